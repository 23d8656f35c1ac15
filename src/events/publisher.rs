//! Background publisher that drains the outbox into a Redis Stream.
//!
//! Handlers only ever write events to the outbox table inside their own
//! transactions; this task owns delivery. Without Redis the outbox is still
//! drained so the table does not grow without bound.

use deadpool_redis::Pool as RedisPool;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::models::OutboxEvent;
use crate::DbPool;

use super::outbox::OutboxService;

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub stream_name: String,
    pub retention_days: i32,
    pub cleanup_interval_polls: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            stream_name: "hireline:events".to_string(),
            retention_days: 7,
            cleanup_interval_polls: 3600,
        }
    }
}

pub struct EventPublisher {
    db_pool: DbPool,
    redis_pool: Option<RedisPool>,
    config: PublisherConfig,
}

impl EventPublisher {
    pub fn new(db_pool: DbPool, redis_pool: Option<RedisPool>, config: PublisherConfig) -> Self {
        Self {
            db_pool,
            redis_pool,
            config,
        }
    }

    pub fn spawn(self) -> watch::Sender<bool> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(self.run(shutdown_rx));
        shutdown_tx
    }

    #[instrument(skip(self, shutdown_rx), name = "event_publisher")]
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis(),
            batch_size = self.config.batch_size,
            stream = %self.config.stream_name,
            "Outbox publisher running"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        let mut ticks: u32 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    ticks = ticks.wrapping_add(1);

                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, "Outbox poll failed");
                    }

                    if ticks.is_multiple_of(self.config.cleanup_interval_polls) {
                        if let Err(e) = self.cleanup().await {
                            warn!(error = %e, "Outbox retention cleanup failed");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.drain().await;
        info!("Outbox publisher stopped");
    }

    /// Bounded final drain so a busy outbox cannot stall shutdown.
    async fn drain(&self) {
        for _ in 0..3 {
            match self.poll_once().await {
                Ok(0) => break,
                Ok(n) => debug!(count = n, "Drained outbox batch on shutdown"),
                Err(e) => {
                    error!(error = %e, "Final outbox drain failed");
                    break;
                }
            }
        }
    }

    async fn on_blocking<T, F>(&self, work: F) -> Result<T, PublishError>
    where
        T: Send + 'static,
        F: FnOnce(&mut diesel::PgConnection) -> Result<T, diesel::result::Error> + Send + 'static,
    {
        let pool = self.db_pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| PublishError::Database(e.to_string()))?;
            work(&mut conn).map_err(|e| PublishError::Database(e.to_string()))
        })
        .await
        .map_err(|e| PublishError::Task(e.to_string()))?
    }

    #[instrument(skip(self))]
    async fn poll_once(&self) -> Result<usize, PublishError> {
        let batch_size = self.config.batch_size;
        let events = self
            .on_blocking(move |conn| OutboxService::fetch_unpublished(conn, batch_size))
            .await?;

        if events.is_empty() {
            return Ok(0);
        }

        match &self.redis_pool {
            Some(redis_pool) => self.publish_to_stream(redis_pool, &events).await?,
            None => debug!(
                count = events.len(),
                "No Redis configured, marking batch published without streaming"
            ),
        }

        let event_ids: Vec<_> = events.iter().map(|e| e.id).collect();
        self.on_blocking(move |conn| OutboxService::mark_published_batch(conn, &event_ids))
            .await?;

        Ok(events.len())
    }

    fn envelope(event: &OutboxEvent) -> String {
        serde_json::json!({
            "id": event.id.to_string(),
            "event_type": event.event_type,
            "aggregate_type": event.aggregate_type,
            "aggregate_id": event.aggregate_id.to_string(),
            "payload": event.payload,
            "created_at": event.created_at.to_string(),
        })
        .to_string()
    }

    #[instrument(skip(self, redis_pool, events), fields(count = events.len()))]
    async fn publish_to_stream(
        &self,
        redis_pool: &RedisPool,
        events: &[OutboxEvent],
    ) -> Result<(), PublishError> {
        use redis::AsyncCommands;

        let mut conn = redis_pool
            .get()
            .await
            .map_err(|e| PublishError::Redis(e.to_string()))?;

        for event in events {
            let fields = [
                ("event_type", event.event_type.clone()),
                ("data", Self::envelope(event)),
            ];

            let _: String = conn
                .xadd(&self.config.stream_name, "*", &fields)
                .await
                .map_err(|e| PublishError::Redis(e.to_string()))?;

            debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Event streamed"
            );
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn cleanup(&self) -> Result<usize, PublishError> {
        let retention_days = self.config.retention_days;
        self.on_blocking(move |conn| OutboxService::cleanup_old_events(conn, retention_days))
            .await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Task error: {0}")]
    Task(String),
}

pub struct EventPublisherBuilder {
    db_pool: DbPool,
    redis_pool: Option<RedisPool>,
    config: PublisherConfig,
}

impl EventPublisherBuilder {
    pub fn new(db_pool: DbPool) -> Self {
        Self {
            db_pool,
            redis_pool: None,
            config: PublisherConfig::default(),
        }
    }

    pub fn maybe_redis_pool(mut self, pool: Option<RedisPool>) -> Self {
        self.redis_pool = pool;
        self
    }

    pub fn config(mut self, config: PublisherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> EventPublisher {
        EventPublisher::new(self.db_pool, self.redis_pool, self.config)
    }

    pub fn spawn(self) -> watch::Sender<bool> {
        self.build().spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_targets_hireline_stream() {
        let config = PublisherConfig::default();
        assert_eq!(config.stream_name, "hireline:events");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.retention_days, 7);
    }

    #[test]
    fn test_publish_error_messages_name_the_subsystem() {
        assert!(PublishError::Database("boom".into())
            .to_string()
            .starts_with("Database error"));
        assert!(PublishError::Redis("boom".into())
            .to_string()
            .starts_with("Redis error"));
    }
}
