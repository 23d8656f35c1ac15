//! Transactional outbox table access.
//!
//! Events are inserted in the same database transaction as the state change
//! they describe, so an event exists iff the change committed. The publisher
//! task owns the fetch/mark/cleanup side.

use diesel::prelude::*;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::models::{NewOutboxEvent, OutboxEvent};
use crate::schema::outbox_events;

use super::types::{AggregateType, DomainEvent, EventMetadata, EventType};

#[derive(Debug, Clone)]
pub struct OutboxService;

impl OutboxService {
    /// Inserts one event row. Actor and request context go into the payload
    /// envelope under `metadata` since the table itself only keys by
    /// aggregate. Failures are logged here so call sites that treat emission
    /// as best-effort can ignore the result without losing the error.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(conn, payload), fields(event_type = %event_type, aggregate_id = %aggregate_id))]
    pub fn emit(
        conn: &mut PgConnection,
        event_type: EventType,
        aggregate_type: AggregateType,
        aggregate_id: Uuid,
        payload: serde_json::Value,
        user_id: Option<Uuid>,
        company_id: Option<Uuid>,
        request_id: Option<String>,
    ) -> Result<OutboxEvent, diesel::result::Error> {
        let event = DomainEvent {
            event_type,
            aggregate_type,
            aggregate_id,
            payload,
            metadata: EventMetadata::record(user_id, company_id, request_id),
        };

        let row = NewOutboxEvent {
            event_type: event.event_type.as_str().to_string(),
            aggregate_type: event.aggregate_type.as_str().to_string(),
            aggregate_id: event.aggregate_id,
            payload: serde_json::json!({
                "data": event.payload,
                "metadata": event.metadata,
            }),
        };

        let written: OutboxEvent = diesel::insert_into(outbox_events::table)
            .values(&row)
            .returning(OutboxEvent::as_returning())
            .get_result(conn)
            .inspect_err(|e| {
                warn!(error = %e, event_type = %event_type, "Failed to write event to outbox")
            })?;

        debug!(event_id = %written.id, "Event written to outbox");
        Ok(written)
    }

    #[instrument(skip(conn))]
    pub fn fetch_unpublished(
        conn: &mut PgConnection,
        limit: i64,
    ) -> Result<Vec<OutboxEvent>, diesel::result::Error> {
        outbox_events::table
            .filter(outbox_events::published.eq(false))
            .order(outbox_events::created_at.asc())
            .limit(limit)
            .select(OutboxEvent::as_select())
            .load(conn)
    }

    #[instrument(skip(conn, event_ids), fields(count = event_ids.len()))]
    pub fn mark_published_batch(
        conn: &mut PgConnection,
        event_ids: &[Uuid],
    ) -> Result<usize, diesel::result::Error> {
        diesel::update(outbox_events::table)
            .filter(outbox_events::id.eq_any(event_ids))
            .set((
                outbox_events::published.eq(true),
                outbox_events::published_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
    }

    /// Deletes published rows older than the retention window. Unpublished
    /// rows are never deleted.
    #[instrument(skip(conn))]
    pub fn cleanup_old_events(
        conn: &mut PgConnection,
        older_than_days: i32,
    ) -> Result<usize, diesel::result::Error> {
        let now = chrono::Utc::now().naive_utc();
        let cutoff = now
            .checked_sub_signed(chrono::Duration::days(older_than_days.into()))
            .unwrap_or(now);

        let count = diesel::delete(outbox_events::table)
            .filter(outbox_events::published.eq(true))
            .filter(outbox_events::published_at.lt(cutoff))
            .execute(conn)?;

        if count > 0 {
            debug!(count, older_than_days, "Cleaned up old outbox events");
        }
        Ok(count)
    }
}
