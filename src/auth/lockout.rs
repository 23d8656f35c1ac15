//! Redis-backed sign-in lockout.
//!
//! Failed attempts are counted per email within a rolling window; crossing
//! the threshold locks the account for the configured duration. Without a
//! Redis pool the manager degrades to a no-op and sign-ins proceed.

use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

const ATTEMPTS_PREFIX: &str = "hireline:signin:attempts:";
const LOCKED_PREFIX: &str = "hireline:signin:locked:";

#[derive(Clone)]
pub struct LockoutManager {
    pool: Option<Pool>,
    max_attempts: u32,
    lockout_duration_secs: u64,
}

impl LockoutManager {
    pub fn new(pool: Option<Pool>, max_attempts: u32, lockout_duration_mins: u32) -> Self {
        Self {
            pool,
            max_attempts,
            lockout_duration_secs: lockout_duration_mins as u64 * 60,
        }
    }

    fn attempts_key(email: &str) -> String {
        format!("{}{}", ATTEMPTS_PREFIX, email.to_lowercase())
    }

    fn locked_key(email: &str) -> String {
        format!("{}{}", LOCKED_PREFIX, email.to_lowercase())
    }

    async fn conn(&self) -> Result<Connection, LockoutError> {
        let pool = self.pool.as_ref().ok_or(LockoutError::NoRedis)?;
        pool.get().await.map_err(|_| LockoutError::ConnectionFailed)
    }

    pub async fn is_locked(&self, email: &str) -> bool {
        let Ok(mut conn) = self.conn().await else {
            return false;
        };

        conn.exists::<_, bool>(Self::locked_key(email))
            .await
            .unwrap_or(false)
    }

    /// Seconds until the lock expires, if the account is locked.
    pub async fn get_lockout_remaining(&self, email: &str) -> Option<u64> {
        let mut conn = self.conn().await.ok()?;
        let ttl: i64 = conn.ttl(Self::locked_key(email)).await.ok()?;

        (ttl > 0).then_some(ttl as u64)
    }

    /// Counts a failed attempt. Returns true when this attempt locked the
    /// account.
    pub async fn record_failed_attempt(&self, email: &str) -> Result<bool, LockoutError> {
        let mut conn = self.conn().await?;
        let attempts_key = Self::attempts_key(email);

        let attempts: u32 = conn
            .incr(&attempts_key, 1)
            .await
            .map_err(|_| LockoutError::OperationFailed)?;

        if attempts == 1 {
            // The attempt window shares the lockout duration.
            let _ = conn
                .expire::<_, ()>(&attempts_key, self.lockout_duration_secs as i64)
                .await;
        }

        debug!(
            email = %email,
            attempts = attempts,
            max_attempts = self.max_attempts,
            "Recorded failed sign-in attempt"
        );

        if attempts < self.max_attempts {
            return Ok(false);
        }

        let _: () = conn
            .set_ex(Self::locked_key(email), "1", self.lockout_duration_secs)
            .await
            .map_err(|_| LockoutError::OperationFailed)?;
        let _: () = conn
            .del(&attempts_key)
            .await
            .map_err(|_| LockoutError::OperationFailed)?;

        warn!(
            email = %email,
            lockout_duration_secs = self.lockout_duration_secs,
            "Account locked after repeated failed sign-ins"
        );

        Ok(true)
    }

    pub async fn clear_failed_attempts(&self, email: &str) -> Result<(), LockoutError> {
        let mut conn = self.conn().await?;

        let _: () = conn
            .del(Self::attempts_key(email))
            .await
            .map_err(|_| LockoutError::OperationFailed)?;

        debug!(email = %email, "Cleared failed sign-in attempts");
        Ok(())
    }

    /// Drops both the lock and the attempt counter.
    pub async fn unlock_account(&self, email: &str) -> Result<(), LockoutError> {
        let mut conn = self.conn().await?;

        let _: () = conn
            .del(Self::locked_key(email))
            .await
            .map_err(|_| LockoutError::OperationFailed)?;
        let _: () = conn
            .del(Self::attempts_key(email))
            .await
            .map_err(|_| LockoutError::OperationFailed)?;

        info!(email = %email, "Account unlocked");
        Ok(())
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }
}

#[derive(Debug, Clone)]
pub enum LockoutError {
    NoRedis,
    ConnectionFailed,
    OperationFailed,
}

impl std::fmt::Display for LockoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockoutError::NoRedis => write!(f, "Redis not configured"),
            LockoutError::ConnectionFailed => write!(f, "Redis connection failed"),
            LockoutError::OperationFailed => write!(f, "Redis operation failed"),
        }
    }
}

impl std::error::Error for LockoutError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_without_redis_is_unavailable() {
        let manager = LockoutManager::new(None, 5, 15);
        assert!(!manager.is_available());
    }

    #[tokio::test]
    async fn test_nothing_is_locked_without_redis() {
        let manager = LockoutManager::new(None, 5, 15);
        assert!(!manager.is_locked("test@example.com").await);
        assert!(manager.get_lockout_remaining("test@example.com").await.is_none());
    }

    #[tokio::test]
    async fn test_recording_without_redis_errors() {
        let manager = LockoutManager::new(None, 5, 15);
        assert!(matches!(
            manager.record_failed_attempt("test@example.com").await,
            Err(LockoutError::NoRedis)
        ));
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        assert_eq!(
            LockoutManager::attempts_key("Test@Example.COM"),
            "hireline:signin:attempts:test@example.com"
        );
        assert_eq!(
            LockoutManager::locked_key("Test@Example.COM"),
            "hireline:signin:locked:test@example.com"
        );
    }
}
