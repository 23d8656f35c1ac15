//! Redis-backed access token revocation list.
//!
//! Bans, account deletion, and logout-all must cut off live access tokens
//! before they expire. Individual tokens are keyed by hash; whole-user
//! revocation stores a cutoff timestamp compared against the token's `iat`.

use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;
use tracing::{debug, error};
use uuid::Uuid;

const TOKEN_PREFIX: &str = "hireline:revoked:token:";
const USER_PREFIX: &str = "hireline:revoked:user:";

#[derive(Clone)]
pub struct TokenRevocationList {
    pool: Option<Pool>,
}

impl TokenRevocationList {
    pub fn new(pool: Option<Pool>) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<Connection, RevocationError> {
        let pool = self.pool.as_ref().ok_or(RevocationError::NoRedis)?;
        pool.get().await.map_err(|e| {
            error!(error = %e, "Failed to get Redis connection");
            RevocationError::ConnectionFailed
        })
    }

    pub async fn revoke_token(&self, token_id: &str, ttl_secs: u64) -> Result<(), RevocationError> {
        let mut conn = self.conn().await?;

        conn.set_ex::<_, _, ()>(format!("{}{}", TOKEN_PREFIX, token_id), "1", ttl_secs)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to revoke token");
                RevocationError::OperationFailed
            })?;

        debug!(token_id = %token_id, ttl_secs = ttl_secs, "Token revoked");
        Ok(())
    }

    pub async fn is_token_revoked(&self, token_id: &str) -> bool {
        let Ok(mut conn) = self.conn().await else {
            return false;
        };

        conn.exists::<_, bool>(format!("{}{}", TOKEN_PREFIX, token_id))
            .await
            .unwrap_or(false)
    }

    /// Marks every token issued to the user before now as revoked. The entry
    /// only needs to outlive the longest-lived access token.
    pub async fn revoke_all_user_tokens(
        &self,
        user_id: Uuid,
        ttl_secs: u64,
    ) -> Result<(), RevocationError> {
        let mut conn = self.conn().await?;
        let cutoff = chrono::Utc::now().timestamp();

        conn.set_ex::<_, _, ()>(format!("{}{}", USER_PREFIX, user_id), cutoff, ttl_secs)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user_id, "Failed to revoke user tokens");
                RevocationError::OperationFailed
            })?;

        debug!(user_id = %user_id, "All user tokens revoked");
        Ok(())
    }

    pub async fn is_user_token_revoked(&self, user_id: Uuid, token_iat: i64) -> bool {
        let Ok(mut conn) = self.conn().await else {
            return false;
        };

        let cutoff: Option<i64> = conn
            .get(format!("{}{}", USER_PREFIX, user_id))
            .await
            .ok();

        cutoff.is_some_and(|ts| token_iat < ts)
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }

    pub fn pool(&self) -> Option<&Pool> {
        self.pool.as_ref()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RevocationError {
    #[error("Redis not configured")]
    NoRedis,
    #[error("Redis connection failed")]
    ConnectionFailed,
    #[error("Redis operation failed")]
    OperationFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_without_redis_is_unavailable() {
        let list = TokenRevocationList::new(None);
        assert!(!list.is_available());
        assert!(list.pool().is_none());
    }

    #[tokio::test]
    async fn test_nothing_is_revoked_without_redis() {
        let list = TokenRevocationList::new(None);

        assert!(!list.is_token_revoked("some-token-hash").await);
        assert!(!list.is_user_token_revoked(Uuid::new_v4(), 12345).await);
    }

    #[tokio::test]
    async fn test_revoking_without_redis_errors() {
        let list = TokenRevocationList::new(None);

        assert!(matches!(
            list.revoke_token("some-token-hash", 60).await,
            Err(RevocationError::NoRedis)
        ));
        assert!(matches!(
            list.revoke_all_user_tokens(Uuid::new_v4(), 60).await,
            Err(RevocationError::NoRedis)
        ));
    }
}
