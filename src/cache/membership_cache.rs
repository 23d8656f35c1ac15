//! Redis-backed company membership caching.
//!
//! HR/owner membership sits on the hot path of realtime authorization, so
//! lookups are cached with a short TTL. Roster changes and company bans
//! invalidate eagerly rather than waiting for expiry.

use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

const MEMBERSHIP_PREFIX: &str = "hireline:membership:";
const DEFAULT_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedMembership {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub is_owner: bool,
    pub is_hr: bool,
    pub cached_at: i64,
}

impl CachedMembership {
    pub fn is_hr_or_owner(&self) -> bool {
        self.is_owner || self.is_hr
    }
}

#[derive(Clone)]
pub struct MembershipCache {
    pool: Option<Pool>,
    ttl_secs: u64,
}

impl MembershipCache {
    pub fn new(pool: Option<Pool>) -> Self {
        Self {
            pool,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }

    fn cache_key(user_id: Uuid, company_id: Uuid) -> String {
        format!("{}{}:{}", MEMBERSHIP_PREFIX, user_id, company_id)
    }

    async fn conn(&self) -> Result<Connection, CacheError> {
        let pool = self.pool.as_ref().ok_or(CacheError::NoRedis)?;
        pool.get().await.map_err(|e| {
            error!(error = %e, "Failed to get Redis connection");
            CacheError::ConnectionFailed
        })
    }

    pub async fn set(
        &self,
        user_id: Uuid,
        company_id: Uuid,
        is_owner: bool,
        is_hr: bool,
    ) -> Result<(), CacheError> {
        let entry = CachedMembership {
            user_id,
            company_id,
            is_owner,
            is_hr,
            cached_at: chrono::Utc::now().timestamp(),
        };
        let value = serde_json::to_string(&entry).map_err(|_| CacheError::SerializationFailed)?;

        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(Self::cache_key(user_id, company_id), value, self.ttl_secs)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to cache membership");
                CacheError::OperationFailed
            })?;

        debug!(user_id = %user_id, company_id = %company_id, "Membership cached");
        Ok(())
    }

    pub async fn get(&self, user_id: Uuid, company_id: Uuid) -> Option<CachedMembership> {
        let mut conn = self.conn().await.ok()?;

        let value: Option<String> = conn
            .get(Self::cache_key(user_id, company_id))
            .await
            .ok()?;

        value.and_then(|v| serde_json::from_str(&v).ok())
    }

    pub async fn invalidate(&self, user_id: Uuid, company_id: Uuid) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;

        conn.del::<_, ()>(Self::cache_key(user_id, company_id))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to invalidate membership cache");
                CacheError::OperationFailed
            })?;

        debug!(user_id = %user_id, company_id = %company_id, "Membership cache invalidated");
        Ok(())
    }

    /// Drops every cached membership for a company. Used after company bans,
    /// where the whole roster must lose access at once.
    pub async fn invalidate_company(&self, company_id: Uuid) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;

        let pattern = format!("{}*:{}", MEMBERSHIP_PREFIX, company_id);
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut *conn)
            .await
            .unwrap_or_default();

        if !keys.is_empty() {
            conn.del::<_, ()>(keys).await.map_err(|e| {
                error!(error = %e, "Failed to invalidate company membership cache");
                CacheError::OperationFailed
            })?;
        }

        debug!(company_id = %company_id, "Company membership cache invalidated");
        Ok(())
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("Redis not configured")]
    NoRedis,
    #[error("Redis connection failed")]
    ConnectionFailed,
    #[error("Redis operation failed")]
    OperationFailed,
    #[error("Serialization failed")]
    SerializationFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_without_pool() {
        assert!(!MembershipCache::new(None).is_available());
    }

    #[tokio::test]
    async fn test_get_misses_without_pool() {
        let cache = MembershipCache::new(None);
        assert!(cache.get(Uuid::new_v4(), Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_set_errors_without_pool() {
        let cache = MembershipCache::new(None);
        assert!(matches!(
            cache.set(Uuid::new_v4(), Uuid::new_v4(), true, false).await,
            Err(CacheError::NoRedis)
        ));
    }

    #[test]
    fn test_cache_key_embeds_both_ids() {
        let user_id = Uuid::new_v4();
        let company_id = Uuid::new_v4();
        let key = MembershipCache::cache_key(user_id, company_id);
        assert!(key.starts_with("hireline:membership:"));
        assert!(key.ends_with(&company_id.to_string()));
        assert!(key.contains(&user_id.to_string()));
    }

    #[test]
    fn test_hr_or_owner_requires_either_flag() {
        let entry = CachedMembership {
            user_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            is_owner: false,
            is_hr: true,
            cached_at: 0,
        };
        assert!(entry.is_hr_or_owner());

        let entry = CachedMembership {
            is_hr: false,
            ..entry
        };
        assert!(!entry.is_hr_or_owner());
    }
}
