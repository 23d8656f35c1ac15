//! Redis-backed shared state: token revocation and company membership.
//!
//! Every consumer tolerates a missing pool, so the service degrades to
//! database-only behavior when Redis is not configured.

pub mod membership_cache;
pub mod token_revocation;

use deadpool_redis::{Config as RedisPoolConfig, Pool, Runtime};
use std::sync::Arc;
use tracing::info;

use crate::config::RedisConfig;

pub use membership_cache::MembershipCache;
pub use token_revocation::TokenRevocationList;

pub fn create_redis_pool(config: &RedisConfig) -> Option<Pool> {
    let url = config.url.as_ref()?;
    let timeout = std::time::Duration::from_secs(config.connection_timeout_secs);

    let pool = RedisPoolConfig::from_url(url)
        .builder()
        .ok()?
        .max_size(config.pool_size)
        .wait_timeout(Some(timeout))
        .create_timeout(Some(timeout))
        .runtime(Runtime::Tokio1)
        .build()
        .ok()?;

    // Log the host part only; the URL may carry credentials.
    info!(redis_url = %url.split('@').next_back().unwrap_or("***"), "Redis pool created");
    Some(pool)
}

#[derive(Clone)]
pub struct CacheServices {
    pub token_revocation: Arc<TokenRevocationList>,
    pub membership_cache: Arc<MembershipCache>,
}

impl CacheServices {
    pub fn new(redis_pool: Option<Pool>) -> Self {
        Self {
            token_revocation: Arc::new(TokenRevocationList::new(redis_pool.clone())),
            membership_cache: Arc::new(MembershipCache::new(redis_pool)),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }
}
