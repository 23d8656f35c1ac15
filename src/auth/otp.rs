//! One-time codes for email confirmation and password reset.
//!
//! Codes are six digits, stored as sha256 digests, and expire after a
//! configurable window. A background sweeper removes expired rows.

use chrono::{Duration, Utc};
use diesel::prelude::*;
use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::models::{NewOtpCode, OtpCode};
use crate::DbPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    ConfirmEmail,
    ResetPassword,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::ConfirmEmail => "confirm_email",
            OtpPurpose::ResetPassword => "reset_password",
        }
    }
}

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000))
}

pub fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Invalidates any outstanding codes for the same purpose and stores a new
/// hashed code. Returns the plaintext code for delivery.
pub fn issue_code(
    conn: &mut PgConnection,
    user_id: Uuid,
    purpose: OtpPurpose,
    expiry_mins: i64,
) -> Result<String, diesel::result::Error> {
    use crate::schema::otp_codes;

    let now = Utc::now().naive_utc();

    diesel::update(
        otp_codes::table
            .filter(otp_codes::user_id.eq(user_id))
            .filter(otp_codes::purpose.eq(purpose.as_str()))
            .filter(otp_codes::consumed_at.is_null()),
    )
    .set(otp_codes::consumed_at.eq(now))
    .execute(conn)?;

    let code = generate_code();
    let new_code = NewOtpCode {
        user_id,
        code_hash: hash_code(&code),
        purpose: purpose.as_str().to_string(),
        expires_at: now + Duration::minutes(expiry_mins),
    };

    diesel::insert_into(otp_codes::table)
        .values(&new_code)
        .execute(conn)?;

    Ok(code)
}

/// Checks the submitted code against the newest unconsumed, unexpired code
/// for this user and purpose, consuming it on success.
pub fn consume_code(
    conn: &mut PgConnection,
    user_id: Uuid,
    purpose: OtpPurpose,
    submitted: &str,
) -> Result<bool, diesel::result::Error> {
    use crate::schema::otp_codes;

    let now = Utc::now().naive_utc();

    let candidate: Option<OtpCode> = otp_codes::table
        .filter(otp_codes::user_id.eq(user_id))
        .filter(otp_codes::purpose.eq(purpose.as_str()))
        .filter(otp_codes::consumed_at.is_null())
        .filter(otp_codes::expires_at.gt(now))
        .order(otp_codes::created_at.desc())
        .first::<OtpCode>(conn)
        .optional()?;

    let Some(record) = candidate else {
        return Ok(false);
    };

    if record.code_hash != hash_code(submitted) {
        return Ok(false);
    }

    diesel::update(otp_codes::table.filter(otp_codes::id.eq(record.id)))
        .set(otp_codes::consumed_at.eq(now))
        .execute(conn)?;

    Ok(true)
}

pub fn delete_expired(conn: &mut PgConnection) -> Result<usize, diesel::result::Error> {
    use crate::schema::otp_codes;

    let now = Utc::now().naive_utc();
    diesel::delete(
        otp_codes::table.filter(
            otp_codes::expires_at
                .lt(now)
                .or(otp_codes::consumed_at.is_not_null()),
        ),
    )
    .execute(conn)
}

/// Periodic sweeper for expired and consumed codes.
pub struct OtpSweeper {
    pool: DbPool,
    interval_secs: u64,
    shutdown: watch::Receiver<bool>,
}

impl OtpSweeper {
    pub fn new(pool: DbPool, interval_secs: u64, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            pool,
            interval_secs,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!(
            interval_secs = self.interval_secs,
            "One-time code sweeper started"
        );

        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(self.interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        info!("One-time code sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn sweep_once(&self) {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(
            move || -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
                let mut conn = pool.get()?;
                Ok(delete_expired(&mut conn)?)
            },
        )
        .await;

        match result {
            Ok(Ok(deleted)) if deleted > 0 => {
                debug!(deleted = deleted, "Removed stale one-time codes");
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!(error = %e, "One-time code sweep failed"),
            Err(e) => error!(error = %e, "One-time code sweep task panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_is_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_hash_is_stable_and_hex() {
        let a = hash_code("123456");
        let b = hash_code("123456");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_different_codes_hash_differently() {
        assert_ne!(hash_code("123456"), hash_code("123457"));
    }

    #[test]
    fn test_purpose_labels() {
        assert_eq!(OtpPurpose::ConfirmEmail.as_str(), "confirm_email");
        assert_eq!(OtpPurpose::ResetPassword.as_str(), "reset_password");
    }
}
