//! Ed25519-signed access and refresh tokens.
//!
//! Access tokens carry email and role so protected handlers never need a
//! user lookup for identity. Refresh tokens carry only a `token_id` that is
//! matched against the stored hash, which is what makes rotation and
//! logout-all enforceable server side.

use jwt_simple::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshCustomClaims {
    pub token_id: String,
}

/// Verified access token claims, flattened for handler use.
#[derive(Debug, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    pub fn is_admin(&self) -> bool {
        self.role == "Admin"
    }
}

#[derive(Debug, Clone)]
pub struct RefreshClaims {
    pub sub: String,
    pub token_id: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct JwtConfig {
    key_pair: Arc<Ed25519KeyPair>,
    public_key: Arc<Ed25519PublicKey>,
    pub access_token_expiry: i64,
    pub refresh_token_expiry: i64,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

fn epoch_secs(ts: Option<jwt_simple::prelude::UnixTimeStamp>) -> i64 {
    ts.map(|t| t.as_secs() as i64).unwrap_or(0)
}

impl JwtConfig {
    /// Reads `JWT_PRIVATE_KEY`, a base64-encoded Ed25519 key. Panics when
    /// the key is missing or malformed since the service cannot mint tokens
    /// without it.
    pub fn from_env_with_expiry(
        access_token_expiry: i64,
        refresh_token_expiry: i64,
        issuer: Option<String>,
        audience: Option<String>,
    ) -> Self {
        use base64::Engine;

        let encoded = std::env::var("JWT_PRIVATE_KEY").expect("JWT_PRIVATE_KEY must be set");
        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .expect("JWT_PRIVATE_KEY must be valid base64");
        let key_pair = Ed25519KeyPair::from_bytes(&key_bytes)
            .expect("JWT_PRIVATE_KEY must be a valid Ed25519 key");

        let mut config = Self::from_key_pair(key_pair);
        config.access_token_expiry = access_token_expiry;
        config.refresh_token_expiry = refresh_token_expiry;
        config.issuer = issuer;
        config.audience = audience;
        config
    }

    pub fn from_key_pair(key_pair: Ed25519KeyPair) -> Self {
        let public_key = key_pair.public_key();
        Self {
            key_pair: Arc::new(key_pair),
            public_key: Arc::new(public_key),
            access_token_expiry: 3600,
            refresh_token_expiry: 604800,
            issuer: None,
            audience: None,
        }
    }

    /// Fresh key pair as (private, public) base64 strings, for key
    /// provisioning and test setups.
    pub fn generate_key_pair() -> (String, String) {
        use base64::Engine;

        let key_pair = Ed25519KeyPair::generate();
        (
            base64::engine::general_purpose::STANDARD.encode(key_pair.to_bytes()),
            base64::engine::general_purpose::STANDARD.encode(key_pair.public_key().to_bytes()),
        )
    }

    fn sign<C: Serialize + serde::de::DeserializeOwned>(
        &self,
        custom: C,
        subject: String,
        expiry_secs: i64,
    ) -> Result<String, jwt_simple::Error> {
        let mut claims = jwt_simple::claims::Claims::with_custom_claims(
            custom,
            Duration::from_secs(expiry_secs as u64),
        )
        .with_subject(subject);

        if let Some(issuer) = &self.issuer {
            claims = claims.with_issuer(issuer);
        }
        if let Some(audience) = &self.audience {
            claims = claims.with_audience(audience);
        }

        self.key_pair.sign(claims)
    }

    fn verification_options(&self) -> VerificationOptions {
        let mut options = VerificationOptions::default();
        if let Some(issuer) = &self.issuer {
            options.allowed_issuers = Some(HashSet::from([issuer.clone()]));
        }
        if let Some(audience) = &self.audience {
            options.allowed_audiences = Some(HashSet::from([audience.clone()]));
        }
        options
    }

    pub fn generate_access_token(
        &self,
        user_id: Uuid,
        email: &str,
        role: &str,
    ) -> Result<String, jwt_simple::Error> {
        self.sign(
            AccessClaims {
                email: email.to_string(),
                role: role.to_string(),
            },
            user_id.to_string(),
            self.access_token_expiry,
        )
    }

    pub fn generate_refresh_token(&self, user_id: Uuid) -> Result<String, jwt_simple::Error> {
        self.sign(
            RefreshCustomClaims {
                token_id: Uuid::new_v4().to_string(),
            },
            user_id.to_string(),
            self.refresh_token_expiry,
        )
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, jwt_simple::Error> {
        let verified = self
            .public_key
            .verify_token::<AccessClaims>(token, Some(self.verification_options()))?;

        Ok(Claims {
            sub: verified.subject.unwrap_or_default(),
            email: verified.custom.email,
            role: verified.custom.role,
            exp: epoch_secs(verified.expires_at),
            iat: epoch_secs(verified.issued_at),
        })
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, jwt_simple::Error> {
        let verified = self
            .public_key
            .verify_token::<RefreshCustomClaims>(token, Some(self.verification_options()))?;

        Ok(RefreshClaims {
            sub: verified.subject.unwrap_or_default(),
            token_id: verified.custom.token_id,
            exp: epoch_secs(verified.expires_at),
            iat: epoch_secs(verified.issued_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig::from_key_pair(Ed25519KeyPair::generate())
    }

    #[test]
    fn test_access_token_round_trip() {
        let config = test_config();
        let user_id = Uuid::new_v4();

        let token = config
            .generate_access_token(user_id, "someone@example.com", "User")
            .unwrap();
        let claims = config.verify_access_token(&token).unwrap();

        assert_eq!(claims.user_id(), Some(user_id));
        assert_eq!(claims.email, "someone@example.com");
        assert!(!claims.is_admin());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_admin_role_is_recognized() {
        let config = test_config();
        let token = config
            .generate_access_token(Uuid::new_v4(), "admin@example.com", "Admin")
            .unwrap();

        assert!(config.verify_access_token(&token).unwrap().is_admin());
    }

    #[test]
    fn test_refresh_tokens_carry_unique_token_ids() {
        let config = test_config();
        let user_id = Uuid::new_v4();

        let first = config.generate_refresh_token(user_id).unwrap();
        let second = config.generate_refresh_token(user_id).unwrap();

        let first = config.verify_refresh_token(&first).unwrap();
        let second = config.verify_refresh_token(&second).unwrap();

        assert_eq!(first.sub, user_id.to_string());
        assert_ne!(first.token_id, second.token_id);
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        assert!(test_config().verify_access_token("not.a.token").is_err());
    }

    #[test]
    fn test_token_from_another_key_is_rejected() {
        let signer = test_config();
        let verifier = test_config();

        let token = signer
            .generate_access_token(Uuid::new_v4(), "someone@example.com", "User")
            .unwrap();

        assert!(verifier.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_access_token_is_not_a_refresh_token() {
        let config = test_config();
        let token = config
            .generate_access_token(Uuid::new_v4(), "someone@example.com", "User")
            .unwrap();

        assert!(config.verify_refresh_token(&token).is_err());
    }

    #[test]
    fn test_generated_key_pair_is_usable() {
        use base64::Engine;

        let (private_b64, public_b64) = JwtConfig::generate_key_pair();
        assert!(!public_b64.is_empty());

        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(&private_b64)
            .unwrap();
        let config = JwtConfig::from_key_pair(Ed25519KeyPair::from_bytes(&key_bytes).unwrap());

        let token = config
            .generate_access_token(Uuid::new_v4(), "someone@example.com", "User")
            .unwrap();
        assert!(config.verify_access_token(&token).is_ok());
    }
}
