//! Argon2id password hashing and signup password policy.

use argon2::{
    password_hash::{
        PasswordHash, PasswordHasher as Argon2PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2, Params,
};
use rand::rngs::OsRng;

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: false,
            require_lowercase: false,
            require_digit: false,
            require_special: false,
        }
    }
}

impl PasswordPolicy {
    /// Policy with every character class required.
    pub fn complex(min_length: usize) -> Self {
        Self {
            min_length,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        }
    }

    pub fn validate(&self, password: &str) -> Result<(), PasswordPolicyError> {
        if password.len() < self.min_length {
            return Err(PasswordPolicyError::TooShort {
                min_length: self.min_length,
            });
        }

        let classes: [(bool, fn(char) -> bool, PasswordPolicyError); 4] = [
            (
                self.require_uppercase,
                |c| c.is_ascii_uppercase(),
                PasswordPolicyError::MissingUppercase,
            ),
            (
                self.require_lowercase,
                |c| c.is_ascii_lowercase(),
                PasswordPolicyError::MissingLowercase,
            ),
            (
                self.require_digit,
                |c| c.is_ascii_digit(),
                PasswordPolicyError::MissingDigit,
            ),
            (
                self.require_special,
                |c| !c.is_alphanumeric(),
                PasswordPolicyError::MissingSpecial,
            ),
        ];

        for (required, pred, err) in classes {
            if required && !password.chars().any(pred) {
                return Err(err);
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PasswordPolicyError {
    #[error("Password must be at least {min_length} characters")]
    TooShort { min_length: usize },
    #[error("Password must contain at least one uppercase letter")]
    MissingUppercase,
    #[error("Password must contain at least one lowercase letter")]
    MissingLowercase,
    #[error("Password must contain at least one digit")]
    MissingDigit,
    #[error("Password must contain at least one special character")]
    MissingSpecial,
}

pub struct PasswordService;

impl PasswordService {
    /// Argon2id with 4MB memory and 3 iterations.
    pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
        let params =
            Params::new(4096, 3, 1, None).map_err(|_| argon2::password_hash::Error::Algorithm)?;
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let salt = SaltString::generate(&mut OsRng);
        Ok(argon2.hash_password(password.as_bytes(), &salt)?.to_string())
    }

    /// A wrong password is `Ok(false)`; `Err` means the stored hash is
    /// malformed or the verifier itself failed.
    pub fn verify_password(
        password: &str,
        password_hash: &str,
    ) -> Result<bool, argon2::password_hash::Error> {
        let parsed = PasswordHash::new(password_hash)?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_accepts_correct_password() {
        let hash = PasswordService::hash_password("hunter2hunter2").unwrap();
        assert!(PasswordService::verify_password("hunter2hunter2", &hash).unwrap());
    }

    #[test]
    fn test_verify_rejects_wrong_password() {
        let hash = PasswordService::hash_password("hunter2hunter2").unwrap();
        assert!(!PasswordService::verify_password("hunter3hunter3", &hash).unwrap());
    }

    #[test]
    fn test_same_password_hashes_differently() {
        let first = PasswordService::hash_password("repeatable").unwrap();
        let second = PasswordService::hash_password("repeatable").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_hash_is_argon2id_phc_string() {
        let hash = PasswordService::hash_password("anything").unwrap();
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(PasswordService::verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_default_policy_only_checks_length() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("lowercase").is_ok());
        assert!(matches!(
            policy.validate("short"),
            Err(PasswordPolicyError::TooShort { min_length: 8 })
        ));
    }

    #[test]
    fn test_complex_policy_requires_every_class() {
        let policy = PasswordPolicy::complex(8);

        assert!(matches!(
            policy.validate("password1!"),
            Err(PasswordPolicyError::MissingUppercase)
        ));
        assert!(matches!(
            policy.validate("PASSWORD1!"),
            Err(PasswordPolicyError::MissingLowercase)
        ));
        assert!(matches!(
            policy.validate("Password!"),
            Err(PasswordPolicyError::MissingDigit)
        ));
        assert!(matches!(
            policy.validate("Password1"),
            Err(PasswordPolicyError::MissingSpecial)
        ));
        assert!(policy.validate("Password1!").is_ok());
    }

    #[test]
    fn test_policy_errors_are_user_facing() {
        let err = PasswordPolicy::complex(10).validate("short").unwrap_err();
        assert!(err.to_string().contains("10 characters"));

        let err = PasswordPolicy::complex(8).validate("password1!").unwrap_err();
        assert!(err.to_string().contains("uppercase"));
    }
}
