//! Authentication primitives: JWT issuance, password hashing, one-time
//! codes, and login lockout.

pub mod jwt;
pub mod lockout;
pub mod otp;
pub mod password;
