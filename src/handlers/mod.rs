//! HTTP request handlers.

pub mod admin;
pub mod applications;
pub mod auth;
pub mod chat;
pub mod companies;
pub mod health;
pub mod jobs;
pub mod users;
