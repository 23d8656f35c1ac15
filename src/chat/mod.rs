//! Two-party chat between company staff and applicants.

pub mod repository;
pub mod service;

pub use repository::ChatRepository;
pub use service::{ChatService, SendMessageInput, SentMessage};
