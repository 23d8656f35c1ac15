//! Domain event vocabulary.
//!
//! Event names are dotted strings grouped by aggregate so stream consumers
//! can subscribe by prefix (`job.*`, `chat.*`). Renaming a variant's string
//! is a breaking change for every consumer of the Redis stream.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    UserRegistered,
    EmailConfirmed,
    LoginSuccess,
    LoginFailed,
    LogoutCompleted,
    TokenRefreshed,
    AccountLocked,
    AccountDeleted,
    UserBanned,
    UserUnbanned,
    PasswordResetRequested,
    PasswordResetCompleted,

    CompanyCreated,
    CompanyUpdated,
    CompanyApproved,
    CompanyBanned,
    CompanyDeleted,
    HrAdded,
    HrRemoved,

    JobCreated,
    JobUpdated,
    JobClosed,
    JobDeleted,

    ApplicationSubmitted,
    ApplicationStatusChanged,

    ConversationCreated,
    ConversationDeleted,
    MessageSent,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        use EventType::*;
        match self {
            UserRegistered => "user.registered",
            EmailConfirmed => "user.email_confirmed",
            LoginSuccess => "auth.login.success",
            LoginFailed => "auth.login.failed",
            LogoutCompleted => "auth.logout",
            TokenRefreshed => "auth.token.refreshed",
            AccountLocked => "auth.account.locked",
            AccountDeleted => "user.deleted",
            UserBanned => "user.banned",
            UserUnbanned => "user.unbanned",
            PasswordResetRequested => "auth.password.reset_requested",
            PasswordResetCompleted => "auth.password.reset_completed",
            CompanyCreated => "company.created",
            CompanyUpdated => "company.updated",
            CompanyApproved => "company.approved",
            CompanyBanned => "company.banned",
            CompanyDeleted => "company.deleted",
            HrAdded => "company.hr.added",
            HrRemoved => "company.hr.removed",
            JobCreated => "job.created",
            JobUpdated => "job.updated",
            JobClosed => "job.closed",
            JobDeleted => "job.deleted",
            ApplicationSubmitted => "application.submitted",
            ApplicationStatusChanged => "application.status_changed",
            ConversationCreated => "chat.conversation.created",
            ConversationDeleted => "chat.conversation.deleted",
            MessageSent => "chat.message.sent",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateType {
    User,
    Company,
    Job,
    Application,
    Conversation,
}

impl AggregateType {
    pub fn as_str(&self) -> &'static str {
        use AggregateType::*;
        match self {
            User => "user",
            Company => "company",
            Job => "job",
            Application => "application",
            Conversation => "conversation",
        }
    }
}

impl std::fmt::Display for AggregateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_type: EventType,
    pub aggregate_type: AggregateType,
    pub aggregate_id: Uuid,
    pub payload: serde_json::Value,
    pub metadata: EventMetadata,
}

/// Actor and request context stamped onto every event at emit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub user_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub request_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl EventMetadata {
    pub fn record(
        user_id: Option<Uuid>,
        company_id: Option<Uuid>,
        request_id: Option<String>,
    ) -> Self {
        Self {
            user_id,
            company_id,
            request_id,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRegisteredPayload {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginFailedPayload {
    pub email: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSubmittedPayload {
    pub job_id: Uuid,
    pub company_id: Uuid,
    pub applicant_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationStatusChangedPayload {
    pub job_id: Uuid,
    pub applicant_id: Uuid,
    pub old_status: String,
    pub new_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSentPayload {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_grouped_by_aggregate() {
        let cases = [
            (EventType::UserRegistered, "user.registered"),
            (EventType::AccountLocked, "auth.account.locked"),
            (EventType::HrRemoved, "company.hr.removed"),
            (EventType::JobClosed, "job.closed"),
            (EventType::ApplicationSubmitted, "application.submitted"),
            (EventType::MessageSent, "chat.message.sent"),
        ];
        for (event, expected) in cases {
            assert_eq!(event.as_str(), expected);
            assert_eq!(event.to_string(), expected);
        }
    }

    #[test]
    fn test_aggregate_names_are_lowercase_singular() {
        assert_eq!(AggregateType::Company.to_string(), "company");
        assert_eq!(AggregateType::Conversation.to_string(), "conversation");
    }

    #[test]
    fn test_metadata_records_context_and_timestamp() {
        let user_id = Uuid::new_v4();
        let metadata = EventMetadata::record(Some(user_id), None, Some("req-9".into()));

        assert_eq!(metadata.user_id, Some(user_id));
        assert!(metadata.company_id.is_none());
        assert_eq!(metadata.request_id.as_deref(), Some("req-9"));
        assert!(metadata.timestamp <= chrono::Utc::now());
    }

    #[test]
    fn test_domain_event_serializes_payload_verbatim() {
        let event = DomainEvent {
            event_type: EventType::JobCreated,
            aggregate_type: AggregateType::Job,
            aggregate_id: Uuid::new_v4(),
            payload: serde_json::json!({"title": "Backend Engineer"}),
            metadata: EventMetadata::record(None, None, None),
        };

        let json = serde_json::to_value(&event).expect("event should serialize");
        assert_eq!(json["payload"]["title"], "Backend Engineer");
        assert_eq!(json["event_type"], "JobCreated");
    }
}
