use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Admin => "Admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "User" => Some(Role::User),
            "Admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    System,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::System => "system",
            Provider::Google => "google",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Provider::System),
            "google" => Some(Provider::Google),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ApplicationStatus {
    Pending,
    Viewed,
    InConsideration,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Viewed => "viewed",
            ApplicationStatus::InConsideration => "in-consideration",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ApplicationStatus::Pending),
            "viewed" => Some(ApplicationStatus::Viewed),
            "in-consideration" => Some(ApplicationStatus::InConsideration),
            "accepted" => Some(ApplicationStatus::Accepted),
            "rejected" => Some(ApplicationStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub provider: String,
    pub is_confirmed: bool,
    pub banned_at: Option<NaiveDateTime>,
    pub deleted_at: Option<NaiveDateTime>,
    pub credential_changed_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn role(&self) -> Role {
        Role::parse(&self.role).unwrap_or(Role::User)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub provider: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::companies)]
pub struct Company {
    pub id: Uuid,
    #[schema(example = "Acme Corp")]
    pub name: String,
    #[schema(example = "hr@acme.example")]
    pub email: String,
    pub description: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub created_by: Uuid,
    pub approved_by_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banned_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::companies)]
pub struct NewCompany {
    pub name: String,
    pub email: String,
    pub description: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::company_hrs)]
pub struct NewCompanyHr {
    pub company_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::jobs)]
pub struct Job {
    pub id: Uuid,
    pub company_id: Uuid,
    #[schema(example = "Backend Engineer")]
    pub title: String,
    pub description: String,
    #[schema(example = "Berlin")]
    pub location: String,
    #[schema(example = "full-time")]
    pub job_type: String,
    pub closed: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::jobs)]
pub struct NewJob {
    pub company_id: Uuid,
    pub title: String,
    pub description: String,
    pub location: String,
    pub job_type: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::applications)]
pub struct Application {
    pub id: Uuid,
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub cv_url: String,
    #[schema(example = "pending")]
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Application {
    pub fn status(&self) -> ApplicationStatus {
        ApplicationStatus::parse(&self.status).unwrap_or(ApplicationStatus::Pending)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::applications)]
pub struct NewApplication {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub cv_url: String,
    pub status: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::conversations)]
pub struct Conversation {
    pub id: Uuid,
    pub company_id: Uuid,
    pub application_id: Option<Uuid>,
    pub initiated_by: Uuid,
    pub last_message: String,
    pub last_message_at: NaiveDateTime,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::conversations)]
pub struct NewConversation {
    pub company_id: Uuid,
    pub application_id: Option<Uuid>,
    pub initiated_by: Uuid,
    pub last_message: String,
    pub last_message_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = crate::schema::conversation_participants)]
pub struct ConversationParticipant {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub unread_count: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::conversation_participants)]
pub struct NewConversationParticipant {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub unread_count: i32,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::messages)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub is_read: bool,
    pub read_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::messages)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = crate::schema::otp_codes)]
pub struct OtpCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code_hash: String,
    pub purpose: String,
    pub expires_at: NaiveDateTime,
    pub consumed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::otp_codes)]
pub struct NewOtpCode {
    pub user_id: Uuid,
    pub code_hash: String,
    pub purpose: String,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub payload: serde_json::Value,
    pub published: bool,
    pub published_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct NewOutboxEvent {
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        assert_eq!(Role::parse("Admin"), Some(Role::Admin));
        assert_eq!(Role::parse("User"), Some(Role::User));
        assert_eq!(Role::parse("user"), None);
        assert_eq!(Role::Admin.as_str(), "Admin");
    }

    #[test]
    fn test_application_status_round_trip() {
        for status in [
            ApplicationStatus::Pending,
            ApplicationStatus::Viewed,
            ApplicationStatus::InConsideration,
            ApplicationStatus::Accepted,
            ApplicationStatus::Rejected,
        ] {
            assert_eq!(ApplicationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ApplicationStatus::parse("open"), None);
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(Provider::parse("system"), Some(Provider::System));
        assert_eq!(Provider::parse("google"), Some(Provider::Google));
        assert_eq!(Provider::parse("github"), None);
    }
}
