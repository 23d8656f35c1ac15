//! Conversation and message semantics on top of the repository.

use diesel::prelude::*;
use tracing::info;
use uuid::Uuid;

use crate::authz::{self, CompanyRef};
use crate::error::DomainError;
use crate::models::{Conversation, Message, User};
use crate::pagination::PaginationParams;

use super::repository::ChatRepository;

#[derive(Debug, Clone)]
pub struct SendMessageInput {
    pub receiver_id: Uuid,
    pub content: String,
    pub conversation_id: Option<Uuid>,
    pub application_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
}

#[derive(Debug)]
pub struct SentMessage {
    pub conversation: Conversation,
    pub message: Message,
    pub conversation_created: bool,
}

#[derive(Clone)]
pub struct ChatService {
    max_message_chars: usize,
    preview_chars: usize,
}

impl ChatService {
    pub fn new(max_message_chars: usize, preview_chars: usize) -> Self {
        Self {
            max_message_chars,
            preview_chars,
        }
    }

    /// Sends a message, creating the conversation if necessary.
    ///
    /// With an explicit conversation id the sender must be a participant and
    /// the receiver must be the other participant. Without one, the company
    /// context is resolved (application, then job, then explicit company,
    /// then the sender's own affiliation) and the sender must be HR or owner
    /// of it.
    pub fn send_message(
        &self,
        conn: &mut PgConnection,
        sender_id: Uuid,
        input: &SendMessageInput,
    ) -> Result<SentMessage, DomainError> {
        let content = input.content.trim();
        if content.is_empty() {
            return Err(DomainError::Validation(
                "Message content must not be empty".to_string(),
            ));
        }
        if content.chars().count() > self.max_message_chars {
            return Err(DomainError::Validation(format!(
                "Message content must not exceed {} characters",
                self.max_message_chars
            )));
        }
        if input.receiver_id == sender_id {
            return Err(DomainError::Validation(
                "Cannot send a message to yourself".to_string(),
            ));
        }

        let receiver = Self::live_user(conn, input.receiver_id)?
            .ok_or_else(|| DomainError::NotFound("Receiver not found".to_string()))?;

        let (conversation, created) = match input.conversation_id {
            Some(conversation_id) => {
                let conversation = ChatRepository::find_by_id(conn, conversation_id)?
                    .filter(|c| c.is_active)
                    .ok_or_else(|| {
                        DomainError::NotFound("Conversation not found".to_string())
                    })?;

                if !ChatRepository::is_participant(conn, conversation.id, sender_id)? {
                    return Err(DomainError::Forbidden(
                        "You are not part of this conversation".to_string(),
                    ));
                }
                if !ChatRepository::is_participant(conn, conversation.id, receiver.id)? {
                    return Err(DomainError::Forbidden(
                        "Receiver is not part of this conversation".to_string(),
                    ));
                }

                (conversation, false)
            }
            None => self.resolve_or_create(conn, sender_id, receiver.id, input)?,
        };

        let message = ChatRepository::send_message(
            conn,
            conversation.id,
            sender_id,
            receiver.id,
            content,
            self.preview_chars,
        )?;

        Ok(SentMessage {
            conversation,
            message,
            conversation_created: created,
        })
    }

    fn resolve_or_create(
        &self,
        conn: &mut PgConnection,
        sender_id: Uuid,
        receiver_id: Uuid,
        input: &SendMessageInput,
    ) -> Result<(Conversation, bool), DomainError> {
        let target = CompanyRef {
            application_id: input.application_id,
            job_id: input.job_id,
            company_id: input.company_id,
        };

        let company_id = match authz::resolve_company(conn, target)? {
            Some(id) => id,
            None => authz::user_company_id(conn, sender_id)?.ok_or_else(|| {
                DomainError::Forbidden(
                    "No company context could be resolved".to_string(),
                )
            })?,
        };

        if !authz::is_hr_or_owner(conn, sender_id, company_id)? {
            return Err(DomainError::Forbidden(
                "Only company HR or the owner may start conversations".to_string(),
            ));
        }

        authz::require_live_company(conn, company_id)?;

        // One active conversation per pair, whatever company context the
        // sender resolved this time.
        if let Some(existing) = ChatRepository::find_between_users(conn, sender_id, receiver_id)? {
            return Ok((existing, false));
        }

        let conversation = ChatRepository::create(
            conn,
            company_id,
            input.application_id,
            sender_id,
            receiver_id,
        )?;

        info!(
            conversation_id = %conversation.id,
            company_id = %company_id,
            "Conversation created"
        );

        Ok((conversation, true))
    }

    /// Pages the history between the caller and another user, marking the
    /// caller's incoming messages as read.
    ///
    /// The company side of a conversation must still be HR or owner of the
    /// conversation's own company at read time; the applicant side is always
    /// allowed. With no conversation, an empty page is returned.
    pub fn history(
        &self,
        conn: &mut PgConnection,
        caller_id: Uuid,
        other_user_id: Uuid,
        params: &PaginationParams,
    ) -> Result<(Vec<Message>, i64), DomainError> {
        let Some(conversation) =
            ChatRepository::find_between_users(conn, caller_id, other_user_id)?
        else {
            return Ok((Vec::new(), 0));
        };

        if conversation.initiated_by == caller_id
            && !authz::is_hr_or_owner(conn, caller_id, conversation.company_id)?
        {
            return Err(DomainError::Forbidden(
                "You no longer manage the company for this conversation".to_string(),
            ));
        }

        let (limit, offset) = params.limit_offset();
        let (page, total) = ChatRepository::list_messages(conn, conversation.id, limit, offset)?;

        ChatRepository::mark_read(conn, conversation.id, caller_id)?;

        Ok((page, total))
    }

    pub fn conversations(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        params: &PaginationParams,
    ) -> Result<(Vec<(Conversation, i32)>, i64), DomainError> {
        let (limit, offset) = params.limit_offset();
        Ok(ChatRepository::list_for_user(conn, user_id, limit, offset)?)
    }

    pub fn unread_total(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<i64, DomainError> {
        Ok(ChatRepository::unread_total(conn, user_id)?)
    }

    pub fn mark_conversation_read(
        &self,
        conn: &mut PgConnection,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> Result<usize, DomainError> {
        let conversation = ChatRepository::find_by_id(conn, conversation_id)?
            .filter(|c| c.is_active)
            .ok_or_else(|| DomainError::NotFound("Conversation not found".to_string()))?;

        if !ChatRepository::is_participant(conn, conversation.id, reader_id)? {
            return Err(DomainError::Forbidden(
                "You are not part of this conversation".to_string(),
            ));
        }

        Ok(ChatRepository::mark_read(conn, conversation.id, reader_id)?)
    }

    pub fn delete_conversation(
        &self,
        conn: &mut PgConnection,
        conversation_id: Uuid,
    ) -> Result<Conversation, DomainError> {
        let conversation = ChatRepository::find_by_id(conn, conversation_id)?
            .filter(|c| c.is_active)
            .ok_or_else(|| DomainError::NotFound("Conversation not found".to_string()))?;

        ChatRepository::deactivate(conn, conversation.id)?;
        Ok(conversation)
    }

    fn live_user(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<Option<User>, diesel::result::Error> {
        use crate::schema::users;

        users::table
            .find(user_id)
            .filter(users::deleted_at.is_null())
            .select(User::as_select())
            .first(conn)
            .optional()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_limits() {
        let service = ChatService::new(2000, 200);
        assert_eq!(service.max_message_chars, 2000);
        assert_eq!(service.preview_chars, 200);
    }
}
