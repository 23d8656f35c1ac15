//! Diesel queries for conversations and messages.

use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::models::{
    Conversation, ConversationParticipant, Message, NewConversation, NewConversationParticipant,
    NewMessage,
};
use crate::schema::{conversation_participants, conversations, messages};

pub struct ChatRepository;

impl ChatRepository {
    pub fn find_by_id(
        conn: &mut PgConnection,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, diesel::result::Error> {
        conversations::table
            .find(conversation_id)
            .select(Conversation::as_select())
            .first(conn)
            .optional()
    }

    pub fn participants(
        conn: &mut PgConnection,
        conversation_id: Uuid,
    ) -> Result<Vec<ConversationParticipant>, diesel::result::Error> {
        conversation_participants::table
            .filter(conversation_participants::conversation_id.eq(conversation_id))
            .select(ConversationParticipant::as_select())
            .load(conn)
    }

    pub fn is_participant(
        conn: &mut PgConnection,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, diesel::result::Error> {
        let count: i64 = conversation_participants::table
            .filter(conversation_participants::conversation_id.eq(conversation_id))
            .filter(conversation_participants::user_id.eq(user_id))
            .count()
            .get_result(conn)?;
        Ok(count > 0)
    }

    /// Finds the active conversation between two users, regardless of which
    /// side initiated it. At most one exists per pair.
    pub fn find_between_users(
        conn: &mut PgConnection,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<Option<Conversation>, diesel::result::Error> {
        let a = conversation_participants::table
            .filter(conversation_participants::user_id.eq(user_a))
            .select(conversation_participants::conversation_id);
        let b = conversation_participants::table
            .filter(conversation_participants::user_id.eq(user_b))
            .select(conversation_participants::conversation_id);

        conversations::table
            .filter(conversations::is_active.eq(true))
            .filter(conversations::id.eq_any(a))
            .filter(conversations::id.eq_any(b))
            .order(conversations::last_message_at.desc())
            .select(Conversation::as_select())
            .first(conn)
            .optional()
    }

    pub fn create(
        conn: &mut PgConnection,
        company_id: Uuid,
        application_id: Option<Uuid>,
        initiated_by: Uuid,
        other_participant: Uuid,
    ) -> Result<Conversation, diesel::result::Error> {
        conn.transaction(|conn| {
            let conversation: Conversation = diesel::insert_into(conversations::table)
                .values(NewConversation {
                    company_id,
                    application_id,
                    initiated_by,
                    last_message: String::new(),
                    last_message_at: Utc::now().naive_utc(),
                })
                .returning(Conversation::as_returning())
                .get_result(conn)?;

            diesel::insert_into(conversation_participants::table)
                .values(&vec![
                    NewConversationParticipant {
                        conversation_id: conversation.id,
                        user_id: initiated_by,
                        unread_count: 0,
                    },
                    NewConversationParticipant {
                        conversation_id: conversation.id,
                        user_id: other_participant,
                        unread_count: 0,
                    },
                ])
                .execute(conn)?;

            Ok(conversation)
        })
    }

    /// Stores a message and updates conversation bookkeeping in one
    /// transaction: the summary fields and the receiver's unread counter
    /// move together or not at all. The increment runs in the database, so
    /// concurrent sends cannot lose counts.
    pub fn send_message(
        conn: &mut PgConnection,
        conversation_id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
        preview_chars: usize,
    ) -> Result<Message, diesel::result::Error> {
        conn.transaction(|conn| {
            let message: Message = diesel::insert_into(messages::table)
                .values(NewMessage {
                    conversation_id,
                    sender_id,
                    receiver_id,
                    content: content.to_string(),
                })
                .returning(Message::as_returning())
                .get_result(conn)?;

            let preview: String = content.chars().take(preview_chars).collect();

            diesel::update(conversations::table.find(conversation_id))
                .set((
                    conversations::last_message.eq(preview),
                    conversations::last_message_at.eq(message.created_at),
                    conversations::updated_at.eq(message.created_at),
                ))
                .execute(conn)?;

            diesel::update(
                conversation_participants::table
                    .filter(conversation_participants::conversation_id.eq(conversation_id))
                    .filter(conversation_participants::user_id.eq(receiver_id)),
            )
            .set(
                conversation_participants::unread_count
                    .eq(conversation_participants::unread_count + 1),
            )
            .execute(conn)?;

            Ok(message)
        })
    }

    /// Pages messages oldest first, so page 1 is the start of the
    /// conversation and new messages append to the last page.
    pub fn list_messages(
        conn: &mut PgConnection,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Message>, i64), diesel::result::Error> {
        let total: i64 = messages::table
            .filter(messages::conversation_id.eq(conversation_id))
            .count()
            .get_result(conn)?;

        let page = messages::table
            .filter(messages::conversation_id.eq(conversation_id))
            .order(messages::created_at.asc())
            .limit(limit)
            .offset(offset)
            .select(Message::as_select())
            .load(conn)?;

        Ok((page, total))
    }

    /// Marks incoming messages read and clears the reader's unread counter.
    pub fn mark_read(
        conn: &mut PgConnection,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> Result<usize, diesel::result::Error> {
        conn.transaction(|conn| {
            let now = Utc::now().naive_utc();

            let updated = diesel::update(
                messages::table
                    .filter(messages::conversation_id.eq(conversation_id))
                    .filter(messages::receiver_id.eq(reader_id))
                    .filter(messages::is_read.eq(false)),
            )
            .set((messages::is_read.eq(true), messages::read_at.eq(now)))
            .execute(conn)?;

            diesel::update(
                conversation_participants::table
                    .filter(conversation_participants::conversation_id.eq(conversation_id))
                    .filter(conversation_participants::user_id.eq(reader_id)),
            )
            .set(conversation_participants::unread_count.eq(0))
            .execute(conn)?;

            Ok(updated)
        })
    }

    pub fn list_for_user(
        conn: &mut PgConnection,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<(Conversation, i32)>, i64), diesel::result::Error> {
        let total: i64 = conversations::table
            .inner_join(conversation_participants::table)
            .filter(conversation_participants::user_id.eq(user_id))
            .filter(conversations::is_active.eq(true))
            .count()
            .get_result(conn)?;

        let page = conversations::table
            .inner_join(conversation_participants::table)
            .filter(conversation_participants::user_id.eq(user_id))
            .filter(conversations::is_active.eq(true))
            .order(conversations::last_message_at.desc())
            .limit(limit)
            .offset(offset)
            .select((
                Conversation::as_select(),
                conversation_participants::unread_count,
            ))
            .load::<(Conversation, i32)>(conn)?;

        Ok((page, total))
    }

    pub fn unread_total(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<i64, diesel::result::Error> {
        use diesel::dsl::sum;

        let total: Option<i64> = conversation_participants::table
            .inner_join(conversations::table)
            .filter(conversation_participants::user_id.eq(user_id))
            .filter(conversations::is_active.eq(true))
            .select(sum(conversation_participants::unread_count))
            .get_result(conn)?;

        Ok(total.unwrap_or(0))
    }

    /// Soft delete. History stays queryable for admins but the conversation
    /// no longer accepts messages or shows in listings.
    pub fn deactivate(
        conn: &mut PgConnection,
        conversation_id: Uuid,
    ) -> Result<usize, diesel::result::Error> {
        diesel::update(conversations::table.find(conversation_id))
            .set(conversations::is_active.eq(false))
            .execute(conn)
    }
}
