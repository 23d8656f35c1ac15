//! Chat handlers over the conversation service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::jwt::Claims,
    chat::{ChatRepository, SendMessageInput},
    error::{get_db_conn, ApiError, ApiResult},
    events::{outbox::OutboxService, AggregateType, EventType, MessageSentPayload},
    handlers::auth::ErrorResponse,
    helpers::get_user_id,
    models::{Conversation, Message},
    pagination::{IntoPaginated, PaginatedResponse, PaginationParams},
    schema::users,
    telemetry::record_message_sent,
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    #[schema(example = "4f8a2d1e-0c3b-4e5f-9a67-2b1d8c9e0f34")]
    pub receiver_id: Uuid,
    #[schema(example = "Hi, thanks for applying!")]
    pub content: String,
    pub conversation_id: Option<Uuid>,
    pub application_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SendMessageResponse {
    pub conversation: Conversation,
    pub message: Message,
    pub conversation_created: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    #[schema(example = 3)]
    pub unread_count: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCountResponse {
    #[schema(example = 7)]
    pub unread: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkReadResponse {
    #[schema(example = 3)]
    pub marked_read: usize,
}

#[utoipa::path(
    post,
    path = "/chat/messages",
    tag = "Chat",
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Message stored and fanned out", body = SendMessageResponse),
        (status = 400, description = "Empty or oversized content", body = ErrorResponse),
        (status = 403, description = "Not allowed to message this user", body = ErrorResponse),
        (status = 404, description = "Receiver or conversation not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SendMessageRequest>,
) -> ApiResult<Json<SendMessageResponse>> {
    let sender_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let input = SendMessageInput {
        receiver_id: payload.receiver_id,
        content: payload.content,
        conversation_id: payload.conversation_id,
        application_id: payload.application_id,
        job_id: payload.job_id,
        company_id: payload.company_id,
    };

    let sent = state.chat.send_message(&mut conn, sender_id, &input)?;

    if sent.conversation_created {
        let _ = OutboxService::emit(
            &mut conn,
            EventType::ConversationCreated,
            AggregateType::Conversation,
            sent.conversation.id,
            serde_json::json!({"company_id": sent.conversation.company_id.to_string()}),
            Some(sender_id),
            Some(sent.conversation.company_id),
            None,
        );
    }

    let _ = OutboxService::emit(
        &mut conn,
        EventType::MessageSent,
        AggregateType::Conversation,
        sent.conversation.id,
        serde_json::to_value(MessageSentPayload {
            conversation_id: sent.conversation.id,
            sender_id: sent.message.sender_id,
            receiver_id: sent.message.receiver_id,
        })
        .unwrap_or_default(),
        Some(sender_id),
        Some(sent.conversation.company_id),
        None,
    );

    record_message_sent(sent.conversation_created);
    state
        .gateway
        .emit_message(&sent.message, sent.conversation_created);

    Ok(Json(SendMessageResponse {
        conversation: sent.conversation,
        message: sent.message,
        conversation_created: sent.conversation_created,
    }))
}

/// Pages the message history between the caller and another user, oldest
/// first, marking the caller's incoming messages as read.
#[utoipa::path(
    get,
    path = "/chat/history/{user_id}",
    tag = "Chat",
    params(("user_id" = Uuid, Path, description = "The other participant"), PaginationParams),
    responses(
        (status = 200, description = "Paginated message history", body = PaginatedResponse<Message>),
        (status = 403, description = "No longer managing the conversation's company", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(other_user_id): Path<Uuid>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<Message>>> {
    let caller_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let exists: i64 = users::table
        .filter(users::id.eq(other_user_id))
        .filter(users::deleted_at.is_null())
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    if exists == 0 {
        return Err(ApiError::not_found("User not found", "USER_NOT_FOUND"));
    }

    let (page, total) = state
        .chat
        .history(&mut conn, caller_id, other_user_id, &pagination)?;

    Ok(Json(page.into_paginated(&pagination, total)))
}

#[utoipa::path(
    get,
    path = "/chat/conversations",
    tag = "Chat",
    params(PaginationParams),
    responses(
        (status = 200, description = "The caller's active conversations", body = PaginatedResponse<ConversationSummary>)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<ConversationSummary>>> {
    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let (rows, total) = state.chat.conversations(&mut conn, user_id, &pagination)?;

    let data = rows
        .into_iter()
        .map(|(conversation, unread_count)| ConversationSummary {
            conversation,
            unread_count,
        })
        .collect::<Vec<_>>();

    Ok(Json(data.into_paginated(&pagination, total)))
}

#[utoipa::path(
    get,
    path = "/chat/unread-count",
    tag = "Chat",
    responses(
        (status = 200, description = "Total unread messages across conversations", body = UnreadCountResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UnreadCountResponse>> {
    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let unread = state.chat.unread_total(&mut conn, user_id)?;

    Ok(Json(UnreadCountResponse { unread }))
}

#[utoipa::path(
    post,
    path = "/chat/conversations/{id}/read",
    tag = "Chat",
    params(("id" = Uuid, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Caller's unread messages marked read", body = MarkReadResponse),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<MarkReadResponse>> {
    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let marked_read = state
        .chat
        .mark_conversation_read(&mut conn, conversation_id, user_id)?;

    Ok(Json(MarkReadResponse { marked_read }))
}

/// Soft-deletes a conversation. Messages stay addressable by id but the
/// conversation no longer appears in listings.
#[utoipa::path(
    delete,
    path = "/chat/conversations/{id}",
    tag = "Chat",
    params(("id" = Uuid, Path, description = "Conversation id")),
    responses(
        (status = 204, description = "Conversation deleted"),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let user_id = get_user_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    if !ChatRepository::is_participant(&mut conn, conversation_id, user_id)
        .map_err(|_| ApiError::db_error())?
    {
        return Err(ApiError::forbidden(
            "You are not part of this conversation",
            "NOT_PARTICIPANT",
        ));
    }

    let conversation = state.chat.delete_conversation(&mut conn, conversation_id)?;

    let _ = OutboxService::emit(
        &mut conn,
        EventType::ConversationDeleted,
        AggregateType::Conversation,
        conversation.id,
        serde_json::json!({"deleted_by": user_id.to_string()}),
        Some(user_id),
        Some(conversation.company_id),
        None,
    );

    info!(conversation_id = %conversation_id, "Conversation deleted");
    Ok(StatusCode::NO_CONTENT)
}
