//! WebSocket gateway: authentication, room management, and event dispatch.
//!
//! A single `/ws` endpoint carries every realtime concern. Clients send
//! JSON frames shaped `{"event": "...", "data": {...}}`; the server answers
//! in the same shape. Database work runs on the blocking pool.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::jwt::Claims;
use crate::chat::SendMessageInput;
use crate::error::DomainError;
use crate::middleware::auth::hash_token;
use crate::models::Message;
use crate::AppState;

use super::registry::{ConnectionRegistry, Room, SocketId};

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinConversation {
        conversation_id: Uuid,
    },
    LeaveConversation {
        conversation_id: Uuid,
    },
    JoinCompanyRoom {
        company_id: Uuid,
    },
    LeaveCompanyRoom {
        company_id: Uuid,
    },
    SendMessage {
        receiver_id: Uuid,
        content: String,
        #[serde(default)]
        conversation_id: Option<Uuid>,
        #[serde(default)]
        application_id: Option<Uuid>,
        #[serde(default)]
        job_id: Option<Uuid>,
        #[serde(default)]
        company_id: Option<Uuid>,
    },
    Typing {
        conversation_id: Uuid,
        is_typing: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    ReceiveMessage {
        conversation_id: Uuid,
        message: Message,
        conversation_created: bool,
    },
    MessageSent {
        conversation_id: Uuid,
        message_id: Uuid,
    },
    UserTyping {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },
    NewApplication {
        company_id: Uuid,
        job_id: Uuid,
        application_id: Uuid,
        applicant_id: Uuid,
    },
    Joined {
        room: String,
    },
    Left {
        room: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    fn to_payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"event":"error","data":{"message":"serialization failed"}}"#.to_string()
        })
    }
}

/// Fan-out handle used by HTTP handlers after their transactions commit.
#[derive(Clone)]
pub struct RealtimeGateway {
    registry: Arc<ConnectionRegistry>,
}

impl RealtimeGateway {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Notifies a company room that an application arrived.
    pub fn emit_new_application(
        &self,
        company_id: Uuid,
        job_id: Uuid,
        application_id: Uuid,
        applicant_id: Uuid,
    ) {
        let event = ServerEvent::NewApplication {
            company_id,
            job_id,
            application_id,
            applicant_id,
        };
        let delivered = self
            .registry
            .send_to_room(Room::Company(company_id), &event.to_payload());
        debug!(
            company_id = %company_id,
            application_id = %application_id,
            delivered = delivered,
            "New application notification sent"
        );
    }

    /// Delivers a stored message to the receiver's sockets and anyone
    /// watching the conversation room.
    pub fn emit_message(&self, message: &Message, conversation_created: bool) {
        let event = ServerEvent::ReceiveMessage {
            conversation_id: message.conversation_id,
            message: message.clone(),
            conversation_created,
        };
        let payload = event.to_payload();

        self.registry.send_to_user(message.receiver_id, &payload);
        self.registry
            .send_to_room(Room::Conversation(message.conversation_id), &payload);
    }
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Upgrades to a WebSocket after verifying the caller's access token. The
/// token comes from the Authorization header or, for browser clients that
/// cannot set headers on upgrade, a `token` query parameter.
pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
) -> Response {
    let claims = match authenticate(&state, &headers, query.token.as_deref()).await {
        Ok(claims) => claims,
        Err(response) => return response,
    };

    let Some(user_id) = claims.user_id() else {
        return (StatusCode::UNAUTHORIZED, "Invalid token subject").into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<Claims, Response> {
    let header_token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let token = header_token
        .or(query_token)
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, "Missing token").into_response())?;

    let claims = state
        .jwt_config
        .verify_access_token(token)
        .map_err(|_| (StatusCode::UNAUTHORIZED, "Invalid or expired token").into_response())?;

    if state
        .cache
        .token_revocation
        .is_token_revoked(&hash_token(token))
        .await
    {
        return Err((StatusCode::UNAUTHORIZED, "Token has been revoked").into_response());
    }

    if let Some(user_id) = claims.user_id() {
        if state
            .cache
            .token_revocation
            .is_user_token_revoked(user_id, claims.iat)
            .await
        {
            return Err((StatusCode::UNAUTHORIZED, "Token has been revoked").into_response());
        }
    }

    Ok(claims)
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let socket_id = state.registry.register(user_id, tx);
    crate::telemetry::record_ws_connection(true);
    info!(socket_id = %socket_id, user_id = %user_id, "WebSocket connected");

    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = ws_rx.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let event = match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "Unparseable WebSocket frame");
                send_error(&state.registry, socket_id, "Unrecognized event");
                continue;
            }
        };

        if let Err(err) = dispatch(&state, socket_id, user_id, event).await {
            send_error(&state.registry, socket_id, &err.to_string());
        }
    }

    state.registry.unregister(socket_id);
    writer.abort();
    crate::telemetry::record_ws_connection(false);
    info!(socket_id = %socket_id, user_id = %user_id, "WebSocket disconnected");
}

fn send_error(registry: &ConnectionRegistry, socket_id: SocketId, message: &str) {
    let event = ServerEvent::Error {
        message: message.to_string(),
    };
    registry.send_to_socket(socket_id, &event.to_payload());
}

async fn dispatch(
    state: &AppState,
    socket_id: SocketId,
    user_id: Uuid,
    event: ClientEvent,
) -> Result<(), DomainError> {
    match event {
        ClientEvent::JoinConversation { conversation_id } => {
            let pool = state.db_pool.clone();
            let allowed = tokio::task::spawn_blocking(move || -> Result<bool, DomainError> {
                let mut conn = pool.get()?;
                Ok(crate::chat::ChatRepository::is_participant(
                    &mut conn,
                    conversation_id,
                    user_id,
                )?)
            })
            .await
            .map_err(|_| DomainError::Validation("Internal task failure".to_string()))??;

            if !allowed {
                return Err(DomainError::Forbidden(
                    "You are not part of this conversation".to_string(),
                ));
            }

            state
                .registry
                .join(socket_id, Room::Conversation(conversation_id));
            ack(state, socket_id, format!("conversation:{conversation_id}"), true);
        }
        ClientEvent::LeaveConversation { conversation_id } => {
            state
                .registry
                .leave(socket_id, Room::Conversation(conversation_id));
            ack(state, socket_id, format!("conversation:{conversation_id}"), false);
        }
        ClientEvent::JoinCompanyRoom { company_id } => {
            let started = std::time::Instant::now();
            let cached = state.cache.membership_cache.get(user_id, company_id).await;

            let allowed = match &cached {
                Some(entry) => entry.is_hr_or_owner(),
                None => {
                    let pool = state.db_pool.clone();
                    let (is_owner, is_hr) =
                        tokio::task::spawn_blocking(move || -> Result<(bool, bool), DomainError> {
                            let mut conn = pool.get()?;
                            Ok((
                                crate::authz::is_company_owner(&mut conn, user_id, company_id)?,
                                crate::authz::is_company_hr(&mut conn, user_id, company_id)?,
                            ))
                        })
                        .await
                        .map_err(|_| {
                            DomainError::Validation("Internal task failure".to_string())
                        })??;

                    let _ = state
                        .cache
                        .membership_cache
                        .set(user_id, company_id, is_owner, is_hr)
                        .await;

                    is_owner || is_hr
                }
            };

            crate::telemetry::record_authz_check(cached.is_some(), allowed, started.elapsed());

            if !allowed {
                return Err(DomainError::Forbidden(
                    "You do not manage this company".to_string(),
                ));
            }

            state.registry.join(socket_id, Room::Company(company_id));
            ack(state, socket_id, format!("company:{company_id}"), true);
        }
        ClientEvent::LeaveCompanyRoom { company_id } => {
            state.registry.leave(socket_id, Room::Company(company_id));
            ack(state, socket_id, format!("company:{company_id}"), false);
        }
        ClientEvent::SendMessage {
            receiver_id,
            content,
            conversation_id,
            application_id,
            job_id,
            company_id,
        } => {
            let input = SendMessageInput {
                receiver_id,
                content,
                conversation_id,
                application_id,
                job_id,
                company_id,
            };

            let pool = state.db_pool.clone();
            let chat = state.chat.clone();
            let sent = tokio::task::spawn_blocking(move || {
                let mut conn = pool.get()?;
                let sent = chat.send_message(&mut conn, user_id, &input)?;

                crate::events::OutboxService::emit(
                    &mut conn,
                    crate::events::EventType::MessageSent,
                    crate::events::AggregateType::Conversation,
                    sent.conversation.id,
                    serde_json::to_value(crate::events::MessageSentPayload {
                        conversation_id: sent.conversation.id,
                        sender_id: sent.message.sender_id,
                        receiver_id: sent.message.receiver_id,
                    })
                    .unwrap_or_default(),
                    Some(user_id),
                    Some(sent.conversation.company_id),
                    None,
                )
                .map_err(DomainError::from)?;

                Ok::<_, DomainError>(sent)
            })
            .await
            .map_err(|_| DomainError::Validation("Internal task failure".to_string()))??;

            crate::telemetry::record_message_sent(sent.conversation_created);
            state.gateway.emit_message(&sent.message, sent.conversation_created);

            let confirm = ServerEvent::MessageSent {
                conversation_id: sent.conversation.id,
                message_id: sent.message.id,
            };
            state
                .registry
                .send_to_socket(socket_id, &confirm.to_payload());
        }
        ClientEvent::Typing {
            conversation_id,
            is_typing,
        } => {
            let pool = state.db_pool.clone();
            let participants =
                tokio::task::spawn_blocking(move || -> Result<Vec<Uuid>, DomainError> {
                    let mut conn = pool.get()?;
                    Ok(
                        crate::chat::ChatRepository::participants(&mut conn, conversation_id)?
                            .into_iter()
                            .map(|p| p.user_id)
                            .collect(),
                    )
                })
                .await
                .map_err(|_| DomainError::Validation("Internal task failure".to_string()))??;

            if !participants.contains(&user_id) {
                return Err(DomainError::Forbidden(
                    "You are not part of this conversation".to_string(),
                ));
            }

            // Typing indicators go to the counterpart only, never echoed back.
            let event = ServerEvent::UserTyping {
                conversation_id,
                user_id,
                is_typing,
            };
            let payload = event.to_payload();
            for participant in participants {
                if participant != user_id {
                    state.registry.send_to_user(participant, &payload);
                }
            }
        }
    }

    Ok(())
}

fn ack(state: &AppState, socket_id: SocketId, room: String, joined: bool) {
    let event = if joined {
        ServerEvent::Joined { room }
    } else {
        ServerEvent::Left { room }
    };
    state.registry.send_to_socket(socket_id, &event.to_payload());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_parsing() {
        let raw = r#"{"event":"join-conversation","data":{"conversation_id":"550e8400-e29b-41d4-a716-446655440000"}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(event, ClientEvent::JoinConversation { .. }));

        let raw = r#"{"event":"send-message","data":{"receiver_id":"550e8400-e29b-41d4-a716-446655440000","content":"hi"}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::SendMessage {
                content,
                conversation_id,
                ..
            } => {
                assert_eq!(content, "hi");
                assert!(conversation_id.is_none());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_unknown_event_rejected() {
        let raw = r#"{"event":"drop-tables","data":{}}"#;
        assert!(serde_json::from_str::<ClientEvent>(raw).is_err());
    }

    #[test]
    fn test_server_event_payload_shape() {
        let event = ServerEvent::UserTyping {
            conversation_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            is_typing: true,
        };
        let json: serde_json::Value = serde_json::from_str(&event.to_payload()).unwrap();
        assert_eq!(json["event"], "user-typing");
        assert_eq!(json["data"]["is_typing"], true);
    }
}
