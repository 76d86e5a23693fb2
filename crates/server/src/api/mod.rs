// Chat REST API.
//
// Handlers are thin: parse the request, run one `ChatCommands` operation,
// then call `ChatNotifier` exactly once for mutations that succeeded. A
// failed command never notifies.

pub mod chats;
pub mod members;
pub mod messages;

use std::sync::Arc;

use axum::{
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use hearth_common::types::{Chat, ChatMember, ChatMessage, ChatRole, ChatType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{jwt::JwtAccessTokenService, middleware::require_bearer_auth},
    chat::{ChatCommands, ChatError, ChatNotifier},
    error::{ErrorCode, ServerError},
};

#[derive(Clone)]
pub(crate) struct ApiState {
    commands: ChatCommands,
    notifier: ChatNotifier,
}

// ── request bodies ─────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateChatRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub chat_type: ChatType,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateChatRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    #[serde(default = "default_member_role")]
    pub role: ChatRole,
}

fn default_member_role() -> ChatRole {
    ChatRole::Member
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MessageContentRequest {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListMessagesQuery {
    #[serde(default)]
    pub skip: Option<usize>,
    #[serde(default)]
    pub take: Option<usize>,
}

// ── envelopes ──────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatEnvelope {
    pub chat: Chat,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemberEnvelope {
    pub member: ChatMember,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message: ChatMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemsEnvelope<T> {
    pub items: Vec<T>,
}

// ── errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct ApiError(ChatError);

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = match self.0 {
            ChatError::ChatNotFound(chat_id) => {
                ServerError::new(ErrorCode::NotFound, format!("chat {chat_id} not found"))
            }
            ChatError::MessageNotFound(message_id) => {
                ServerError::new(ErrorCode::NotFound, format!("message {message_id} not found"))
            }
            ChatError::NotMember => ServerError::from_code(ErrorCode::NotMember),
            ChatError::AlreadyMember => ServerError::from_code(ErrorCode::AlreadyMember),
            ChatError::InsufficientPermissions => {
                ServerError::from_code(ErrorCode::InsufficientPermissions)
            }
            ChatError::MessageDeleted => ServerError::from_code(ErrorCode::MessageDeleted),
            ChatError::Validation(message) => ServerError::new(ErrorCode::ValidationFailed, message),
            ChatError::OperationFailed { context, source } => {
                tracing::error!(error = ?source, context = %context, "chat operation failed");
                ServerError::from_code(ErrorCode::OperationFailed)
            }
        };
        error.into_response()
    }
}

pub fn build_router(
    commands: ChatCommands,
    notifier: ChatNotifier,
    jwt_service: Arc<JwtAccessTokenService>,
) -> Router {
    let state = ApiState { commands, notifier };

    Router::new()
        .route("/v1/chats", post(chats::create_chat).get(chats::list_chats))
        .route(
            "/v1/chats/{chat_id}",
            get(chats::get_chat).patch(chats::update_chat).delete(chats::deactivate_chat),
        )
        .route(
            "/v1/chats/{chat_id}/members",
            get(members::list_members).post(members::add_member),
        )
        .route("/v1/chats/{chat_id}/leave", post(members::leave_chat))
        .route(
            "/v1/chats/{chat_id}/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route(
            "/v1/chats/{chat_id}/messages/{message_id}",
            patch(messages::edit_message).delete(messages::delete_message),
        )
        .with_state(state)
        .route_layer(middleware::from_fn_with_state(jwt_service, require_bearer_auth))
}
