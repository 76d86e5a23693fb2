use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
};
use hearth_common::types::Chat;
use uuid::Uuid;

use crate::{auth::middleware::AuthenticatedUser, validation::ValidatedJson};

use super::{ApiError, ApiState, ChatEnvelope, CreateChatRequest, ItemsEnvelope, UpdateChatRequest};

pub(super) async fn create_chat(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ValidatedJson(payload): ValidatedJson<CreateChatRequest>,
) -> Result<(StatusCode, Json<ChatEnvelope>), ApiError> {
    let chat = state
        .commands
        .create_chat(user.user_id, &payload.name, payload.description.as_deref(), payload.chat_type)
        .await?;

    Ok((StatusCode::CREATED, Json(ChatEnvelope { chat })))
}

pub(super) async fn list_chats(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<ItemsEnvelope<Chat>>, ApiError> {
    let items = state.commands.list_chats(user.user_id).await?;
    Ok(Json(ItemsEnvelope { items }))
}

pub(super) async fn get_chat(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<ChatEnvelope>, ApiError> {
    let chat = state.commands.get_chat(chat_id, user.user_id).await?;
    Ok(Json(ChatEnvelope { chat }))
}

pub(super) async fn update_chat(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chat_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateChatRequest>,
) -> Result<Json<ChatEnvelope>, ApiError> {
    let chat = state
        .commands
        .update_chat(chat_id, user.user_id, &payload.name, payload.description.as_deref())
        .await?;
    Ok(Json(ChatEnvelope { chat }))
}

pub(super) async fn deactivate_chat(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<ChatEnvelope>, ApiError> {
    let chat = state.commands.deactivate_chat(chat_id, user.user_id).await?;
    state.notifier.chat_deactivated(chat_id).await;

    Ok(Json(ChatEnvelope { chat }))
}
