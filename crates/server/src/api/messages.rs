use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
};
use hearth_common::types::ChatMessage;
use uuid::Uuid;

use crate::{
    auth::middleware::AuthenticatedUser,
    validation::{ValidatedJson, ValidatedQuery},
};

use super::{
    ApiError, ApiState, ItemsEnvelope, ListMessagesQuery, MessageContentRequest, MessageEnvelope,
};

/// Newest first. `take` is clamped to 1..=100 and defaults to 50.
pub(super) async fn list_messages(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chat_id): Path<Uuid>,
    ValidatedQuery(query): ValidatedQuery<ListMessagesQuery>,
) -> Result<Json<ItemsEnvelope<ChatMessage>>, ApiError> {
    let items = state
        .commands
        .list_messages(chat_id, user.user_id, query.skip.unwrap_or(0), query.take)
        .await?;
    Ok(Json(ItemsEnvelope { items }))
}

pub(super) async fn send_message(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chat_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<MessageContentRequest>,
) -> Result<(StatusCode, Json<MessageEnvelope>), ApiError> {
    let message = state.commands.send_message(chat_id, user.user_id, &payload.content).await?;
    state.notifier.new_message(message.id).await;

    Ok((StatusCode::CREATED, Json(MessageEnvelope { message })))
}

pub(super) async fn edit_message(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(payload): ValidatedJson<MessageContentRequest>,
) -> Result<Json<MessageEnvelope>, ApiError> {
    let message = state
        .commands
        .edit_message(chat_id, message_id, user.user_id, &payload.content)
        .await?;
    state.notifier.message_edited(message.id).await;

    Ok(Json(MessageEnvelope { message }))
}

pub(super) async fn delete_message(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<MessageEnvelope>, ApiError> {
    let message = state.commands.delete_message(chat_id, message_id, user.user_id).await?;
    state.notifier.message_deleted(chat_id, message.id).await;

    Ok(Json(MessageEnvelope { message }))
}
