use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
};
use hearth_common::types::ChatMember;
use uuid::Uuid;

use crate::{auth::middleware::AuthenticatedUser, validation::ValidatedJson};

use super::{AddMemberRequest, ApiError, ApiState, ItemsEnvelope, MemberEnvelope};

pub(super) async fn list_members(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<ItemsEnvelope<ChatMember>>, ApiError> {
    let items = state.commands.list_members(chat_id, user.user_id).await?;
    Ok(Json(ItemsEnvelope { items }))
}

/// Adds or reactivates a membership, then announces it to the room.
pub(super) async fn add_member(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chat_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<AddMemberRequest>,
) -> Result<(StatusCode, Json<MemberEnvelope>), ApiError> {
    let member =
        state.commands.add_member(chat_id, user.user_id, payload.user_id, payload.role).await?;
    state.notifier.user_joined(chat_id, member.user_id).await;

    Ok((StatusCode::CREATED, Json(MemberEnvelope { member })))
}

pub(super) async fn leave_chat(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<MemberEnvelope>, ApiError> {
    let member = state.commands.leave_chat(chat_id, user.user_id).await?;
    state.notifier.user_left(chat_id, member.user_id).await;

    Ok(Json(MemberEnvelope { member }))
}
