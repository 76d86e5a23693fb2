use crate::{
    auth::jwt::JwtAccessTokenService,
    error::{ErrorCode, ServerError},
};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

pub async fn require_bearer_auth(
    State(jwt_service): State<Arc<JwtAccessTokenService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
    {
        Some(token) => token,
        None => return unauthorized_response("missing bearer token"),
    };

    let user_id = match jwt_service.validate_user_token(token) {
        Ok(user_id) => user_id,
        Err(error) => {
            tracing::debug!(error = %error, "rejected bearer token");
            return unauthorized_response("invalid bearer token");
        }
    };

    request.extensions_mut().insert(AuthenticatedUser { user_id });

    next.run(request).await
}

fn extract_bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    Some(token)
}

fn unauthorized_response(message: &'static str) -> Response {
    ServerError::new(ErrorCode::AuthInvalidToken, message).into_response()
}
