// Input validation helpers.
//
// - `ValidatedJson<T>` extractor: content-type check + serde, structured errors.
// - `ValidatedQuery<T>` extractor: the same error shape for query strings.
// - WebSocket frame size limit.
// - Field rules for chat names, descriptions and message bodies.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::request::Parts,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::{ErrorCode, ServerError};

/// Maximum WebSocket frame payload in bytes (256 KiB).
pub const MAX_WS_FRAME_BYTES: usize = 256 * 1024;

/// Maximum REST request body in bytes (1 MiB).
pub const MAX_REST_BODY_BYTES: usize = 1024 * 1024;

pub const MAX_CHAT_NAME_CHARS: usize = 100;
pub const MAX_CHAT_DESCRIPTION_CHARS: usize = 500;
pub const MAX_MESSAGE_CHARS: usize = 4000;

// ── ValidatedJson extractor ────────────────────────────────────────

/// A JSON body extractor that returns a structured `ServerError` on failure.
///
/// Use this instead of `axum::Json<T>` in handlers to get consistent
/// VALIDATION_FAILED error responses instead of plain-text axum rejections.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) => {
                let (message, details) = classify_json_rejection(&rejection);
                Err(ServerError::new(ErrorCode::ValidationFailed, message)
                    .with_details(details)
                    .into_response())
            }
        }
    }
}

fn classify_json_rejection(rejection: &JsonRejection) -> (String, serde_json::Value) {
    match rejection {
        JsonRejection::JsonDataError(e) => (
            format!("invalid JSON payload: {e}"),
            serde_json::json!({ "kind": "data_error" }),
        ),
        JsonRejection::JsonSyntaxError(e) => (
            format!("malformed JSON: {e}"),
            serde_json::json!({ "kind": "syntax_error" }),
        ),
        JsonRejection::MissingJsonContentType(_) => (
            "expected Content-Type: application/json".to_string(),
            serde_json::json!({ "kind": "missing_content_type" }),
        ),
        JsonRejection::BytesRejection(e) => (
            format!("request body error: {e}"),
            serde_json::json!({ "kind": "body_error" }),
        ),
        other => (
            format!("request body error: {other}"),
            serde_json::json!({ "kind": "unknown" }),
        ),
    }
}

// ── ValidatedQuery extractor ───────────────────────────────────────

/// Query-string counterpart of [`ValidatedJson`].
pub struct ValidatedQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ValidatedQuery(value)),
            Err(rejection) => Err(ServerError::new(
                ErrorCode::ValidationFailed,
                query_rejection_message(&rejection),
            )
            .with_details(serde_json::json!({ "kind": "query_error" }))
            .into_response()),
        }
    }
}

fn query_rejection_message(rejection: &QueryRejection) -> String {
    match rejection {
        QueryRejection::FailedToDeserializeQueryString(e) => format!("invalid query string: {e}"),
        other => format!("invalid query string: {other}"),
    }
}

// ── WebSocket frame validation ─────────────────────────────────────

/// Returns an error message suitable for an error frame when `payload` is too large.
pub fn check_ws_frame_size(payload: &[u8]) -> Result<(), String> {
    if payload.len() > MAX_WS_FRAME_BYTES {
        Err(format!(
            "frame size {} bytes exceeds limit of {} bytes",
            payload.len(),
            MAX_WS_FRAME_BYTES
        ))
    } else {
        Ok(())
    }
}

// ── Chat field rules ───────────────────────────────────────────────

/// Postgres `text` cannot store U+0000.
fn reject_nul(field: &str, value: &str) -> Result<(), String> {
    if value.contains('\0') {
        return Err(format!("{field} must not contain NUL characters"));
    }
    Ok(())
}

/// Trims and bounds a chat name.
pub fn normalize_chat_name(raw: &str) -> Result<String, String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("chat name must not be empty".to_string());
    }
    reject_nul("chat name", name)?;
    let chars = name.chars().count();
    if chars > MAX_CHAT_NAME_CHARS {
        return Err(format!(
            "chat name is {chars} characters; limit is {MAX_CHAT_NAME_CHARS}"
        ));
    }
    Ok(name.to_string())
}

/// Blank descriptions collapse to `None`.
pub fn normalize_description(raw: Option<&str>) -> Result<Option<String>, String> {
    let Some(description) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    reject_nul("chat description", description)?;
    let chars = description.chars().count();
    if chars > MAX_CHAT_DESCRIPTION_CHARS {
        return Err(format!(
            "chat description is {chars} characters; limit is {MAX_CHAT_DESCRIPTION_CHARS}"
        ));
    }
    Ok(Some(description.to_string()))
}

/// Message bodies keep their inner whitespace; only surrounding whitespace is dropped.
pub fn normalize_message_content(raw: &str) -> Result<String, String> {
    let content = raw.trim();
    if content.is_empty() {
        return Err("message content must not be empty".to_string());
    }
    reject_nul("message content", content)?;
    let chars = content.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(format!(
            "message content is {chars} characters; limit is {MAX_MESSAGE_CHARS}"
        ));
    }
    Ok(content.to_string())
}
