// Realtime gateway.
//
// A client first registers a session over HTTP (bearer auth), then attaches a
// single WebSocket to it. The socket must open with `hello`; after that the
// client joins chat rooms explicitly and may send typing indicators. Chat
// events are pushed by `ChatNotifier` through the shared `ConnectionHub`.

pub mod hub;

use crate::auth::{
    jwt::JwtAccessTokenService,
    middleware::{require_bearer_auth, AuthenticatedUser},
};
use crate::chat::ChatCommands;
use crate::error::{
    current_request_id, request_id_from_headers_or_generate, with_request_id_scope, ErrorCode,
    ServerError,
};
use crate::protocol;
use crate::validation::{check_ws_frame_size, ValidatedJson, MAX_WS_FRAME_BYTES};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path, State,
    },
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use hearth_common::protocol::ws::{room_name, WsMessage};
use hub::{ConnectAttempt, ConnectionHub, SessionTokenValidation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const HEARTBEAT_INTERVAL_MS: u32 = 15_000;
const HEARTBEAT_TIMEOUT_MS: u64 = 10_000;
const SESSION_TOKEN_TTL_MINUTES: i64 = 15;

const HELLO_REQUIRED: &str = "HELLO_REQUIRED";
const SESSION_TOKEN_INVALID: &str = "SESSION_TOKEN_INVALID";
const SESSION_TOKEN_EXPIRED: &str = "SESSION_TOKEN_EXPIRED";
const SESSION_ALREADY_CONNECTED: &str = "SESSION_ALREADY_CONNECTED";
const INVALID_MESSAGE: &str = "INVALID_MESSAGE";
const UNSUPPORTED_MESSAGE: &str = "UNSUPPORTED_MESSAGE";

#[derive(Clone)]
pub struct GatewayState {
    hub: ConnectionHub,
    commands: ChatCommands,
    ws_base_url: Arc<str>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRealtimeSessionRequest {
    pub protocol: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateRealtimeSessionResponse {
    pub session_id: Uuid,
    pub session_token: String,
    pub ws_url: String,
    pub heartbeat_interval_ms: u32,
    pub max_frame_bytes: u32,
}

pub fn router(
    jwt_service: Arc<JwtAccessTokenService>,
    hub: ConnectionHub,
    commands: ChatCommands,
    ws_base_url: String,
) -> Router {
    let state = GatewayState { hub, commands, ws_base_url: Arc::<str>::from(ws_base_url) };
    let auth_layer = middleware::from_fn_with_state(jwt_service, require_bearer_auth);

    Router::new()
        .route("/v1/realtime/sessions", post(create_realtime_session).route_layer(auth_layer))
        .route("/v1/ws/{session_id}", get(ws_upgrade))
        .with_state(state)
}

pub async fn create_realtime_session(
    Extension(user): Extension<AuthenticatedUser>,
    State(state): State<GatewayState>,
    ValidatedJson(payload): ValidatedJson<CreateRealtimeSessionRequest>,
) -> impl IntoResponse {
    if let Err(upgrade_error) = protocol::require_supported(&payload.protocol) {
        return upgrade_error.into_response();
    }

    let session_id = Uuid::new_v4();
    let session_token = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::minutes(SESSION_TOKEN_TTL_MINUTES);
    let ws_url = format!("{}/v1/ws/{}", state.ws_base_url, session_id);

    state.hub.create_session(session_id, user.user_id, session_token.clone(), expires_at).await;
    info!(session_id = %session_id, user_id = %user.user_id, "realtime session created");

    (
        StatusCode::CREATED,
        Json(CreateRealtimeSessionResponse {
            session_id,
            session_token,
            ws_url,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            max_frame_bytes: MAX_WS_FRAME_BYTES as u32,
        }),
    )
        .into_response()
}

pub async fn ws_upgrade(
    Path(session_id): Path<Uuid>,
    State(state): State<GatewayState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if !state.hub.session_exists(session_id).await {
        return ServerError::from_code(ErrorCode::NotFound).into_response();
    }

    let request_id = request_id_from_headers_or_generate(&headers);
    ws.max_frame_size(MAX_WS_FRAME_BYTES).on_upgrade(move |socket| async move {
        with_request_id_scope(request_id, handle_socket(state, session_id, socket)).await;
    })
}

async fn handle_socket(state: GatewayState, session_id: Uuid, mut socket: WebSocket) {
    let request_id = current_request_id().unwrap_or_else(|| "unknown".to_string());
    let hub = &state.hub;

    match hub.mark_connected(session_id).await {
        ConnectAttempt::Connected => {}
        ConnectAttempt::AlreadyConnected => {
            debug!(session_id = %session_id, request_id = %request_id, "duplicate connection refused");
            reject_hello(
                &mut socket,
                SESSION_ALREADY_CONNECTED,
                "session already has an open connection",
            )
            .await;
            return;
        }
        ConnectAttempt::UnknownSession => return,
    }

    let user_id = match socket.recv().await {
        Some(Ok(Message::Text(raw_message))) => match serde_json::from_str::<WsMessage>(&raw_message)
        {
            Ok(WsMessage::Hello { session_token }) => {
                match hub.validate_session_token(session_id, &session_token).await {
                    SessionTokenValidation::Valid { user_id } => user_id,
                    SessionTokenValidation::Invalid => {
                        reject_hello(&mut socket, SESSION_TOKEN_INVALID, "invalid session token")
                            .await;
                        hub.mark_disconnected(session_id).await;
                        return;
                    }
                    SessionTokenValidation::Expired => {
                        reject_hello(&mut socket, SESSION_TOKEN_EXPIRED, "session token expired")
                            .await;
                        hub.mark_disconnected(session_id).await;
                        return;
                    }
                }
            }
            _ => {
                reject_hello(
                    &mut socket,
                    HELLO_REQUIRED,
                    "first WebSocket message must be a hello frame",
                )
                .await;
                hub.mark_disconnected(session_id).await;
                return;
            }
        },
        _ => {
            hub.mark_disconnected(session_id).await;
            return;
        }
    };

    let hello_ack = WsMessage::HelloAck { server_time: Utc::now().to_rfc3339() };
    if send_ws_message(&mut socket, &hello_ack).await.is_err() {
        hub.mark_disconnected(session_id).await;
        return;
    }

    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<WsMessage>();
    if !hub.register_outbound(session_id, outbound_sender).await {
        hub.mark_disconnected(session_id).await;
        return;
    }
    debug!(session_id = %session_id, user_id = %user_id, request_id = %request_id, "realtime connection ready");

    // Server pings every HEARTBEAT_INTERVAL_MS; a ping left unanswered for
    // HEARTBEAT_TIMEOUT_MS ends the connection at the next tick.
    let mut heartbeat_interval =
        tokio::time::interval(std::time::Duration::from_millis(HEARTBEAT_INTERVAL_MS as u64));
    heartbeat_interval.reset();
    let mut last_pong = Instant::now();
    let heartbeat_timeout = std::time::Duration::from_millis(HEARTBEAT_TIMEOUT_MS);

    loop {
        tokio::select! {
            _ = heartbeat_interval.tick() => {
                if last_pong.elapsed() > heartbeat_timeout + heartbeat_interval.period() {
                    warn!(
                        session_id = %session_id,
                        request_id = %request_id,
                        "heartbeat timeout, disconnecting"
                    );
                    break;
                }
                if socket.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
            maybe_outbound = outbound_receiver.recv() => {
                match maybe_outbound {
                    Some(outbound_message) => {
                        if send_ws_message(&mut socket, &outbound_message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw_message)) => {
                        let reply = match check_ws_frame_size(raw_message.as_bytes()) {
                            Err(reason) => Some(error_frame(INVALID_MESSAGE, reason, None)),
                            Ok(()) => match serde_json::from_str::<WsMessage>(&raw_message) {
                                Ok(inbound) => {
                                    handle_client_message(&state, session_id, user_id, inbound).await
                                }
                                Err(_) => Some(error_frame(
                                    INVALID_MESSAGE,
                                    "invalid websocket frame payload",
                                    None,
                                )),
                            },
                        };

                        if let Some(reply) = reply {
                            if send_ws_message(&mut socket, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {
                        last_pong = Instant::now();
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
    }

    hub.mark_disconnected(session_id).await;
    debug!(session_id = %session_id, user_id = %user_id, "realtime connection closed");
}

/// Dispatches one client frame. Returns the direct reply, if any.
async fn handle_client_message(
    state: &GatewayState,
    session_id: Uuid,
    user_id: Uuid,
    inbound: WsMessage,
) -> Option<WsMessage> {
    match inbound {
        WsMessage::JoinChat { chat_id } => {
            Some(handle_join_chat(state, session_id, user_id, chat_id).await)
        }
        WsMessage::LeaveChat { chat_id } => {
            state.hub.unsubscribe(session_id, &room_name(chat_id)).await;
            Some(WsMessage::LeftChat { chat_id })
        }
        WsMessage::NotifyTyping { chat_id } => {
            relay_typing(state, session_id, chat_id, WsMessage::UserTyping { chat_id, user_id })
                .await;
            None
        }
        WsMessage::NotifyStoppedTyping { chat_id } => {
            relay_typing(
                state,
                session_id,
                chat_id,
                WsMessage::UserStoppedTyping { chat_id, user_id },
            )
            .await;
            None
        }
        other => Some(error_frame(
            UNSUPPORTED_MESSAGE,
            "message type is not accepted from clients",
            other.chat_id(),
        )),
    }
}

/// Membership is re-checked on every join; a previous subscription grants nothing.
async fn handle_join_chat(
    state: &GatewayState,
    session_id: Uuid,
    user_id: Uuid,
    chat_id: Uuid,
) -> WsMessage {
    match state.commands.is_active_member(chat_id, user_id).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(session_id = %session_id, user_id = %user_id, chat_id = %chat_id, "join_chat denied");
            return error_frame(
                ErrorCode::AuthForbidden.as_str(),
                "user is not an active member of this chat",
                Some(chat_id),
            );
        }
        Err(error) => {
            let request_id = current_request_id().unwrap_or_default();
            error!(
                error = ?error,
                session_id = %session_id,
                request_id = %request_id,
                user_id = %user_id,
                chat_id = %chat_id,
                "failed to evaluate chat membership for join_chat",
            );
            return WsMessage::Error {
                code: ErrorCode::InternalError.as_str().to_string(),
                message: ErrorCode::InternalError.default_message().to_string(),
                retryable: true,
                chat_id: Some(chat_id),
            };
        }
    }

    let room = room_name(chat_id);
    if !state.hub.subscribe(session_id, &room).await {
        return error_frame(SESSION_TOKEN_INVALID, "session is not available", Some(chat_id));
    }

    WsMessage::JoinedChat { chat_id, room }
}

/// Best effort. Frames from connections outside the room are dropped.
async fn relay_typing(state: &GatewayState, session_id: Uuid, chat_id: Uuid, frame: WsMessage) {
    let room = room_name(chat_id);
    if !state.hub.is_subscribed(session_id, &room).await {
        debug!(session_id = %session_id, chat_id = %chat_id, "typing indicator ignored: not subscribed");
        return;
    }
    state.hub.broadcast_excluding(&room, frame, session_id).await;
}

fn error_frame(code: &str, message: impl Into<String>, chat_id: Option<Uuid>) -> WsMessage {
    WsMessage::Error { code: code.to_string(), message: message.into(), retryable: false, chat_id }
}

async fn reject_hello(socket: &mut WebSocket, code: &str, message: &str) {
    let _ = send_ws_message(socket, &error_frame(code, message, None)).await;
    let _ = socket.send(Message::Close(None)).await;
}

async fn send_ws_message(socket: &mut WebSocket, message: &WsMessage) -> Result<(), ()> {
    let encoded = serde_json::to_string(message).map_err(|_| ())?;
    socket.send(Message::Text(encoded.into())).await.map_err(|_| ())
}
