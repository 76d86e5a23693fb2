mod api;
mod auth;
mod chat;
mod config;
mod cors;
mod db;
mod error;
mod protocol;
mod store;
mod validation;
mod ws;

use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::{sync::Arc, time::Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::auth::jwt::JwtAccessTokenService;
use crate::chat::{ChatCommands, ChatNotifier};
use crate::config::ServerConfig;
use crate::db::{
    migrations::run_migrations,
    pool::{check_pool_health, create_pg_pool},
};
use crate::error::{
    attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope,
    ErrorCode, ServerError, REQUEST_ID_HEADER,
};
use crate::store::{ChatStore, MemoryChatStore};
use crate::validation::MAX_REST_BODY_BYTES;
use crate::ws::hub::ConnectionHub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    init_tracing(&config)?;

    if config.is_dev_jwt_secret() {
        warn!("HEARTH_JWT_SECRET is not set; using the development secret");
    }

    let jwt_service = Arc::new(
        JwtAccessTokenService::new(&config.jwt_secret).context("invalid HEARTH_JWT_SECRET")?,
    );
    let store = connect_store(&config).await?;
    let commands = ChatCommands::new(store.clone());
    let notifier = ChatNotifier::new(store, ConnectionHub::default());

    let app = build_router(
        jwt_service,
        commands,
        notifier,
        config.ws_base_url.clone(),
        config.cors_origins.clone(),
    );

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind chat listener on {}", config.listen_addr))?;

    info!(listen_addr = %config.listen_addr, ws_base_url = %config.ws_base_url, "starting chat server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("chat server exited unexpectedly")
}

fn init_tracing(config: &ServerConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&config.log_filter)
        .with_context(|| format!("invalid log filter '{}'", config.log_filter))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

/// Postgres when a database URL is configured, otherwise the in-memory store
/// with users provisioned on first sight.
async fn connect_store(config: &ServerConfig) -> anyhow::Result<ChatStore> {
    let Some(database_url) = config.database_url.as_deref() else {
        warn!("HEARTH_DATABASE_URL is not set; using the in-memory chat store, data is lost on restart");
        return Ok(ChatStore::memory(MemoryChatStore::with_auto_provisioned_users()));
    };

    let pool = create_pg_pool(database_url, config.pool.clone())
        .await
        .context("failed to initialize chat PostgreSQL pool")?;
    check_pool_health(&pool).await?;
    run_migrations(&pool).await?;
    info!(
        min_connections = config.pool.min_connections,
        max_connections = config.pool.max_connections,
        "chat PostgreSQL store ready"
    );

    Ok(ChatStore::Postgres(pool))
}

fn build_router(
    jwt_service: Arc<JwtAccessTokenService>,
    commands: ChatCommands,
    notifier: ChatNotifier,
    ws_base_url: String,
    cors_origins: Option<String>,
) -> Router {
    let hub = notifier.hub().clone();
    apply_middleware(
        Router::new()
            .route("/healthz", get(healthz))
            .merge(ws::router(Arc::clone(&jwt_service), hub, commands.clone(), ws_base_url))
            .merge(api::build_router(commands, notifier, jwt_service)),
    )
    .layer(cors::cors_layer(cors_origins.as_deref()))
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(error = %error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(error = %error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

async fn panic_handler(mut request: Request<Body>, next: Next) -> Response {
    // Pin the request id before spawning so the panic response and the
    // request log line agree on it.
    let request_id = request_id_from_headers_or_generate(request.headers());
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, request_id = %request_id, "request handling panicked");
            ServerError::from_code(ErrorCode::InternalError)
                .with_request_id(request_id)
                .into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;
    attach_request_id_header(&mut response, &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
