// Chat server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. Pool sizing lives in `db::pool::PoolConfig` and is read
// through the same lookup so tests can inject a fake environment.

use std::net::SocketAddr;

use crate::db::pool::PoolConfig;

pub const DEV_JWT_SECRET: &str = "hearth_local_development_jwt_secret_must_be_32_chars";

/// Core server configuration.
///
/// Constructed via [`ServerConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// HS256 secret used to validate bearer tokens.
    pub jwt_secret: String,
    /// Base URL handed to clients for WebSocket connections.
    pub ws_base_url: String,
    /// PostgreSQL connection string. `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `hearth_server=debug`).
    pub log_filter: String,
    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
    pub pool: PoolConfig,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `HEARTH_HOST` | `0.0.0.0` |
    /// | `HEARTH_PORT` | `8080` |
    /// | `HEARTH_JWT_SECRET` | dev-only placeholder |
    /// | `HEARTH_WS_BASE_URL` | `ws://{host}:{port}` |
    /// | `HEARTH_DATABASE_URL` | *(none, in-memory store)* |
    /// | `HEARTH_CORS_ORIGINS` | *(none, cors.rs uses dev defaults)* |
    /// | `HEARTH_LOG_FILTER` | `RUST_LOG`, then `info` |
    /// | `HEARTH_LOG_FORMAT` | `text` (`json` for JSON lines) |
    /// | `HEARTH_DB_MIN_CONNECTIONS` | `2` |
    /// | `HEARTH_DB_MAX_CONNECTIONS` | `20` |
    /// | `HEARTH_DB_ACQUIRE_TIMEOUT_SECS` | `10` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("HEARTH_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("HEARTH_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let jwt_secret = env("HEARTH_JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.into());

        let ws_base_url =
            env("HEARTH_WS_BASE_URL").unwrap_or_else(|_| format!("ws://{listen_addr}"));

        let database_url = env("HEARTH_DATABASE_URL").ok().filter(|url| !url.trim().is_empty());
        let cors_origins = env("HEARTH_CORS_ORIGINS").ok();

        let log_filter = env("HEARTH_LOG_FILTER")
            .or_else(|_| env("RUST_LOG"))
            .unwrap_or_else(|_| "info".into());
        let log_json = env("HEARTH_LOG_FORMAT")
            .map(|format| format.trim().eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let pool = PoolConfig::from_env_fn(&env);

        Self {
            listen_addr,
            jwt_secret,
            ws_base_url,
            database_url,
            cors_origins,
            log_filter,
            log_json,
            pool,
        }
    }

    /// Returns true when using the development-only JWT secret.
    pub fn is_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}
