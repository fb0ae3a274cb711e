// Server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. Individual modules (DB pool, presence backend) may still
// read their own env vars — this module covers the core server settings.

use std::net::SocketAddr;

const DEV_JWT_SECRET: &str = "sotto_local_development_jwt_secret_must_be_32_chars";

const DEFAULT_ACTIVE_WINDOW_MINUTES: i64 = 5;
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Core server configuration.
///
/// Constructed via [`ServerConfig::from_env`] which reads environment
/// variables and falls back to sensible development defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// JWT signing secret for access tokens.
    pub jwt_secret: String,
    /// PostgreSQL connection string for lock/directory lookups.
    pub database_url: Option<String>,
    /// Redis connection string; when set, presence uses the shared store.
    pub redis_url: Option<String>,
    /// Log filter directive (e.g. `info`, `sotto_server=debug`).
    pub log_filter: String,
    /// How far back a presence ping counts as "active".
    pub active_window_minutes: i64,
    /// Bounded capacity of each subscriber's delivery channel.
    pub channel_capacity: usize,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `SOTTO_SERVER_HOST` | `0.0.0.0` |
    /// | `SOTTO_SERVER_PORT` | `8080` |
    /// | `SOTTO_SERVER_JWT_SECRET` | dev-only placeholder |
    /// | `SOTTO_SERVER_DATABASE_URL` | *(none — in-memory collaborators)* |
    /// | `SOTTO_SERVER_REDIS_URL` | *(none — in-process presence)* |
    /// | `SOTTO_SERVER_LOG_FILTER` | `info` |
    /// | `SOTTO_SERVER_ACTIVE_WINDOW_MINUTES` | `5` |
    /// | `SOTTO_SERVER_CHANNEL_CAPACITY` | `64` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("SOTTO_SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("SOTTO_SERVER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let jwt_secret = env("SOTTO_SERVER_JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.into());

        let database_url = env("SOTTO_SERVER_DATABASE_URL").ok();
        let redis_url = env("SOTTO_SERVER_REDIS_URL").ok();

        let log_filter = env("SOTTO_SERVER_LOG_FILTER").unwrap_or_else(|_| "info".into());

        let active_window_minutes = env("SOTTO_SERVER_ACTIVE_WINDOW_MINUTES")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|minutes| *minutes > 0)
            .unwrap_or(DEFAULT_ACTIVE_WINDOW_MINUTES);

        let channel_capacity = env("SOTTO_SERVER_CHANNEL_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|capacity| *capacity > 0)
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY);

        Self {
            listen_addr,
            jwt_secret,
            database_url,
            redis_url,
            log_filter,
            active_window_minutes,
            channel_capacity,
        }
    }

    /// Returns true when using the development-only JWT secret.
    pub fn is_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}
