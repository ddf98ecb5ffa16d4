//! Process configuration, loaded once from the environment at startup.
//! No runtime reconfiguration.

use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Durable-store connection URL (e.g. a Postgres DSN).
    pub database_url: String,
    /// Cache provider connection URL (e.g. a Redis DSN). Absent means the
    /// in-process `DashMap` backend is used.
    pub cache_url: Option<String>,
    /// Cache provider auth token, if the provider requires one.
    pub cache_token: Option<String>,
    /// Allowed CORS origin for the event/HTTP surface.
    pub cors_origin: String,
    /// Listen port for the HTTP + WebSocket surface.
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let cache_url = env::var("CACHE_URL").ok();
        let cache_token = env::var("CACHE_TOKEN").ok();
        let cors_origin = env::var("CORS_ORIGIN").unwrap_or_else(|_| "*".to_string());
        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid("PORT", raw))?,
            Err(_) => 8080,
        };

        Ok(Self {
            database_url,
            cache_url,
            cache_token,
            cors_origin,
            port,
        })
    }
}
