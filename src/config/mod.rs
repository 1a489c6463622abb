//! Configuration module for the member directory.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::DirectoryError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file backing the read endpoint
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Base URL of the read API, e.g. `http://127.0.0.1:8080/api`
    pub api_base_url: String,
    /// Websocket URL of the member change feed; `None` disables live updates
    pub feed_url: Option<String>,
    /// Timeout applied to each member fetch
    pub request_timeout: Duration,
    /// How often the server checks the store revision for changes
    pub change_poll_interval: Duration,
    /// Buffer size of the server-side change broadcast
    pub change_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, DirectoryError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from `lookup`, which maps a variable name to its
    /// value when set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DirectoryError> {
        let db_path = lookup("DIRECTORY_DB_PATH")
            .unwrap_or_else(|| "./data/members.sqlite".to_string())
            .into();

        let bind_addr = parse_var(&lookup, "DIRECTORY_BIND_ADDR", "127.0.0.1:8080")?;

        let log_level = lookup("DIRECTORY_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let api_base_url = lookup("DIRECTORY_API_URL")
            .unwrap_or_else(|| "http://127.0.0.1:8080/api".to_string())
            .trim_end_matches('/')
            .to_string();

        let feed_url = match lookup("DIRECTORY_FEED_URL") {
            Some(url) if url.trim().is_empty() => None,
            Some(url) => Some(url),
            None => derive_feed_url(&api_base_url),
        };

        let request_timeout = parse_millis(&lookup, "DIRECTORY_REQUEST_TIMEOUT_MS", "10000")?;
        let change_poll_interval = parse_millis(&lookup, "DIRECTORY_CHANGE_POLL_MS", "500")?;
        let change_capacity = parse_var(&lookup, "DIRECTORY_CHANGE_CAPACITY", "64")?;

        Ok(Self {
            db_path,
            bind_addr,
            log_level,
            api_base_url,
            feed_url,
            request_timeout,
            change_poll_interval,
            change_capacity,
        })
    }
}

/// Derive the change feed websocket URL from the read API base URL.
pub fn derive_feed_url(api_base_url: &str) -> Option<String> {
    let base = api_base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        return None;
    };
    Some(format!("{}/members/changes", ws_base))
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> Result<T, DirectoryError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(name).unwrap_or_else(|| default.to_string());
    raw.parse()
        .map_err(|e| DirectoryError::Config(format!("Invalid {} value {:?}: {}", name, raw, e)))
}

/// A non-zero duration in milliseconds.
fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> Result<Duration, DirectoryError> {
    match parse_var::<u64>(lookup, name, default)? {
        0 => Err(DirectoryError::Config(format!(
            "Invalid {} value \"0\": must be greater than zero",
            name
        ))),
        millis => Ok(Duration::from_millis(millis)),
    }
}
