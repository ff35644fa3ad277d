//! Configuration management for the server.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Directory holding `quotes.json` and `conflicts.json`
    pub data_dir: PathBuf,
    /// Base URL of the remote authority
    pub remote_url: String,
    /// Number of records requested per fetch
    pub fetch_limit: usize,
    /// Whether periodic sync starts enabled
    pub auto_sync: bool,
    /// Period of the auto-sync timer
    pub sync_interval: Duration,
    /// Upper bound for any single remote call
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let remote_url = env::var("REMOTE_URL")
            .unwrap_or_else(|_| "https://jsonplaceholder.typicode.com".to_string())
            .trim_end_matches('/')
            .to_string();

        let fetch_limit = parse_number("FETCH_LIMIT", 5)?;
        let auto_sync = parse_bool("AUTO_SYNC", true)?;

        let sync_interval = Duration::from_secs(parse_number("SYNC_INTERVAL_SECS", 60)?);
        if sync_interval.is_zero() {
            return Err(ConfigError::InvalidNumber("SYNC_INTERVAL_SECS"));
        }

        let request_timeout = Duration::from_secs(parse_number("REQUEST_TIMEOUT_SECS", 10)?);
        if request_timeout.is_zero() {
            return Err(ConfigError::InvalidNumber("REQUEST_TIMEOUT_SECS"));
        }

        Ok(Self {
            host,
            port,
            data_dir,
            remote_url,
            fetch_limit,
            auto_sync,
            sync_interval,
            request_timeout,
        })
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(name)),
        Err(_) => Ok(default),
    }
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool(name)),
        },
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("{0} must be a positive integer")]
    InvalidNumber(&'static str),

    #[error("{0} must be true or false")]
    InvalidBool(&'static str),
}
