//! Configuration loader
//!
//! Loads client configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If the required ones are missing, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `GRAPHLINK_HTTP_ENDPOINT`: GraphQL HTTP endpoint (required)
//! - `GRAPHLINK_WS_ENDPOINT`: GraphQL WebSocket endpoint (required)
//! - `GRAPHLINK_REFRESH_ENDPOINT`: Refresh mutation endpoint
//! - `GRAPHLINK_LOGIN_ROUTE`: Route opened when the session is lost
//! - `GRAPHLINK_REQUEST_TIMEOUT_SECS`: Per-request timeout
//! - `GRAPHLINK_RETRY_MAX_ATTEMPTS`: Attempts per HTTP operation
//! - `GRAPHLINK_RETRY_INITIAL_DELAY_MS`: First backoff delay
//! - `GRAPHLINK_RETRY_MAX_DELAY_MS`: Backoff cap
//! - `GRAPHLINK_RETRY_JITTER`: Randomize backoff delays (true/false)
//! - `GRAPHLINK_AUTO_REFRESH`: Run the background refresh task (true/false)
//! - `GRAPHLINK_REFRESH_THRESHOLD_SECS`: Proactive refresh window
//! - `GRAPHLINK_WS_RECONNECT_ATTEMPTS`: Streaming reconnects before failing
//!
//! Unset optional variables keep their defaults.
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.{json,toml}` or `./graphlink.{json,toml}`
//! 2. The same names one and two directories up
//! 3. Relative to executable location
//!
//! Every loaded configuration is validated before it is returned.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use graphlink_domain::{GraphLinkConfig, Result, TransportError};

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `TransportError::Config` if no source yields a valid
/// configuration
pub fn load() -> Result<GraphLinkConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `TransportError::Config` if a required variable is missing or
/// any value is invalid
pub fn load_from_env() -> Result<GraphLinkConfig> {
    let mut config =
        GraphLinkConfig::new(env_var("GRAPHLINK_HTTP_ENDPOINT")?, env_var("GRAPHLINK_WS_ENDPOINT")?);

    config.refresh_endpoint = std::env::var("GRAPHLINK_REFRESH_ENDPOINT").ok();
    if let Ok(route) = std::env::var("GRAPHLINK_LOGIN_ROUTE") {
        config.login_route = route;
    }
    if let Some(secs) = env_parse("GRAPHLINK_REQUEST_TIMEOUT_SECS")? {
        config.request_timeout_secs = secs;
    }

    let retry = &mut config.retry;
    if let Some(attempts) = env_parse("GRAPHLINK_RETRY_MAX_ATTEMPTS")? {
        retry.max_attempts = attempts;
    }
    if let Some(ms) = env_parse("GRAPHLINK_RETRY_INITIAL_DELAY_MS")? {
        retry.initial_delay_ms = ms;
    }
    if let Some(ms) = env_parse("GRAPHLINK_RETRY_MAX_DELAY_MS")? {
        retry.max_delay_ms = ms;
    }
    retry.jitter = env_bool("GRAPHLINK_RETRY_JITTER", retry.jitter);

    config.auth.auto_refresh = env_bool("GRAPHLINK_AUTO_REFRESH", config.auth.auto_refresh);
    if let Some(secs) = env_parse("GRAPHLINK_REFRESH_THRESHOLD_SECS")? {
        config.auth.refresh_threshold_secs = secs;
    }
    if let Some(attempts) = env_parse("GRAPHLINK_WS_RECONNECT_ATTEMPTS")? {
        config.subscriptions.reconnect_attempts = attempts;
    }

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is detected
/// by extension.
///
/// # Errors
/// Returns `TransportError::Config` if the file is missing, malformed or
/// fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<GraphLinkConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(TransportError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            TransportError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| TransportError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

fn parse_config(contents: &str, path: &Path) -> Result<GraphLinkConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| TransportError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| TransportError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(TransportError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations
pub fn probe_config_paths() -> Option<PathBuf> {
    const NAMES: [&str; 4] = ["config.json", "config.toml", "graphlink.json", "graphlink.toml"];

    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| [root.clone(), root.join(".."), root.join("../..")])
        .flat_map(|dir| NAMES.map(|name| dir.join(name)))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        TransportError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Parse an optional variable; unset is `None`, unparsable is an error
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| TransportError::Config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
