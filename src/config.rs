//! Configuration module for the balance ledger

use serde::Deserialize;
use std::env;
use std::path::Path;

use crate::error::{LedgerError, Result};

const DEFAULT_API_URL: &str = "https://api.tauros.io";
const DEFAULT_WS_ENDPOINT: &str = "wss://ws.tauros.io";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:2224";

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Exchange REST base URL (without the `/api/vN` suffix)
    pub api_url: String,

    /// API token used for the balance snapshot
    pub api_token: String,

    /// Account login, exchanged for the feed session token
    pub email: String,
    pub password: String,

    /// Notification feed endpoint
    pub ws_endpoint: String,

    /// Address the query server binds to
    pub listen_addr: String,

    /// Capacity of the channel between the feed transport and the consumer
    pub feed_channel_capacity: usize,

    /// Reconnection settings
    pub reconnect_delay_ms: u64,

    /// Timeout for REST calls in seconds
    pub http_timeout_secs: u64,

    /// Accept a snapshot with no wallets (fresh accounts only)
    pub allow_empty_snapshot: bool,
}

/// Layout of the JSON credentials file
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    tauros: ExchangeCredentials,
}

#[derive(Debug, Deserialize)]
struct ExchangeCredentials {
    token: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    base_api_url: Option<String>,
    #[serde(default)]
    websocket: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            api_url: env::var("LEDGER_API_URL")
                .map(|url| normalize_api_url(&url))
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            api_token: env::var("LEDGER_API_TOKEN").unwrap_or_default(),
            email: env::var("LEDGER_EMAIL").unwrap_or_default(),
            password: env::var("LEDGER_PASSWORD").unwrap_or_default(),
            ws_endpoint: env::var("LEDGER_WS_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_WS_ENDPOINT.to_string()),
            ..Self::default()
        }
        .with_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Load credentials and endpoints from a JSON credentials file.
    ///
    /// Tunables not present in the file still come from the environment.
    pub fn from_credentials_file(path: impl AsRef<Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LedgerError::ConfigError(format!("unable to read {}: {}", path.display(), e))
        })?;
        let creds: CredentialsFile = serde_json::from_str(&raw).map_err(|e| {
            LedgerError::ConfigError(format!("bad credentials file {}: {}", path.display(), e))
        })?;
        let tauros = creds.tauros;

        let config = Self {
            api_url: tauros
                .base_api_url
                .map(|url| normalize_api_url(&url))
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_token: tauros.token,
            email: tauros.email,
            password: tauros.password,
            ws_endpoint: tauros
                .websocket
                .unwrap_or_else(|| DEFAULT_WS_ENDPOINT.to_string()),
            ..Self::default()
        }
        .with_env_overrides();

        config.validate()?;
        Ok(config)
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(addr) = env::var("LEDGER_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        self.feed_channel_capacity = env_parse("FEED_CHANNEL_CAPACITY", self.feed_channel_capacity);
        self.reconnect_delay_ms = env_parse("RECONNECT_DELAY_MS", self.reconnect_delay_ms);
        self.http_timeout_secs = env_parse("HTTP_TIMEOUT_SECS", self.http_timeout_secs);
        self.allow_empty_snapshot = env_parse("ALLOW_EMPTY_SNAPSHOT", self.allow_empty_snapshot);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.api_token.trim().is_empty() {
            return Err(LedgerError::ConfigError("API token is not set".to_string()));
        }
        if self.feed_channel_capacity == 0 {
            return Err(LedgerError::ConfigError(
                "feed channel capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: String::new(),
            email: String::new(),
            password: String::new(),
            ws_endpoint: DEFAULT_WS_ENDPOINT.to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            feed_channel_capacity: 1024,
            reconnect_delay_ms: 1000,
            http_timeout_secs: 10,
            allow_empty_snapshot: false,
        }
    }
}

/// Host root of the exchange API. Endpoint paths carry their own `/api`
/// prefix, so a base URL that already ends in `/api` is cut back to the host.
fn normalize_api_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    url.strip_suffix("/api").unwrap_or(url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_credentials_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "tauros": {{
                    "token": "abc123",
                    "email": "bot@example.com",
                    "password": "secret",
                    "base_api_url": "https://api.staging.tauros.io/",
                    "websocket": "wss://ws.staging.tauros.io"
                }}
            }}"#
        )
        .unwrap();

        let config = Config::from_credentials_file(file.path()).unwrap();
        assert_eq!(config.api_token, "abc123");
        assert_eq!(config.email, "bot@example.com");
        assert_eq!(config.api_url, "https://api.staging.tauros.io");
        assert_eq!(config.ws_endpoint, "wss://ws.staging.tauros.io");
    }

    #[test]
    fn test_base_url_with_api_suffix() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"tauros": {{"token": "abc123", "base_api_url": "https://api.tauros.io/api/"}}}}"#
        )
        .unwrap();

        let config = Config::from_credentials_file(file.path()).unwrap();
        assert_eq!(config.api_url, "https://api.tauros.io");
    }

    #[test]
    fn test_normalize_api_url() {
        assert_eq!(normalize_api_url("https://api.tauros.io"), "https://api.tauros.io");
        assert_eq!(normalize_api_url("https://api.tauros.io/"), "https://api.tauros.io");
        assert_eq!(normalize_api_url("https://api.tauros.io/api"), "https://api.tauros.io");
        assert_eq!(normalize_api_url(" https://api.tauros.io/api/ "), "https://api.tauros.io");
    }

    #[test]
    fn test_credentials_file_without_token() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tauros": {{"token": ""}}}}"#).unwrap();

        let err = Config::from_credentials_file(file.path()).unwrap_err();
        assert!(matches!(err, LedgerError::ConfigError(_)));
    }

    #[test]
    fn test_missing_credentials_file() {
        let err = Config::from_credentials_file("/nonexistent/creds.json").unwrap_err();
        assert!(matches!(err, LedgerError::ConfigError(_)));
    }
}
