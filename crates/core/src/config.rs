//! Client configuration
//!
//! Parsed from TOML. Every field has a default, so a partial or empty file
//! is valid.
//!
//! ```toml
//! nickname = "standa"
//!
//! [server]
//! address = "10.0.1.62"
//! port = 50000
//!
//! [session]
//! reconnect_deadline_ms = 30000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Timing knobs for the network session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bound on a single TCP connect
    pub connect_timeout_ms: u64,
    /// How long a request waits for its response
    pub response_timeout_ms: u64,
    /// Maximum silence between two received frames
    pub idle_timeout_ms: u64,
    /// Heartbeat period
    pub keep_alive_interval_ms: u64,
    /// Total budget for reconnect attempts
    pub reconnect_deadline_ms: u64,
    /// Pause between two reconnect attempts (fixed, not exponential)
    pub reconnect_backoff_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            response_timeout_ms: 15_000,
            idle_timeout_ms: 15_000,
            keep_alive_interval_ms: 5_000,
            reconnect_deadline_ms: 60_000,
            reconnect_backoff_ms: 5_000,
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    pub fn reconnect_deadline(&self) -> Duration {
        Duration::from_millis(self.reconnect_deadline_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    /// Reject periods and timeouts that cannot work as zero
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("response_timeout_ms", self.response_timeout_ms),
            ("idle_timeout_ms", self.idle_timeout_ms),
            ("keep_alive_interval_ms", self.keep_alive_interval_ms),
        ];
        for (name, value) in required {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}

/// Server to connect to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 50000,
        }
    }
}

/// Top-level client configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub nickname: String,
    pub server: ServerConfig,
    pub session: SessionConfig,
}

impl ClientConfig {
    /// Parse configuration from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.session.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, falling back to defaults if it is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ClientConfig::from_toml("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.session.keep_alive_interval(), Duration::from_secs(5));
        assert_eq!(config.session.reconnect_deadline(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_override() {
        let toml = r#"
nickname = "standa"

[server]
address = "10.0.1.62"

[session]
reconnect_backoff_ms = 250
"#;
        let config = ClientConfig::from_toml(toml).unwrap();
        assert_eq!(config.nickname, "standa");
        assert_eq!(config.server.address, "10.0.1.62");
        assert_eq!(config.server.port, 50000);
        assert_eq!(
            config.session.reconnect_backoff(),
            Duration::from_millis(250)
        );
        assert_eq!(config.session.idle_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(ClientConfig::from_toml("[server]\nport = \"many\"").is_err());
    }

    #[test]
    fn test_zero_durations_rejected() {
        let err = ClientConfig::from_toml("[session]\nkeep_alive_interval_ms = 0").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("keep_alive_interval_ms")));
        assert!(ClientConfig::from_toml("[session]\nidle_timeout_ms = 0").is_err());

        // A zero backoff just retries immediately
        assert!(ClientConfig::from_toml("[session]\nreconnect_backoff_ms = 0").is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        // Missing file falls back to defaults
        assert_eq!(ClientConfig::load(&path).unwrap(), ClientConfig::default());

        std::fs::write(&path, "nickname = \"bob\"\n").unwrap();
        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.nickname, "bob");
    }
}
