//! Configuration for the watch telemetry agent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default collector TCP port.
pub const DEFAULT_PORT: u16 = 12345;

/// Source tag stamped on every wire line.
pub const SOURCE_TAG: &str = "smartwatch";

/// Collector endpoint (host plus TCP port).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ServerAddress {
    type Err = ConfigError;

    /// Parse `host` or `host:port`; a bare host gets the default port.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConfigError::ParseError(
                "server address is empty".to_string(),
            ));
        }
        match s.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(ConfigError::ParseError(format!(
                        "missing host in server address '{s}'"
                    )));
                }
                let port: u16 = port.parse().map_err(|_| {
                    ConfigError::ParseError(format!("invalid port in server address '{s}'"))
                })?;
                Ok(Self::new(host, port))
            }
            None => Ok(Self::new(s, DEFAULT_PORT)),
        }
    }
}

/// Read-only context for one telemetry session.
///
/// Set once at pipeline start; changing the server or user requires stopping
/// the pipeline and starting a new one with a fresh context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    /// User identifier stamped on every wire line
    pub user_id: String,
    /// Source tag identifying the device class
    pub source_tag: String,
    /// Collector endpoint
    pub server: ServerAddress,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>, server: ServerAddress) -> Self {
        Self {
            user_id: user_id.into(),
            source_tag: SOURCE_TAG.to_string(),
            server,
        }
    }
}

/// Tunables for the forwarder loop and connection manager.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Outbound queue capacity before drop-oldest kicks in
    pub queue_capacity: usize,
    /// Delivery retries per message before it is dropped
    pub max_retries: u32,
    /// First backoff delay after a delivery failure
    pub backoff_base: Duration,
    /// Upper bound on the backoff delay
    pub backoff_cap: Duration,
    /// Immediate dial attempts per `ensure_connected` call
    pub dial_attempts: u32,
    /// Deadline for a single dial attempt
    pub dial_timeout: Duration,
    /// Deadline for a single write
    pub write_timeout: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_retries: 3,
            backoff_base: Duration::from_millis(200),
            backoff_cap: Duration::from_secs(5),
            dial_attempts: 2,
            dial_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(3),
        }
    }
}

/// Persisted agent configuration.
///
/// Holds the CLI defaults, notably the collector address and user id entered
/// on previous runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Collector endpoint
    pub server: ServerAddress,
    /// User identifier
    pub user_id: String,
    /// Outbound queue capacity
    pub queue_capacity: usize,
    /// Sample delivery rate per sensor in Hz
    pub sample_rate_hz: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerAddress::new("127.0.0.1", DEFAULT_PORT),
            user_id: "anonymous".to_string(),
            queue_capacity: 256,
            sample_rate_hz: 20,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("watch-telemetry-agent")
            .join("config.json")
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_address_parsing() {
        let addr: ServerAddress = "192.168.1.20:9000".parse().expect("parse");
        assert_eq!(addr.host, "192.168.1.20");
        assert_eq!(addr.port, 9000);

        let addr: ServerAddress = "collector.local".parse().expect("parse");
        assert_eq!(addr.host, "collector.local");
        assert_eq!(addr.port, DEFAULT_PORT);

        assert!("".parse::<ServerAddress>().is_err());
        assert!(":9000".parse::<ServerAddress>().is_err());
        assert!("host:notaport".parse::<ServerAddress>().is_err());
    }

    #[test]
    fn test_server_address_display_roundtrip() {
        let addr = ServerAddress::new("10.0.0.5", 12345);
        let parsed: ServerAddress = addr.to_string().parse().expect("parse");
        assert_eq!(parsed, addr);
    }

    #[test]
    fn test_session_context_source_tag() {
        let session = SessionContext::new("u1", ServerAddress::new("127.0.0.1", DEFAULT_PORT));
        assert_eq!(session.source_tag, "smartwatch");
    }

    #[test]
    fn test_default_forwarder_config() {
        let config = ForwarderConfig::default();
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(config.backoff_base, Duration::from_millis(200));
        assert_eq!(config.backoff_cap, Duration::from_secs(5));
        assert!(config.max_retries > 0);
    }
}
