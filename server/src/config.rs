//! Server configuration
//!
//! Loaded from an optional JSON file, then overridden from the command
//! line. Every field has a default, so `{}` is a valid config file.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use routem_core::{DispatcherConfig, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Listener and dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind, as an IP literal
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request deadline in milliseconds, for unmatched requests and for
    /// routes declared on [`ServerConfig::router`]
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Maximum request body size in bytes (default: 16MB)
    #[serde(default = "default_max_body_size")]
    pub max_request_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            port: default_port(),
            default_timeout_ms: default_timeout_ms(),
            max_request_body_size: default_max_body_size(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> ServerResult<()> {
        if self.hostname.is_empty() {
            return Err(ServerError::Config("Hostname cannot be empty".to_string()));
        }
        if self.default_timeout_ms == 0 {
            return Err(ServerError::Config("Default timeout must be > 0".to_string()));
        }
        if self.max_request_body_size == 0 {
            return Err(ServerError::Config(
                "Maximum request body size must be > 0".to_string(),
            ));
        }
        self.socket_addr().map(|_| ())
    }

    /// Parse hostname and port into a socket address
    pub fn socket_addr(&self) -> ServerResult<SocketAddr> {
        let addr = format!("{}:{}", self.hostname, self.port);
        addr.parse()
            .map_err(|e| ServerError::Config(format!("Invalid address '{}': {}", addr, e)))
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Root router whose routes default to [`Self::default_timeout`]
    pub fn router(&self) -> Router {
        let mut router = Router::new();
        router.timeout(self.default_timeout());
        router
    }

    /// Dispatcher settings derived from this config
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::new().with_default_timeout(self.default_timeout())
    }
}

// Default function values for serde
fn default_hostname() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 3000 }
fn default_timeout_ms() -> u64 { 2000 }
fn default_max_body_size() -> usize { 16 * 1024 * 1024 }

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr().unwrap(), "127.0.0.1:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.default_timeout(), Duration::from_secs(2));
        assert_eq!(config.dispatcher_config().default_timeout, Duration::from_secs(2));
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_from_file_fills_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 8080, "default_timeout_ms": 500}}"#).unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.hostname, "127.0.0.1");
        assert_eq!(config.default_timeout(), Duration::from_millis(500));
        assert_eq!(config.max_request_body_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_from_file_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            ServerConfig::from_file(file.path()),
            Err(ServerError::Serialization(_))
        ));
        assert!(matches!(
            ServerConfig::from_file("/definitely/not/here.json"),
            Err(ServerError::Io(_))
        ));
    }

    #[test]
    fn test_router_uses_default_timeout() {
        let config = ServerConfig {
            default_timeout_ms: 750,
            ..ServerConfig::default()
        };
        let mut router = config.router();
        router.get("/a", |_ctx| async { Ok(()) });
        router.group("/g").get("/b", |_ctx| async { Ok(()) });

        for route in router.flatten() {
            assert_eq!(route.timeout(), Duration::from_millis(750));
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ServerConfig {
            default_timeout_ms: 0,
            ..ServerConfig::default()
        };
        tokio_test::assert_err!(config.validate());

        let config = ServerConfig {
            hostname: "not a host".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }
}
