//! Configuration module for loopwire
//!
//! JSON configuration for the `loopwire` binary. The option structs it embeds
//! ([`UdpOptions`], [`TimerConfig`]) reject unknown keys.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::resource::{ReschedulePolicy, TimerConfig};
use crate::transport::UdpOptions;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log configuration
    #[serde(default)]
    pub log: LogConfig,

    /// Run a UDP echo server
    #[serde(default)]
    pub server: Option<ServerConfig>,

    /// Run a UDP client fed from standard input
    #[serde(default)]
    pub client: Option<ClientConfig>,
}

/// Log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_idle_timeout_ms() -> u64 {
    30_000
}

/// Echo server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub listen: UdpOptions,

    /// Stop after this long without a datagram
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Periodic heartbeat log line
    #[serde(default)]
    pub heartbeat: Option<TimerConfig>,
}

/// Client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub target: UdpOptions,

    /// Stop after this long without a reply
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl ServerConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl ClientConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check option combinations that serde alone cannot express
    pub fn validate(&self) -> Result<()> {
        if self.server.is_some() == self.client.is_some() {
            return Err(Error::Config(
                "exactly one of 'server' or 'client' must be configured".into(),
            ));
        }
        if let Some(server) = &self.server {
            server.listen.bind_address()?;
        }
        if let Some(client) = &self.client {
            client.target.target()?;
        }
        Ok(())
    }

    /// Create a default server configuration
    pub fn default_server() -> Self {
        Config {
            log: LogConfig::default(),
            server: Some(ServerConfig {
                listen: UdpOptions::host_port("0.0.0.0", 9000).duplex(),
                idle_timeout_ms: default_idle_timeout_ms(),
                heartbeat: Some(TimerConfig {
                    interval_ms: 10_000,
                    policy: ReschedulePolicy::Soft,
                }),
            }),
            client: None,
        }
    }

    /// Create a default client configuration
    pub fn default_client() -> Self {
        Config {
            log: LogConfig::default(),
            server: None,
            client: Some(ClientConfig {
                target: UdpOptions::uri("udp://127.0.0.1:9000").duplex(),
                idle_timeout_ms: default_idle_timeout_ms(),
            }),
        }
    }
}
