//! Environment-sourced runtime configuration.
//!
//! Every knob has a default, so a bare environment starts a TCP server on
//! 127.0.0.1:9171. Invalid values fail startup with a configuration error
//! instead of being silently replaced.

use chat_network::TransportProtocol;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9171;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {variable}: {reason}")]
    Invalid {
        variable: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection driver. Closed set; `socket` is the only implementation, and
/// an unknown name is rejected at startup rather than deferred to a
/// lookup failure later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Socket,
}

impl FromStr for Driver {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "socket" => Ok(Self::Socket),
            other => Err(ConfigError::Invalid {
                variable: "CONNECTION_DRIVER",
                value: other.to_string(),
                reason: "known drivers: socket".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub host: String,
    pub port: u16,
    pub protocol: TransportProtocol,
    pub driver: Driver,
}

impl ChatConfig {
    /// Resolve from the process environment, applying defaults for unset
    /// variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("SERVER_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());

        let port = match std::env::var("SERVER_PORT") {
            Ok(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
                variable: "SERVER_PORT",
                value: raw.clone(),
                reason: format!("{e}"),
            })?,
            Err(_) => DEFAULT_PORT,
        };

        let protocol = match std::env::var("CONNECTION_PROTOCOL") {
            Ok(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
                variable: "CONNECTION_PROTOCOL",
                value: raw.clone(),
                reason: format!("{e}"),
            })?,
            Err(_) => TransportProtocol::Tcp,
        };

        let driver = match std::env::var("CONNECTION_DRIVER") {
            Ok(raw) => raw.parse()?,
            Err(_) => Driver::Socket,
        };

        Ok(Self {
            host,
            port,
            protocol,
            driver,
        })
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            protocol: TransportProtocol::Tcp,
            driver: Driver::Socket,
        }
    }
}
