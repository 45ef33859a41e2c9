//! Connection layer error types.
//!
//! Startup failures (configuration, permission, availability) are fatal at
//! construction; transport failures propagate to the caller of the lifecycle
//! operation that hit them. Nothing here is retried internally.

use std::net::SocketAddr;
use thiserror::Error;

/// Main connection layer error type
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Invalid construction parameters (bad port, unknown protocol name)
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Privileged endpoint without sufficient rights
    #[error("permission error: {message}")]
    Permission { message: String },

    /// Endpoint already occupied (server) or unreachable (client) at startup
    #[error("availability error: {endpoint}: {message}")]
    Availability { endpoint: String, message: String },

    /// Failed to bind the listening endpoint
    #[error("bind error: {message}")]
    Bind {
        message: String,
        source: Option<std::io::Error>,
    },

    /// Failed to establish an outbound connection
    #[error("connect error: {message}")]
    Connect {
        message: String,
        source: Option<std::io::Error>,
    },

    /// Failed to close the bind-level listening handle. The tokio drivers
    /// in this crate release their listeners by drop, which cannot fail,
    /// so they never produce this variant; it is reserved for drivers
    /// whose bind handle has a fallible teardown.
    #[error("close error (bind): {message}")]
    CloseBind {
        message: String,
        source: Option<std::io::Error>,
    },

    /// Failed to close or unregister a single peer connection
    #[error("close error (connection): {message}")]
    CloseConnection {
        message: String,
        source: Option<std::io::Error>,
    },

    /// Mid-operation socket failure on an established connection
    #[error("connection error: {message} (remote: {remote_addr:?})")]
    Connection {
        message: String,
        remote_addr: Option<SocketAddr>,
        source: Option<std::io::Error>,
    },
}

/// Result type alias for connection layer operations
pub type Result<T> = std::result::Result<T, NetworkError>;

impl NetworkError {
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    pub fn availability(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Availability {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn bind(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn connect(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Connect {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn close_bind(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::CloseBind {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn close_connection(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::CloseConnection {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn connection(message: impl Into<String>, remote_addr: Option<SocketAddr>) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: None,
        }
    }

    pub fn connection_with_source(
        message: impl Into<String>,
        remote_addr: Option<SocketAddr>,
        source: std::io::Error,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: Some(source),
        }
    }
}
