//! Concrete actors and their inbox message types.
//!
//! One tagged message type per actor, so `process` is exhaustive over the
//! shapes that actor accepts instead of poking at a loose record.

pub mod command;
pub mod delivery;
pub mod log;
pub mod session;

pub use command::CommandActor;
pub use delivery::DeliveryActor;
pub use log::LogActor;
pub use session::SessionActor;

use crate::contact::ClientId;
use chat_network::ConnectionId;
use std::net::SocketAddr;

/// A newly accepted peer connection, bound for the session actor.
#[derive(Debug, Clone, Copy)]
pub struct JoinEvent {
    pub peer_addr: SocketAddr,
    pub connection: ConnectionId,
}

/// Severity of a [`LogRecord`]. Closed set; an unrecognized level cannot be
/// constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Error,
}

/// Side-channel diagnostic bound for the log actor.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: LogLevel,
    pub text: String,
}

impl LogRecord {
    pub fn debug(text: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Debug,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Error,
            text: text.into(),
        }
    }
}

/// Delivery addressing: one resolved identity or every registered client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    One(ClientId),
    All,
}

/// A routed outbound message, bound for the delivery actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub recipient: Recipient,
    pub text: String,
    /// Present when a client originated the message; recipients see the
    /// sender's identity and the sender gets a delivery confirmation.
    pub sender: Option<ClientId>,
}

/// A raw inbound line plus its origin, bound for the command actor.
#[derive(Debug, Clone)]
pub struct InboundCommand {
    pub connection: ConnectionId,
    pub text: String,
}
