//! Connection lifecycle events and the handler table.
//!
//! The event set is closed: bind, connect, join, message, disconnect. Every
//! handler not supplied to the builder is replaced by an explicit no-op at
//! construction time, so dispatching an event can never hit a missing entry.

use crate::table::ConnectionId;
use std::net::SocketAddr;
use std::sync::Arc;

/// Fired once the listening endpoint is bound (server mode).
pub type BindHandler = Arc<dyn Fn(SocketAddr) + Send + Sync>;
/// Fired once the outbound connection is established (client mode).
pub type ConnectHandler = Arc<dyn Fn(ConnectionId) + Send + Sync>;
/// Fired when a new peer connection is accepted.
pub type JoinHandler = Arc<dyn Fn(ConnectionId, SocketAddr) + Send + Sync>;
/// Fired with the decoded, line-terminator-stripped payload of one read.
pub type MessageHandler = Arc<dyn Fn(ConnectionId, String) + Send + Sync>;
/// Fired when a connection is closed and unregistered.
pub type DisconnectHandler = Arc<dyn Fn(ConnectionId) + Send + Sync>;

/// Handler table over the closed set of connection events.
#[derive(Clone)]
pub struct EventHandlers {
    pub(crate) on_bind: BindHandler,
    pub(crate) on_connect: ConnectHandler,
    pub(crate) on_join: JoinHandler,
    pub(crate) on_message: MessageHandler,
    pub(crate) on_disconnect: DisconnectHandler,
}

impl EventHandlers {
    pub fn builder() -> EventHandlersBuilder {
        EventHandlersBuilder::default()
    }
}

impl Default for EventHandlers {
    /// A table where every event resolves to a no-op.
    fn default() -> Self {
        EventHandlersBuilder::default().build()
    }
}

/// Builder filling unset slots with no-op handlers.
#[derive(Default)]
pub struct EventHandlersBuilder {
    on_bind: Option<BindHandler>,
    on_connect: Option<ConnectHandler>,
    on_join: Option<JoinHandler>,
    on_message: Option<MessageHandler>,
    on_disconnect: Option<DisconnectHandler>,
}

impl EventHandlersBuilder {
    pub fn on_bind(mut self, f: impl Fn(SocketAddr) + Send + Sync + 'static) -> Self {
        self.on_bind = Some(Arc::new(f));
        self
    }

    pub fn on_connect(mut self, f: impl Fn(ConnectionId) + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    pub fn on_join(mut self, f: impl Fn(ConnectionId, SocketAddr) + Send + Sync + 'static) -> Self {
        self.on_join = Some(Arc::new(f));
        self
    }

    pub fn on_message(mut self, f: impl Fn(ConnectionId, String) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Arc::new(f));
        self
    }

    pub fn on_disconnect(mut self, f: impl Fn(ConnectionId) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> EventHandlers {
        EventHandlers {
            on_bind: self.on_bind.unwrap_or_else(|| Arc::new(|_| {})),
            on_connect: self.on_connect.unwrap_or_else(|| Arc::new(|_| {})),
            on_join: self.on_join.unwrap_or_else(|| Arc::new(|_, _| {})),
            on_message: self.on_message.unwrap_or_else(|| Arc::new(|_, _| {})),
            on_disconnect: self.on_disconnect.unwrap_or_else(|| Arc::new(|_| {})),
        }
    }
}
