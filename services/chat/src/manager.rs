//! Composition root: wires the connection layer to the actors.
//!
//! The manager owns the contact registry and the connection table, spawns
//! the four actors, and translates connection events into inbox messages.
//! Handlers are synchronous and only enqueue, so the event loop never waits
//! on actor processing.

use crate::actors::{
    CommandActor, DeliveryActor, InboundCommand, JoinEvent, LogActor, LogRecord, SessionActor,
};
use crate::config::{ChatConfig, Driver};
use crate::contact::ContactRegistry;
use chat_actors::{spawn, ActorRef};
use chat_network::{
    ConnectionTable, EventHandlers, Result, Server, SocketClient, TcpServer, TransportProtocol,
    UdpServer,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

struct ActorSet {
    session: ActorRef<JoinEvent>,
    command: ActorRef<InboundCommand>,
    delivery: ActorRef<crate::actors::Delivery>,
    log: ActorRef<LogRecord>,
}

impl ActorSet {
    /// Stop the pipeline front to back so records already queued still
    /// drain; the log actor goes last.
    fn shutdown(&self) {
        self.session.shutdown();
        self.command.shutdown();
        self.delivery.shutdown();
        self.log.shutdown();
    }
}

/// Server-mode runtime: one connection driver plus the actor pipeline.
pub struct Manager {
    server: Arc<dyn Server>,
    actors: ActorSet,
    tasks: Vec<JoinHandle<()>>,
}

/// Cloneable handle for requesting shutdown from outside `run`.
#[derive(Clone)]
pub struct ManagerHandle {
    server: Arc<dyn Server>,
}

impl ManagerHandle {
    pub fn shutdown(&self) {
        self.server.shutdown();
    }
}

impl Manager {
    pub fn server(config: &ChatConfig) -> Result<Self> {
        let registry = Arc::new(ContactRegistry::new());
        let table = ConnectionTable::new();

        let (log, log_task) = spawn(LogActor);
        let (delivery, delivery_task) = spawn(DeliveryActor::new(
            Arc::clone(&registry),
            table.clone(),
            log.clone(),
        ));
        let (command, command_task) = spawn(CommandActor::new(
            Arc::clone(&registry),
            delivery.clone(),
            log.clone(),
        ));
        let (session, session_task) = spawn(SessionActor::new(
            Arc::clone(&registry),
            table.clone(),
            log.clone(),
        ));

        let handlers = {
            let bind_log = log.clone();
            let join_session = session.clone();
            let message_command = command.clone();
            let disconnect_log = log.clone();
            let disconnect_registry = Arc::clone(&registry);
            EventHandlers::builder()
                .on_bind(move |addr| {
                    bind_log.submit(LogRecord::info(format!("listening on {addr}")));
                })
                .on_join(move |connection, peer_addr| {
                    join_session.submit(JoinEvent {
                        peer_addr,
                        connection,
                    });
                })
                .on_message(move |connection, text| {
                    message_command.submit(InboundCommand { connection, text });
                })
                .on_disconnect(move |connection| match disconnect_registry.resolve(connection) {
                    Ok(id) => {
                        disconnect_registry.remove(id);
                        disconnect_log.submit(LogRecord::info(format!("client {id} left")));
                    }
                    Err(_) => {
                        // Closed before the session actor greeted it.
                        disconnect_log
                            .submit(LogRecord::debug(format!("{connection} closed unregistered")));
                    }
                })
                .build()
        };

        let server = build_server(config, handlers, table)?;

        Ok(Self {
            server,
            actors: ActorSet {
                session,
                command,
                delivery,
                log,
            },
            tasks: vec![session_task, command_task, delivery_task, log_task],
        })
    }

    pub fn handle(&self) -> ManagerHandle {
        ManagerHandle {
            server: Arc::clone(&self.server),
        }
    }

    /// Serve until shutdown or a fatal connection-layer error, then stop
    /// the actor pipeline and join every task. Inbox messages still queued
    /// when shutdown lands are dropped, not drained.
    pub async fn run(self) -> Result<()> {
        let result = self.server.serve().await;
        if let Err(e) = &result {
            error!(error = %e, "connection layer failed");
        }

        self.actors.shutdown();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "actor task panicked");
            }
        }
        info!("manager stopped");
        result
    }
}

fn build_server(
    config: &ChatConfig,
    handlers: EventHandlers,
    table: ConnectionTable,
) -> Result<Arc<dyn Server>> {
    let Driver::Socket = config.driver;
    Ok(match config.protocol {
        TransportProtocol::Tcp => Arc::new(TcpServer::new(
            config.host.clone(),
            config.port,
            handlers,
            table,
        )?),
        TransportProtocol::Udp => Arc::new(UdpServer::new(
            config.host.clone(),
            config.port,
            handlers,
            table,
        )?),
    })
}

/// Client-mode runtime: a single connection whose received lines go to
/// standard output.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<SocketClient>,
}

impl ChatClient {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let handlers = EventHandlers::builder()
            .on_connect(|connection| {
                info!(%connection, "connected to the chat server");
            })
            .on_message(|_, text| {
                println!("{text}");
            })
            .on_disconnect(|connection| {
                info!(%connection, "connection closed");
            })
            .build();
        let inner = SocketClient::new(
            config.host.clone(),
            config.port,
            config.protocol,
            handlers,
        )?;
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Connect and read until the server closes or shutdown is requested.
    pub async fn run(&self) -> Result<()> {
        self.inner.run().await
    }

    pub async fn send(&self, text: &str) -> Result<()> {
        self.inner.send(text).await
    }

    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}
