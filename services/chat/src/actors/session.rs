//! Session actor: registers newly joined peers and greets them.

use super::{JoinEvent, LogRecord};
use crate::contact::ContactRegistry;
use async_trait::async_trait;
use chat_actors::{Actor, ActorRef};
use chat_network::ConnectionTable;
use std::sync::Arc;

pub struct SessionActor {
    registry: Arc<ContactRegistry>,
    connections: ConnectionTable,
    log: ActorRef<LogRecord>,
}

impl SessionActor {
    pub fn new(
        registry: Arc<ContactRegistry>,
        connections: ConnectionTable,
        log: ActorRef<LogRecord>,
    ) -> Self {
        Self {
            registry,
            connections,
            log,
        }
    }
}

#[async_trait]
impl Actor for SessionActor {
    type Message = JoinEvent;

    fn name(&self) -> &'static str {
        "session"
    }

    async fn process(&mut self, event: JoinEvent) -> anyhow::Result<()> {
        // A conflict here means identity allocation raced, which the
        // registry lock rules out; treat it as fatal.
        let id = self.registry.add(event.peer_addr, event.connection)?;
        self.log.submit(LogRecord::info(format!(
            "client {id} joined from {} on {}",
            event.peer_addr, event.connection
        )));

        let welcome = format!("Your client ID: {id}\r\n");
        if let Err(e) = self.connections.send(event.connection, &welcome).await {
            // The peer vanished between join and greeting; give the
            // identity back so the next join can take it.
            self.registry.remove(id);
            self.log.submit(LogRecord::error(format!(
                "failed to greet client {id}: {e}"
            )));
        }
        Ok(())
    }
}
