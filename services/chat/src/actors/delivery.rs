//! Delivery actor: the single egress point for chat text.
//!
//! Recipients are resolved against the contact registry at delivery time,
//! so a client that left between routing and delivery is skipped, not an
//! error. A failed write to one recipient never aborts the rest of a
//! broadcast batch.

use super::{Delivery, LogRecord, Recipient};
use crate::contact::{ClientId, ContactRegistry};
use async_trait::async_trait;
use chat_actors::{Actor, ActorRef};
use chat_network::ConnectionTable;
use std::sync::Arc;

pub const CONFIRMATION: &str = "your message has been delivered";

pub struct DeliveryActor {
    registry: Arc<ContactRegistry>,
    connections: ConnectionTable,
    log: ActorRef<LogRecord>,
}

impl DeliveryActor {
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

    async fn send_to(&self, id: ClientId, line: &str) {
        let Some(entry) = self.registry.get(id) else {
            self.log.submit(LogRecord::debug(format!(
                "skipping delivery to unregistered client {id}"
            )));
            return;
        };
        if let Err(e) = self.connections.send(entry.connection, line).await {
            self.log.submit(LogRecord::error(format!(
                "delivery to client {id} failed: {e}"
            )));
        }
    }
}

/// Addressed lines carry a local timestamp and the sender's identity so
/// recipients can tell messages apart; unaddressed lines (command replies,
/// listings) go out verbatim. Either way the line is CRLF-terminated.
pub fn format_line(sender: Option<ClientId>, text: &str) -> String {
    match sender {
        Some(id) => {
            let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f");
            format!("{stamp} {id} {text}\r\n")
        }
        None => format!("{text}\r\n"),
    }
}

#[async_trait]
impl Actor for DeliveryActor {
    type Message = Delivery;

    fn name(&self) -> &'static str {
        "delivery"
    }

    async fn process(&mut self, delivery: Delivery) -> anyhow::Result<()> {
        let line = format_line(delivery.sender, &delivery.text);
        match delivery.recipient {
            Recipient::One(id) => self.send_to(id, &line).await,
            Recipient::All => {
                for id in self.registry.list() {
                    self.send_to(id, &line).await;
                }
            }
        }
        if let Some(sender) = delivery.sender {
            self.send_to(sender, &format_line(None, CONFIRMATION)).await;
        }
        Ok(())
    }
}
