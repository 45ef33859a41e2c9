//! Log actor: serializes side-channel diagnostics from the other actors.
//!
//! Routing through an inbox keeps the hot paths free of subscriber-side
//! locking; the record's level picks the `tracing` macro here.

use super::{LogLevel, LogRecord};
use async_trait::async_trait;
use chat_actors::Actor;
use tracing::{debug, error, info};

#[derive(Default)]
pub struct LogActor;

#[async_trait]
impl Actor for LogActor {
    type Message = LogRecord;

    fn name(&self) -> &'static str {
        "log"
    }

    async fn process(&mut self, record: LogRecord) -> anyhow::Result<()> {
        match record.level {
            LogLevel::Debug => debug!(target: "chat", "{}", record.text),
            LogLevel::Info => info!(target: "chat", "{}", record.text),
            LogLevel::Error => error!(target: "chat", "{}", record.text),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_actors::{spawn, ActorStatus};
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn records_of_every_level_are_absorbed() {
        let (log, task) = spawn(LogActor);
        log.submit(LogRecord::debug("d"));
        log.submit(LogRecord::info("i"));
        log.submit(LogRecord::error("e"));
        log.shutdown();
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(log.status(), ActorStatus::Stopped);
    }
}
