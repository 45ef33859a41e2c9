//! Actor processing loop and handle types.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Behavior implemented by every concrete actor.
///
/// `process` is the single point a concrete actor overrides; the runtime
/// guarantees at most one in-flight `process` call per actor.
#[async_trait]
pub trait Actor: Send + 'static {
    type Message: Send + 'static;

    /// Stable name used in log records for this actor.
    fn name(&self) -> &'static str;

    /// Handle one inbox message.
    async fn process(&mut self, msg: Self::Message) -> anyhow::Result<()>;

    /// Called once before the first message is processed.
    async fn on_start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once after the loop has terminated, for any reason.
    async fn on_stop(&mut self) {}
}

/// Observable lifecycle state of a spawned actor. An actor never transitions
/// back to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorStatus {
    Running,
    ShuttingDown,
    Stopped,
}

const RUNNING: u8 = 0;
const SHUTTING_DOWN: u8 = 1;
const STOPPED: u8 = 2;

fn status_from(raw: u8) -> ActorStatus {
    match raw {
        RUNNING => ActorStatus::Running,
        SHUTTING_DOWN => ActorStatus::ShuttingDown,
        _ => ActorStatus::Stopped,
    }
}

enum Envelope<M> {
    Message(M),
    Shutdown,
}

/// Cloneable handle for submitting messages to one actor's inbox.
pub struct ActorRef<M> {
    name: &'static str,
    tx: mpsc::UnboundedSender<Envelope<M>>,
    status: Arc<AtomicU8>,
}

impl<M> Clone for ActorRef<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            status: Arc::clone(&self.status),
        }
    }
}

impl<M: Send + 'static> ActorRef<M> {
    /// Enqueue a message. Never blocks; the inbox is unbounded. A message
    /// submitted after the actor stopped is dropped.
    pub fn submit(&self, msg: M) {
        if self.tx.send(Envelope::Message(msg)).is_err() {
            debug!(actor = self.name, "inbox closed, message dropped");
        }
    }

    /// Request cooperative termination. The sentinel terminates the loop
    /// after messages already queued ahead of it, without reaching `process`.
    pub fn shutdown(&self) {
        let _ = self.status.compare_exchange(
            RUNNING,
            SHUTTING_DOWN,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let _ = self.tx.send(Envelope::Shutdown);
    }

    pub fn status(&self) -> ActorStatus {
        status_from(self.status.load(Ordering::Acquire))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Spawn an actor onto its own task and return a handle to its inbox.
///
/// The loop awaits the inbox (a blocking wait rather than a sleep-poll, so
/// shutdown is observed as soon as the sentinel is dequeued), processes
/// messages strictly in submission order, and terminates on the shutdown
/// sentinel, on a processing error, or when every `ActorRef` is dropped.
pub fn spawn<A: Actor>(mut actor: A) -> (ActorRef<A::Message>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let status = Arc::new(AtomicU8::new(RUNNING));
    let name = actor.name();

    let actor_ref = ActorRef {
        name,
        tx,
        status: Arc::clone(&status),
    };

    let task = tokio::spawn(async move {
        if let Err(e) = actor.on_start().await {
            error!(actor = name, error = %e, "actor failed to start");
            status.store(STOPPED, Ordering::Release);
            return;
        }
        debug!(actor = name, "actor started");

        while let Some(envelope) = rx.recv().await {
            match envelope {
                Envelope::Shutdown => {
                    debug!(actor = name, "shutdown sentinel received");
                    break;
                }
                Envelope::Message(msg) => {
                    if let Err(e) = actor.process(msg).await {
                        error!(actor = name, error = %e, "processing failed, stopping actor");
                        break;
                    }
                }
            }
        }

        status.store(STOPPED, Ordering::Release);
        rx.close();
        actor.on_stop().await;
        debug!(actor = name, "actor stopped");
    });

    (actor_ref, task)
}
