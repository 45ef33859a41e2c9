//! Command actor: turns inbound lines into routed deliveries.
//!
//! The sender's identity is resolved before parsing; a line from a
//! connection with no registered identity is dropped and logged, which is
//! fatal to that request only, never to the actor.

use super::{Delivery, InboundCommand, LogRecord, Recipient};
use crate::contact::{ClientId, ContactRegistry};
use crate::dispatch::{self, Command};
use async_trait::async_trait;
use chat_actors::{Actor, ActorRef};
use std::sync::Arc;

pub struct CommandActor {
    registry: Arc<ContactRegistry>,
    delivery: ActorRef<Delivery>,
    log: ActorRef<LogRecord>,
    http: reqwest::Client,
}

impl CommandActor {
    pub fn new(
        registry: Arc<ContactRegistry>,
        delivery: ActorRef<Delivery>,
        log: ActorRef<LogRecord>,
    ) -> Self {
        Self {
            registry,
            delivery,
            log,
            http: reqwest::Client::new(),
        }
    }

    async fn route(&self, sender: ClientId, command: Command) -> Delivery {
        match command {
            Command::Direct { client_id, message } => Delivery {
                recipient: Recipient::One(client_id),
                text: message,
                sender: Some(sender),
            },
            Command::Who => {
                let listing = self
                    .registry
                    .list()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\r\n");
                Delivery {
                    recipient: Recipient::One(sender),
                    text: listing,
                    sender: None,
                }
            }
            Command::Broadcast { message } => Delivery {
                recipient: Recipient::All,
                text: message,
                sender: Some(sender),
            },
            Command::Url { client_id, url } => match self.body_size(&url).await {
                Ok(size) => Delivery {
                    recipient: Recipient::One(client_id),
                    text: size.to_string(),
                    sender: Some(sender),
                },
                Err(report) => Delivery {
                    recipient: Recipient::One(sender),
                    text: report,
                    sender: None,
                },
            },
            Command::Fib { client_id, n } => match dispatch::fibonacci(n) {
                Some(value) => Delivery {
                    recipient: Recipient::One(client_id),
                    text: value.to_string(),
                    sender: Some(sender),
                },
                None => Delivery {
                    recipient: Recipient::One(sender),
                    text: format!("fibonacci of {n} does not fit in 128 bits"),
                    sender: None,
                },
            },
            Command::Malformed { reply } => Delivery {
                recipient: Recipient::One(sender),
                text: reply.to_string(),
                sender: None,
            },
        }
    }

    /// Byte length of the body behind `url`.
    async fn body_size(&self, url: &str) -> Result<usize, String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request has failed: {e}"))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| format!("request has failed: {e}"))?;
        Ok(body.len())
    }
}

#[async_trait]
impl Actor for CommandActor {
    type Message = InboundCommand;

    fn name(&self) -> &'static str {
        "command"
    }

    async fn process(&mut self, msg: InboundCommand) -> anyhow::Result<()> {
        let sender = match self.registry.resolve(msg.connection) {
            Ok(id) => id,
            Err(e) => {
                self.log
                    .submit(LogRecord::error(format!("dropping inbound line: {e}")));
                return Ok(());
            }
        };
        let delivery = self.route(sender, dispatch::parse(&msg.text)).await;
        self.delivery.submit(delivery);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::LogActor;
    use crate::dispatch::{INVALID_COMMAND, INVALID_DIRECT};
    use chat_actors::spawn;
    use chat_network::ConnectionId;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Stand-in for the delivery actor that records what it was handed.
    struct Sink {
        seen: Arc<Mutex<Vec<Delivery>>>,
    }

    #[async_trait]
    impl Actor for Sink {
        type Message = Delivery;

        fn name(&self) -> &'static str {
            "sink"
        }

        async fn process(&mut self, msg: Delivery) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(msg);
            Ok(())
        }
    }

    struct Harness {
        command: ActorRef<InboundCommand>,
        seen: Arc<Mutex<Vec<Delivery>>>,
        tasks: Vec<tokio::task::JoinHandle<()>>,
        refs: (ActorRef<Delivery>, ActorRef<LogRecord>),
    }

    impl Harness {
        fn start(registry: Arc<ContactRegistry>) -> (Self, ActorRef<InboundCommand>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let (sink, sink_task) = spawn(Sink {
                seen: Arc::clone(&seen),
            });
            let (log, log_task) = spawn(LogActor);
            let (command, command_task) =
                spawn(CommandActor::new(registry, sink.clone(), log.clone()));
            let handle = command.clone();
            (
                Self {
                    command,
                    seen,
                    tasks: vec![command_task, sink_task, log_task],
                    refs: (sink, log),
                },
                handle,
            )
        }

        async fn finish(self) -> Vec<Delivery> {
            let mut tasks = self.tasks.into_iter();
            // The command actor forwards into the sink while processing, so
            // it must drain fully before the sink's shutdown sentinel is
            // enqueued; anything queued behind the sentinel is dropped.
            self.command.shutdown();
            timeout(Duration::from_secs(1), tasks.next().unwrap())
                .await
                .unwrap()
                .unwrap();
            self.refs.0.shutdown();
            self.refs.1.shutdown();
            for task in tasks {
                timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
            }
            self.seen.lock().unwrap().clone()
        }
    }

    fn registry_with(clients: &[(u64, u16)]) -> Arc<ContactRegistry> {
        let registry = Arc::new(ContactRegistry::new());
        for (conn, port) in clients {
            registry
                .add(
                    format!("127.0.0.1:{port}").parse().unwrap(),
                    ConnectionId::from_raw(*conn),
                )
                .unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn direct_message_routes_to_the_target_with_the_sender_attached() {
        let registry = registry_with(&[(1, 4000), (2, 4001)]);
        let (harness, command) = Harness::start(registry);

        command.submit(InboundCommand {
            connection: ConnectionId::from_raw(1),
            text: "msg 7 hello".to_string(),
        });

        let seen = harness.finish().await;
        assert_eq!(
            seen,
            vec![Delivery {
                recipient: Recipient::One(7),
                text: "hello".to_string(),
                sender: Some(1),
            }]
        );
    }

    #[tokio::test]
    async fn who_lists_sorted_identities_to_the_sender_only() {
        let registry = registry_with(&[(1, 4000), (2, 4001), (3, 4002)]);
        registry.remove(2);
        let (harness, command) = Harness::start(registry);

        command.submit(InboundCommand {
            connection: ConnectionId::from_raw(3),
            text: "w".to_string(),
        });

        let seen = harness.finish().await;
        assert_eq!(
            seen,
            vec![Delivery {
                recipient: Recipient::One(3),
                text: "1\r\n3".to_string(),
                sender: None,
            }]
        );
    }

    #[tokio::test]
    async fn broadcast_routes_to_everyone() {
        let registry = registry_with(&[(1, 4000)]);
        let (harness, command) = Harness::start(registry);

        command.submit(InboundCommand {
            connection: ConnectionId::from_raw(1),
            text: "broadcast good morning".to_string(),
        });

        let seen = harness.finish().await;
        assert_eq!(
            seen,
            vec![Delivery {
                recipient: Recipient::All,
                text: "good morning".to_string(),
                sender: Some(1),
            }]
        );
    }

    #[tokio::test]
    async fn fib_result_goes_to_the_target_and_overflow_to_the_sender() {
        let registry = registry_with(&[(1, 4000)]);
        let (harness, command) = Harness::start(registry);

        command.submit(InboundCommand {
            connection: ConnectionId::from_raw(1),
            text: "fib 5 10".to_string(),
        });
        command.submit(InboundCommand {
            connection: ConnectionId::from_raw(1),
            text: "fib 5 500".to_string(),
        });

        let seen = harness.finish().await;
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[0],
            Delivery {
                recipient: Recipient::One(5),
                text: "55".to_string(),
                sender: Some(1),
            }
        );
        assert_eq!(seen[1].recipient, Recipient::One(1));
        assert_eq!(seen[1].sender, None);
        assert!(seen[1].text.contains("does not fit"));
    }

    #[tokio::test]
    async fn malformed_lines_bounce_their_error_text_to_the_sender() {
        let registry = registry_with(&[(1, 4000)]);
        let (harness, command) = Harness::start(registry);

        command.submit(InboundCommand {
            connection: ConnectionId::from_raw(1),
            text: "msg abc hi".to_string(),
        });
        command.submit(InboundCommand {
            connection: ConnectionId::from_raw(1),
            text: "nonsense".to_string(),
        });

        let seen = harness.finish().await;
        assert_eq!(
            seen,
            vec![
                Delivery {
                    recipient: Recipient::One(1),
                    text: INVALID_DIRECT.to_string(),
                    sender: None,
                },
                Delivery {
                    recipient: Recipient::One(1),
                    text: INVALID_COMMAND.to_string(),
                    sender: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn url_reports_the_body_size_to_the_target() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // One canned HTTP exchange; the body is 11 bytes.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            stream
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\nhello world",
                )
                .await
                .unwrap();
        });

        let registry = registry_with(&[(1, 4000), (2, 4001)]);
        let (harness, command) = Harness::start(registry);

        command.submit(InboundCommand {
            connection: ConnectionId::from_raw(1),
            text: format!("url 2 http://127.0.0.1:{port}/"),
        });

        let seen = harness.finish().await;
        assert_eq!(
            seen,
            vec![Delivery {
                recipient: Recipient::One(2),
                text: "11".to_string(),
                sender: Some(1),
            }]
        );
    }

    #[tokio::test]
    async fn url_request_failure_is_reported_to_the_sender() {
        let registry = registry_with(&[(1, 4000), (2, 4001)]);
        let (harness, command) = Harness::start(registry);

        // Port 1 on loopback refuses the connection.
        command.submit(InboundCommand {
            connection: ConnectionId::from_raw(1),
            text: "url 2 http://127.0.0.1:1/".to_string(),
        });

        let seen = harness.finish().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].recipient, Recipient::One(1));
        assert_eq!(seen[0].sender, None);
        assert!(
            seen[0].text.starts_with("request has failed"),
            "got {}",
            seen[0].text
        );
    }

    #[tokio::test]
    async fn line_from_an_unregistered_connection_is_dropped() {
        let registry = registry_with(&[(1, 4000)]);
        let (harness, command) = Harness::start(registry);

        command.submit(InboundCommand {
            connection: ConnectionId::from_raw(99),
            text: "broadcast hi".to_string(),
        });

        let seen = harness.finish().await;
        assert!(seen.is_empty());
    }
}
