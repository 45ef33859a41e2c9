//! Chat relay binary: serves by default, connects with `--client`.

use anyhow::Result;
use chat_server::{ChatClient, ChatConfig, Manager};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "chat-server", about = "Actor-based multi-client text-chat relay")]
struct Args {
    /// Connect to a running server instead of serving.
    #[arg(long)]
    client: bool,

    /// Log filter, e.g. `info` or `chat_server=debug`. Falls back to the
    /// LOG_LEVEL environment variable, then `info`.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    let config = ChatConfig::from_env()?;
    if args.client {
        run_client(&config).await
    } else {
        run_server(&config).await
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_server(config: &ChatConfig) -> Result<()> {
    let manager = Manager::server(config)?;
    let handle = manager.handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            handle.shutdown();
        }
    });

    manager.run().await?;
    Ok(())
}

/// Interactive client: stdin lines go to the server, received lines are
/// printed by the connection handlers.
async fn run_client(config: &ChatConfig) -> Result<()> {
    let client = ChatClient::new(config)?;
    let runner = {
        let client = client.clone();
        tokio::spawn(async move { client.run().await })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(line) => {
                    if let Err(e) = client.send(&format!("{line}\r\n")).await {
                        error!(error = %e, "send failed");
                        break;
                    }
                }
                None => break,
            },
        }
    }

    client.shutdown();
    runner.await??;
    Ok(())
}
