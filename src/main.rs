//! CLI for DeskHub
//!
//! Subcommands:
//! - `server`: run the WebSocket hub
//! - `publish`: publish desk events through a resilient publisher
//! - `listen`: attach to the hub and print every broadcast

use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use deskhub::config::{Settings, load_config};
use deskhub::hub::DeskClientEvent;
use deskhub::publisher::{Publisher, PublisherOptions};
use deskhub::transport::{SessionRegistry, WsSessionConfig, WsSessionFactory, start_websocket_server};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "deskhub")]
enum Command {
    /// Start the WebSocket hub
    Server,
    /// Publish desk events to the hub at `publisher.hub_url`
    Publish {
        /// Desk the events belong to
        #[arg(long)]
        desk: String,
        /// Event type label
        #[arg(long, default_value = "added")]
        event_type: String,
        /// Number of events to publish
        #[arg(long, default_value_t = 1)]
        count: u32,
        /// Seconds to wait for queued events before shutting down
        #[arg(long, default_value_t = 5)]
        linger: u64,
    },
    /// Print every broadcast from the hub at `publisher.hub_url`
    Listen,
}

#[tokio::main]
async fn main() {
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            deskhub::utils::logging::init("info");
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    deskhub::utils::logging::init(&settings.log.level);

    let result = match cmd {
        Command::Server => run_server(settings).await,
        Command::Publish {
            desk,
            event_type,
            count,
            linger,
        } => run_publish(settings, desk, event_type, count, Duration::from_secs(linger)).await,
        Command::Listen => run_listen(settings).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let registry = Arc::new(Mutex::new(SessionRegistry::new()));

    tokio::select! {
        result = start_websocket_server(addr, registry, settings.clone()) => {
            result?;
            error!("WebSocket hub exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn run_publish(
    settings: Settings,
    desk: String,
    event_type: String,
    count: u32,
    linger: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let session_config = WsSessionConfig::from_settings(&settings)?;
    let factory = Arc::new(WsSessionFactory::new(session_config));
    let publisher = Publisher::start(factory, PublisherOptions::from(&settings.publisher)).await;

    for seq in 0..count {
        let event = DeskClientEvent::new(desk.clone(), event_type.clone(), json!({ "seq": seq }));
        publisher.publish_added(&event).await?;
        info!(id = %event.id, seq, "published desk event");
    }

    let deadline = tokio::time::Instant::now() + linger;
    while publisher.queued() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if publisher.queued() > 0 {
        warn!(queued = publisher.queued(), "hub unreachable, giving up on queued events");
    }

    publisher.dispose().await;
    Ok(())
}

async fn run_listen(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let session_config = WsSessionConfig::from_settings(&settings)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let factory = Arc::new(WsSessionFactory::new(session_config).with_listener(tx));
    let publisher = Publisher::start(factory, PublisherOptions::from(&settings.publisher)).await;

    loop {
        tokio::select! {
            broadcast = rx.recv() => match broadcast {
                Some(broadcast) => println!("{} {}", broadcast.method, broadcast.payload),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received. Exiting gracefully.");
                break;
            }
        }
    }

    publisher.dispose().await;
    Ok(())
}
