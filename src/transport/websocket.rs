//! WebSocket hub server
//!
//! Accepts WebSocket connections and turns invoke frames into broadcast hub
//! calls. Responsibilities:
//! - accept TCP/WebSocket connections
//! - create a `Client` for each connection and register it with the
//!   `SessionRegistry`, removing it exactly once when the connection ends
//! - route `invoke` frames addressed to the configured hub name to the
//!   `ObservationDeckHub` and answer each one with a `completion` frame

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::spawn;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::client::Client;
use crate::config::Settings;
use crate::hub::ObservationDeckHub;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::transport::registry::SessionRegistry;

/// Bind `addr` and serve the hub until the listener fails.
pub async fn start_websocket_server(
    addr: String,
    registry: Arc<Mutex<SessionRegistry>>,
    settings: Settings,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("WebSocket hub listening on ws://{addr}");
    serve(listener, registry, settings).await;
    Ok(())
}

/// Serve the hub on an already bound listener.
pub async fn serve(listener: TcpListener, registry: Arc<Mutex<SessionRegistry>>, settings: Settings) {
    let hub = ObservationDeckHub::new(registry.clone());
    let hub_name = Arc::new(settings.server.hub_name);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "accept failed");
                return;
            }
        };
        let registry = registry.clone();
        let hub = hub.clone();
        let hub_name = hub_name.clone();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!(%peer, error = %e, "WebSocket handshake error");
                    return;
                }
            };
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
            let client = Client::new(tx);
            let client_id = client.id.clone();
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .register_client(client);
            info!(%peer, client_id = %client_id, "session attached");

            let cleanup_called = Arc::new(AtomicBool::new(false));

            let do_cleanup = {
                let registry = registry.clone();
                let client_id = client_id.clone();
                let cleanup_called = cleanup_called.clone();

                move || {
                    if !cleanup_called.swap(true, Ordering::SeqCst) {
                        registry
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove_client(&client_id);
                        info!(client_id = %client_id, "session detached");
                    }
                }
            };

            {
                let client_id = client_id.clone();
                let do_cleanup = do_cleanup.clone();

                spawn(async move {
                    while let Some(msg) = rx.recv().await {
                        if let Err(e) = ws_sender.send(msg).await {
                            warn!(client_id = %client_id, error = %e, "failed to send frame");
                            break;
                        }
                    }

                    do_cleanup();
                    debug!(client_id = %client_id, "send loop closed");
                });
            }

            while let Some(Ok(msg)) = ws_receiver.next().await {
                if msg.is_close() {
                    break;
                }
                let Ok(text) = msg.to_text() else {
                    continue;
                };
                if text.is_empty() {
                    continue;
                }
                if let Some(reply) = handle_client_message(&hub, &hub_name, text) {
                    let registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
                    registry.send_to(&client_id, &reply);
                }
            }

            do_cleanup();
        });
    }
}

/// Process one text frame from a session and build the completion to send
/// back. Returns `None` for frames that cannot be answered.
pub fn handle_client_message(
    hub: &ObservationDeckHub,
    hub_name: &str,
    text: &str,
) -> Option<ServerMessage> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Invoke {
            hub: target,
            method,
            invocation_id,
            payload,
        }) => {
            let error = if target != hub_name {
                warn!(hub = %target, "invocation for unknown hub");
                Some(format!("unknown hub: {target}"))
            } else {
                match hub.dispatch(&method, payload) {
                    Ok(recipients) => {
                        debug!(method = %method, recipients, "invocation dispatched");
                        None
                    }
                    Err(e) => {
                        warn!(method = %method, error = %e, "invocation rejected");
                        Some(e.to_string())
                    }
                }
            };
            Some(ServerMessage::Completion {
                invocation_id,
                error,
            })
        }
        Err(err) => {
            warn!(
                error = %err,
                frame = %text.chars().take(100).collect::<String>(),
                "invalid client message"
            );
            None
        }
    }
}
