use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::sync::mpsc;
use tungstenite::protocol::Message as WsMessage;

use crate::client::Client;
use crate::hub::{DeskClientEvent, ObservationDeckHub};
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::transport::registry::SessionRegistry;
use crate::transport::session::{ConnectionState, SessionEvent, SessionEvents};
use crate::transport::websocket::handle_client_message;

const HUB: &str = "ObservationDeckHub";

fn hub_with_listener() -> (ObservationDeckHub, mpsc::UnboundedReceiver<WsMessage>) {
    let registry = Arc::new(Mutex::new(SessionRegistry::new()));
    let (tx, rx) = mpsc::unbounded_channel();
    registry.lock().unwrap().register_client(Client::new(tx));
    (ObservationDeckHub::new(registry), rx)
}

fn invoke_frame(hub: &str, method: &str, payload: serde_json::Value) -> String {
    serde_json::to_string(&ClientMessage::Invoke {
        hub: hub.to_string(),
        method: method.to_string(),
        invocation_id: "inv-1".to_string(),
        payload,
    })
    .unwrap()
}

#[test]
fn test_client_invoke_wire_format() {
    let frame = ClientMessage::Invoke {
        hub: HUB.to_string(),
        method: "SendDeskEventAddedMessage".to_string(),
        invocation_id: "abc".to_string(),
        payload: json!({ "id": "e1" }),
    };
    let value = serde_json::to_value(&frame).unwrap();
    assert_eq!(value["type"], "invoke");
    assert_eq!(value["hub"], HUB);
    assert_eq!(value["method"], "SendDeskEventAddedMessage");
    assert_eq!(value["invocation_id"], "abc");
}

#[test]
fn test_server_completion_wire_format() {
    let parsed: ServerMessage =
        serde_json::from_str(r#"{"type":"completion","invocation_id":"abc","error":null}"#)
            .unwrap();
    assert_eq!(
        parsed,
        ServerMessage::Completion {
            invocation_id: "abc".to_string(),
            error: None
        }
    );
}

#[test]
fn test_handle_invoke_broadcasts_and_completes() {
    let (hub, mut rx) = hub_with_listener();
    let event = DeskClientEvent::new("desk-7", "moved", json!(null));
    let text = invoke_frame(
        HUB,
        "SendDeskEventAddedMessage",
        serde_json::to_value(&event).unwrap(),
    );

    let reply = handle_client_message(&hub, HUB, &text).expect("completion");
    assert_eq!(
        reply,
        ServerMessage::Completion {
            invocation_id: "inv-1".to_string(),
            error: None
        }
    );

    let broadcast = rx.try_recv().unwrap().to_text().unwrap().to_string();
    match serde_json::from_str::<ServerMessage>(&broadcast).unwrap() {
        ServerMessage::Invoke { method, payload } => {
            assert_eq!(method, "DeskEventAddedMessage");
            assert_eq!(serde_json::from_value::<DeskClientEvent>(payload).unwrap(), event);
        }
        other => panic!("expected broadcast, got {other:?}"),
    }
}

#[test]
fn test_handle_invoke_for_other_hub_is_rejected() {
    let (hub, mut rx) = hub_with_listener();
    let text = invoke_frame("ChatHub", "SendDeskEventAddedMessage", json!({}));

    match handle_client_message(&hub, HUB, &text) {
        Some(ServerMessage::Completion { error: Some(e), .. }) => assert!(e.contains("ChatHub")),
        other => panic!("expected error completion, got {other:?}"),
    }
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_handle_invoke_unknown_method_is_rejected() {
    let (hub, _rx) = hub_with_listener();
    let text = invoke_frame(HUB, "Nope", json!({}));

    match handle_client_message(&hub, HUB, &text) {
        Some(ServerMessage::Completion { error: Some(e), .. }) => assert!(e.contains("Nope")),
        other => panic!("expected error completion, got {other:?}"),
    }
}

#[test]
fn test_handle_garbage_frame_is_ignored() {
    let (hub, _rx) = hub_with_listener();
    assert!(handle_client_message(&hub, HUB, "{not json").is_none());
    assert!(handle_client_message(&hub, HUB, r#"{"type":"subscribe"}"#).is_none());
}

#[test]
fn test_session_events_are_stamped_with_generation() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let events = SessionEvents::new(7, tx);
    events.emit(SessionEvent::Reconnecting);
    events.emit(SessionEvent::StateChanged {
        old: ConnectionState::Connected,
        new: ConnectionState::Reconnecting,
    });

    assert_eq!(rx.try_recv().unwrap(), (7, SessionEvent::Reconnecting));
    assert!(matches!(rx.try_recv().unwrap(), (7, SessionEvent::StateChanged { .. })));
}

#[test]
fn test_emit_after_receiver_dropped_is_silent() {
    let (tx, rx) = mpsc::unbounded_channel();
    let events = SessionEvents::new(1, tx);
    drop(rx);
    events.emit(SessionEvent::Closed);
}

#[test]
fn test_connection_state_activity() {
    assert!(!ConnectionState::Disconnected.is_active());
    assert!(ConnectionState::Connecting.is_active());
    assert!(ConnectionState::Connected.is_active());
    assert!(ConnectionState::Reconnecting.is_active());
    assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
}
