use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::sync::mpsc;
use tungstenite::protocol::Message as WsMessage;

use super::ObservationDeckHub;
use super::event::{DeskClientEvent, HubMethod};
use crate::client::Client;
use crate::transport::message::ServerMessage;
use crate::transport::registry::SessionRegistry;
use crate::utils::error::HubError;

fn hub_with_clients(
    count: usize,
) -> (
    ObservationDeckHub,
    Arc<Mutex<SessionRegistry>>,
    Vec<mpsc::UnboundedReceiver<WsMessage>>,
) {
    let registry = Arc::new(Mutex::new(SessionRegistry::new()));
    let mut receivers = Vec::new();
    for _ in 0..count {
        let (tx, rx) = mpsc::unbounded_channel::<WsMessage>();
        registry.lock().unwrap().register_client(Client::new(tx));
        receivers.push(rx);
    }
    (ObservationDeckHub::new(registry.clone()), registry, receivers)
}

fn next_invoke(rx: &mut mpsc::UnboundedReceiver<WsMessage>) -> (String, serde_json::Value) {
    let msg = rx.try_recv().expect("expected a frame");
    let text = msg.to_text().expect("text frame").to_string();
    match serde_json::from_str::<ServerMessage>(&text).unwrap() {
        ServerMessage::Invoke { method, payload } => (method, payload),
        other => panic!("expected invoke frame, got {other:?}"),
    }
}

fn sample_event(desk: &str) -> DeskClientEvent {
    DeskClientEvent::new(desk, "checked_in", json!({ "seat": 4 }))
}

#[test]
fn test_hub_method_names_are_stable() {
    assert_eq!(HubMethod::DeskEventAdded.as_str(), "SendDeskEventAddedMessage");
    assert_eq!(HubMethod::DeskEventUpdated.as_str(), "SendDeskEventUpdatedMessage");
    assert_eq!(HubMethod::DeskEventAdded.client_method(), "DeskEventAddedMessage");
    assert_eq!(HubMethod::DeskEventUpdated.client_method(), "DeskEventUpdatedMessage");
    assert_eq!(
        HubMethod::from_name("SendDeskEventUpdatedMessage"),
        Some(HubMethod::DeskEventUpdated)
    );
    assert_eq!(HubMethod::from_name("DeskEventAddedMessage"), None);
}

#[test]
fn test_receive_added_reaches_every_client() {
    let (hub, _registry, mut receivers) = hub_with_clients(3);
    let event = sample_event("desk-1");

    assert_eq!(hub.receive_added(&event), 3);

    for rx in receivers.iter_mut() {
        let (method, payload) = next_invoke(rx);
        assert_eq!(method, "DeskEventAddedMessage");
        let received: DeskClientEvent = serde_json::from_value(payload).unwrap();
        assert_eq!(received, event);
    }
}

#[test]
fn test_receive_updated_forwards_sequence() {
    let (hub, _registry, mut receivers) = hub_with_clients(2);
    let events = vec![sample_event("desk-1"), sample_event("desk-2")];

    assert_eq!(hub.receive_updated(&events), 2);

    for rx in receivers.iter_mut() {
        let (method, payload) = next_invoke(rx);
        assert_eq!(method, "DeskEventUpdatedMessage");
        let received: Vec<DeskClientEvent> = serde_json::from_value(payload).unwrap();
        assert_eq!(received, events);
    }
}

#[test]
fn test_receive_with_no_clients_is_noop() {
    let (hub, _registry, _receivers) = hub_with_clients(0);
    assert_eq!(hub.receive_added(&sample_event("desk-1")), 0);
}

#[test]
fn test_closed_client_does_not_block_others() {
    let (hub, _registry, mut receivers) = hub_with_clients(2);
    let closed = receivers.remove(0);
    drop(closed);

    assert_eq!(hub.receive_added(&sample_event("desk-9")), 1);
    let (method, _) = next_invoke(&mut receivers[0]);
    assert_eq!(method, "DeskEventAddedMessage");
}

#[test]
fn test_dispatch_routes_by_method_name() {
    let (hub, _registry, mut receivers) = hub_with_clients(1);
    let event = sample_event("desk-3");

    let reached = hub
        .dispatch("SendDeskEventAddedMessage", serde_json::to_value(&event).unwrap())
        .unwrap();
    assert_eq!(reached, 1);
    let (method, _) = next_invoke(&mut receivers[0]);
    assert_eq!(method, "DeskEventAddedMessage");

    let reached = hub
        .dispatch(
            "SendDeskEventUpdatedMessage",
            serde_json::to_value(vec![&event]).unwrap(),
        )
        .unwrap();
    assert_eq!(reached, 1);
    let (method, _) = next_invoke(&mut receivers[0]);
    assert_eq!(method, "DeskEventUpdatedMessage");
}

#[test]
fn test_dispatch_rejects_unknown_method() {
    let (hub, _registry, mut receivers) = hub_with_clients(1);
    let err = hub.dispatch("DropAllDesks", json!({})).unwrap_err();
    assert!(matches!(err, HubError::UnknownMethod(name) if name == "DropAllDesks"));
    assert!(receivers[0].try_recv().is_err());
}

#[test]
fn test_dispatch_rejects_malformed_payload() {
    let (hub, _registry, mut receivers) = hub_with_clients(1);
    let err = hub
        .dispatch("SendDeskEventUpdatedMessage", json!({ "not": "a list" }))
        .unwrap_err();
    assert!(matches!(err, HubError::InvalidPayload { .. }));
    assert!(receivers[0].try_recv().is_err());
}

#[test]
fn test_registry_register_and_remove_client() {
    let (_hub, registry, _receivers) = hub_with_clients(0);
    let (tx, _) = mpsc::unbounded_channel::<WsMessage>();
    let client = Client::new(tx);
    let client_id = client.id.clone();

    registry.lock().unwrap().register_client(client);
    assert_eq!(registry.lock().unwrap().client_count(), 1);

    assert!(registry.lock().unwrap().remove_client(&client_id).is_some());
    assert_eq!(registry.lock().unwrap().client_count(), 0);
    assert!(registry.lock().unwrap().remove_client(&client_id).is_none());
}

#[test]
fn test_registry_send_to_single_client() {
    let mut registry = SessionRegistry::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let client = Client::new(tx);
    let client_id = client.id.clone();
    registry.register_client(client);

    let frame = ServerMessage::Completion {
        invocation_id: "inv-1".to_string(),
        error: None,
    };
    assert!(registry.send_to(&client_id, &frame));
    assert!(!registry.send_to(&"missing".to_string(), &frame));

    let text = rx.try_recv().unwrap().to_text().unwrap().to_string();
    assert_eq!(serde_json::from_str::<ServerMessage>(&text).unwrap(), frame);
}
