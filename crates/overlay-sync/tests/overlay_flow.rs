use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use overlay_proto::{
    AckOutcome, AckRecord, MenuUpdate, PropertyRecord, VisitorIntent, TOPIC_CLIENT_DIRECTIONS,
    TOPIC_CLIENT_PROPERTIES, TOPIC_OVERLAY_ACK, TOPIC_UI_OVERLAY,
};
use overlay_sync::{
    spawn_intent_listener, spawn_session_worker, OverlayPublisher, OverlaySession,
    PublisherConfig, SessionConfig, VisitorCommand,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use transport_bus::{Bus, BusMessage, LocalBus, PublishOptions, TransportEvent};

fn frame(value: Value) -> Vec<u8> {
    serde_json::to_vec(&value).expect("json frame")
}

fn ack_of(msg: &BusMessage) -> AckRecord {
    let value: Value = serde_json::from_slice(&msg.payload).expect("ack json");
    assert_eq!(value["type"], TOPIC_OVERLAY_ACK);
    serde_json::from_value(value["payload"].clone()).expect("ack payload")
}

fn legacy_menu() -> Vec<u8> {
    frame(json!({
        "type": "ui.overlay",
        "payload": {
            "kind": "properties.menu",
            "overlayId": "o1",
            "items": [{"id": "a", "title": "Oceanview"}, {"id": "b", "title": "Skyline"}]
        }
    }))
}

/// Overlays sent without an `overlayId` are rendered but never cached or acked.
fn transient_menu(items: Value) -> Vec<u8> {
    frame(json!({
        "type": "ui.overlay",
        "payload": {"kind": "properties.menu", "items": items}
    }))
}

fn legacy_detail() -> Vec<u8> {
    frame(json!({
        "type": "ui.overlay",
        "payload": {
            "kind": "properties.detail",
            "overlayId": "o2",
            "property": {"id": "a", "title": "Oceanview", "price": 1250000}
        }
    }))
}

#[test]
fn menu_detail_reconnect_scenario() {
    let bus = Arc::new(LocalBus::new());
    let mut acks = bus.subscribe(TOPIC_OVERLAY_ACK);
    let mut session = OverlaySession::new(bus.clone(), SessionConfig::default());
    session.on_connected();

    session
        .on_message(&legacy_menu(), TOPIC_UI_OVERLAY)
        .expect("menu applied");
    assert_eq!(session.state().menu_items.len(), 2);
    assert_eq!(
        ack_of(&acks.try_recv().expect("menu ack")),
        AckRecord::new("o1", AckOutcome::Rendered)
    );

    session
        .on_message(&legacy_detail(), TOPIC_UI_OVERLAY)
        .expect("detail applied");
    assert_eq!(session.state().selected_id.as_deref(), Some("a"));
    assert_eq!(
        ack_of(&acks.try_recv().expect("detail ack")),
        AckRecord::new("o2", AckOutcome::Rendered)
    );

    let acked = session.snapshot();

    // Live state drifts away from the acked overlays before the drop.
    session
        .on_message(&transient_menu(json!([])), TOPIC_UI_OVERLAY)
        .expect("transient menu applied");
    session
        .on_message(
            &frame(json!({
                "type": "client.properties",
                "payload": {"action": "detail", "item": {"id": "c", "title": "Harbor Loft"}}
            })),
            TOPIC_CLIENT_PROPERTIES,
        )
        .expect("transient detail applied");
    assert!(session.state().menu_items.is_empty());
    assert_eq!(session.state().selected_id.as_deref(), Some("c"));
    assert!(matches!(
        acks.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));

    session.on_disconnected();
    let report = session.on_reconnected();
    let after = session.snapshot();

    assert_eq!(report.replayed.len(), 2);
    assert_eq!(after.menu_items, acked.menu_items);
    assert_eq!(after.menu_items.len(), 2);
    assert_eq!(after.detail, acked.detail);
    assert_eq!(after.selected_id.as_deref(), Some("a"));
    assert_eq!(
        report.acknowledgment,
        Some(AckRecord::new("o2", AckOutcome::Rendered))
    );
    assert_eq!(
        ack_of(&acks.try_recv().expect("repeated ack")),
        AckRecord::new("o2", AckOutcome::Rendered)
    );
    assert!(matches!(
        acks.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[test]
fn dialects_converge_on_the_same_state() {
    let legacy = [
        (TOPIC_UI_OVERLAY, legacy_menu()),
        (TOPIC_UI_OVERLAY, legacy_detail()),
        (
            TOPIC_UI_OVERLAY,
            frame(json!({
                "type": "ui.overlay",
                "payload": {
                    "kind": "directions.show",
                    "overlayId": "d1",
                    "locations": [{"label": "Marina office"}],
                    "notes": "Parking behind the building"
                }
            })),
        ),
    ];
    let typed = [
        (
            TOPIC_CLIENT_PROPERTIES,
            frame(json!({
                "type": "client.properties",
                "payload": {
                    "action": "menu",
                    "overlayId": "o1",
                    "items": [{"id": "a", "title": "Oceanview"}, {"id": "b", "title": "Skyline"}]
                }
            })),
        ),
        (
            TOPIC_CLIENT_PROPERTIES,
            frame(json!({
                "type": "client.properties",
                "payload": {
                    "action": "detail",
                    "overlayId": "o2",
                    "item": {"id": "a", "title": "Oceanview", "price": 1250000}
                }
            })),
        ),
        (
            TOPIC_CLIENT_DIRECTIONS,
            frame(json!({
                "type": "client.directions",
                "payload": {
                    "action": "show",
                    "overlayId": "d1",
                    "locations": [{"label": "Marina office"}],
                    "notes": "Parking behind the building"
                }
            })),
        ),
    ];

    let run = |messages: &[(&str, Vec<u8>)]| {
        let mut session = OverlaySession::new(Arc::new(LocalBus::new()), SessionConfig::default());
        for (channel, bytes) in messages {
            session.on_message(bytes, channel).expect("applied");
        }
        (session.snapshot(), session.cache().clone())
    };

    let (legacy_state, legacy_cache) = run(&legacy);
    let (typed_state, typed_cache) = run(&typed);
    assert_eq!(legacy_state, typed_state);
    assert_eq!(legacy_cache, typed_cache);
    assert!(legacy_state.directions.is_some());
}

#[test]
fn cleared_directions_ack_as_cleared_and_stay_cleared_after_reconnect() {
    let bus = Arc::new(LocalBus::new());
    let mut acks = bus.subscribe(TOPIC_OVERLAY_ACK);
    let mut session = OverlaySession::new(bus.clone(), SessionConfig::default());

    session
        .on_message(
            &frame(json!({
                "type": "client.directions",
                "payload": {"action": "show", "overlayId": "d1", "locations": [{"label": "Office"}]}
            })),
            TOPIC_CLIENT_DIRECTIONS,
        )
        .expect("show applied");
    session
        .on_message(
            &frame(json!({
                "type": "client.directions",
                "payload": {"action": "clear", "overlayId": "d2"}
            })),
            TOPIC_CLIENT_DIRECTIONS,
        )
        .expect("clear applied");

    assert_eq!(ack_of(&acks.try_recv().expect("show ack")).outcome, AckOutcome::Rendered);
    assert_eq!(
        ack_of(&acks.try_recv().expect("clear ack")),
        AckRecord::new("d2", AckOutcome::Cleared)
    );
    assert!(session.state().directions.is_none());
    assert!(session.cache().directions.is_none());

    session.on_reconnected();
    assert!(session.state().directions.is_none());
}

#[tokio::test]
async fn worker_replays_on_transport_reconnect() {
    let bus = Arc::new(LocalBus::new());
    let session = OverlaySession::new(bus.clone(), SessionConfig::default());
    let handle = spawn_session_worker(bus.clone(), session);
    let mut snapshots = handle.snapshots();
    let mut acks = bus.subscribe(TOPIC_OVERLAY_ACK);

    bus.publish(
        TOPIC_UI_OVERLAY,
        Bytes::from(legacy_menu()),
        PublishOptions::RELIABLE,
    )
    .expect("publish menu");
    tokio::time::timeout(
        Duration::from_secs(2),
        snapshots.wait_for(|state| state.menu_items.len() == 2),
    )
    .await
    .expect("snapshot timeout")
    .expect("worker alive");
    let first = tokio::time::timeout(Duration::from_secs(2), acks.recv())
        .await
        .expect("ack timeout")
        .expect("ack");
    assert_eq!(ack_of(&first).overlay_id.as_str(), "o1");

    bus.publish(
        TOPIC_UI_OVERLAY,
        Bytes::from(transient_menu(json!([]))),
        PublishOptions::RELIABLE,
    )
    .expect("publish transient menu");
    tokio::time::timeout(
        Duration::from_secs(2),
        snapshots.wait_for(|state| state.menu_items.is_empty()),
    )
    .await
    .expect("transient snapshot timeout")
    .expect("worker alive");

    bus.signal(TransportEvent::Disconnected);
    bus.signal(TransportEvent::Reconnected);

    tokio::time::timeout(
        Duration::from_secs(2),
        snapshots.wait_for(|state| state.menu_items.len() == 2),
    )
    .await
    .expect("replayed snapshot timeout")
    .expect("worker alive");

    let repeated = tokio::time::timeout(Duration::from_secs(2), acks.recv())
        .await
        .expect("repeated ack timeout")
        .expect("repeated ack");
    assert_eq!(ack_of(&repeated), AckRecord::new("o1", AckOutcome::Rendered));
    assert_eq!(handle.current().menu_items.len(), 2);
    handle.abort();
}

#[tokio::test]
async fn agent_and_visitor_settle_over_one_bus() {
    let bus = Arc::new(LocalBus::new());
    let publisher = Arc::new(Mutex::new(OverlayPublisher::new(
        bus.clone(),
        &PublisherConfig::default(),
    )));
    let mut listener = spawn_intent_listener(bus.clone(), publisher.clone());
    let session = OverlaySession::new(bus.clone(), SessionConfig::default());
    let handle = spawn_session_worker(bus.clone(), session);
    let mut snapshots = handle.snapshots();

    let overlay_id = publisher
        .lock()
        .show_menu(
            MenuUpdate {
                items: Some(vec![
                    PropertyRecord::new("a", "Oceanview"),
                    PropertyRecord::new("b", "Skyline"),
                ]),
                query: Some("waterfront".into()),
                filters: None,
            },
            None,
        )
        .expect("publish menu");

    tokio::time::timeout(Duration::from_secs(2), snapshots.changed())
        .await
        .expect("snapshot timeout")
        .expect("worker alive");

    assert!(handle.command(VisitorCommand::SelectProperty("b".into())));
    let intent = tokio::time::timeout(Duration::from_secs(2), listener.intents.recv())
        .await
        .expect("intent timeout")
        .expect("intent");
    match intent {
        VisitorIntent::SelectProperty(select) => {
            assert_eq!(select.property_id, "b");
            assert_eq!(select.overlay_id, Some(overlay_id.clone()));
        }
        other => panic!("unexpected intent: {other:?}"),
    }
    // Acks are published before any later command is handled, so the
    // listener has settled the menu by the time the selection arrives.
    assert!(!publisher.lock().is_pending(&overlay_id));

    handle.abort();
    listener.task.abort();
}
