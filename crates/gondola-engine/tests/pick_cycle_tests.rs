//! End-to-end flows through the driver, the machine and the vision bridge.

mod common;

use std::time::Duration;

use common::Harness;
use gondola_core::GondolaEntry;
use gondola_core::constants::*;
use gondola_engine::{Clock, Event, EventKind, ProtocolState, RawEvent};

#[test]
fn test_startup_sequence_reaches_object_detected() {
    let mut harness = Harness::new();
    harness.shared.set_webserver_ready(true);
    harness.device.push_all([DEVICE_HANDSHAKE, DEVICE_HANDSHAKE_CONFIRM]);

    harness.handle(EventKind::Inicial).unwrap();
    harness.handle(EventKind::WebserverOn).unwrap();
    harness.handle(EventKind::WebDone).unwrap();
    harness.handle(EventKind::SerialOn).unwrap();
    harness.handle(EventKind::SerialOnAck).unwrap();
    harness.shared.set_object_detected(true);
    harness.handle(EventKind::Idle).unwrap();

    assert_eq!(harness.state(), ProtocolState::ObjectDetected);
    assert_eq!(harness.device.written(), vec![1, 3]);
    assert_eq!(harness.driver.machine().history().len(), 6);
}

#[test]
fn test_driver_bootstraps_and_handshakes() {
    let mut harness = Harness::new().with_firmware();
    harness.shared.set_webserver_ready(true);
    harness.device.push(DEVICE_HANDSHAKE);

    harness.run_until(ProtocolState::Idle, 20);

    assert_eq!(harness.device.written(), vec![HOST_HANDSHAKE_ACK]);
    let visited: Vec<_> = harness
        .driver
        .machine()
        .history()
        .iter()
        .map(|t| t.to)
        .collect();
    assert_eq!(
        visited,
        vec![
            ProtocolState::WebUiReady,
            ProtocolState::Bootstrapped,
            ProtocolState::SerialHandshake,
            ProtocolState::SerialAck,
            ProtocolState::Idle,
        ]
    );
}

#[test]
fn test_bootstrap_through_camera() {
    let mut harness = Harness::new();
    harness.run_until(ProtocolState::WebUiReady, 3);

    harness.vision.announce_camera(true);
    harness.tick();

    assert_eq!(harness.state(), ProtocolState::SerialHandshake);
}

#[test]
fn test_full_pick_cycle() {
    let mut harness = Harness::in_state(ProtocolState::Idle).with_firmware();

    harness.identify("hammer", 0.9);
    harness.run_until(ProtocolState::GondolaSet, 10);
    assert_eq!(harness.shared.current_gondola(), Some(73));

    harness.run_until(ProtocolState::DropObject, 10);
    harness.run_until(ProtocolState::Idle, 10);

    assert_eq!(harness.device.written(), vec![3, 5, 73, 9, 11]);
    assert!(!harness.shared.object_detected());
    assert!(!harness.shared.tool_identified());
    assert_eq!(harness.shared.current_gondola(), None);

    let messages: Vec<_> = harness
        .shared
        .logs()
        .into_iter()
        .map(|entry| entry.message)
        .collect();
    assert!(messages.contains(&"Processing gondola 73".to_string()));
    assert!(messages.contains(&"Gondola finished".to_string()));
}

#[test]
fn test_two_consecutive_cycles() {
    let mut harness = Harness::in_state(ProtocolState::Idle).with_firmware();

    harness.identify("pliers", 0.9);
    harness.run_until(ProtocolState::DropObject, 10);
    harness.run_until(ProtocolState::Idle, 10);

    harness.clock.advance(Duration::from_secs(5));
    harness.identify("saw", 0.8);
    harness.run_until(ProtocolState::DropObject, 10);
    harness.run_until(ProtocolState::Idle, 10);

    assert_eq!(
        harness.device.written(),
        vec![3, 5, 71, 9, 11, 3, 5, 75, 9, 11]
    );
}

#[test]
fn test_unmapped_label_goes_to_default_gondola() {
    let mut harness = Harness::in_state(ProtocolState::Idle).with_firmware();

    harness.identify("drill", 0.9);
    harness.run_until(ProtocolState::GondolaSet, 10);

    assert_eq!(harness.device.written(), vec![3, 5, DEFAULT_POSITION_ID]);
}

#[test]
fn test_late_identification_after_reidentification_request() {
    let mut harness = Harness::in_state(ProtocolState::Idle).with_firmware();
    harness.shared.set_object_detected(true);

    harness.run_until(ProtocolState::AwaitToolIdent, 5);
    assert_eq!(harness.device.written(), vec![3]);

    harness.clock.advance(Duration::from_secs(11));
    harness.tick();
    assert_eq!(harness.driver.machine().retry_count(), 1);
    assert_eq!(harness.vision.handle_requests(harness.clock.now()), 1);

    harness.identify("wrench", 0.9);
    harness.run_until(ProtocolState::GondolaSet, 5);

    assert_eq!(harness.device.written(), vec![3, 5, 74]);
    assert_eq!(harness.driver.machine().retry_count(), 0);
}

#[test]
fn test_retry_ladder_aborts_to_idle() {
    let mut harness = Harness::in_state(ProtocolState::AwaitToolIdent);
    harness.shared.set_object_detected(true);

    let mut requests = 0;
    for _ in 0..3 {
        harness.clock.advance(Duration::from_secs(11));
        assert!(harness.tick().is_empty());
        requests += harness.vision.handle_requests(harness.clock.now());
    }
    assert_eq!(requests, 3);
    assert_eq!(harness.state(), ProtocolState::AwaitToolIdent);

    harness.clock.advance(Duration::from_secs(11));
    let transitions = harness.tick();

    assert_eq!(transitions.len(), 1);
    assert_eq!(harness.state(), ProtocolState::Idle);
    assert!(!harness.shared.object_detected());
    assert_eq!(harness.driver.machine().retry_count(), 0);
    assert_eq!(harness.vision.handle_requests(harness.clock.now()), 0);
    assert!(harness.device.written().is_empty());
}

#[test]
fn test_write_failure_is_retried_on_next_tick() {
    let mut harness = Harness::in_state(ProtocolState::GondolaSet);
    harness.device.push(DEVICE_AT_GONDOLA);
    harness.device.fail_writes(true);

    assert!(harness.tick().is_empty());
    assert_eq!(harness.state(), ProtocolState::GondolaSet);

    harness.device.fail_writes(false);
    harness.tick();

    assert_eq!(harness.state(), ProtocolState::DropObject);
    assert_eq!(harness.device.written(), vec![HOST_PROCEED_DROP]);
}

#[test]
fn test_disconnected_device_stalls_without_error() {
    let mut harness = Harness::in_state(ProtocolState::SerialHandshake);
    harness.device.set_disconnected(true);
    harness.device.push(DEVICE_HANDSHAKE);

    for _ in 0..5 {
        assert!(harness.tick().is_empty());
    }
    assert_eq!(harness.state(), ProtocolState::SerialHandshake);

    harness.device.set_disconnected(false);
    harness.tick();
    assert_eq!(harness.state(), ProtocolState::SerialAck);
}

#[test]
fn test_replaced_registry_drives_resolution() {
    let mut harness = Harness::in_state(ProtocolState::Idle).with_firmware();
    let entries = vec![
        GondolaEntry::new("pliers", 71),
        GondolaEntry::new("hammer", 90),
        GondolaEntry::new("Hammer", 91),
        GondolaEntry::new("saw", 90),
    ];

    let report = harness.shared.replace_gondolas(entries.clone()).unwrap();
    assert_eq!(report.duplicates, vec![90]);
    assert_eq!(harness.shared.gondolas(), entries);

    harness.identify(" HAMMER ", 0.9);
    harness.run_until(ProtocolState::GondolaSet, 10);
    assert_eq!(harness.device.written(), vec![3, 5, 90]);
}

#[test]
fn test_raw_events_from_producers() {
    let mut harness = Harness::new();
    harness.shared.set_webserver_ready(true);

    for line in [
        r#"{"type": "INICIAL"}"#,
        r#"{"type": "NOT_A_TRIGGER"}"#,
        r#"{"label": "saw"}"#,
        r#"{"kind": "WEBSERVER_ON"}"#,
    ] {
        let raw: RawEvent = serde_json::from_str(line).unwrap();
        if let Some(event) = raw.into_event() {
            harness.send(event);
        }
    }
    harness.tick();

    // Inicial and WebserverOn from the queue, then the poll of Bootstrapped
    assert_eq!(harness.state(), ProtocolState::SerialHandshake);
}

#[test]
fn test_identification_event_carries_payload() {
    let mut harness = Harness::in_state(ProtocolState::Idle);
    let event = Event::new(EventKind::ToolIdentified)
        .with_label("screwdriver")
        .with_confidence(0.91)
        .with_timestamp(1_700_000_000.0);

    harness.send(event);
    harness.tick();

    assert_eq!(harness.state(), ProtocolState::ObjectDetected);
    assert_eq!(
        harness.shared.identified_label().as_deref(),
        Some("screwdriver")
    );
}
