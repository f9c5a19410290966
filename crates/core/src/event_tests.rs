// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for event serialization

use super::*;

#[test]
fn events_tag_with_bus_names() {
    let event = Event::BrokerConnected {
        name: WorkerName::new("dns"),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "broker:worker_connected");
    assert_eq!(json["name"], "dns");
}

#[test]
fn process_started_round_trips() {
    let event = Event::ProcessStarted {
        name: WorkerName::new("dns"),
        path: PathBuf::from("/opt/workers/dns/dnsWorker"),
        args: vec!["--verbose".to_string()],
        debug: false,
        heartbeat_disabled: true,
        pid: 4242,
        respawn_id: 2,
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn stopped_event_carries_exit_code_or_signal() {
    let event = Event::ProcessStopped {
        name: WorkerName::new("dns"),
        debug: false,
        enabled: true,
        pid: 77,
        respawn_id: 0,
        exit_code: None,
        signal: Some("SIGTERM".to_string()),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "procman:process_stopped");
    assert_eq!(json["signal"], "SIGTERM");
    assert!(json["exit_code"].is_null());
}

#[test]
fn worker_name_accessor_covers_per_worker_events() {
    let name = WorkerName::new("dns");
    let with_worker = Event::BrokerFailedHb { name: name.clone() };
    assert_eq!(with_worker.worker_name(), Some(&name));

    assert_eq!(Event::TickRequested.worker_name(), None);
    assert_eq!(Event::Shutdown { retcode: 0 }.worker_name(), None);
}
