// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent worker-state specs across supervisor restarts.

use crate::prelude::*;
use procman_core::{Event, WorkerName, WorkerStatus};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn enabled_flag_survives_a_supervisor_restart() {
    let fleet = Fleet::new();
    fleet.add_worker("beta", "sleep 30", "");

    // First run: the worker starts out disabled; enable it persistently
    {
        let procman = fleet.startup();
        let supervisor = procman.supervisor();
        let events = procman.events();
        let loop_task = tokio::spawn(procman.run());

        let settled = wait_for(SPEC_WAIT_MAX_MS, || {
            worker_status(&supervisor, "beta") == WorkerStatus::Disabled
        });
        assert!(settled, "worker should settle disabled");

        supervisor
            .enable_worker(&WorkerName::new("beta"), "operator request", true, true)
            .unwrap();

        let spawned = wait_for(SPEC_WAIT_MAX_MS, || {
            read_worker(&supervisor, "beta", |w| w.pid.is_some())
        });
        assert!(spawned, "enabled worker should spawn");

        let _ = events.send(Event::Shutdown { retcode: 0 });
        let retcode = tokio::time::timeout(std::time::Duration::from_secs(15), loop_task)
            .await
            .expect("shutdown")
            .expect("loop task");
        assert_eq!(retcode, 0);
    }

    // The store document survived with schema version 2
    let raw = std::fs::read_to_string(fleet.config.store_path.clone()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["version"], 2);
    let ids: Vec<&String> = doc["workers"].as_object().unwrap().keys().collect();
    assert!(ids.iter().any(|id| id.starts_with("beta:")), "{ids:?}");

    // Second run over the same state directory: enabled comes from the store
    {
        let procman = fleet.startup();
        let supervisor = procman.supervisor();
        let events = procman.events();
        let loop_task = tokio::spawn(procman.run());

        let (enabled, cause) =
            read_worker(&supervisor, "beta", |w| (w.enabled, w.enabled_cause.clone()));
        assert!(enabled, "persisted enable should win at discovery");
        assert_eq!(cause, "persistent state");

        let spawned = wait_for(SPEC_WAIT_MAX_MS, || {
            read_worker(&supervisor, "beta", |w| w.pid.is_some())
        });
        assert!(spawned, "worker should respawn on the second run");

        let _ = events.send(Event::Shutdown { retcode: 0 });
        let _ = tokio::time::timeout(std::time::Duration::from_secs(15), loop_task).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn heartbeat_and_pause_toggles_survive_restart() {
    let fleet = Fleet::new();
    fleet.add_worker("gamma", "sleep 30", "");

    {
        let procman = fleet.startup();
        let supervisor = procman.supervisor();
        let events = procman.events();
        let loop_task = tokio::spawn(procman.run());

        supervisor
            .set_heartbeat_disabled(&WorkerName::new("gamma"), true, true)
            .unwrap();
        supervisor
            .set_pause_on_start(&WorkerName::new("gamma"), true, true)
            .unwrap();

        let _ = events.send(Event::Shutdown { retcode: 0 });
        let _ = tokio::time::timeout(std::time::Duration::from_secs(15), loop_task).await;
    }

    {
        let procman = fleet.startup();
        let supervisor = procman.supervisor();
        let events = procman.events();
        let loop_task = tokio::spawn(procman.run());

        let (hb_disabled, paused) = read_worker(&supervisor, "gamma", |w| {
            (w.heartbeat_disabled, w.pause_on_start)
        });
        assert!(hb_disabled, "heartbeat toggle should persist");
        assert!(paused, "pause-on-start should persist");

        let _ = events.send(Event::Shutdown { retcode: 0 });
        let _ = tokio::time::timeout(std::time::Duration::from_secs(15), loop_task).await;
    }
}
