// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor lifecycle specs: clean start to online, graceful shutdown.

use crate::prelude::*;
use procman_core::{Event, SupervisorState, WorkerName, WorkerStatus};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_worker_reaches_online_and_stops_on_shutdown() {
    let fleet = Fleet::new();
    fleet.add_worker("alpha", "sleep 30", r#""enabled": true"#);

    let procman = fleet.startup();
    let supervisor = procman.supervisor();
    let events = procman.events();
    let loop_task = tokio::spawn(procman.run());

    // The child spawns and sits in starting until the broker reports it
    let spawned = wait_for(SPEC_WAIT_MAX_MS, || {
        read_worker(&supervisor, "alpha", |w| {
            w.status == WorkerStatus::Starting && w.pid.is_some()
        })
    });
    assert!(spawned, "worker should spawn");
    let pid = read_worker(&supervisor, "alpha", |w| w.pid).expect("pid");
    assert!(pid_alive(pid), "child process should be running");

    let _ = events.send(Event::BrokerConnected {
        name: WorkerName::new("alpha"),
    });
    let online = wait_for(SPEC_WAIT_MAX_MS, || {
        worker_status(&supervisor, "alpha") == WorkerStatus::Online
            && supervisor.state() == SupervisorState::Online
    });
    assert!(online, "worker and supervisor should reach online");

    let _ = events.send(Event::Shutdown { retcode: 0 });
    let retcode = tokio::time::timeout(std::time::Duration::from_secs(15), loop_task)
        .await
        .expect("shutdown should finish")
        .expect("loop task");
    assert_eq!(retcode, 0);

    let gone = wait_for(SPEC_WAIT_MAX_MS, || !pid_alive(pid));
    assert!(gone, "child should be terminated after shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabled_worker_never_spawns() {
    let fleet = Fleet::new();
    fleet.add_worker("idle", "sleep 30", "");

    let procman = fleet.startup();
    let supervisor = procman.supervisor();
    let events = procman.events();
    let loop_task = tokio::spawn(procman.run());

    let settled = wait_for(SPEC_WAIT_MAX_MS, || {
        worker_status(&supervisor, "idle") == WorkerStatus::Disabled
    });
    assert!(settled, "disabled worker should settle");
    assert_eq!(read_worker(&supervisor, "idle", |w| w.pid), None);

    let _ = events.send(Event::Shutdown { retcode: 0 });
    let _ = tokio::time::timeout(std::time::Duration::from_secs(15), loop_task).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exit_reason_is_reported_for_crashing_workers() {
    let fleet = Fleet::new();
    fleet.add_worker("crash", "exit 7", r#""enabled": true"#);

    let procman = fleet.startup();
    let supervisor = procman.supervisor();
    let events = procman.events();
    let loop_task = tokio::spawn(procman.run());

    let offline = wait_for(SPEC_WAIT_MAX_MS, || {
        read_worker(&supervisor, "crash", |w| {
            w.status == WorkerStatus::Offline
                && w.status_description == "exited with code 7"
        })
    });
    assert!(offline, "crash should surface its exit reason");

    let _ = events.send(Event::Shutdown { retcode: 0 });
    let _ = tokio::time::timeout(std::time::Duration::from_secs(15), loop_task).await;
}
