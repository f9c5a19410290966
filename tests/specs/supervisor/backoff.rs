// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Respawn back-off specs with a really-crashing child.

use crate::prelude::*;
use procman_core::Event;
use std::time::Instant;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_spawns_are_spaced_by_the_exponential_delay() {
    let fleet = Fleet::new();
    fleet.add_worker("flappy", "exit 1", r#""enabled": true, "respawnCount": 5"#);

    let procman = fleet.startup();
    let supervisor = procman.supervisor();
    let events = procman.events();
    let loop_task = tokio::spawn(procman.run());

    let respawn_id = |target: u32| {
        let supervisor = &supervisor;
        move || read_worker(supervisor, "flappy", |w| w.respawn_id) >= target
    };

    assert!(wait_for(SPEC_WAIT_MAX_MS, respawn_id(1)), "first spawn");
    let first = Instant::now();

    // Second spawn only after the 2^1 - 1 = 1s window
    assert!(wait_for(SPEC_WAIT_MAX_MS, respawn_id(2)), "second spawn");
    let gap = first.elapsed();
    assert!(
        gap >= std::time::Duration::from_millis(900),
        "respawn came after {gap:?}, expected at least 1s of back-off"
    );

    let _ = events.send(Event::Shutdown { retcode: 0 });
    let _ = tokio::time::timeout(std::time::Duration::from_secs(15), loop_task).await;
}
