// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for event handling: exits, heartbeats, guard samples

use super::exit_reason;
use crate::test_helpers::setup;
use procman_core::{Event, WorkerBuilder, WorkerKind, WorkerName, WorkerStatus};
use yare::parameterized;

#[parameterized(
    signal = { None, Some("SIGTERM"), "killed by SIGTERM" },
    signal_with_code = { Some(1), Some("SIGKILL"), "killed by SIGKILL" },
    clean = { Some(0), None, "exited normally" },
    code = { Some(3), None, "exited with code 3" },
    unknown = { None, None, "exited" },
)]
fn exit_reasons(code: Option<i32>, signal: Option<&str>, expected: &str) {
    assert_eq!(exit_reason(code, signal), expected);
}

fn enabled(name: &str) -> procman_core::Worker {
    WorkerBuilder::new(name).enabled().build()
}

async fn online_worker(
    ctx: &mut crate::test_helpers::TestContext,
    name: &str,
) {
    ctx.tick().await;
    ctx.connect(name).await;
    assert_eq!(ctx.status(name), WorkerStatus::Online);
}

#[tokio::test(start_paused = true)]
async fn failed_heartbeat_restarts_with_core_collection() {
    let mut ctx = setup(vec![enabled("dns")]);
    online_worker(&mut ctx, "dns").await;

    ctx.inject(Event::BrokerFailedHb {
        name: WorkerName::new("dns"),
    })
    .await;

    // Restart happened with collect_core = true
    let stops = ctx.adapter.stops();
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].2, Some("gcore".to_string()));
    assert_eq!(ctx.adapter.spawn_count("dns"), 2);
    let restart = ctx.logged(|e| {
        matches!(
            e,
            Event::StatusChanged {
                status: WorkerStatus::Restarting,
                ..
            }
        )
    });
    assert_eq!(restart.len(), 1);
    if let Event::StatusChanged { description, .. } = restart[0] {
        assert_eq!(description, "Failed HB check");
    }
}

#[tokio::test(start_paused = true)]
async fn failed_heartbeat_under_cpu_pressure_is_skipped() {
    let mut ctx = setup(vec![enabled("dns")]);
    online_worker(&mut ctx, "dns").await;
    ctx.supervisor.cpu.force(true);

    ctx.inject(Event::BrokerFailedHb {
        name: WorkerName::new("dns"),
    })
    .await;
    assert_eq!(ctx.status("dns"), WorkerStatus::Online);
    assert!(ctx.adapter.stops().is_empty());
    assert!(ctx
        .supervisor
        .hb_pressure_warned
        .load(std::sync::atomic::Ordering::SeqCst));

    // Recovery clears the one-shot warning flag
    ctx.inject(Event::BrokerRecovered {
        name: WorkerName::new("dns"),
    })
    .await;
    assert!(!ctx
        .supervisor
        .hb_pressure_warned
        .load(std::sync::atomic::Ordering::SeqCst));

    // Pressure gone: the same event now restarts
    ctx.supervisor.cpu.force(false);
    ctx.inject(Event::BrokerFailedHb {
        name: WorkerName::new("dns"),
    })
    .await;
    assert_eq!(ctx.adapter.stops().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_heartbeats_never_restart() {
    let mut worker = enabled("dns");
    worker.heartbeat_disabled = true;
    let mut ctx = setup(vec![worker]);
    online_worker(&mut ctx, "dns").await;

    ctx.inject(Event::BrokerFailedHb {
        name: WorkerName::new("dns"),
    })
    .await;
    assert_eq!(ctx.status("dns"), WorkerStatus::Online);
    assert!(ctx.adapter.stops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn memory_sample_over_trigger_restarts_with_cause() {
    let worker = WorkerBuilder::new("dns")
        .enabled()
        .memleak_guard(100, false)
        .build();
    let mut ctx = setup(vec![worker]);
    online_worker(&mut ctx, "dns").await;

    ctx.inject(Event::MemorySampled {
        name: WorkerName::new("dns"),
        rss_mb: 150,
    })
    .await;

    let restart = ctx.logged(|e| {
        matches!(
            e,
            Event::StatusChanged {
                status: WorkerStatus::Restarting,
                ..
            }
        )
    });
    assert_eq!(restart.len(), 1);
    if let Event::StatusChanged { description, .. } = restart[0] {
        assert_eq!(description, "Exceeded memory threshold");
    }
    // collect_core follows the guard knob (false here)
    assert_eq!(ctx.adapter.stops()[0].2, None);
}

#[tokio::test(start_paused = true)]
async fn memory_sample_under_trigger_is_ignored() {
    let worker = WorkerBuilder::new("dns")
        .enabled()
        .memleak_guard(100, false)
        .build();
    let mut ctx = setup(vec![worker]);
    online_worker(&mut ctx, "dns").await;

    ctx.inject(Event::MemorySampled {
        name: WorkerName::new("dns"),
        rss_mb: 99,
    })
    .await;
    assert_eq!(ctx.status("dns"), WorkerStatus::Online);
    assert!(ctx.adapter.stops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn broker_death_outside_shutdown_exits_one() {
    let broker = WorkerBuilder::new("broker")
        .enabled()
        .kind(WorkerKind::Broker)
        .build();
    let mut ctx = setup(vec![broker, enabled("dns")]);

    ctx.tick().await;
    ctx.inject(Event::BrokerReady).await;
    ctx.connect("dns").await;
    assert_eq!(ctx.status("broker"), WorkerStatus::Online);

    ctx.adapter.exit_child("broker", Some(1), None);
    ctx.settle().await;

    assert_eq!(ctx.done_rx.try_recv().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_emits_offline_notification() {
    let mut ctx = setup(vec![enabled("dns")]);
    online_worker(&mut ctx, "dns").await;

    ctx.inject(Event::BrokerDisconnected {
        name: WorkerName::new("dns"),
    })
    .await;

    assert!(!ctx
        .logged(|e| matches!(e, Event::ProcessOffline { .. }))
        .is_empty());
    // The status machine itself only moves on child exit
    assert_eq!(ctx.status("dns"), WorkerStatus::Online);
}

#[tokio::test(start_paused = true)]
async fn child_exception_is_survivable() {
    let mut ctx = setup(vec![enabled("dns")]);
    online_worker(&mut ctx, "dns").await;

    ctx.inject(Event::ChildException {
        name: WorkerName::new("dns"),
        stack: "TypeError: boom\n  at main".to_string(),
    })
    .await;
    assert_eq!(ctx.status("dns"), WorkerStatus::Online);
}

#[tokio::test(start_paused = true)]
async fn connected_for_unknown_or_idle_workers_is_harmless() {
    let mut ctx = setup(vec![enabled("dns")]);

    ctx.inject(Event::BrokerConnected {
        name: WorkerName::new("ghost"),
    })
    .await;
    // dns has no live child yet: connected is ignored
    ctx.inject(Event::BrokerConnected {
        name: WorkerName::new("dns"),
    })
    .await;
    assert_ne!(ctx.status("dns"), WorkerStatus::Online);
}
