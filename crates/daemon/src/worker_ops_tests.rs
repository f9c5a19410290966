// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for enable/disable cascades and persisted toggles

use crate::test_helpers::{setup, setup_with};
use procman_core::{WorkerBuilder, WorkerId, WorkerKind, WorkerName, WorkerStatus};

fn name(s: &str) -> WorkerName {
    WorkerName::new(s)
}

#[tokio::test(start_paused = true)]
async fn enable_with_required_pulls_in_the_transitive_closure() {
    let workers = vec![
        WorkerBuilder::new("disk").build(),
        WorkerBuilder::new("db").require(&["disk"]).build(),
        WorkerBuilder::new("web").require(&["db"]).build(),
    ];
    let ctx = setup(workers);

    ctx.supervisor
        .enable_worker(&name("web"), "operator request", true, false)
        .unwrap();

    for worker in ["web", "db", "disk"] {
        assert!(ctx.read_worker(worker, |w| w.enabled), "{worker}");
    }
    assert_eq!(
        ctx.read_worker("web", |w| w.enabled_cause.clone()),
        "operator request"
    );
    assert_eq!(
        ctx.read_worker("db", |w| w.enabled_cause.clone()),
        "required dependency for web"
    );
    assert_eq!(
        ctx.read_worker("disk", |w| w.enabled_cause.clone()),
        "required dependency for db"
    );
}

#[tokio::test(start_paused = true)]
async fn enable_is_idempotent_and_refreshes_the_cause() {
    let ctx = setup(vec![WorkerBuilder::new("dns").build()]);

    ctx.supervisor
        .enable_worker(&name("dns"), "first", false, false)
        .unwrap();
    ctx.supervisor
        .enable_worker(&name("dns"), "second", false, false)
        .unwrap();

    assert!(ctx.read_worker("dns", |w| w.enabled));
    assert_eq!(ctx.read_worker("dns", |w| w.enabled_cause.clone()), "second");
}

#[tokio::test(start_paused = true)]
async fn disable_then_enable_leaves_the_latest_cause() {
    let ctx = setup(vec![WorkerBuilder::new("dns").enabled().build()]);

    ctx.supervisor
        .disable_worker(&name("dns"), "maintenance", false, false)
        .unwrap();
    assert!(!ctx.read_worker("dns", |w| w.enabled));

    ctx.supervisor
        .enable_worker(&name("dns"), "back in service", false, false)
        .unwrap();
    assert!(ctx.read_worker("dns", |w| w.enabled));
    assert_eq!(
        ctx.read_worker("dns", |w| w.enabled_cause.clone()),
        "back in service"
    );
}

#[tokio::test(start_paused = true)]
async fn cascading_disable_reaches_transitive_dependents() {
    let workers = vec![
        WorkerBuilder::new("a").enabled().build(),
        WorkerBuilder::new("b").enabled().require(&["a"]).build(),
        WorkerBuilder::new("c").enabled().require(&["b"]).build(),
    ];
    let mut ctx = setup(workers);

    ctx.supervisor
        .disable_worker(&name("a"), "operator request", true, false)
        .unwrap();

    assert!(!ctx.read_worker("a", |w| w.enabled));
    assert!(!ctx.read_worker("b", |w| w.enabled));
    assert!(!ctx.read_worker("c", |w| w.enabled));
    assert_eq!(
        ctx.read_worker("b", |w| w.enabled_cause.clone()),
        "required dependency a has been disabled"
    );
    assert_eq!(
        ctx.read_worker("c", |w| w.enabled_cause.clone()),
        "required dependency b has been disabled"
    );

    // The next tick drives everything to rest with the cause as description
    ctx.tick().await;
    assert_eq!(ctx.status("b"), WorkerStatus::Disabled);
    assert_eq!(
        ctx.description("b"),
        "required dependency a has been disabled"
    );
}

#[tokio::test(start_paused = true)]
async fn disabling_an_unkillable_worker_is_refused() {
    let broker = WorkerBuilder::new("broker")
        .enabled()
        .kind(WorkerKind::Broker)
        .build();
    let ctx = setup(vec![broker]);

    let err = ctx
        .supervisor
        .disable_worker(&name("broker"), "test", false, false)
        .unwrap_err();
    assert_eq!(err.kind(), procman_core::ErrorKind::BadArg);
    assert!(ctx.read_worker("broker", |w| w.enabled));
}

#[tokio::test(start_paused = true)]
async fn persisted_enable_survives_in_the_store() {
    let ctx = setup(vec![WorkerBuilder::new("dns").build()]);

    ctx.supervisor
        .enable_worker(&name("dns"), "operator request", false, true)
        .unwrap();

    let (worker_name, executable) =
        ctx.read_worker("dns", |w| (w.name.clone(), w.executable.clone()));
    let record = ctx
        .supervisor
        .store
        .get(&WorkerId::new(&worker_name, &executable))
        .unwrap();
    assert_eq!(record.enabled, Some(true));
}

#[tokio::test(start_paused = true)]
async fn debug_is_forbidden_in_production() {
    let ctx = setup_with(vec![WorkerBuilder::new("dns").build()], |config| {
        config.environment = "production".to_string();
    });

    let err = ctx.supervisor.set_debug(&name("dns"), true).unwrap_err();
    assert_eq!(err.kind(), procman_core::ErrorKind::BadArg);
}

#[tokio::test(start_paused = true)]
async fn debug_toggle_signals_or_stops_a_running_child() {
    let mut ctx = setup(vec![WorkerBuilder::new("dns").enabled().build()]);
    ctx.tick().await;
    ctx.connect("dns").await;

    ctx.supervisor.set_debug(&name("dns"), true).unwrap();
    assert_eq!(ctx.adapter.debug_signals().len(), 1);
    assert!(ctx.read_worker("dns", |w| w.debug));

    // Disabling debug stops the child so the next spawn is clean
    ctx.supervisor.set_debug(&name("dns"), false).unwrap();
    ctx.settle().await;
    assert_eq!(ctx.adapter.stops().len(), 1);
    assert_eq!(ctx.adapter.spawn_count("dns"), 2);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_toggle_is_persisted_and_idempotent() {
    let ctx = setup(vec![WorkerBuilder::new("dns").build()]);

    ctx.supervisor
        .set_heartbeat_disabled(&name("dns"), true, true)
        .unwrap();
    ctx.supervisor
        .set_heartbeat_disabled(&name("dns"), true, true)
        .unwrap();

    assert!(ctx.read_worker("dns", |w| w.heartbeat_disabled));
    let (worker_name, executable) =
        ctx.read_worker("dns", |w| (w.name.clone(), w.executable.clone()));
    let record = ctx
        .supervisor
        .store
        .get(&WorkerId::new(&worker_name, &executable))
        .unwrap();
    assert_eq!(record.heartbeat_disabled, Some(true));
}
