// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for the aggregate: startup through the event loop to exit

use super::*;
use crate::test_helpers::FakeProcessAdapter;
use procman_core::{FakeClock, WorkerName, WorkerStatus};
use std::time::Duration;
use tempfile::TempDir;

fn config_with_one_worker(dir: &TempDir) -> Config {
    let mut config = Config::with_state_dir(dir.path().join("state"));
    config.spawn_interval = Duration::ZERO;
    config.tick_interval = Duration::from_millis(100);
    let workers_dir = dir.path().join("workers");
    std::fs::create_dir_all(workers_dir.join("dns")).unwrap();
    std::fs::write(
        workers_dir.join("dns").join("meta.json"),
        r#"{"enabled": true}"#,
    )
    .unwrap();
    config.workers_dirs = vec![workers_dir];
    config
}

#[tokio::test(start_paused = true)]
async fn runs_discovery_to_online_and_exits_with_requested_retcode() {
    let dir = TempDir::new().unwrap();
    let config = config_with_one_worker(&dir);
    let adapter = FakeProcessAdapter::new();

    let procman = Procman::startup(config, adapter.clone(), FakeClock::new()).unwrap();
    let supervisor = procman.supervisor();
    let events = procman.events();
    let loop_task = tokio::spawn(procman.run());

    // Let the first tick spawn the worker, then report it connected
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(adapter.spawn_count("dns"), 1);
    let _ = events.send(procman_core::Event::BrokerConnected {
        name: WorkerName::new("dns"),
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    {
        let workers = supervisor.workers_handle();
        let workers = workers.lock();
        assert_eq!(
            workers.get(&WorkerName::new("dns")).unwrap().status,
            WorkerStatus::Online
        );
        assert!(workers.contains(&WorkerName::new("procman")));
    }
    assert_eq!(supervisor.state(), procman_core::SupervisorState::Online);

    let _ = events.send(procman_core::Event::Shutdown { retcode: 3 });
    let retcode = loop_task.await.unwrap();
    assert_eq!(retcode, 3);
    assert_eq!(adapter.stops().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dependency_cycle_fails_startup() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::with_state_dir(dir.path().join("state"));
    let workers_dir = dir.path().join("workers");
    for (name, manifest) in [
        ("a", r#"{"require": ["b"]}"#),
        ("b", r#"{"require": ["a"]}"#),
    ] {
        std::fs::create_dir_all(workers_dir.join(name)).unwrap();
        std::fs::write(workers_dir.join(name).join("meta.json"), manifest).unwrap();
    }
    config.workers_dirs = vec![workers_dir];

    let err = Procman::startup(config, FakeProcessAdapter::new(), FakeClock::new()).unwrap_err();
    assert_eq!(err.kind(), procman_core::ErrorKind::Invalid);
    let rendered = err.to_string();
    assert!(rendered.contains('a') && rendered.contains('b'), "{rendered}");
}
