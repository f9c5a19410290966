// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for daemon unit tests: a fake process adapter and a
//! supervisor harness that pumps the event loop manually.

use crate::adapters::{ProcessAdapter, SpawnSpec};
use crate::collection::WorkerCollection;
use crate::config::Config;
use crate::cpu::CpuSensor;
use crate::ipc::BrokerLink;
use crate::supervisor::Supervisor;
use parking_lot::Mutex;
use procman_core::{Event, FakeClock, SupervisorState, Worker, WorkerName, WorkerStatus};
use procman_storage::WorkerStateStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

#[derive(Default)]
struct FakeInner {
    next_pid: u32,
    spawned: Vec<SpawnSpec>,
    stops: Vec<(WorkerName, u32, Option<String>)>,
    debug_signals: Vec<(WorkerName, u32)>,
    alive: HashMap<u32, WorkerName>,
    senders: HashMap<u32, UnboundedSender<Event>>,
    rss: HashMap<WorkerName, u64>,
    fail_spawn: HashSet<WorkerName>,
    exit_on_spawn: HashMap<WorkerName, (Option<i32>, Option<String>)>,
    exit_on_stop: bool,
}

/// Process adapter that never touches the OS.
#[derive(Clone)]
pub(crate) struct FakeProcessAdapter {
    inner: Arc<Mutex<FakeInner>>,
}

impl FakeProcessAdapter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeInner {
                exit_on_stop: true,
                ..FakeInner::default()
            })),
        }
    }

    /// Children of `name` exit immediately after spawning.
    pub fn exit_on_spawn(&self, name: &str, exit_code: Option<i32>, signal: Option<&str>) {
        self.inner.lock().exit_on_spawn.insert(
            WorkerName::new(name),
            (exit_code, signal.map(str::to_string)),
        );
    }

    /// Spawns of `name` fail outright.
    pub fn fail_spawn(&self, name: &str) {
        self.inner.lock().fail_spawn.insert(WorkerName::new(name));
    }

    /// Keep children alive through stop (no simulated exit).
    pub fn ignore_stops(&self) {
        self.inner.lock().exit_on_stop = false;
    }

    pub fn set_rss(&self, name: &str, rss_mb: u64) {
        self.inner.lock().rss.insert(WorkerName::new(name), rss_mb);
    }

    pub fn spawn_count(&self, name: &str) -> usize {
        self.inner
            .lock()
            .spawned
            .iter()
            .filter(|spec| spec.name == name)
            .count()
    }

    pub fn spawned(&self) -> Vec<SpawnSpec> {
        self.inner.lock().spawned.clone()
    }

    pub fn stops(&self) -> Vec<(WorkerName, u32, Option<String>)> {
        self.inner.lock().stops.clone()
    }

    pub fn debug_signals(&self) -> Vec<(WorkerName, u32)> {
        self.inner.lock().debug_signals.clone()
    }

    /// Simulate an exit of the named worker's live child.
    pub fn exit_child(&self, name: &str, exit_code: Option<i32>, signal: Option<&str>) {
        let target = WorkerName::new(name);
        let sender = {
            let mut inner = self.inner.lock();
            let Some(pid) = inner
                .alive
                .iter()
                .find(|(_, n)| **n == target)
                .map(|(pid, _)| *pid)
            else {
                panic!("no live child for worker '{name}'");
            };
            inner.alive.remove(&pid);
            inner.senders.remove(&pid)
        };
        if let Some(sender) = sender {
            let _ = sender.send(Event::ChildExited {
                name: target,
                exit_code,
                signal: signal.map(str::to_string),
            });
        }
    }
}

impl ProcessAdapter for FakeProcessAdapter {
    fn spawn(&self, spec: SpawnSpec, events: UnboundedSender<Event>) -> std::io::Result<u32> {
        let mut inner = self.inner.lock();
        if inner.fail_spawn.contains(&spec.name) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "spawn refused by fake adapter",
            ));
        }
        inner.next_pid += 1;
        let pid = 1000 + inner.next_pid;
        inner.spawned.push(spec.clone());

        if let Some((exit_code, signal)) = inner.exit_on_spawn.get(&spec.name).cloned() {
            let name = spec.name.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                let _ = events.send(Event::ChildExited {
                    name,
                    exit_code,
                    signal,
                });
            });
        } else {
            inner.alive.insert(pid, spec.name.clone());
            inner.senders.insert(pid, events);
        }
        Ok(pid)
    }

    fn stop(&self, name: &WorkerName, pid: u32, _grace: Duration, collect_core: Option<String>) {
        let mut inner = self.inner.lock();
        inner.stops.push((name.clone(), pid, collect_core));
        if inner.exit_on_stop && inner.alive.remove(&pid).is_some() {
            if let Some(sender) = inner.senders.remove(&pid) {
                let name = name.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    let _ = sender.send(Event::ChildExited {
                        name,
                        exit_code: None,
                        signal: Some("SIGTERM".to_string()),
                    });
                });
            }
        }
    }

    fn signal_debug(&self, name: &WorkerName, pid: u32) {
        self.inner.lock().debug_signals.push((name.clone(), pid));
    }

    fn alive(&self, pid: u32) -> bool {
        self.inner.lock().alive.contains_key(&pid)
    }

    fn rss_mb(&self, pid: u32) -> Option<u64> {
        let inner = self.inner.lock();
        let name = inner.alive.get(&pid)?;
        inner.rss.get(name).copied()
    }
}

/// Supervisor harness: the test plays the engine loop, pumping events
/// until the system is quiet.
pub(crate) struct TestContext {
    pub supervisor: Arc<Supervisor<FakeProcessAdapter, FakeClock>>,
    pub adapter: FakeProcessAdapter,
    pub clock: FakeClock,
    pub tx: UnboundedSender<Event>,
    pub rx: UnboundedReceiver<Event>,
    pub done_rx: oneshot::Receiver<i32>,
    pub log: Vec<Event>,
    _state_dir: TempDir,
}

pub(crate) fn setup(workers: Vec<Worker>) -> TestContext {
    setup_with(workers, |_| {})
}

pub(crate) fn setup_with(workers: Vec<Worker>, customize: impl FnOnce(&mut Config)) -> TestContext {
    let state_dir = TempDir::new().unwrap();
    let mut config = Config::with_state_dir(state_dir.path().to_path_buf());
    config.spawn_interval = Duration::ZERO;
    config.core_dump_cmd = Some("gcore".to_string());
    customize(&mut config);

    let store = Arc::new(WorkerStateStore::load(&config.store_path).unwrap());
    let mut collection = WorkerCollection::new();
    for worker in workers {
        collection.insert(worker).unwrap();
    }
    collection.resolve_order().unwrap();

    let (tx, rx) = unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();
    let adapter = FakeProcessAdapter::new();
    let clock = FakeClock::new();
    let supervisor = Arc::new(Supervisor::new(
        Arc::new(config),
        clock.clone(),
        adapter.clone(),
        store,
        collection,
        tx.clone(),
        Arc::new(BrokerLink::new()),
        CpuSensor::new(),
        done_tx,
    ));
    supervisor.set_state(SupervisorState::Starting);

    TestContext {
        supervisor,
        adapter,
        clock,
        tx,
        rx,
        done_rx,
        log: Vec::new(),
        _state_dir: state_dir,
    }
}

impl TestContext {
    /// Pump events (and the timers they arm) until the loop is quiet.
    pub async fn settle(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    self.log.push(event.clone());
                    self.supervisor.handle_event(event).await;
                }
                Err(_) => {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    match self.rx.try_recv() {
                        Ok(event) => {
                            self.log.push(event.clone());
                            self.supervisor.handle_event(event).await;
                        }
                        Err(_) => break,
                    }
                }
            }
        }
    }

    /// Inject an event as if it arrived on the engine loop, then settle.
    pub async fn inject(&mut self, event: Event) {
        let _ = self.tx.send(event);
        self.settle().await;
    }

    /// Run one tick and settle the fallout.
    pub async fn tick(&mut self) {
        self.supervisor.tick();
        self.settle().await;
    }

    /// Broker reports the worker connected.
    pub async fn connect(&mut self, name: &str) {
        self.inject(Event::BrokerConnected {
            name: WorkerName::new(name),
        })
        .await;
    }

    pub fn status(&self, name: &str) -> WorkerStatus {
        self.read_worker(name, |w| w.status)
    }

    pub fn description(&self, name: &str) -> String {
        self.read_worker(name, |w| w.status_description.clone())
    }

    pub fn read_worker<T>(&self, name: &str, f: impl FnOnce(&Worker) -> T) -> T {
        let workers = self.supervisor.workers_handle();
        let workers = workers.lock();
        let worker = workers
            .get(&WorkerName::new(name))
            .unwrap_or_else(|| panic!("unknown worker '{name}'"));
        f(worker)
    }

    /// Events logged so far whose type matches the filter.
    pub fn logged<'a>(&'a self, filter: impl Fn(&Event) -> bool + 'a) -> Vec<&'a Event> {
        self.log.iter().filter(|e| filter(e)).collect()
    }
}
