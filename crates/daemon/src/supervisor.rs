// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor: serialized tick loop driving every worker toward its
//! desired state.

use crate::adapters::{ProcessAdapter, SpawnSpec};
use crate::collection::WorkerCollection;
use crate::config::Config;
use crate::cpu::CpuSensor;
use crate::ipc::{BrokerLink, BROKER_READY_SENTINEL};
use crate::sync::SyncQueue;
use parking_lot::Mutex;
use procman_core::{
    Clock, DebounceRegistry, Event, ReplaceableTimer, SupervisorState, ThrottleGate, Worker,
    WorkerKind, WorkerName, WorkerStatus,
};
use procman_storage::WorkerStateStore;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;

/// Debounce key for workerChanged-triggered ticks.
const TICK_KEY: &str = "supervisor:tick";
/// Debounce key for broker snapshot pushes.
const SYNC_KEY: &str = "broker:sync";
/// Throttle key for the global spawn gate.
const SPAWN_KEY: &str = "spawn";

/// Per-worker one-shot timers.
#[derive(Clone, Default)]
pub(crate) struct WorkerTimers {
    pub(crate) startup: ReplaceableTimer,
    pub(crate) respawn_clear: ReplaceableTimer,
}

pub struct Supervisor<P: ProcessAdapter, C: Clock> {
    pub(crate) config: Arc<Config>,
    pub(crate) clock: C,
    pub(crate) adapter: P,
    pub(crate) store: Arc<WorkerStateStore>,
    pub(crate) workers: Arc<Mutex<WorkerCollection>>,
    pub(crate) state: Mutex<SupervisorState>,
    pub(crate) events: UnboundedSender<Event>,
    pub(crate) debounce: DebounceRegistry,
    pub(crate) spawn_gate: Arc<ThrottleGate>,
    pub(crate) cpu: CpuSensor,
    pub(crate) sync: SyncQueue,
    pub(crate) broker: Arc<BrokerLink>,
    pub(crate) timers: Mutex<HashMap<WorkerName, WorkerTimers>>,
    pub(crate) stop_issued: Mutex<HashMap<WorkerName, Instant>>,
    /// One-shot warning flag for heartbeat skips under CPU pressure.
    pub(crate) hb_pressure_warned: AtomicBool,
    pub(crate) retcode: Mutex<Option<i32>>,
    pub(crate) done: Mutex<Option<oneshot::Sender<i32>>>,
}

impl<P, C> Supervisor<P, C>
where
    P: ProcessAdapter,
    C: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        clock: C,
        adapter: P,
        store: Arc<WorkerStateStore>,
        collection: WorkerCollection,
        events: UnboundedSender<Event>,
        broker: Arc<BrokerLink>,
        cpu: CpuSensor,
        done: oneshot::Sender<i32>,
    ) -> Self {
        let spawn_gate = Arc::new(ThrottleGate::new(config.spawn_interval));
        Self {
            config,
            clock,
            adapter,
            store,
            workers: Arc::new(Mutex::new(collection)),
            state: Mutex::new(SupervisorState::Init),
            events,
            debounce: DebounceRegistry::new(),
            spawn_gate,
            cpu,
            sync: SyncQueue::new(),
            broker,
            timers: Mutex::new(HashMap::new()),
            stop_issued: Mutex::new(HashMap::new()),
            hb_pressure_warned: AtomicBool::new(false),
            retcode: Mutex::new(None),
            done: Mutex::new(Some(done)),
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: SupervisorState) {
        let mut guard = self.state.lock();
        if *guard != state {
            tracing::info!(from = %*guard, to = %state, "supervisor state changed");
            *guard = state;
        }
    }

    /// Shared handle to the worker table (for the memory guard).
    pub fn workers_handle(&self) -> Arc<Mutex<WorkerCollection>> {
        Arc::clone(&self.workers)
    }

    pub(crate) fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    /// Re-arm the tick through the workerChanged debounce.
    pub(crate) fn schedule_tick(&self) {
        let events = self.events.clone();
        self.debounce.call(TICK_KEY, self.config.tick_debounce, move || {
            let _ = events.send(Event::TickRequested);
        });
    }

    /// Re-arm the broker snapshot push through the sync debounce.
    pub(crate) fn schedule_sync(&self) {
        let events = self.events.clone();
        self.debounce.call(SYNC_KEY, self.config.sync_debounce, move || {
            let _ = events.send(Event::SyncRequested);
        });
    }

    pub(crate) fn timers_for(&self, name: &WorkerName) -> WorkerTimers {
        self.timers.lock().entry(name.clone()).or_default().clone()
    }

    /// Run a closure against one worker under the table lock.
    pub(crate) fn with_worker<T>(
        &self,
        name: &WorkerName,
        f: impl FnOnce(&Self, &mut Worker) -> T,
    ) -> Option<T> {
        let mut workers = self.workers.lock();
        workers.get_mut(name).map(|worker| f(self, worker))
    }

    // ---- tick -----------------------------------------------------------

    /// One pass of the reconciliation loop. Errors are logged; the next
    /// tick retries.
    pub fn tick(&self) {
        let state = self.state();
        tracing::trace!(%state, "tick");
        if state == SupervisorState::Stopping {
            self.shutdown_tick();
            return;
        }

        let order = { self.workers.lock().start_order() };
        self.settle_disabled(&order);
        self.queue_enabled(&order);
        self.dispatch_queued(&order);
        if state == SupervisorState::Starting {
            self.finish_starting();
        }
    }

    /// Drive every disabled worker to rest.
    fn settle_disabled(&self, order: &[WorkerName]) {
        for name in order {
            self.with_worker(name, |sup, w| {
                if w.enabled
                    || matches!(w.status, WorkerStatus::Disabled | WorkerStatus::Stopping)
                {
                    return;
                }
                if w.running() {
                    sup.issue_stop_on(w, "disabled");
                } else {
                    sup.set_status_on(w, WorkerStatus::Disabled, String::new());
                }
            });
        }
    }

    /// Queue idle enabled workers; stop restarting ones.
    fn queue_enabled(&self, order: &[WorkerName]) {
        let now = self.clock.now();
        for name in order {
            self.with_worker(name, |sup, w| {
                if !w.enabled {
                    return;
                }
                if w.status == WorkerStatus::Restarting {
                    let why = w.status_description.clone();
                    sup.issue_stop_on(w, &why);
                    return;
                }
                if w.running() || w.status.in_flight() || w.in_backoff(now) {
                    return;
                }
                if w.pause_on_start && w.status == WorkerStatus::Init {
                    sup.set_status_on(w, WorkerStatus::Init, "paused on start".to_string());
                    return;
                }
                sup.set_status_on(w, WorkerStatus::Queued, String::new());
            });
        }
    }

    /// Start every queued worker whose dependencies allow it.
    fn dispatch_queued(&self, order: &[WorkerName]) {
        for name in order {
            let decision = self.dispatch_decision(name);
            match decision {
                Dispatch::Skip => {}
                Dispatch::Start => {
                    self.with_worker(name, |sup, w| {
                        if w.status == WorkerStatus::Queued {
                            sup.start_worker_on(w);
                        }
                    });
                }
                Dispatch::FailedDependency(missing) => {
                    let retry_at = self.clock.now() + self.config.tick_interval;
                    self.with_worker(name, |sup, w| {
                        // Pace the requeue so the retry rides the tick
                        // cadence instead of the changed-worker debounce
                        w.respawn_delay_until =
                            Some(w.respawn_delay_until.map_or(retry_at, |at| at.max(retry_at)));
                        sup.set_status_on(
                            w,
                            WorkerStatus::Offline,
                            format!("Failed dependency: {missing}"),
                        );
                    });
                }
                Dispatch::Waiting(pending) => {
                    self.with_worker(name, |sup, w| {
                        sup.set_status_on(
                            w,
                            WorkerStatus::Queued,
                            format!("Waiting for: {pending}"),
                        );
                    });
                }
            }
        }
    }

    fn dispatch_decision(&self, name: &WorkerName) -> Dispatch {
        let now = self.clock.now();
        let workers = self.workers.lock();
        let Some(worker) = workers.get(name) else {
            return Dispatch::Skip;
        };
        if worker.status != WorkerStatus::Queued || !worker.enabled {
            return Dispatch::Skip;
        }

        let failed: Vec<&str> = workers
            .required_workers(name)
            .iter()
            .filter_map(|dep| workers.get(dep))
            .filter(|dep| dep.enabled && dep.status == WorkerStatus::Offline)
            .map(|dep| dep.name.as_str())
            .collect();
        if !failed.is_empty() {
            return Dispatch::FailedDependency(failed.join(", "));
        }

        let pending: Vec<&str> = workers
            .prestarted_workers(name)
            .iter()
            .filter_map(|dep| workers.get(dep))
            .filter(|dep| match dep.status {
                WorkerStatus::Queued => true,
                WorkerStatus::Starting | WorkerStatus::Stopping => {
                    within_spawn_timeout(dep, now)
                }
                _ => false,
            })
            .map(|dep| dep.name.as_str())
            .collect();
        if !pending.is_empty() {
            return Dispatch::Waiting(pending.join(", "));
        }

        Dispatch::Start
    }

    /// When the supervisor is starting, check whether every enabled
    /// worker has settled and declare startup complete.
    fn finish_starting(&self) {
        let (online, failed_workers, waiting) = {
            let workers = self.workers.lock();
            let mut online = 0usize;
            let mut failed: Vec<WorkerName> = Vec::new();
            let mut waiting = 0usize;
            for w in workers.iter().filter(|w| w.enabled) {
                match w.status {
                    WorkerStatus::Online => online += 1,
                    WorkerStatus::Offline => failed.push(w.name.clone()),
                    WorkerStatus::Disabled => {}
                    WorkerStatus::Init if w.pause_on_start => {}
                    _ => waiting += 1,
                }
            }
            failed.sort_unstable();
            (online, failed, waiting)
        };
        if waiting > 0 {
            return;
        }

        self.set_state(SupervisorState::Online);
        if failed_workers.is_empty() {
            tracing::info!(online, "startup complete");
        } else {
            tracing::warn!(
                online,
                failed = failed_workers.len(),
                workers = ?failed_workers,
                "startup complete with failed workers"
            );
        }
        self.emit(Event::StartComplete {
            online,
            failed: failed_workers.len(),
            failed_workers,
        });
    }

    /// Shutdown pass: stop killable workers leaves-first (reverse
    /// dependency order), then close the broker, flush the store and
    /// report the requested retcode.
    fn shutdown_tick(&self) {
        let now = self.clock.now();
        let stop_issued = self.stop_issued.lock().clone();
        let mut to_stop: Vec<WorkerName> = Vec::new();
        let mut blocking = false;

        {
            let workers = self.workers.lock();
            // A worker still counts as draining until procman_spawn_wait
            // has elapsed since its stop was issued.
            let draining = |w: &Worker| -> bool {
                if !w.running() {
                    return false;
                }
                match stop_issued.get(&w.name) {
                    Some(at) => now.duration_since(*at) < self.config.procman_spawn_wait,
                    None => true,
                }
            };

            for w in workers.iter().filter(|w| w.killable()) {
                if !w.running() {
                    continue;
                }
                if w.status == WorkerStatus::Stopping || stop_issued.contains_key(&w.name) {
                    if draining(w) {
                        blocking = true;
                    } else {
                        tracing::warn!(worker = %w.name, "shutdown proceeding past stuck worker");
                    }
                    continue;
                }
                // Only stop workers no running dependent still needs.
                let has_running_dependent = workers.iter().any(|x| {
                    x.killable()
                        && draining(x)
                        && x.name != w.name
                        && workers.prestarted_workers(&x.name).contains(&w.name)
                });
                if has_running_dependent {
                    blocking = true;
                } else {
                    to_stop.push(w.name.clone());
                    blocking = true;
                }
            }
        }

        for name in to_stop {
            self.with_worker(&name, |sup, w| sup.issue_stop_on(w, "supervisor shutdown"));
        }
        if blocking {
            return;
        }

        // All killable workers are down: close the broker sibling, flush
        // state, report the retcode.
        let broker_pid = {
            let workers = self.workers.lock();
            let broker_pid = workers
                .iter()
                .find(|w| w.kind == WorkerKind::Broker)
                .and_then(|w| w.pid);
            broker_pid
        };
        if let Some(pid) = broker_pid {
            self.adapter.stop(
                &WorkerName::new(crate::ipc::BROKER_NAME),
                pid,
                self.config.stop_timeout,
                None,
            );
        }
        let broker = Arc::clone(&self.broker);
        tokio::spawn(async move { broker.close().await });

        if let Err(err) = self.store.flush() {
            tracing::warn!(error = %err, "state store flush failed during shutdown");
        }

        let retcode = (*self.retcode.lock()).unwrap_or(0);
        if let Some(done) = self.done.lock().take() {
            tracing::info!(retcode, "supervisor stopped");
            let _ = done.send(retcode);
        }
    }

    // ---- start / stop ----------------------------------------------------

    /// Transition a queued worker to starting and spawn it through the
    /// throttled spawn gate.
    pub(crate) fn start_worker_on(&self, w: &mut Worker) {
        w.respawn_id += 1;
        w.exit_reason = None;
        w.went_online = false;
        self.set_status_on(w, WorkerStatus::Starting, String::new());

        let spec = self.spawn_spec(w);
        let name = w.name.clone();
        let respawn_id = w.respawn_id;
        let gate = Arc::clone(&self.spawn_gate);
        let adapter = self.adapter.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            gate.acquire(SPAWN_KEY).await;
            match adapter.spawn(spec, events.clone()) {
                Ok(pid) => {
                    let _ = events.send(Event::ProcessSpawned {
                        name,
                        pid,
                        respawn_id,
                    });
                }
                Err(err) => {
                    let _ = events.send(Event::SpawnFailed {
                        name,
                        reason: err.to_string(),
                    });
                }
            }
        });
    }

    fn spawn_spec(&self, w: &Worker) -> SpawnSpec {
        let process_type = match w.kind {
            WorkerKind::Broker => "broker",
            _ => "worker",
        };
        let mut env = vec![
            ("NEF_PROCESS_TYPE".to_string(), process_type.to_string()),
            (
                "PROCMAN_IPC_SOCKET".to_string(),
                self.config.socket_path.display().to_string(),
            ),
        ];
        if w.debug {
            env.push(("PROCMAN_DEBUG".to_string(), "1".to_string()));
        }
        SpawnSpec {
            name: w.name.clone(),
            program: w.executable.clone(),
            args: w.args.clone(),
            cwd: w
                .executable
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf(),
            env,
            ready_sentinel: (w.kind == WorkerKind::Broker)
                .then(|| BROKER_READY_SENTINEL.to_string()),
        }
    }

    /// Begin a graceful stop. Idempotent while a stop is in flight.
    ///
    /// A restarting worker keeps its status (and cause) through the stop
    /// so the exit re-queues it instead of settling offline.
    pub(crate) fn issue_stop_on(&self, w: &mut Worker, why: &str) {
        if w.status == WorkerStatus::Stopping {
            return;
        }
        if w.status == WorkerStatus::Restarting && self.stop_issued.lock().contains_key(&w.name) {
            return;
        }
        let Some(pid) = w.pid else {
            if w.enabled {
                self.set_status_on(w, WorkerStatus::Offline, why.to_string());
            } else {
                self.set_status_on(w, WorkerStatus::Disabled, String::new());
            }
            return;
        };

        let collect_core = self
            .config
            .core_dump_cmd
            .clone()
            .filter(|_| w.collect_core);
        w.collect_core = false;

        self.timers_for(&w.name).startup.clear();
        if w.status != WorkerStatus::Restarting {
            self.set_status_on(w, WorkerStatus::Stopping, why.to_string());
        }
        self.stop_issued.lock().insert(w.name.clone(), self.clock.now());
        self.adapter
            .stop(&w.name, pid, self.config.stop_timeout, collect_core);
    }

    /// Record a status transition: description bookkeeping, statusChanged
    /// plus per-status platform events, workerChanged.
    pub(crate) fn set_status_on(&self, w: &mut Worker, status: WorkerStatus, description: String) {
        let description = if status == WorkerStatus::Disabled && description.is_empty() {
            w.enabled_cause.clone()
        } else {
            description
        };
        if w.status == status && w.status_description == description {
            return;
        }
        let old = w.status;
        w.status = status;
        w.status_description = description.clone();
        tracing::info!(worker = %w.name, from = %old, to = %status, %description, "worker status");

        self.emit(Event::StatusChanged {
            name: w.name.clone(),
            status,
            description,
        });
        if status == WorkerStatus::Online && old != WorkerStatus::Online {
            self.emit(Event::ProcessOnline {
                name: w.name.clone(),
            });
        }
        if status == WorkerStatus::Offline && old != WorkerStatus::Offline {
            self.emit(Event::ProcessOffline {
                name: w.name.clone(),
            });
        }
        self.emit(Event::WorkerChanged {
            name: w.name.clone(),
        });
    }
}

enum Dispatch {
    Skip,
    Start,
    FailedDependency(String),
    Waiting(String),
}

/// Whether a starting/stopping dependency is still within its startup
/// window counted from its last spawn.
fn within_spawn_timeout(dep: &Worker, now: Instant) -> bool {
    match (dep.startup_timeout, dep.spawned_at) {
        (Some(timeout), Some(at)) => now.duration_since(at) < timeout,
        _ => true,
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
