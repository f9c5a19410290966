// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The owning aggregate: wires the store, collection, supervisor, IPC
//! listener, CPU sensor and memory guard together, and runs the
//! serialized event loop.

use crate::adapters::ProcessAdapter;
use crate::collection::WorkerCollection;
use crate::config::Config;
use crate::cpu::CpuSensor;
use crate::discovery;
use crate::error::ProcmanError;
use crate::ipc::{self, BrokerLink};
use crate::memguard::{HistoryWriter, MemoryGuard};
use crate::supervisor::Supervisor;
use procman_core::{Clock, Event, SupervisorState};
use procman_storage::WorkerStateStore;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

pub struct Procman<P: ProcessAdapter, C: Clock> {
    supervisor: Arc<Supervisor<P, C>>,
    config: Arc<Config>,
    events_rx: UnboundedReceiver<Event>,
    events_tx: UnboundedSender<Event>,
    done_rx: oneshot::Receiver<i32>,
}

impl<P: ProcessAdapter, C: Clock> std::fmt::Debug for Procman<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Procman").finish_non_exhaustive()
    }
}

impl<P, C> Procman<P, C>
where
    P: ProcessAdapter,
    C: Clock,
{
    /// Discovery, dependency resolution, enabled-state policy, background
    /// tasks: everything up to (and including) scheduling the first tick.
    pub fn startup(config: Config, adapter: P, clock: C) -> Result<Self, ProcmanError> {
        std::fs::create_dir_all(&config.state_dir)?;
        let config = Arc::new(config);
        let store = Arc::new(WorkerStateStore::load(&config.store_path)?);

        let mut collection = WorkerCollection::new();
        collection.insert(discovery::procman_placeholder())?;
        if let Some(broker_path) = &config.broker_path {
            collection.insert(discovery::broker_worker(broker_path))?;
        }
        discovery::discover_workers(&config, &store, &mut collection);
        // A dependency cycle is fatal at startup.
        collection.resolve_order()?;
        discovery::apply_cli_filters(&mut collection, &config);
        tracing::info!(workers = collection.len(), "discovery complete");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();

        let broker = Arc::new(BrokerLink::new());
        ipc::spawn_listener(&config.socket_path, events_tx.clone(), Arc::clone(&broker))?;

        let cpu = CpuSensor::new();
        cpu.spawn_sampler(config.cpu_sample_interval, config.cpu_high_threshold);

        let supervisor = Arc::new(Supervisor::new(
            Arc::clone(&config),
            clock.clone(),
            adapter.clone(),
            Arc::clone(&store),
            collection,
            events_tx.clone(),
            broker,
            cpu,
            done_tx,
        ));

        MemoryGuard::new(
            supervisor.workers_handle(),
            adapter,
            clock,
            HistoryWriter::new(
                config.memleak_history_path.clone(),
                config.memleak_history_enabled,
            ),
            events_tx.clone(),
        )
        .spawn(config.memleak_guard_interval);

        supervisor.set_state(SupervisorState::Starting);
        let _ = events_tx.send(Event::TickRequested);

        Ok(Self {
            supervisor,
            config,
            events_rx,
            events_tx,
            done_rx,
        })
    }

    pub fn supervisor(&self) -> Arc<Supervisor<P, C>> {
        Arc::clone(&self.supervisor)
    }

    /// Sender for injecting events (signal handlers, tests).
    pub fn events(&self) -> UnboundedSender<Event> {
        self.events_tx.clone()
    }

    /// Ask the supervisor to drain workers and exit with `retcode`.
    pub fn trigger_shutdown(&self, retcode: i32) {
        let _ = self.events_tx.send(Event::Shutdown { retcode });
    }

    /// The engine loop: events are processed strictly in order; the fixed
    /// tick interval keeps reconciliation moving between events. Returns
    /// the retcode requested by the shutdown trigger.
    pub async fn run(mut self) -> i32 {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_event = self.events_rx.recv() => {
                    match maybe_event {
                        Some(event) => self.supervisor.handle_event(event).await,
                        None => {
                            tracing::error!("event channel closed, stopping");
                            return 1;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.supervisor.tick();
                }
                result = &mut self.done_rx => {
                    return result.unwrap_or(0);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "procman_tests.rs"]
mod tests;
