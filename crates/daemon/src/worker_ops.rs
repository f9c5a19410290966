// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-worker operations: enable/disable cascades, debug and heartbeat
//! toggles, pause-on-start.

use crate::adapters::ProcessAdapter;
use crate::collection::WorkerCollection;
use crate::error::ProcmanError;
use crate::supervisor::Supervisor;
use procman_core::{Clock, Event, Worker, WorkerName};
use procman_storage::WorkerStateRecord;
use std::collections::HashSet;

impl<P, C> Supervisor<P, C>
where
    P: ProcessAdapter,
    C: Clock,
{
    /// Enable a worker. With `enable_required`, recursively enables
    /// everything in its `require` list. Idempotent; the cause is always
    /// refreshed. Persisting is opt-in per call.
    pub fn enable_worker(
        &self,
        name: &WorkerName,
        cause: &str,
        enable_required: bool,
        persist: bool,
    ) -> Result<(), ProcmanError> {
        let mut workers = self.workers.lock();
        let mut visited = HashSet::new();
        self.enable_locked(&mut workers, name, cause, enable_required, persist, &mut visited)
    }

    fn enable_locked(
        &self,
        workers: &mut WorkerCollection,
        name: &WorkerName,
        cause: &str,
        enable_required: bool,
        persist: bool,
        visited: &mut HashSet<WorkerName>,
    ) -> Result<(), ProcmanError> {
        if !visited.insert(name.clone()) {
            return Ok(());
        }
        let required: Vec<WorkerName> = if enable_required {
            workers.required_workers(name).to_vec()
        } else {
            Vec::new()
        };

        {
            let w = workers
                .get_mut(name)
                .ok_or_else(|| ProcmanError::UnknownWorker(name.clone()))?;
            let flipped = !w.enabled;
            w.enabled = true;
            w.enabled_cause = cause.to_string();
            if flipped {
                tracing::info!(worker = %name, cause, "worker enabled");
                self.emit(Event::EnabledChanged {
                    name: name.clone(),
                    enabled: true,
                    cause: cause.to_string(),
                });
                self.emit(Event::WorkerChanged { name: name.clone() });
            }
            if persist {
                self.persist_record(w, |record| record.enabled = Some(true));
            }
        }

        for dep in required {
            let dep_cause = format!("required dependency for {name}");
            self.enable_locked(workers, &dep, &dep_cause, true, persist, visited)?;
        }
        Ok(())
    }

    /// Disable a worker. With `disable_dependent`, recursively disables
    /// every worker whose `require` list contains it. Unkillable workers
    /// refuse. The actual stop happens on the next tick.
    pub fn disable_worker(
        &self,
        name: &WorkerName,
        cause: &str,
        disable_dependent: bool,
        persist: bool,
    ) -> Result<(), ProcmanError> {
        let mut workers = self.workers.lock();
        let mut visited = HashSet::new();
        self.disable_locked(&mut workers, name, cause, disable_dependent, persist, &mut visited)
    }

    fn disable_locked(
        &self,
        workers: &mut WorkerCollection,
        name: &WorkerName,
        cause: &str,
        disable_dependent: bool,
        persist: bool,
        visited: &mut HashSet<WorkerName>,
    ) -> Result<(), ProcmanError> {
        if !visited.insert(name.clone()) {
            return Ok(());
        }
        let dependents: Vec<WorkerName> = if disable_dependent {
            workers.dependents_of(name)
        } else {
            Vec::new()
        };

        {
            let w = workers
                .get_mut(name)
                .ok_or_else(|| ProcmanError::UnknownWorker(name.clone()))?;
            if !w.killable() {
                return Err(ProcmanError::Unkillable {
                    name: name.clone(),
                    action: "disable",
                });
            }
            let flipped = w.enabled;
            w.enabled = false;
            w.enabled_cause = cause.to_string();
            if flipped {
                tracing::info!(worker = %name, cause, "worker disabled");
                self.emit(Event::EnabledChanged {
                    name: name.clone(),
                    enabled: false,
                    cause: cause.to_string(),
                });
                self.emit(Event::WorkerChanged { name: name.clone() });
            }
            if persist {
                self.persist_record(w, |record| record.enabled = Some(false));
            }
        }

        for dep in dependents {
            let dep_cause = format!("required dependency {name} has been disabled");
            self.disable_locked(workers, &dep, &dep_cause, true, persist, visited)?;
        }
        Ok(())
    }

    /// Toggle the debug flag. Forbidden in the production environment.
    /// A running child gets the debugger-activation signal when enabling,
    /// or a stop (for a clean restart) when disabling.
    pub fn set_debug(&self, name: &WorkerName, debug: bool) -> Result<(), ProcmanError> {
        if self.config.production() {
            return Err(ProcmanError::DebugForbidden);
        }
        let mut workers = self.workers.lock();
        let w = workers
            .get_mut(name)
            .ok_or_else(|| ProcmanError::UnknownWorker(name.clone()))?;
        if w.debug == debug {
            return Ok(());
        }
        w.debug = debug;
        self.persist_record(w, |record| record.debug = Some(debug));
        let debug_enabled = debug;
        tracing::info!(worker = %name, debug = debug_enabled, "debug toggled");

        if w.running() {
            if debug {
                if let Some(pid) = w.pid {
                    self.adapter.signal_debug(&w.name, pid);
                }
            } else {
                self.issue_stop_on(w, "debug disabled");
            }
        }
        self.emit(Event::WorkerChanged { name: name.clone() });
        Ok(())
    }

    /// Toggle heartbeat supervision for a worker.
    pub fn set_heartbeat_disabled(
        &self,
        name: &WorkerName,
        disabled: bool,
        persist: bool,
    ) -> Result<(), ProcmanError> {
        let mut workers = self.workers.lock();
        let w = workers
            .get_mut(name)
            .ok_or_else(|| ProcmanError::UnknownWorker(name.clone()))?;
        if w.heartbeat_disabled == disabled {
            return Ok(());
        }
        w.heartbeat_disabled = disabled;
        if persist {
            self.persist_record(w, |record| record.heartbeat_disabled = Some(disabled));
        }
        self.emit(Event::HeartbeatDisabledChanged {
            name: name.clone(),
            disabled,
        });
        self.emit(Event::WorkerChanged { name: name.clone() });
        Ok(())
    }

    /// Toggle pause-on-start: a paused worker stays in `init` instead of
    /// queueing when the supervisor starts.
    pub fn set_pause_on_start(
        &self,
        name: &WorkerName,
        pause: bool,
        persist: bool,
    ) -> Result<(), ProcmanError> {
        let mut workers = self.workers.lock();
        let w = workers
            .get_mut(name)
            .ok_or_else(|| ProcmanError::UnknownWorker(name.clone()))?;
        if w.pause_on_start == pause {
            return Ok(());
        }
        w.pause_on_start = pause;
        if persist {
            self.persist_record(w, |record| record.pause_on_start = Some(pause));
        }
        self.emit(Event::WorkerChanged { name: name.clone() });
        Ok(())
    }

    /// Write-through of one desired-state flag; failures are logged, the
    /// in-memory toggle stands.
    fn persist_record(&self, w: &Worker, mutate: impl FnOnce(&mut WorkerStateRecord)) {
        if let Err(err) = self.store.update(&w.name, &w.executable, mutate) {
            tracing::warn!(worker = %w.name, error = %err, "state store update failed");
        }
    }
}

#[cfg(test)]
#[path = "worker_ops_tests.rs"]
mod tests;
