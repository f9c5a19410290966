// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event dispatch: child exits, broker liveness, guard samples, timers.

use crate::adapters::ProcessAdapter;
use crate::ipc::{WorkerSnapshot, BROKER_NAME};
use crate::supervisor::Supervisor;
use procman_core::{
    respawn_delay, Clock, Event, SupervisorState, WorkerKind, WorkerName, WorkerStatus,
};
use std::sync::atomic::Ordering;

impl<P, C> Supervisor<P, C>
where
    P: ProcessAdapter,
    C: Clock,
{
    /// Process one event from the serialized loop.
    pub async fn handle_event(&self, event: Event) {
        match event {
            Event::TickRequested => self.tick(),
            Event::WorkerChanged { name } => {
                self.sync.mark_dirty(&name);
                self.schedule_sync();
                self.schedule_tick();
            }
            Event::ProcessSpawned {
                name,
                pid,
                respawn_id,
            } => self.handle_spawned(&name, pid, respawn_id),
            Event::SpawnFailed { name, reason } => self.handle_spawn_failed(&name, &reason),
            Event::ChildExited {
                name,
                exit_code,
                signal,
            } => self.handle_child_exit(&name, exit_code, signal),
            Event::StartupTimedOut { name } => self.handle_startup_timeout(&name),
            Event::RespawnClearElapsed { name } => self.handle_respawn_clear(&name),
            Event::BrokerConnected { name } => self.handle_connected(&name),
            Event::BrokerDisconnected { name } => self.handle_disconnected(&name),
            Event::BrokerFailedHb { name } => self.handle_failed_hb(&name),
            Event::BrokerRecovered { name } => {
                tracing::debug!(worker = %name, "heartbeat recovered");
                self.hb_pressure_warned.store(false, Ordering::SeqCst);
            }
            Event::BrokerReady => self.handle_broker_ready(),
            Event::MemorySampled { name, rss_mb } => self.handle_memory_sample(&name, rss_mb),
            Event::ChildException { name, stack } => {
                tracing::error!(worker = %name, "uncaught exception in worker:\n{stack}");
            }
            Event::SyncRequested => self.push_snapshots().await,
            Event::Shutdown { retcode } => self.handle_shutdown(retcode),

            // Notifications emitted for external consumers; nothing to do
            // when they come back through the loop.
            Event::ProcessStarted { .. }
            | Event::ProcessStopped { .. }
            | Event::ProcessOnline { .. }
            | Event::ProcessOffline { .. }
            | Event::StartComplete { .. }
            | Event::StatusChanged { .. }
            | Event::EnabledChanged { .. }
            | Event::HeartbeatDisabledChanged { .. }
            | Event::RespawnTick { .. } => {}
        }
    }

    fn handle_spawned(&self, name: &WorkerName, pid: u32, respawn_id: u32) {
        let now = self.clock.now();
        let started = self.with_worker(name, |sup, w| {
            w.pid = Some(pid);
            w.spawned_at = Some(now);
            w.exit_reason = None;

            if let Some(timeout) = w.startup_timeout {
                let events = sup.events.clone();
                let timer_name = w.name.clone();
                sup.timers_for(&w.name).startup.set(timeout, move || {
                    let _ = events.send(Event::StartupTimedOut { name: timer_name });
                });
            }

            Event::ProcessStarted {
                name: w.name.clone(),
                path: w.executable.clone(),
                args: w.args.clone(),
                debug: w.debug,
                heartbeat_disabled: w.heartbeat_disabled,
                pid,
                respawn_id,
            }
        });
        if let Some(event) = started {
            tracing::info!(worker = %name, pid, respawn_id, "worker spawned");
            self.emit(event);
            self.emit(Event::WorkerChanged { name: name.clone() });
        }
    }

    fn handle_spawn_failed(&self, name: &WorkerName, reason: &str) {
        tracing::warn!(worker = %name, reason, "spawn failed");
        let now = self.clock.now();
        self.with_worker(name, |sup, w| {
            sup.apply_backoff(w, now);
            sup.set_status_on(
                w,
                WorkerStatus::Offline,
                format!("spawn failed: {reason}"),
            );
        });
    }

    fn handle_child_exit(&self, name: &WorkerName, exit_code: Option<i32>, signal: Option<String>) {
        let reason = exit_reason(exit_code, signal.as_deref());
        let now = self.clock.now();
        self.stop_issued.lock().remove(name);

        let kind = self.with_worker(name, |sup, w| {
            let timers = sup.timers_for(&w.name);
            timers.startup.clear();
            timers.respawn_clear.clear();

            let Some(pid) = w.pid.take() else {
                tracing::debug!(worker = %w.name, "exit for worker without a live child");
                return w.kind;
            };
            w.spawned_at = None;
            w.exit_reason = Some(reason.clone());
            tracing::info!(worker = %w.name, pid, %reason, "worker exited");

            sup.emit(Event::ProcessStopped {
                name: w.name.clone(),
                debug: w.debug,
                enabled: w.enabled,
                pid,
                respawn_id: w.respawn_id,
                exit_code,
                signal: signal.clone(),
            });

            // Exit before this spawn ever came online arms the back-off
            if !w.went_online {
                sup.apply_backoff(w, now);
            }
            match w.status {
                WorkerStatus::Restarting => {
                    sup.set_status_on(w, WorkerStatus::Queued, String::new());
                }
                WorkerStatus::Stopping if !w.enabled => {
                    sup.set_status_on(w, WorkerStatus::Disabled, String::new());
                }
                _ => {
                    sup.set_status_on(w, WorkerStatus::Offline, reason.clone());
                }
            }
            w.kind
        });

        if kind == Some(WorkerKind::Broker) && self.state() != SupervisorState::Stopping {
            tracing::error!("broker exited outside shutdown, stopping supervisor");
            self.handle_shutdown(1);
        }
    }

    /// Exit before sustained health: arm the exponential respawn delay.
    fn apply_backoff(&self, w: &mut procman_core::Worker, now: std::time::Instant) {
        let delay = respawn_delay(w.respawn_id, w.respawn_count);
        if delay.is_zero() {
            w.respawn_delay_until = None;
            return;
        }
        w.respawn_delay_until = Some(now + delay);
        tracing::info!(
            worker = %w.name,
            respawn_id = w.respawn_id,
            delay_secs = delay.as_secs(),
            "respawn back-off armed"
        );
        self.emit(Event::RespawnTick {
            name: w.name.clone(),
            respawn_id: w.respawn_id,
            delay_ms: delay.as_millis() as u64,
        });
    }

    fn handle_startup_timeout(&self, name: &WorkerName) {
        self.with_worker(name, |sup, w| {
            if w.status == WorkerStatus::Starting {
                tracing::warn!(worker = %w.name, "startup timed out");
                sup.issue_stop_on(w, "startup timed out");
            }
        });
    }

    fn handle_respawn_clear(&self, name: &WorkerName) {
        self.with_worker(name, |sup, w| {
            if w.status == WorkerStatus::Online && w.respawn_id != 0 {
                tracing::debug!(worker = %w.name, "respawn counter cleared after sustained health");
                w.respawn_id = 0;
                w.respawn_delay_until = None;
                sup.emit(Event::WorkerChanged {
                    name: w.name.clone(),
                });
            }
        });
    }

    fn handle_connected(&self, name: &WorkerName) {
        let handled = self.with_worker(name, |sup, w| {
            if !w.running() {
                tracing::debug!(worker = %w.name, "broker reports connection for non-running worker");
                return;
            }
            if w.status == WorkerStatus::Online {
                return;
            }
            w.went_online = true;
            w.respawn_delay_until = None;
            sup.set_status_on(w, WorkerStatus::Online, String::new());

            let events = sup.events.clone();
            let timer_name = w.name.clone();
            sup.timers_for(&w.name)
                .respawn_clear
                .set(w.respawn_clear_timeout, move || {
                    let _ = events.send(Event::RespawnClearElapsed { name: timer_name });
                });
        });
        if handled.is_none() {
            tracing::warn!(worker = %name, "broker reports connection for unknown worker");
        }
        self.schedule_tick();
    }

    fn handle_disconnected(&self, name: &WorkerName) {
        tracing::info!(worker = %name, "broker reports disconnect");
        self.emit(Event::ProcessOffline { name: name.clone() });
        self.schedule_tick();
    }

    fn handle_failed_hb(&self, name: &WorkerName) {
        let eligible = self
            .with_worker(name, |_, w| {
                w.status == WorkerStatus::Online && !w.heartbeat_disabled
            })
            .unwrap_or(false);
        if !eligible {
            return;
        }

        if self.cpu.is_high() {
            if !self.hb_pressure_warned.swap(true, Ordering::SeqCst) {
                tracing::warn!(
                    worker = %name,
                    "skipping heartbeat restart while cpu pressure is high"
                );
            }
            return;
        }

        if let Err(err) = self.request_restart(name, "Failed HB check", true) {
            tracing::warn!(worker = %name, error = %err, "heartbeat restart refused");
        }
    }

    fn handle_broker_ready(&self) {
        let name = WorkerName::new(BROKER_NAME);
        self.with_worker(&name, |sup, w| {
            if w.running() && w.status != WorkerStatus::Online {
                tracing::info!("broker ready");
                w.went_online = true;
                sup.set_status_on(w, WorkerStatus::Online, String::new());
            }
        });
        self.schedule_tick();
    }

    fn handle_memory_sample(&self, name: &WorkerName, rss_mb: u64) {
        let over = self
            .with_worker(name, |_, w| {
                (w.status == WorkerStatus::Online
                    && w.memleak_guard.enabled
                    && rss_mb > w.memleak_guard.trigger_mb)
                    .then_some((w.killable(), w.memleak_guard.collect_core))
            })
            .flatten();
        let Some((killable, collect_core)) = over else {
            return;
        };
        if !killable {
            tracing::warn!(worker = %name, rss_mb, "memory threshold exceeded by unkillable worker");
            return;
        }
        tracing::warn!(worker = %name, rss_mb, "memory threshold exceeded");
        if let Err(err) = self.request_restart(name, "Exceeded memory threshold", collect_core) {
            tracing::warn!(worker = %name, error = %err, "memory guard restart refused");
        }
    }

    /// Request a restart of an online worker with a cause; the next tick
    /// performs the stop, and the exit re-queues it.
    pub fn request_restart(
        &self,
        name: &WorkerName,
        cause: &str,
        collect_core: bool,
    ) -> Result<(), crate::error::ProcmanError> {
        let mut workers = self.workers.lock();
        let w = workers
            .get_mut(name)
            .ok_or_else(|| crate::error::ProcmanError::UnknownWorker(name.clone()))?;
        if !w.killable() {
            return Err(crate::error::ProcmanError::Unkillable {
                name: name.clone(),
                action: "restart",
            });
        }
        if w.status != WorkerStatus::Online {
            tracing::debug!(worker = %name, status = %w.status, "restart request ignored");
            return Ok(());
        }
        w.collect_core = w.collect_core || collect_core;
        self.set_status_on(w, WorkerStatus::Restarting, cause.to_string());
        Ok(())
    }

    fn handle_shutdown(&self, retcode: i32) {
        tracing::info!(retcode, "shutdown requested");
        *self.retcode.lock() = Some(retcode);
        self.set_state(SupervisorState::Stopping);
        self.tick();
    }

    /// Push every dirty worker's snapshot to the broker; only workers
    /// whose push succeeded are marked clean.
    async fn push_snapshots(&self) {
        let dirty = self.sync.dirty();
        if dirty.is_empty() {
            return;
        }
        let (snapshots, known): (Vec<WorkerSnapshot>, Vec<WorkerName>) = {
            let workers = self.workers.lock();
            let snapshots: Vec<WorkerSnapshot> = dirty
                .iter()
                .filter_map(|name| workers.get(name))
                .map(|w| WorkerSnapshot {
                    name: w.name.clone(),
                    pid: w.pid,
                    running: w.running(),
                    enabled: w.enabled,
                    online: w.status == WorkerStatus::Online,
                    heartbeat_disabled: w.heartbeat_disabled,
                    liveness_counter: w.liveness_counter,
                })
                .collect();
            let known = snapshots.iter().map(|s| s.name.clone()).collect();
            (snapshots, known)
        };

        match self.broker.push(&snapshots).await {
            Ok(()) => {
                self.sync.mark_clean(&known);
                tracing::debug!(count = known.len(), "broker sync pushed");
            }
            Err(err) => {
                tracing::debug!(error = %err, "broker sync push failed, will retry");
            }
        }
    }
}

/// Human-readable exit reason per the platform convention.
pub(crate) fn exit_reason(exit_code: Option<i32>, signal: Option<&str>) -> String {
    match (exit_code, signal) {
        (_, Some(sig)) => format!("killed by {sig}"),
        (Some(0), None) => "exited normally".to_string(),
        (Some(code), None) => format!("exited with code {code}"),
        (None, None) => "exited".to_string(),
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
