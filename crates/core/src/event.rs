// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events that flow through the supervisor's serialized loop.
//!
//! Everything asynchronous (child waiters, the IPC listener, the memory
//! guard, debounce timers, signal handlers) communicates with the
//! supervisor exclusively by sending one of these; the loop consumes them
//! in order, so worker state is only ever mutated from one context.

use crate::status::WorkerStatus;
use crate::worker::WorkerName;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Serializes with `{"type": "ns:name", ...fields}`, the same names the
/// platform event bus uses for these notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- process lifecycle (emitted) --
    #[serde(rename = "procman:process_spawned")]
    ProcessSpawned {
        name: WorkerName,
        pid: u32,
        respawn_id: u32,
    },

    #[serde(rename = "procman:process_started")]
    ProcessStarted {
        name: WorkerName,
        path: PathBuf,
        args: Vec<String>,
        debug: bool,
        heartbeat_disabled: bool,
        pid: u32,
        respawn_id: u32,
    },

    #[serde(rename = "procman:process_stopped")]
    ProcessStopped {
        name: WorkerName,
        debug: bool,
        enabled: bool,
        pid: u32,
        respawn_id: u32,
        exit_code: Option<i32>,
        signal: Option<String>,
    },

    #[serde(rename = "procman:process_online")]
    ProcessOnline { name: WorkerName },

    #[serde(rename = "procman:process_offline")]
    ProcessOffline { name: WorkerName },

    #[serde(rename = "procman:start_complete")]
    StartComplete {
        online: usize,
        failed: usize,
        failed_workers: Vec<WorkerName>,
    },

    // -- worker state notifications --
    #[serde(rename = "procman:status_changed")]
    StatusChanged {
        name: WorkerName,
        status: WorkerStatus,
        description: String,
    },

    #[serde(rename = "procman:worker_changed")]
    WorkerChanged { name: WorkerName },

    #[serde(rename = "procman:enabled_changed")]
    EnabledChanged {
        name: WorkerName,
        enabled: bool,
        cause: String,
    },

    #[serde(rename = "procman:heartbeat_disabled_changed")]
    HeartbeatDisabledChanged { name: WorkerName, disabled: bool },

    #[serde(rename = "procman:respawn_tick")]
    RespawnTick {
        name: WorkerName,
        respawn_id: u32,
        delay_ms: u64,
    },

    // -- child observations (consumed) --
    #[serde(rename = "child:spawn_failed")]
    SpawnFailed { name: WorkerName, reason: String },

    #[serde(rename = "child:exited")]
    ChildExited {
        name: WorkerName,
        exit_code: Option<i32>,
        signal: Option<String>,
    },

    #[serde(rename = "child:exception")]
    ChildException { name: WorkerName, stack: String },

    // -- broker events (consumed) --
    #[serde(rename = "broker:worker_connected")]
    BrokerConnected { name: WorkerName },

    #[serde(rename = "broker:worker_disconnected")]
    BrokerDisconnected { name: WorkerName },

    #[serde(rename = "broker:worker_failed_hb")]
    BrokerFailedHb { name: WorkerName },

    #[serde(rename = "broker:worker_recovered")]
    BrokerRecovered { name: WorkerName },

    /// The broker sibling printed its READY sentinel.
    #[serde(rename = "broker:ready")]
    BrokerReady,

    /// Push the dirty worker snapshots to the broker.
    #[serde(rename = "broker:sync")]
    SyncRequested,

    // -- guard and timer wakeups --
    #[serde(rename = "guard:memory_sampled")]
    MemorySampled { name: WorkerName, rss_mb: u64 },

    #[serde(rename = "timer:respawn_clear")]
    RespawnClearElapsed { name: WorkerName },

    #[serde(rename = "timer:startup_timeout")]
    StartupTimedOut { name: WorkerName },

    #[serde(rename = "supervisor:tick")]
    TickRequested,

    #[serde(rename = "procman:shutdown")]
    Shutdown { retcode: i32 },
}

impl Event {
    /// The worker this event concerns, if any.
    pub fn worker_name(&self) -> Option<&WorkerName> {
        match self {
            Event::ProcessSpawned { name, .. }
            | Event::ProcessStarted { name, .. }
            | Event::ProcessStopped { name, .. }
            | Event::ProcessOnline { name }
            | Event::ProcessOffline { name }
            | Event::StatusChanged { name, .. }
            | Event::WorkerChanged { name }
            | Event::EnabledChanged { name, .. }
            | Event::HeartbeatDisabledChanged { name, .. }
            | Event::RespawnTick { name, .. }
            | Event::SpawnFailed { name, .. }
            | Event::ChildExited { name, .. }
            | Event::ChildException { name, .. }
            | Event::BrokerConnected { name }
            | Event::BrokerDisconnected { name }
            | Event::BrokerFailedHb { name }
            | Event::BrokerRecovered { name }
            | Event::MemorySampled { name, .. }
            | Event::RespawnClearElapsed { name }
            | Event::StartupTimedOut { name } => Some(name),
            Event::StartComplete { .. }
            | Event::BrokerReady
            | Event::SyncRequested
            | Event::TickRequested
            | Event::Shutdown { .. } => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
