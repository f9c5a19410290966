// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker identity and the per-worker domain model.

use crate::status::WorkerStatus;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Name of a worker, unique within one supervisor process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerName(pub String);

impl WorkerName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkerName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorkerName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for WorkerName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for WorkerName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for WorkerName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Store key for a worker: `name + ":" + executable path`.
///
/// Unique across disk locations, so the same worker name deployed from a
/// different directory gets a fresh persistent record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(name: &WorkerName, executable: &Path) -> Self {
        Self(format!("{}:{}", name, executable.display()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a worker within the supervisor.
///
/// The supervisor's own placeholder and the broker sibling cannot be
/// stopped, disabled, or restarted through the normal API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    Worker,
    Procman,
    Broker,
}

impl WorkerKind {
    pub fn unkillable(self) -> bool {
        !matches!(self, WorkerKind::Worker)
    }
}

/// Memory-guard knobs from the worker manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemleakGuard {
    pub enabled: bool,
    /// Restart threshold in MB of resident set size.
    pub trigger_mb: u64,
    /// Collect a core dump before the restart stop.
    pub collect_core: bool,
}

impl Default for MemleakGuard {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger_mb: 0,
            collect_core: false,
        }
    }
}

/// One managed worker: manifest attributes plus runtime state.
///
/// Created at discovery, mutated only from the serialized supervisor
/// context, destroyed when the supervisor shuts down. The persistent
/// record (see `procman-storage`) outlives this struct.
#[derive(Debug, Clone)]
pub struct Worker {
    // Identity and manifest attributes
    pub name: WorkerName,
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub tags: Vec<String>,
    pub require: Vec<String>,
    pub after: Vec<String>,
    pub before: Vec<String>,
    pub startup_timeout: Option<Duration>,
    pub respawn_clear_timeout: Duration,
    /// Exponent cap for respawn back-off.
    pub respawn_count: u32,
    pub liveness_counter: u32,
    pub memleak_guard: MemleakGuard,
    pub kind: WorkerKind,

    // Runtime state
    pub pid: Option<u32>,
    pub status: WorkerStatus,
    pub status_description: String,
    pub enabled: bool,
    pub enabled_cause: String,
    /// Spawn attempt counter, reset after sustained health.
    pub respawn_id: u32,
    pub respawn_delay_until: Option<Instant>,
    pub spawned_at: Option<Instant>,
    /// Whether the current spawn ever reached online; exits before that
    /// arm the respawn back-off.
    pub went_online: bool,
    pub exit_reason: Option<String>,
    pub debug: bool,
    pub heartbeat_disabled: bool,
    pub pause_on_start: bool,
    /// One-shot: collect a core dump before the next stop.
    pub collect_core: bool,
    pub start_index: Option<usize>,
}

impl Worker {
    pub fn new(name: impl Into<WorkerName>, executable: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            args: Vec::new(),
            tags: Vec::new(),
            require: Vec::new(),
            after: Vec::new(),
            before: Vec::new(),
            startup_timeout: None,
            respawn_clear_timeout: Duration::from_secs(60),
            respawn_count: 5,
            liveness_counter: 3,
            memleak_guard: MemleakGuard::default(),
            kind: WorkerKind::Worker,
            pid: None,
            status: WorkerStatus::Init,
            status_description: String::new(),
            enabled: false,
            enabled_cause: String::new(),
            respawn_id: 0,
            respawn_delay_until: None,
            spawned_at: None,
            went_online: false,
            exit_reason: None,
            debug: false,
            heartbeat_disabled: false,
            pause_on_start: false,
            collect_core: false,
            start_index: None,
        }
    }

    pub fn id(&self) -> WorkerId {
        WorkerId::new(&self.name, &self.executable)
    }

    /// A live child exists iff `pid` is set.
    pub fn running(&self) -> bool {
        self.pid.is_some()
    }

    pub fn killable(&self) -> bool {
        !self.kind.unkillable()
    }

    /// Whether the respawn back-off window is still open at `now`.
    pub fn in_backoff(&self, now: Instant) -> bool {
        self.respawn_delay_until.is_some_and(|until| now < until)
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
