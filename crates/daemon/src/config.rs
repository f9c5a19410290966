// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: fixed paths under the state directory plus
//! command-line switches and timing tunables.

use crate::error::ProcmanError;
use std::path::PathBuf;
use std::time::Duration;

/// Environment name that forbids debug toggling.
pub const PRODUCTION_ENV: &str = "production";

#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/procman)
    pub state_dir: PathBuf,
    /// Unix socket children connect their IPC channel to
    pub socket_path: PathBuf,
    /// Lock/PID file
    pub lock_path: PathBuf,
    /// Daemon log file
    pub log_path: PathBuf,
    /// Persistent worker-state document
    pub store_path: PathBuf,
    /// Memory-guard history (JSON lines)
    pub memleak_history_path: PathBuf,

    /// Directories scanned for worker subdirectories
    pub workers_dirs: Vec<PathBuf>,
    /// Global manifest defaults document
    pub meta_defaults_path: Option<PathBuf>,
    /// Workers enabled when neither store nor manifest says otherwise
    pub default_workers: Vec<String>,
    /// `--only`: everything not listed is disabled
    pub only_workers: Vec<String>,
    /// `--skip`: listed workers are disabled
    pub skip_workers: Vec<String>,
    /// Deployment environment name; "production" forbids debug toggling
    pub environment: String,
    /// Broker sibling executable; None runs without a broker child
    pub broker_path: Option<PathBuf>,
    /// Core-dump collector command (e.g. "gcore"); None declines collection
    pub core_dump_cmd: Option<String>,

    /// Minimum interval between spawn starts across all workers
    pub spawn_interval: Duration,
    /// Fixed supervisor tick cadence
    pub tick_interval: Duration,
    /// Debounce applied to workerChanged-triggered ticks
    pub tick_debounce: Duration,
    /// Debounce applied to broker snapshot pushes
    pub sync_debounce: Duration,
    /// Grace period between SIGTERM and SIGKILL
    pub stop_timeout: Duration,
    /// How long shutdown waits on a worker stuck in stopping
    pub procman_spawn_wait: Duration,
    /// Memory-guard sampling cadence
    pub memleak_guard_interval: Duration,
    /// Whether guard samples are appended to the history file
    pub memleak_history_enabled: bool,
    /// CPU sensor sampling cadence
    pub cpu_sample_interval: Duration,
    /// CPU usage percentage above which pressure is "high"
    pub cpu_high_threshold: f32,
}

impl Config {
    /// Configuration rooted at the user state directory.
    pub fn load() -> Result<Self, ProcmanError> {
        let state_dir = crate::env::state_dir().ok_or(ProcmanError::NoStateDir)?;
        Ok(Self::with_state_dir(state_dir))
    }

    /// Configuration rooted at an explicit state directory.
    pub fn with_state_dir(state_dir: PathBuf) -> Self {
        Self {
            socket_path: state_dir.join("procman.sock"),
            lock_path: state_dir.join("procman.pid"),
            log_path: state_dir.join("procman.log"),
            store_path: state_dir.join("worker-state.json"),
            memleak_history_path: state_dir.join("memleak-history.jsonl"),
            workers_dirs: Vec::new(),
            meta_defaults_path: None,
            default_workers: Vec::new(),
            only_workers: Vec::new(),
            skip_workers: Vec::new(),
            environment: "development".to_string(),
            broker_path: None,
            core_dump_cmd: None,
            spawn_interval: crate::env::duration_ms("PROCMAN_SPAWN_INTERVAL_MS")
                .unwrap_or(Duration::from_millis(500)),
            tick_interval: crate::env::duration_ms("PROCMAN_TICK_MS")
                .unwrap_or(Duration::from_secs(1)),
            tick_debounce: Duration::from_millis(50),
            sync_debounce: Duration::from_millis(200),
            stop_timeout: crate::env::duration_ms("PROCMAN_STOP_TIMEOUT_MS")
                .unwrap_or(Duration::from_secs(10)),
            procman_spawn_wait: Duration::from_secs(30),
            memleak_guard_interval: Duration::from_secs(60),
            memleak_history_enabled: true,
            cpu_sample_interval: Duration::from_secs(5),
            cpu_high_threshold: 90.0,
            state_dir,
        }
    }

    pub fn production(&self) -> bool {
        self.environment == PRODUCTION_ENV
    }
}
