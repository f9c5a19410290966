// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker discovery: scan the configured directories, load manifests and
//! persisted state, and resolve each worker's initial enabled state.

use crate::collection::WorkerCollection;
use crate::config::Config;
use crate::error::ProcmanError;
use procman_core::{MemleakGuard, Worker, WorkerKind, WorkerName, WorkerStatus};
use procman_manifest::load_manifest;
use procman_storage::WorkerStateStore;
use std::path::Path;
use std::time::Duration;

/// Scan every workers directory and register what loads cleanly.
///
/// Load failures are logged and skip the worker; they are never fatal to
/// the supervisor.
pub fn discover_workers(
    config: &Config,
    store: &WorkerStateStore,
    collection: &mut WorkerCollection,
) {
    for dir in &config.workers_dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "workers directory unreadable");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string)
            else {
                continue;
            };
            match build_worker(&path, &name, config, store) {
                Ok(worker) => {
                    if let Err(err) = collection.insert(worker) {
                        tracing::warn!(worker = %name, error = %err, "skipping duplicate worker");
                    } else {
                        tracing::info!(worker = %name, dir = %path.display(), "worker discovered");
                    }
                }
                Err(err) => {
                    tracing::warn!(worker = %name, error = %err, "failed to load worker, skipping");
                }
            }
        }
    }
}

fn build_worker(
    dir: &Path,
    name: &str,
    config: &Config,
    store: &WorkerStateStore,
) -> Result<Worker, ProcmanError> {
    let manifest = load_manifest(dir, name, config.meta_defaults_path.as_deref())?;

    let mut worker = Worker::new(name, dir.join(manifest.executable_name(name)));
    worker.args = manifest.args.clone();
    worker.tags = manifest.tags.clone();
    worker.require = manifest.require.clone();
    worker.after = manifest.after.clone();
    worker.before = manifest.before.clone();
    if let Some(ms) = manifest.startup_timeout {
        worker.startup_timeout = Some(Duration::from_millis(ms));
    }
    if let Some(ms) = manifest.respawn_clear_timeout {
        worker.respawn_clear_timeout = Duration::from_millis(ms);
    }
    if let Some(cap) = manifest.respawn_count {
        worker.respawn_count = cap;
    }
    if let Some(count) = manifest.liveness_counter {
        worker.liveness_counter = count;
    }
    worker.memleak_guard = MemleakGuard {
        enabled: manifest.memleak_guard_enabled.unwrap_or(false),
        trigger_mb: manifest.memleak_guard_trigger.unwrap_or(0),
        collect_core: manifest.memleak_guard_collect_core.unwrap_or(false),
    };

    // Persisted desired state (the enabled flag resolves later, with the
    // manifest default and platform list in the priority chain).
    if let Some(record) = store.get(&worker.id()) {
        worker.debug = record.debug.unwrap_or(false);
        worker.heartbeat_disabled = record.heartbeat_disabled.unwrap_or(false);
        worker.pause_on_start = record.pause_on_start.unwrap_or(false);
    }

    let (enabled, cause) = resolve_enabled(&worker, &manifest.enabled, config, store);
    worker.enabled = enabled;
    worker.enabled_cause = cause;

    Ok(worker)
}

/// Priority order: persistent record, manifest default, platform
/// default-workers list, otherwise disabled.
fn resolve_enabled(
    worker: &Worker,
    manifest_enabled: &Option<bool>,
    config: &Config,
    store: &WorkerStateStore,
) -> (bool, String) {
    if let Some(enabled) = store.get(&worker.id()).and_then(|r| r.enabled) {
        return (enabled, "persistent state".to_string());
    }
    if let Some(enabled) = manifest_enabled {
        return (*enabled, "worker manifest".to_string());
    }
    if config
        .default_workers
        .iter()
        .any(|n| worker.name == n.as_str())
    {
        return (true, "platform default".to_string());
    }
    (false, String::new())
}

/// Command-line switches override the resolved enabled state: an explicit
/// start list disables everything else, a skip list disables its subset.
pub fn apply_cli_filters(collection: &mut WorkerCollection, config: &Config) {
    if !config.only_workers.is_empty() {
        for worker in collection.iter_mut() {
            if worker.kind.unkillable() {
                continue;
            }
            if !config.only_workers.iter().any(|n| worker.name == n.as_str()) {
                worker.enabled = false;
                worker.enabled_cause = "not in start list".to_string();
            }
        }
    }
    for name in &config.skip_workers {
        let name = WorkerName::new(name.clone());
        if let Some(worker) = collection.get_mut(&name) {
            if worker.kind.unkillable() {
                tracing::warn!(worker = %name, "cannot skip unkillable worker");
                continue;
            }
            worker.enabled = false;
            worker.enabled_cause = "skipped on command line".to_string();
        }
    }
}

/// The supervisor's own placeholder entry: always online, never killable.
pub fn procman_placeholder() -> Worker {
    let executable = std::env::current_exe().unwrap_or_else(|_| "procmand".into());
    let mut worker = Worker::new("procman", executable);
    worker.kind = WorkerKind::Procman;
    worker.enabled = true;
    worker.enabled_cause = "supervisor self".to_string();
    worker.pid = Some(std::process::id());
    worker.status = WorkerStatus::Online;
    worker
}

/// The broker sibling entry: started like a worker, never killable.
pub fn broker_worker(executable: &Path) -> Worker {
    let mut worker = Worker::new(crate::ipc::BROKER_NAME, executable);
    worker.kind = WorkerKind::Broker;
    worker.enabled = true;
    worker.enabled_cause = "broker sibling".to_string();
    worker
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
