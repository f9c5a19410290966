// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Memory guard: periodic RSS sampling for online workers.
//!
//! Samples are appended to a JSONL history file (size-rotated) and fed to
//! the supervisor as events; the restart decision itself happens in the
//! serialized loop so it sees consistent worker state.

use crate::adapters::ProcessAdapter;
use crate::collection::WorkerCollection;
use parking_lot::Mutex;
use procman_core::{Clock, Event, WorkerName};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Maximum history file size before rotation (10 MB).
const MAX_HISTORY_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated history files to keep.
const MAX_ROTATED_FILES: u32 = 3;

/// One line of guard history.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GuardRecord<'a> {
    timestamp_ms: u64,
    name: &'a WorkerName,
    pid: u32,
    rss_mb: u64,
    trigger_mb: u64,
}

/// Append-only JSONL history with size-based rotation.
pub struct HistoryWriter {
    path: PathBuf,
    enabled: bool,
}

impl HistoryWriter {
    pub fn new(path: PathBuf, enabled: bool) -> Self {
        Self { path, enabled }
    }

    fn append(&self, record: &GuardRecord<'_>) {
        if !self.enabled {
            return;
        }
        self.rotate_if_needed();
        let Ok(line) = serde_json::to_string(record) else {
            return;
        };
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(err) = result {
            tracing::warn!(error = %err, "memory guard history write failed");
        }
    }

    /// Shift `history` → `.1` → `.2` → `.3`, dropping the oldest.
    fn rotate_if_needed(&self) {
        let size = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return,
        };
        if size < MAX_HISTORY_SIZE {
            return;
        }
        let base = self.path.display().to_string();
        for i in (1..MAX_ROTATED_FILES).rev() {
            let _ = std::fs::rename(format!("{base}.{i}"), format!("{base}.{}", i + 1));
        }
        let _ = std::fs::rename(&self.path, format!("{base}.1"));
    }
}

/// The sampling half of the memory guard.
pub struct MemoryGuard<P: ProcessAdapter, C: Clock> {
    workers: Arc<Mutex<WorkerCollection>>,
    adapter: P,
    clock: C,
    history: HistoryWriter,
    events: UnboundedSender<Event>,
}

impl<P: ProcessAdapter, C: Clock> MemoryGuard<P, C> {
    pub fn new(
        workers: Arc<Mutex<WorkerCollection>>,
        adapter: P,
        clock: C,
        history: HistoryWriter,
        events: UnboundedSender<Event>,
    ) -> Self {
        Self {
            workers,
            adapter,
            clock,
            history,
            events,
        }
    }

    /// Sample every online worker with the guard enabled.
    pub fn sample_once(&self) {
        let candidates: Vec<(WorkerName, u32, u64)> = {
            let workers = self.workers.lock();
            workers
                .iter()
                .filter(|w| {
                    w.memleak_guard.enabled
                        && w.status == procman_core::WorkerStatus::Online
                })
                .filter_map(|w| {
                    w.pid.map(|pid| (w.name.clone(), pid, w.memleak_guard.trigger_mb))
                })
                .collect()
        };

        for (name, pid, trigger_mb) in candidates {
            let Some(rss_mb) = self.adapter.rss_mb(pid) else {
                continue;
            };
            self.history.append(&GuardRecord {
                timestamp_ms: self.clock.epoch_ms(),
                name: &name,
                pid,
                rss_mb,
                trigger_mb,
            });
            let _ = self.events.send(Event::MemorySampled { name, rss_mb });
        }
    }

    /// Run the sampler on its cadence until the event channel closes.
    pub fn spawn(self, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first interval tick fires immediately; skip it so freshly
            // spawned workers get a full interval before their first sample.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if self.events.is_closed() {
                    break;
                }
                self.sample_once();
            }
        });
    }
}

#[cfg(test)]
#[path = "memguard_tests.rs"]
mod tests;
