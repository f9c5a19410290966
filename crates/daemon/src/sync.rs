// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker-sync bookkeeping: which workers still need a snapshot push.
//!
//! `workerChanged` marks a worker dirty; after the sync debounce the
//! supervisor pushes every dirty worker's snapshot and clears only the
//! ones whose push succeeded.

use parking_lot::Mutex;
use procman_core::WorkerName;
use std::collections::HashSet;

#[derive(Default)]
pub struct SyncQueue {
    dirty: Mutex<HashSet<WorkerName>>,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_dirty(&self, name: &WorkerName) {
        self.dirty.lock().insert(name.clone());
    }

    /// Names currently awaiting a push.
    pub fn dirty(&self) -> Vec<WorkerName> {
        self.dirty.lock().iter().cloned().collect()
    }

    pub fn is_dirty(&self, name: &WorkerName) -> bool {
        self.dirty.lock().contains(name)
    }

    /// Clear entries after a successful push.
    pub fn mark_clean(&self, names: &[WorkerName]) {
        let mut dirty = self.dirty.lock();
        for name in names {
            dirty.remove(name);
        }
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
