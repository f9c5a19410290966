// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders and fixtures shared with other crates' tests.

use crate::status::WorkerStatus;
use crate::worker::{MemleakGuard, Worker, WorkerKind, WorkerName};
use std::time::Duration;

/// Builder for [`Worker`] fixtures.
pub struct WorkerBuilder {
    worker: Worker,
}

impl WorkerBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            worker: Worker::new(name, format!("/opt/workers/{name}/{name}Worker")),
        }
    }

    pub fn executable(mut self, path: &str) -> Self {
        self.worker.executable = path.into();
        self
    }

    pub fn enabled(mut self) -> Self {
        self.worker.enabled = true;
        self.worker.enabled_cause = "test".to_string();
        self
    }

    pub fn status(mut self, status: WorkerStatus) -> Self {
        self.worker.status = status;
        if status == WorkerStatus::Online {
            self.worker.went_online = true;
        }
        self
    }

    pub fn kind(mut self, kind: WorkerKind) -> Self {
        self.worker.kind = kind;
        self
    }

    pub fn require(mut self, names: &[&str]) -> Self {
        self.worker.require = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn after(mut self, names: &[&str]) -> Self {
        self.worker.after = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn before(mut self, names: &[&str]) -> Self {
        self.worker.before = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.worker.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn memleak_guard(mut self, trigger_mb: u64, collect_core: bool) -> Self {
        self.worker.memleak_guard = MemleakGuard {
            enabled: true,
            trigger_mb,
            collect_core,
        };
        self
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.worker.startup_timeout = Some(timeout);
        self
    }

    pub fn respawn_count(mut self, cap: u32) -> Self {
        self.worker.respawn_count = cap;
        self
    }

    pub fn running(mut self, pid: u32) -> Self {
        self.worker.pid = Some(pid);
        self
    }

    pub fn build(self) -> Worker {
        self.worker
    }
}

/// Shorthand for a [`WorkerName`].
pub fn name(s: &str) -> WorkerName {
    WorkerName::new(s)
}
