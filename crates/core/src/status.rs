// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker and supervisor status machines.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one worker, driven by the supervisor tick and event handlers.
///
/// `Offline` and `Disabled` are stable; everything else is in motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Init,
    Disabled,
    Queued,
    Starting,
    Stopping,
    Restarting,
    Offline,
    Online,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Init => "init",
            WorkerStatus::Disabled => "disabled",
            WorkerStatus::Queued => "queued",
            WorkerStatus::Starting => "starting",
            WorkerStatus::Stopping => "stopping",
            WorkerStatus::Restarting => "restarting",
            WorkerStatus::Offline => "offline",
            WorkerStatus::Online => "online",
        }
    }

    /// Statuses that represent a start or stop already in flight.
    ///
    /// A worker in one of these must not be re-queued: the status machine
    /// is what prevents two concurrent start/stop operations per worker.
    pub fn in_flight(self) -> bool {
        matches!(
            self,
            WorkerStatus::Queued | WorkerStatus::Starting | WorkerStatus::Stopping
        )
    }

    /// Stable resting statuses (no pending transition).
    pub fn settled(self) -> bool {
        matches!(self, WorkerStatus::Offline | WorkerStatus::Disabled)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of the supervisor itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    Init,
    Starting,
    Online,
    Stopping,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SupervisorState::Init => "init",
            SupervisorState::Starting => "starting",
            SupervisorState::Online => "online",
            SupervisorState::Stopping => "stopping",
        })
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
