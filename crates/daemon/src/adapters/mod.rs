// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process adapter seam.
//!
//! The supervisor drives children through this trait so its behavior is
//! fully testable with a fake; the real implementation lives in
//! [`process`].

mod process;

pub use process::{TokioProcessAdapter, DEBUG_LINE_PREFIX};

use procman_core::{Event, WorkerName};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Everything needed to spawn one child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    pub name: WorkerName,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Extra variables on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Stdout line that marks the child ready (the broker's READY).
    pub ready_sentinel: Option<String>,
}

/// Spawning, signalling and sampling of OS children.
///
/// Implementations observe exits asynchronously and report them as
/// [`Event::ChildExited`] on the sender given to [`ProcessAdapter::spawn`].
pub trait ProcessAdapter: Clone + Send + Sync + 'static {
    /// Start the child; returns its pid. Lifecycle events flow to `events`.
    fn spawn(&self, spec: SpawnSpec, events: UnboundedSender<Event>) -> std::io::Result<u32>;

    /// Graceful stop: run the core collector first when requested, then
    /// terminate signal, then forceful kill after `grace` if the pid is
    /// still alive.
    fn stop(&self, name: &WorkerName, pid: u32, grace: Duration, collect_core: Option<String>);

    /// Debugger-activation signal (SIGUSR1).
    fn signal_debug(&self, name: &WorkerName, pid: u32);

    fn alive(&self, pid: u32) -> bool;

    /// Resident set size in MB, if the process exists.
    fn rss_mb(&self, pid: u32) -> Option<u64>;
}
