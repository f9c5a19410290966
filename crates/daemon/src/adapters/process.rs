// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real process adapter on tokio, nix and sysinfo.

use super::{ProcessAdapter, SpawnSpec};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use procman_core::{Event, WorkerName};
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{PidExt, ProcessExt, System, SystemExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::UnboundedSender;

/// Child stdout lines starting with this prefix are structured debug
/// output and are re-emitted unprefixed on the debug channel.
pub const DEBUG_LINE_PREFIX: &str = "@dbg ";

/// How long the core collector may run before the stop proceeds anyway.
const CORE_DUMP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct TokioProcessAdapter {
    sys: Arc<Mutex<System>>,
}

impl TokioProcessAdapter {
    pub fn new() -> Self {
        Self {
            sys: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl Default for TokioProcessAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessAdapter for TokioProcessAdapter {
    fn spawn(&self, spec: SpawnSpec, events: UnboundedSender<Event>) -> std::io::Result<u32> {
        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().cloned())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        if spec.cwd.is_dir() {
            cmd.current_dir(&spec.cwd);
        }

        let mut child = cmd.spawn()?;
        let pid = child.id().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "child exited before reporting a pid")
        })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(
                spec.name.clone(),
                "stdout",
                stdout,
                spec.ready_sentinel.clone(),
                events.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(
                spec.name.clone(),
                "stderr",
                stderr,
                None,
                events.clone(),
            ));
        }

        let name = spec.name;
        tokio::spawn(async move {
            let (exit_code, signal) = match child.wait().await {
                Ok(status) => (status.code(), status.signal().map(signal_name)),
                Err(err) => {
                    tracing::warn!(worker = %name, error = %err, "wait on child failed");
                    (None, None)
                }
            };
            let _ = events.send(Event::ChildExited {
                name,
                exit_code,
                signal,
            });
        });

        Ok(pid)
    }

    fn stop(&self, name: &WorkerName, pid: u32, grace: Duration, collect_core: Option<String>) {
        let name = name.clone();
        tokio::spawn(async move {
            if let Some(collector) = collect_core {
                run_core_collector(&name, pid, &collector).await;
            }

            tracing::info!(worker = %name, pid, "sending SIGTERM");
            send_signal(&name, pid, Signal::SIGTERM);

            tokio::time::sleep(grace).await;
            if pid_alive(pid) {
                tracing::warn!(worker = %name, pid, "still alive after grace period, sending SIGKILL");
                send_signal(&name, pid, Signal::SIGKILL);
            }
        });
    }

    fn signal_debug(&self, name: &WorkerName, pid: u32) {
        send_signal(name, pid, Signal::SIGUSR1);
    }

    fn alive(&self, pid: u32) -> bool {
        pid_alive(pid)
    }

    fn rss_mb(&self, pid: u32) -> Option<u64> {
        let mut sys = self.sys.lock();
        let pid = sysinfo::Pid::from_u32(pid);
        if !sys.refresh_process(pid) {
            return None;
        }
        sys.process(pid).map(|p| p.memory() / (1024 * 1024))
    }
}

fn pid_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

fn send_signal(name: &WorkerName, pid: u32, signal: Signal) {
    if let Err(err) = kill(Pid::from_raw(pid as i32), signal) {
        tracing::warn!(
            worker = %name,
            pid,
            signal = signal.as_str(),
            error = %err,
            "signal delivery failed"
        );
    }
}

fn signal_name(raw: i32) -> String {
    match Signal::try_from(raw) {
        Ok(signal) => signal.as_str().to_string(),
        Err(_) => format!("signal {raw}"),
    }
}

async fn run_core_collector(name: &WorkerName, pid: u32, collector: &str) {
    tracing::info!(worker = %name, pid, collector, "collecting core before stop");
    let result = tokio::time::timeout(
        CORE_DUMP_TIMEOUT,
        tokio::process::Command::new(collector)
            .arg(pid.to_string())
            .stdin(Stdio::null())
            .output(),
    )
    .await;
    match result {
        Ok(Ok(output)) if output.status.success() => {
            tracing::info!(worker = %name, pid, "core collected");
        }
        Ok(Ok(output)) => {
            tracing::warn!(
                worker = %name,
                pid,
                exit_code = output.status.code().unwrap_or(-1),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "core collector failed"
            );
        }
        Ok(Err(err)) => {
            tracing::warn!(worker = %name, pid, error = %err, "core collector did not run");
        }
        Err(_) => {
            tracing::warn!(worker = %name, pid, "core collector timed out");
        }
    }
}

/// Split a child stream into lines: debug-prefixed lines are re-emitted
/// unprefixed, a ready sentinel becomes [`Event::BrokerReady`], everything
/// else is forwarded with the worker name attached.
async fn forward_lines<R>(
    name: WorkerName,
    stream: &'static str,
    reader: R,
    ready_sentinel: Option<String>,
    events: UnboundedSender<Event>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(rest) = line.strip_prefix(DEBUG_LINE_PREFIX) {
                    tracing::debug!(target: "procman::child::debug", "{rest}");
                    continue;
                }
                if ready_sentinel.as_deref() == Some(line.trim()) {
                    let _ = events.send(Event::BrokerReady);
                    continue;
                }
                tracing::info!(target: "procman::child", worker = %name, stream, "{line}");
            }
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(worker = %name, stream, error = %err, "output stream closed");
                break;
            }
        }
    }
}
