// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC listener for child processes.
//!
//! Children connect to the supervisor's Unix socket (path handed to them
//! in `PROCMAN_IPC_SOCKET`) and exchange JSON lines. The first frame must
//! be a hello naming the worker; afterwards the supervisor consumes
//! exception reports and, from the broker, the four liveness events. The
//! broker's write half is retained for worker-table snapshot pushes.

use procman_core::{Event, WorkerName};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;

/// Name the broker sibling announces itself under.
pub const BROKER_NAME: &str = "broker";

/// Stdout line the broker prints once it accepts connections.
pub const BROKER_READY_SENTINEL: &str = "READY";

/// One frame on a child's IPC connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IpcFrame {
    /// Connection handshake; must come first.
    Hello { name: String },
    /// Uncaught-error report from the child.
    Exception { stack: String },
    /// Liveness event relayed by the broker.
    Broker {
        event: BrokerEventKind,
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerEventKind {
    Connected,
    Disconnected,
    FailedHb,
    Recovered,
}

/// Snapshot of one worker pushed to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSnapshot {
    pub name: WorkerName,
    pub pid: Option<u32>,
    pub running: bool,
    pub enabled: bool,
    pub online: bool,
    pub heartbeat_disabled: bool,
    pub liveness_counter: u32,
}

/// Retained connection to the broker sibling for snapshot pushes.
#[derive(Default)]
pub struct BrokerLink {
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl BrokerLink {
    pub fn new() -> Self {
        Self::default()
    }

    async fn attach(&self, writer: OwnedWriteHalf) {
        *self.writer.lock().await = Some(writer);
    }

    pub async fn connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    pub async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }

    /// Push worker snapshots as one JSON line. A broken connection is
    /// dropped so the next push reports failure immediately.
    pub async fn push(&self, workers: &[WorkerSnapshot]) -> std::io::Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "broker not connected")
        })?;
        let mut line = serde_json::to_vec(&serde_json::json!({
            "kind": "workers",
            "workers": workers,
        }))?;
        line.push(b'\n');
        if let Err(err) = writer.write_all(&line).await {
            *guard = None;
            return Err(err);
        }
        Ok(())
    }
}

/// Bind the socket and accept child connections until dropped.
pub fn spawn_listener(
    socket_path: &Path,
    events: UnboundedSender<Event>,
    broker: std::sync::Arc<BrokerLink>,
) -> std::io::Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(socket_path)?;

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    tokio::spawn(serve_connection(stream, events.clone(), broker.clone()));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "ipc accept failed");
                }
            }
        }
    });
    Ok(())
}

async fn serve_connection(
    stream: UnixStream,
    events: UnboundedSender<Event>,
    broker: std::sync::Arc<BrokerLink>,
) {
    let (read_half, write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let name = match read_frame(&mut lines).await {
        Some(IpcFrame::Hello { name }) => WorkerName::new(name),
        Some(frame) => {
            tracing::warn!(?frame, "ipc connection did not start with hello, dropping");
            return;
        }
        None => return,
    };

    if name == BROKER_NAME {
        broker.attach(write_half).await;
        tracing::info!("broker ipc channel attached");
    }
    tracing::debug!(worker = %name, "ipc channel open");

    while let Some(frame) = read_frame(&mut lines).await {
        let event = match frame {
            IpcFrame::Hello { .. } => continue,
            IpcFrame::Exception { stack } => Event::ChildException {
                name: name.clone(),
                stack,
            },
            IpcFrame::Broker { event, name } => {
                let name = WorkerName::new(name);
                match event {
                    BrokerEventKind::Connected => Event::BrokerConnected { name },
                    BrokerEventKind::Disconnected => Event::BrokerDisconnected { name },
                    BrokerEventKind::FailedHb => Event::BrokerFailedHb { name },
                    BrokerEventKind::Recovered => Event::BrokerRecovered { name },
                }
            }
        };
        if events.send(event).is_err() {
            break;
        }
    }
    tracing::debug!(worker = %name, "ipc channel closed");
}

async fn read_frame<R>(lines: &mut tokio::io::Lines<BufReader<R>>) -> Option<IpcFrame>
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => return None,
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(frame) => return Some(frame),
            Err(err) => {
                tracing::warn!(error = %err, line = %line, "unparseable ipc frame");
            }
        }
    }
}

#[cfg(test)]
#[path = "ipc_tests.rs"]
mod tests;
