// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned JSON document store for per-worker desired state.
//!
//! The document survives supervisor restarts; everything else about a
//! worker is rebuilt from discovery. Holds exactly the four desired-state
//! flags: enabled, debug, heartbeatDisabled, pauseOnStart.

use parking_lot::Mutex;
use procman_core::{WorkerId, WorkerName};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a valid state document: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported state schema version {found} (supported: 1..={SCHEMA_VERSION})")]
    UnsupportedVersion { found: u64 },
}

/// Persistent record for one worker, keyed by `name + ":" + path`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStateRecord {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_on_start: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Document {
    version: u32,
    workers: BTreeMap<String, WorkerStateRecord>,
}

/// The store. All mutations go through [`WorkerStateStore::update`],
/// which serializes read-modify-write cycles and writes through to disk
/// atomically (temp file, fsync, rename).
#[derive(Debug)]
pub struct WorkerStateStore {
    path: PathBuf,
    doc: Mutex<Document>,
}

impl WorkerStateStore {
    /// Open the document at `path`, applying schema upgrades. A missing
    /// file yields an empty current-version document.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let doc = match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let value: Value =
                    serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
                        path: path.clone(),
                        source,
                    })?;
                Self::decode(&path, value)?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Document {
                version: SCHEMA_VERSION,
                workers: BTreeMap::new(),
            },
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.clone(),
                    source,
                })
            }
        };
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    fn decode(path: &Path, value: Value) -> Result<Document, StoreError> {
        match value.get("version").and_then(Value::as_u64) {
            Some(2) => {
                serde_json::from_value(value).map_err(|source| StoreError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
            }
            Some(1) => Ok(upgrade_v1(value)),
            Some(found) => Err(StoreError::UnsupportedVersion { found }),
            None => Err(StoreError::UnsupportedVersion { found: 0 }),
        }
    }

    pub fn get(&self, id: &WorkerId) -> Option<WorkerStateRecord> {
        self.doc.lock().workers.get(id.as_str()).cloned()
    }

    /// Read-modify-write one worker's record and persist the document.
    ///
    /// The record is created on first use with identity fields filled in.
    pub fn update<F>(
        &self,
        name: &WorkerName,
        executable: &Path,
        mutate: F,
    ) -> Result<WorkerStateRecord, StoreError>
    where
        F: FnOnce(&mut WorkerStateRecord),
    {
        let id = WorkerId::new(name, executable);
        let mut doc = self.doc.lock();
        let record = doc
            .workers
            .entry(id.as_str().to_string())
            .or_insert_with(|| WorkerStateRecord {
                id: id.as_str().to_string(),
                name: name.to_string(),
                path: executable.display().to_string(),
                ..WorkerStateRecord::default()
            });
        mutate(record);
        let updated = record.clone();
        self.persist(&doc)?;
        Ok(updated)
    }

    /// Drop a worker's record, if present.
    pub fn remove(&self, id: &WorkerId) -> Result<(), StoreError> {
        let mut doc = self.doc.lock();
        if doc.workers.remove(id.as_str()).is_some() {
            self.persist(&doc)?;
        }
        Ok(())
    }

    /// Write the current document to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        let doc = self.doc.lock();
        self.persist(&doc)
    }

    /// Atomic write: temp file in the same directory, fsync, rename.
    fn persist(&self, doc: &Document) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(doc).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        {
            let mut file = std::fs::File::create(&tmp).map_err(io_err)?;
            file.write_all(&payload).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

/// v1 → v2: keys migrate from bare `name` to the compound `id`, missing
/// `heartbeatDisabled` defaults to false, and the obsolete `args`,
/// `depends` and `registeredExplicitly` fields are dropped.
fn upgrade_v1(value: Value) -> Document {
    let mut workers = BTreeMap::new();
    let entries = value
        .get("workers")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    for (key, entry) in entries {
        let Some(fields) = entry.as_object() else {
            tracing::warn!(worker = %key, "dropping malformed v1 record");
            continue;
        };
        let name = fields
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&key)
            .to_string();
        let Some(path) = fields.get("path").and_then(Value::as_str) else {
            tracing::warn!(worker = %name, "dropping v1 record without a path");
            continue;
        };
        let id = format!("{name}:{path}");
        let flag = |key: &str| fields.get(key).and_then(Value::as_bool);
        workers.insert(
            id.clone(),
            WorkerStateRecord {
                id,
                name,
                path: path.to_string(),
                enabled: flag("enabled"),
                debug: flag("debug"),
                heartbeat_disabled: Some(flag("heartbeatDisabled").unwrap_or(false)),
                pause_on_start: flag("pauseOnStart"),
            },
        );
    }

    Document {
        version: SCHEMA_VERSION,
        workers,
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
