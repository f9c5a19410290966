// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manifest loading: defaults ← descriptor ← override merge, then
//! decoding and validation.

use crate::types::WorkerManifest;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Descriptor file inside each worker directory.
pub const DESCRIPTOR_FILE: &str = "meta.json";
/// Optional per-worker override, merged over the descriptor.
pub const OVERRIDE_FILE: &str = "meta.override.json";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} must hold a JSON object")]
    NotAnObject { path: PathBuf },

    #[error("invalid manifest for worker '{worker}': {source}")]
    Schema {
        worker: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid manifest for worker '{worker}': {reason}")]
    Invalid { worker: String, reason: String },
}

/// Load and validate the manifest for one worker.
///
/// Merge order: global defaults document, then `meta.json` in the worker
/// directory, then `meta.override.json`; later keys replace earlier ones.
/// All three files are optional; an absent file contributes nothing.
pub fn load_manifest(
    worker_dir: &Path,
    worker: &str,
    defaults_path: Option<&Path>,
) -> Result<WorkerManifest, ManifestError> {
    let mut doc = Map::new();
    if let Some(path) = defaults_path {
        merge_file(&mut doc, path)?;
    }
    merge_file(&mut doc, &worker_dir.join(DESCRIPTOR_FILE))?;
    merge_file(&mut doc, &worker_dir.join(OVERRIDE_FILE))?;

    let mut manifest: WorkerManifest =
        serde_json::from_value(Value::Object(doc)).map_err(|source| ManifestError::Schema {
            worker: worker.to_string(),
            source,
        })?;
    manifest.normalize(worker);
    validate(&manifest, worker)?;
    Ok(manifest)
}

/// Merge one JSON object file into `doc`; a missing file is a no-op.
fn merge_file(doc: &mut Map<String, Value>, path: &Path) -> Result<(), ManifestError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(ManifestError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let value: Value = serde_json::from_str(&raw).map_err(|source| ManifestError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let Value::Object(fields) = value else {
        return Err(ManifestError::NotAnObject {
            path: path.to_path_buf(),
        });
    };
    for (key, value) in fields {
        doc.insert(key, value);
    }
    Ok(())
}

fn validate(manifest: &WorkerManifest, worker: &str) -> Result<(), ManifestError> {
    if manifest.path.as_deref().is_some_and(str::is_empty) {
        return Err(ManifestError::Invalid {
            worker: worker.to_string(),
            reason: "'path' must not be empty".to_string(),
        });
    }
    if manifest.memleak_guard_enabled == Some(true)
        && manifest.memleak_guard_trigger.unwrap_or(0) == 0
    {
        return Err(ManifestError::Invalid {
            worker: worker.to_string(),
            reason: "'memleakGuardTrigger' must be positive when the guard is enabled"
                .to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
