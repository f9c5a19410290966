// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon errors and their taxonomy mapping.

use procman_core::{DependencyError, ErrorKind, WorkerName};
use procman_manifest::ManifestError;
use procman_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcmanError {
    #[error("could not determine state directory")]
    NoStateDir,

    #[error("unknown worker '{0}'")]
    UnknownWorker(WorkerName),

    #[error("worker '{0}' is already registered")]
    AlreadyRegistered(WorkerName),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("cannot {action} unkillable worker '{name}'")]
    Unkillable {
        name: WorkerName,
        action: &'static str,
    },

    #[error("debug toggling is forbidden in the production environment")]
    DebugForbidden,

    #[error("spawn failed for '{name}': {source}")]
    Spawn {
        name: WorkerName,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcmanError {
    /// Failure class for callers that branch on the taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcmanError::UnknownWorker(_) => ErrorKind::NotFound,
            ProcmanError::AlreadyRegistered(_) => ErrorKind::Exists,
            ProcmanError::Dependency(_) | ProcmanError::Manifest(_) => ErrorKind::Invalid,
            ProcmanError::Unkillable { .. } | ProcmanError::DebugForbidden => ErrorKind::BadArg,
            ProcmanError::NoStateDir
            | ProcmanError::Store(_)
            | ProcmanError::Spawn { .. }
            | ProcmanError::Io(_) => ErrorKind::Failed,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
