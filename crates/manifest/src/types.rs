// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed model of the worker meta-manifest.

use serde::{Deserialize, Deserializer, Serialize};

/// Per-worker descriptor, merged from the global defaults document, the
/// worker's own descriptor file and an optional override file.
///
/// Every field is optional; unknown fields are tolerated so manifests can
/// carry application-level keys the supervisor does not interpret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerManifest {
    /// Executable path, relative to the worker directory.
    /// Defaults to `<name>Worker` plus the platform executable suffix.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// `tags` as a list, or the singular `tag` form with one string.
    #[serde(default, alias = "tag", deserialize_with = "string_or_list")]
    pub tags: Vec<String>,

    /// Names (or `tag:<t>` groups) that must be online before this worker starts.
    #[serde(default)]
    pub require: Vec<String>,

    /// Names that must be started first but are not required online.
    #[serde(default)]
    pub after: Vec<String>,

    /// Names this worker must precede.
    #[serde(default)]
    pub before: Vec<String>,

    /// Deprecated alias of `after`; folded in by [`WorkerManifest::normalize`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends: Option<Vec<String>>,

    #[serde(default)]
    pub enabled: Option<bool>,

    /// Milliseconds a spawned child may take to come online.
    #[serde(default)]
    pub startup_timeout: Option<u64>,

    /// Exponent cap for respawn back-off.
    #[serde(default)]
    pub respawn_count: Option<u32>,

    /// Milliseconds of sustained health before the respawn counter resets.
    #[serde(default)]
    pub respawn_clear_timeout: Option<u64>,

    #[serde(default)]
    pub liveness_counter: Option<u32>,

    #[serde(default)]
    pub memleak_guard_enabled: Option<bool>,

    /// Restart threshold in MB of resident set size.
    #[serde(default)]
    pub memleak_guard_trigger: Option<u64>,

    #[serde(default)]
    pub memleak_guard_collect_core: Option<bool>,
}

impl WorkerManifest {
    /// Fold the deprecated `depends` key into `after`.
    ///
    /// When both appear, `after` wins and the alias is dropped.
    pub fn normalize(&mut self, worker: &str) {
        let Some(depends) = self.depends.take() else {
            return;
        };
        if self.after.is_empty() {
            tracing::warn!(
                worker,
                "manifest key 'depends' is deprecated, use 'after'"
            );
            self.after = depends;
        } else {
            tracing::warn!(
                worker,
                "manifest carries both 'after' and deprecated 'depends'; 'depends' ignored"
            );
        }
    }

    /// Executable path relative to the worker directory.
    pub fn executable_name(&self, worker: &str) -> String {
        match &self.path {
            Some(path) => path.clone(),
            None => format!("{worker}Worker{}", std::env::consts::EXE_SUFFIX),
        }
    }
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(tag) => vec![tag],
        OneOrMany::Many(tags) => tags,
    })
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
