// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment lookups: state directory resolution and tunable overrides.

use std::path::PathBuf;
use std::time::Duration;

/// Resolve the supervisor state directory.
///
/// Priority: `$PROCMAN_STATE_DIR`, then `$XDG_STATE_HOME/procman`, then
/// `~/.local/state/procman`.
pub fn state_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("PROCMAN_STATE_DIR") {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        if !xdg.is_empty() {
            return Some(PathBuf::from(xdg).join("procman"));
        }
    }
    dirs::home_dir().map(|home| home.join(".local/state/procman"))
}

/// Duration override from a `*_MS` environment variable.
pub fn duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
