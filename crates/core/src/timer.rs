// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Replaceable one-shot timer.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

/// One-shot timer whose deadline and callback can be replaced or cleared
/// idempotently.
///
/// `set` with a zero delay fires synchronously in the caller's context.
/// The timer is reentrant against itself: the callback may call `set` or
/// `clear` on the same timer (no lock is held while it runs).
///
/// Non-zero delays need a tokio runtime; stale firings are fenced by a
/// generation counter, so an aborted or replaced deadline can never run.
#[derive(Clone, Default)]
pub struct ReplaceableTimer {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    generation: u64,
    pending: Option<AbortHandle>,
}

impl ReplaceableTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any outstanding firing and schedule `f` after `delay`.
    pub fn set<F>(&self, delay: Duration, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            if let Some(pending) = inner.pending.take() {
                pending.abort();
            }
            inner.generation
        };

        if delay.is_zero() {
            f();
            return;
        }

        let shared = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let fire = {
                let mut inner = shared.lock();
                if inner.generation == generation {
                    inner.pending = None;
                    true
                } else {
                    false
                }
            };
            if fire {
                f();
            }
        });

        let mut inner = self.inner.lock();
        if inner.generation == generation {
            inner.pending = Some(handle.abort_handle());
        }
    }

    /// Cancel the pending firing, if any. Safe to call repeatedly.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        if let Some(pending) = inner.pending.take() {
            pending.abort();
        }
    }

    /// Whether a firing is currently scheduled.
    pub fn armed(&self) -> bool {
        self.inner.lock().pending.is_some()
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
