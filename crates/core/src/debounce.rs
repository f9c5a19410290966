// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named debounce registry and throttle gate.
//!
//! Call sites reference work by a string key; the registry coalesces
//! pending work per key, the gate enforces a minimum interval between
//! acquisitions per key.

use crate::timer::ReplaceableTimer;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Trailing-edge debounce per named key: while a firing is pending for a
/// key, another call replaces both its deadline and its callback.
#[derive(Default)]
pub struct DebounceRegistry {
    timers: Mutex<HashMap<String, ReplaceableTimer>>,
}

impl DebounceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` once `delay` has passed without another call for `key`.
    pub fn call<F>(&self, key: &str, delay: Duration, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let timer = {
            let mut timers = self.timers.lock();
            timers.entry(key.to_string()).or_default().clone()
        };
        timer.set(delay, f);
    }

    /// Drop any pending work for `key`.
    pub fn cancel(&self, key: &str) {
        if let Some(timer) = self.timers.lock().get(key) {
            timer.clear();
        }
    }
}

/// Minimum-interval gate per named key.
///
/// Callers serialize on the key; each acquisition completes no sooner
/// than `interval` after the previous one. The spawn gate uses this to
/// let at most one spawn begin per interval across all workers.
pub struct ThrottleGate {
    interval: Duration,
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Option<Instant>>>>>,
}

impl ThrottleGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for the key's slot, then until the interval has elapsed.
    pub async fn acquire(&self, key: &str) {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.to_string()).or_default())
        };
        let mut last = slot.lock().await;
        if let Some(previous) = *last {
            let due = previous + self.interval;
            let now = Instant::now();
            if due > now {
                tokio::time::sleep_until(due).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
#[path = "debounce_tests.rs"]
mod tests;
