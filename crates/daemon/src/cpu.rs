// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CPU-load sensor.
//!
//! Samples aggregate CPU usage on a fixed cadence and exposes a single
//! "pressure high" predicate. Heartbeat handling consults it to avoid
//! restarting workers that merely starved for cycles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{CpuExt, System, SystemExt};

#[derive(Clone, Default)]
pub struct CpuSensor {
    high: Arc<AtomicBool>,
}

impl CpuSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while the last sample exceeded the configured threshold.
    pub fn is_high(&self) -> bool {
        self.high.load(Ordering::Relaxed)
    }

    /// Spawn the sampling task.
    ///
    /// Usage percentages need two refreshes to be meaningful, so pressure
    /// can only report high from the second sample on.
    pub fn spawn_sampler(&self, interval: Duration, threshold: f32) {
        let high = Arc::clone(&self.high);
        tokio::spawn(async move {
            let mut sys = System::new();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                sys.refresh_cpu();
                let usage = sys.global_cpu_info().cpu_usage();
                let was_high = high.swap(usage >= threshold, Ordering::Relaxed);
                if was_high != (usage >= threshold) {
                    tracing::info!(usage, threshold, high = usage >= threshold, "cpu pressure changed");
                }
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn force(&self, high: bool) {
        self.high.store(high, Ordering::Relaxed);
    }
}
