//! Counters for captures, analyses and overlays.
//!
//! Cheap to clone and safe to share across tasks; every counter is a relaxed
//! atomic so recording never blocks the capture or overlay paths.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Times a single operation.
#[derive(Debug)]
pub struct OperationTimer {
    start_time: Instant,
}

impl OperationTimer {
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    /// Returns elapsed time since construction in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }
}

/// Point-in-time copy of [`EngineMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub captures_total: u64,
    pub captures_failed: u64,
    pub avg_capture_ms: f32,
    pub analyses_run: u64,
    pub analyses_skipped: u64,
    pub overlays_placed: u64,
    pub overlays_dismissed: u64,
}

/// Aggregated metrics for the engine instance.
#[derive(Clone, Debug, Default)]
pub struct EngineMetrics {
    captures_total: Arc<AtomicU64>,
    captures_failed: Arc<AtomicU64>,
    total_capture_ms: Arc<AtomicU64>,
    analyses_run: Arc<AtomicU64>,
    analyses_skipped: Arc<AtomicU64>,
    overlays_placed: Arc<AtomicU64>,
    overlays_dismissed: Arc<AtomicU64>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful capture and its duration.
    pub fn record_capture_success(&self, duration_ms: u64) {
        self.captures_total.fetch_add(1, Ordering::Relaxed);
        self.total_capture_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    /// Records a failed capture and its duration.
    pub fn record_capture_failure(&self, duration_ms: u64) {
        self.captures_total.fetch_add(1, Ordering::Relaxed);
        self.captures_failed.fetch_add(1, Ordering::Relaxed);
        self.total_capture_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn record_analysis_run(&self) {
        self.analyses_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analysis_skipped(&self) {
        self.analyses_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overlay_placed(&self) {
        self.overlays_placed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overlays_dismissed(&self, count: u64) {
        self.overlays_dismissed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn captures_total(&self) -> u64 {
        self.captures_total.load(Ordering::Relaxed)
    }

    pub fn captures_failed(&self) -> u64 {
        self.captures_failed.load(Ordering::Relaxed)
    }

    /// Returns the average capture time (ms) over all attempts.
    pub fn avg_capture_ms(&self) -> f32 {
        let total = self.captures_total();
        if total == 0 {
            return 0.0;
        }
        self.total_capture_ms.load(Ordering::Relaxed) as f32 / total as f32
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            captures_total: self.captures_total(),
            captures_failed: self.captures_failed(),
            avg_capture_ms: self.avg_capture_ms(),
            analyses_run: self.analyses_run.load(Ordering::Relaxed),
            analyses_skipped: self.analyses_skipped.load(Ordering::Relaxed),
            overlays_placed: self.overlays_placed.load(Ordering::Relaxed),
            overlays_dismissed: self.overlays_dismissed.load(Ordering::Relaxed),
        }
    }
}
