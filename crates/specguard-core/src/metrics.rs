//! Global atomic counters for SpecGuard runs.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters: no allocations, no locking.
pub struct Metrics {
    episodes_finished: AtomicU64,
    rounds_consumed: AtomicU64,
    tool_calls: AtomicU64,
    interrupts_delivered: AtomicU64,
    adapter_errors: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            episodes_finished: AtomicU64::new(0),
            rounds_consumed: AtomicU64::new(0),
            tool_calls: AtomicU64::new(0),
            interrupts_delivered: AtomicU64::new(0),
            adapter_errors: AtomicU64::new(0),
        }
    }

    pub fn inc_episodes(&self) {
        self.episodes_finished.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "episodes_finished", "counter incremented");
    }

    pub fn inc_rounds(&self) {
        self.rounds_consumed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rounds_consumed", "counter incremented");
    }

    pub fn inc_tool_calls(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tool_calls", "counter incremented");
    }

    pub fn inc_interrupts(&self) {
        self.interrupts_delivered.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "interrupts_delivered", "counter incremented");
    }

    pub fn inc_adapter_errors(&self) {
        self.adapter_errors.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "adapter_errors", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            episodes_finished = self.episodes_finished(),
            rounds_consumed = self.rounds_consumed(),
            tool_calls = self.tool_calls(),
            interrupts_delivered = self.interrupts_delivered(),
            adapter_errors = self.adapter_errors(),
        );
    }

    pub fn episodes_finished(&self) -> u64 {
        self.episodes_finished.load(Ordering::Relaxed)
    }

    pub fn rounds_consumed(&self) -> u64 {
        self.rounds_consumed.load(Ordering::Relaxed)
    }

    pub fn tool_calls(&self) -> u64 {
        self.tool_calls.load(Ordering::Relaxed)
    }

    pub fn interrupts_delivered(&self) -> u64 {
        self.interrupts_delivered.load(Ordering::Relaxed)
    }

    pub fn adapter_errors(&self) -> u64 {
        self.adapter_errors.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.episodes_finished.store(0, Ordering::Relaxed);
        self.rounds_consumed.store(0, Ordering::Relaxed);
        self.tool_calls.store(0, Ordering::Relaxed);
        self.interrupts_delivered.store(0, Ordering::Relaxed);
        self.adapter_errors.store(0, Ordering::Relaxed);
    }
}
