//! Global atomic counters for execgate observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a CLI session ends).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free atomic counters.
pub struct Metrics {
    executions: AtomicU64,
    spawned: AtomicU64,
    denials: AtomicU64,
    approvals_requested: AtomicU64,
    timeouts: AtomicU64,
    cancellations: AtomicU64,
    spawn_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            executions: AtomicU64::new(0),
            spawned: AtomicU64::new(0),
            denials: AtomicU64::new(0),
            approvals_requested: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            cancellations: AtomicU64::new(0),
            spawn_failures: AtomicU64::new(0),
        }
    }

    /// A request entered the governor.
    pub fn inc_executions(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "executions", "counter incremented");
    }

    /// A child process was started.
    pub fn inc_spawned(&self) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "spawned", "counter incremented");
    }

    /// Policy or approver refused a request.
    pub fn inc_denials(&self) {
        self.denials.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "denials", "counter incremented");
    }

    pub fn inc_approvals_requested(&self) {
        self.approvals_requested.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "approvals_requested", "counter incremented");
    }

    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "timeouts", "counter incremented");
    }

    pub fn inc_cancellations(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cancellations", "counter incremented");
    }

    pub fn inc_spawn_failures(&self) {
        self.spawn_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "spawn_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            executions = self.executions(),
            spawned = self.spawned(),
            denials = self.denials(),
            approvals_requested = self.approvals_requested(),
            timeouts = self.timeouts(),
            cancellations = self.cancellations(),
            spawn_failures = self.spawn_failures(),
        );
    }

    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    pub fn denials(&self) -> u64 {
        self.denials.load(Ordering::Relaxed)
    }

    pub fn approvals_requested(&self) -> u64 {
        self.approvals_requested.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn cancellations(&self) -> u64 {
        self.cancellations.load(Ordering::Relaxed)
    }

    pub fn spawn_failures(&self) -> u64 {
        self.spawn_failures.load(Ordering::Relaxed)
    }
}
