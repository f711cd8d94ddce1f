//! Metrics collection and registry.

use crate::notify::Notifier;
use crate::oracle::EntropyOracle;
use crate::scheduler::JobStats;
use crate::selection::Selector;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of workflow counters for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Successful selector draws.
    pub selector_draws: u64,
    /// Selector draws that failed at the entropy source or oracle.
    pub selector_failures: u64,
    /// Decision records dropped because the recorder queue was full.
    pub decisions_dropped: u64,
    /// Progress events accepted by the outbound queue.
    pub notifications_published: u64,
    /// Progress events dropped by the outbound queue.
    pub notifications_dropped: u64,
    /// Per-job scheduler counters.
    pub jobs: BTreeMap<String, JobStats>,
}

/// Prometheus metrics registry for the oracle workflows.
pub struct MetricsRegistry {
    registry: Registry,

    // Selection
    selector_draws: IntCounter,
    selector_failures: IntCounter,
    decisions_dropped: IntCounter,

    // Notifications
    notifications_published: IntCounter,
    notifications_dropped: IntCounter,

    // Scheduler
    job_runs: IntCounterVec,
    job_worked: IntCounterVec,
    job_errors: IntCounterVec,
    job_panics: IntCounterVec,
}

impl MetricsRegistry {
    /// Creates a new registry with all workflow metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let selector_draws = IntCounter::new(
            "optical_oracle_selector_draws_total",
            "Selections served from an oracle draw",
        )?;
        let selector_failures = IntCounter::new(
            "optical_oracle_selector_failures_total",
            "Selections that failed to obtain a draw",
        )?;
        let decisions_dropped = IntCounter::new(
            "optical_oracle_decisions_dropped_total",
            "Decision records dropped before persistence",
        )?;
        let notifications_published = IntCounter::new(
            "optical_oracle_notifications_published_total",
            "Progress events queued for delivery",
        )?;
        let notifications_dropped = IntCounter::new(
            "optical_oracle_notifications_dropped_total",
            "Progress events dropped by the outbound queue",
        )?;

        let job_runs = IntCounterVec::new(
            Opts::new("optical_oracle_job_runs_total", "Scheduler ticks per job"),
            &["job"],
        )?;
        let job_worked = IntCounterVec::new(
            Opts::new("optical_oracle_job_worked_total", "Ticks that performed work"),
            &["job"],
        )?;
        let job_errors = IntCounterVec::new(
            Opts::new("optical_oracle_job_errors_total", "Ticks that returned an error"),
            &["job"],
        )?;
        let job_panics = IntCounterVec::new(
            Opts::new("optical_oracle_job_panics_total", "Ticks that panicked"),
            &["job"],
        )?;

        registry.register(Box::new(selector_draws.clone()))?;
        registry.register(Box::new(selector_failures.clone()))?;
        registry.register(Box::new(decisions_dropped.clone()))?;
        registry.register(Box::new(notifications_published.clone()))?;
        registry.register(Box::new(notifications_dropped.clone()))?;
        registry.register(Box::new(job_runs.clone()))?;
        registry.register(Box::new(job_worked.clone()))?;
        registry.register(Box::new(job_errors.clone()))?;
        registry.register(Box::new(job_panics.clone()))?;

        Ok(Self {
            registry,
            selector_draws,
            selector_failures,
            decisions_dropped,
            notifications_published,
            notifications_dropped,
            job_runs,
            job_worked,
            job_errors,
            job_panics,
        })
    }

    /// Updates all metrics from a snapshot.
    ///
    /// Snapshots carry running totals; counters advance by the difference.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        advance(&self.selector_draws, snapshot.selector_draws);
        advance(&self.selector_failures, snapshot.selector_failures);
        advance(&self.decisions_dropped, snapshot.decisions_dropped);
        advance(&self.notifications_published, snapshot.notifications_published);
        advance(&self.notifications_dropped, snapshot.notifications_dropped);

        for (job, stats) in &snapshot.jobs {
            let labels = [job.as_str()];
            advance(&self.job_runs.with_label_values(&labels), stats.runs);
            advance(&self.job_worked.with_label_values(&labels), stats.worked);
            advance(&self.job_errors.with_label_values(&labels), stats.errors);
            advance(&self.job_panics.with_label_values(&labels), stats.panics);
        }
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

impl MetricsSnapshot {
    /// Creates a snapshot from the live workflow components.
    pub fn from_components(
        selector: &dyn Selector,
        oracle: &EntropyOracle,
        notifier: &Notifier,
        jobs: BTreeMap<String, JobStats>,
    ) -> Self {
        let stats = selector.stats();
        Self {
            selector_draws: stats.draws,
            selector_failures: stats.failures,
            decisions_dropped: oracle.dropped_decisions(),
            notifications_published: notifier.published(),
            notifications_dropped: notifier.dropped(),
            jobs,
        }
    }
}
