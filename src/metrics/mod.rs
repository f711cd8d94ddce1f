//! Prometheus metrics for the oracle workflows.
//!
//! # Metrics Exposed
//!
//! ## Selection
//! - `optical_oracle_selector_draws_total` - Selections served from an oracle draw
//! - `optical_oracle_selector_failures_total` - Selections that failed to obtain a draw
//! - `optical_oracle_decisions_dropped_total` - Decision records dropped before persistence
//!
//! ## Notifications
//! - `optical_oracle_notifications_published_total` - Progress events queued
//! - `optical_oracle_notifications_dropped_total` - Progress events dropped
//!
//! ## Scheduler (labelled by `job`)
//! - `optical_oracle_job_runs_total`
//! - `optical_oracle_job_worked_total`
//! - `optical_oracle_job_errors_total`
//! - `optical_oracle_job_panics_total`
//!
//! The HTTP exporter is behind the `metrics` feature; the registry itself is
//! always available.

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
