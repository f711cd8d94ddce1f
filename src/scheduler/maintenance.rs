//! Periodic housekeeping shared by both workflows.

use super::{JobError, JobStatus};
use crate::lottery::plan_daily_lottery;
use crate::store::LotteryStore;
use crate::unity::UnityPlanner;
use chrono::NaiveDate;
use std::sync::Arc;

/// Result of one maintenance tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Top-level unities created.
    pub seeded: usize,
    /// Unities created or queued for re-unification by the planner.
    pub planned: usize,
    /// Whether a daily lottery was created.
    pub lottery_planned: bool,
    /// One message per failed step.
    pub failures: Vec<String>,
}

impl MaintenanceReport {
    /// Converts the report into a scheduler result.
    ///
    /// Any failed step makes the tick an error, after every step has run.
    pub fn into_status(self) -> Result<JobStatus, JobError> {
        if !self.failures.is_empty() {
            return Err(self.failures.join("; ").into());
        }
        let worked = self.seeded > 0 || self.planned > 0 || self.lottery_planned;
        Ok(if worked {
            JobStatus::Worked
        } else {
            JobStatus::Idle
        })
    }
}

/// Seeds top-level unities, catches the planner up and plans the daily
/// lottery. Each step runs regardless of the others.
pub struct Maintenance {
    planner: UnityPlanner,
    lotteries: Option<Arc<dyn LotteryStore>>,
}

impl Maintenance {
    /// `lotteries` is `None` when daily lotteries are disabled.
    pub fn new(planner: UnityPlanner, lotteries: Option<Arc<dyn LotteryStore>>) -> Self {
        Self { planner, lotteries }
    }

    /// Runs one tick for the UTC calendar day `today`.
    pub fn run_once(&self, today: NaiveDate) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match self.planner.seed_top_level() {
            Ok(created) => report.seeded = created,
            Err(e) => {
                tracing::error!(error = %e, "Top-level seeding failed");
                report.failures.push(format!("seeding: {}", e));
            }
        }

        match self.planner.catch_up() {
            Ok(touched) => report.planned = touched,
            Err(e) => {
                tracing::error!(error = %e, "Planner catch-up failed");
                report.failures.push(format!("catch-up: {}", e));
            }
        }

        if let Some(lotteries) = &self.lotteries {
            match plan_daily_lottery(lotteries.as_ref(), today) {
                Ok((_, created)) => report.lottery_planned = created,
                Err(e) => {
                    tracing::error!(error = %e, %today, "Daily lottery planning failed");
                    report.failures.push(format!("daily lottery: {}", e));
                }
            }
        }

        report
    }
}
