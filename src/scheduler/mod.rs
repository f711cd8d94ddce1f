//! Fixed-interval job threads with cooperative cancellation.
//!
//! Each job runs on its own named thread and performs one bounded unit of
//! work per tick. A job that errors or panics is logged and retried on the
//! next tick; only the [`CancellationToken`] stops it.

mod cancel;
mod maintenance;

pub use cancel::{countdown, CancellationToken};
pub use maintenance::{Maintenance, MaintenanceReport};

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// What one tick of a job achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Work was done.
    Worked,
    /// Nothing to do this tick.
    Idle,
}

/// Boxed job error, logged by the scheduler.
pub type JobError = Box<dyn std::error::Error + Send + Sync>;

/// Per-job counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    /// Ticks started.
    pub runs: u64,
    /// Ticks that reported [`JobStatus::Worked`].
    pub worked: u64,
    /// Ticks that returned an error.
    pub errors: u64,
    /// Ticks that panicked.
    pub panics: u64,
}

type StatsMap = Arc<Mutex<BTreeMap<String, JobStats>>>;

/// Owner of the job threads.
pub struct Scheduler {
    cancel: CancellationToken,
    handles: Vec<(String, JoinHandle<()>)>,
    stats: StatsMap,
}

impl Scheduler {
    /// Creates a scheduler with no jobs.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            handles: Vec::new(),
            stats: Arc::default(),
        }
    }

    /// Token shared by every job.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Starts `job` on a thread, ticking every `interval` until cancelled.
    ///
    /// The first tick runs immediately.
    pub fn spawn<F>(&mut self, name: &str, interval: Duration, mut job: F) -> std::io::Result<()>
    where
        F: FnMut(&CancellationToken) -> Result<JobStatus, JobError> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let stats = Arc::clone(&self.stats);
        let job_name = name.to_string();

        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            tracing::info!(job = %job_name, interval_ms = interval.as_millis() as u64, "Job started");
            while !cancel.is_cancelled() {
                let result = panic::catch_unwind(AssertUnwindSafe(|| job(&cancel)));

                let mut entry = JobStats::default();
                match result {
                    Ok(Ok(JobStatus::Worked)) => entry.worked = 1,
                    Ok(Ok(JobStatus::Idle)) => {}
                    Ok(Err(e)) => {
                        entry.errors = 1;
                        tracing::error!(job = %job_name, error = %e, "Job failed");
                    }
                    Err(_) => {
                        entry.panics = 1;
                        tracing::error!(job = %job_name, "Job panicked");
                    }
                }
                record(&stats, &job_name, entry);

                if cancel.wait_timeout(interval) {
                    break;
                }
            }
            tracing::info!(job = %job_name, "Job stopped");
        })?;

        self.handles.push((name.to_string(), handle));
        Ok(())
    }

    /// Counters for every job that has ticked at least once.
    pub fn stats(&self) -> BTreeMap<String, JobStats> {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Shared handle to the counters, for exporters.
    pub fn stats_handle(&self) -> Arc<Mutex<BTreeMap<String, JobStats>>> {
        Arc::clone(&self.stats)
    }

    /// Cancels every job and waits for the threads to exit.
    pub fn shutdown(self) {
        self.cancel.cancel();
        for (name, handle) in self.handles {
            if handle.join().is_err() {
                tracing::error!(job = %name, "Job thread terminated abnormally");
            }
        }
    }
}

fn record(stats: &StatsMap, job: &str, tick: JobStats) {
    let mut map = stats.lock().unwrap_or_else(PoisonError::into_inner);
    let entry = map.entry(job.to_string()).or_default();
    entry.runs += 1;
    entry.worked += tick.worked;
    entry.errors += tick.errors;
    entry.panics += tick.panics;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Instant;

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_job_ticks_until_shutdown() {
        let mut scheduler = Scheduler::new(CancellationToken::new());
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&ticks);
        scheduler
            .spawn("ticker", Duration::from_millis(1), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(JobStatus::Worked)
            })
            .unwrap();

        wait_for(|| ticks.load(Ordering::SeqCst) >= 3);
        let handle = scheduler.stats_handle();
        scheduler.shutdown();

        let stats = handle.lock().unwrap()["ticker"];
        assert!(stats.worked >= 3);
        assert_eq!(stats.runs, stats.worked);
    }

    #[test]
    fn test_errors_and_panics_do_not_stop_the_job() {
        let mut scheduler = Scheduler::new(CancellationToken::new());
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&ticks);
        scheduler
            .spawn("flaky", Duration::from_millis(1), move |_| {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => Err("first tick fails".into()),
                    1 => panic!("second tick panics"),
                    _ => Ok(JobStatus::Idle),
                }
            })
            .unwrap();

        wait_for(|| ticks.load(Ordering::SeqCst) >= 4);
        let handle = scheduler.stats_handle();
        scheduler.shutdown();

        let stats = handle.lock().unwrap()["flaky"];
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.panics, 1);
        assert_eq!(stats.worked, 0);
        assert!(stats.runs >= 3);
    }

    #[test]
    fn test_shutdown_interrupts_long_interval() {
        let mut scheduler = Scheduler::new(CancellationToken::new());
        scheduler
            .spawn("slow", Duration::from_secs(3600), |_| Ok(JobStatus::Idle))
            .unwrap();

        let started = Instant::now();
        scheduler.shutdown();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
