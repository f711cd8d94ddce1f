//! Incremental lottery stepping.

use super::{Lottery, LotteryError, LotteryState, Selection};
use crate::notify::{LotteryProgress, Notifier};
use crate::scheduler::{countdown, CancellationToken};
use crate::selection::{sample_with_replacement, Selector};
use crate::store::{LeafId, LeafStore, LotteryStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Result of one lottery step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Start time not reached yet; nothing persisted.
    Waiting,
    /// The lottery moved to `running` with this winner target.
    Started { total_winners: u64 },
    /// One winner was appended.
    WinnerDrawn { leaf_id: LeafId, drawn: usize },
    /// The target was reached and the lottery is finished.
    Finished { winners: Vec<LeafId> },
}

/// Drives lotteries one bounded step per call.
///
/// All progress lives in the lottery row, so a crashed runner resumes from
/// whatever was last saved.
pub struct LotteryRunner {
    lotteries: Arc<dyn LotteryStore>,
    leaves: Arc<dyn LeafStore>,
    selector: Arc<dyn Selector>,
    notifier: Notifier,
    enjoy: Duration,
    min_winners: u64,
    winner_spread: u64,
}

impl LotteryRunner {
    /// Creates a runner with a 10..=99 winner target and a 10 second enjoy
    /// period.
    pub fn new(
        lotteries: Arc<dyn LotteryStore>,
        leaves: Arc<dyn LeafStore>,
        selector: Arc<dyn Selector>,
        notifier: Notifier,
    ) -> Self {
        Self {
            lotteries,
            leaves,
            selector,
            notifier,
            enjoy: Duration::from_secs(10),
            min_winners: 10,
            winner_spread: 90,
        }
    }

    /// Sets the post-finish countdown.
    pub fn with_enjoy(mut self, enjoy: Duration) -> Self {
        self.enjoy = enjoy;
        self
    }

    /// Winner targets are drawn from `min..min + spread`.
    pub fn with_winner_bounds(mut self, min: u64, spread: u64) -> Self {
        self.min_winners = min;
        self.winner_spread = spread;
        self
    }

    /// Steps the oldest active lottery, if any.
    pub fn work_once(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<(u64, StepOutcome)>, LotteryError> {
        let now = Utc::now();
        let Some(lottery) = self.lotteries.active_lottery(now)? else {
            return Ok(None);
        };
        let outcome = self.step_at(lottery.id, now, cancel)?;
        Ok(Some((lottery.id, outcome)))
    }

    /// Steps lottery `id` at the current time.
    pub fn step(&self, id: u64, cancel: &CancellationToken) -> Result<StepOutcome, LotteryError> {
        self.step_at(id, Utc::now(), cancel)
    }

    /// Steps lottery `id` as if the clock read `now`.
    pub fn step_at(
        &self,
        id: u64,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, LotteryError> {
        let lottery = self
            .lotteries
            .get_lottery(id)?
            .ok_or(LotteryError::NotFound(id))?;

        match lottery.state {
            LotteryState::Finished => Err(LotteryError::AlreadyFinished(id)),
            LotteryState::Waiting if now < lottery.start_time => Ok(StepOutcome::Waiting),
            LotteryState::Waiting => self.start(lottery, now),
            LotteryState::Running => self.draw_winner(lottery, now, cancel),
        }
    }

    fn start(&self, mut lottery: Lottery, now: DateTime<Utc>) -> Result<StepOutcome, LotteryError> {
        let total_winners = self.selector.select(self.winner_spread)? + self.min_winners;

        lottery.state = LotteryState::Running;
        lottery.total_winners = total_winners;
        lottery.started_at = Some(now);
        lottery.set_winners(&[]).map_err(|source| LotteryError::MalformedWinners {
            id: lottery.id,
            source,
        })?;
        let lottery = self.lotteries.save_lottery(&lottery)?;

        tracing::info!(lottery = lottery.id, kind = %lottery.kind, total_winners, "Lottery started");
        self.publish(&lottery, &[], None, 0, 0);
        Ok(StepOutcome::Started { total_winners })
    }

    fn draw_winner(
        &self,
        mut lottery: Lottery,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, LotteryError> {
        let mut winners = self.winners(&lottery)?;

        if (winners.len() as u64) < lottery.total_winners {
            let pool = self
                .leaves
                .identifiers_created_between(lottery.collect_period_start, lottery.collect_period_end)?;
            if pool.is_empty() {
                return Err(LotteryError::EmptyPool(lottery.id));
            }

            let winner = sample_with_replacement(&pool, self.selector.as_ref())?;
            winners.push(winner);
            lottery.set_winners(&winners).map_err(|source| LotteryError::MalformedWinners {
                id: lottery.id,
                source,
            })?;

            let reached = winners.len() as u64 >= lottery.total_winners;
            if reached {
                lottery.state = LotteryState::Finished;
                lottery.finished_at = Some(now);
            }
            let (saved, _) = self
                .lotteries
                .save_winner(&lottery, Selection::new(lottery.id, winner))?;

            tracing::info!(
                lottery = saved.id,
                winner,
                drawn = winners.len(),
                total = saved.total_winners,
                pool = pool.len(),
                "Lottery winner drawn"
            );

            if !reached {
                self.publish(&saved, &winners, Some(winner), 0, 0);
                return Ok(StepOutcome::WinnerDrawn {
                    leaf_id: winner,
                    drawn: winners.len(),
                });
            }
            lottery = saved;
        } else {
            // target already met by an earlier save that did not finish
            lottery.state = LotteryState::Finished;
            lottery.finished_at = Some(now);
            lottery = self.lotteries.save_lottery(&lottery)?;
        }

        tracing::info!(lottery = lottery.id, winners = %lottery.winners, "Lottery finished");
        self.enjoy(&lottery, &winners, cancel);
        Ok(StepOutcome::Finished { winners })
    }

    fn enjoy(&self, lottery: &Lottery, winners: &[LeafId], cancel: &CancellationToken) {
        let total = self.enjoy.as_secs();
        let last = winners.last().copied();
        let completed = countdown(self.enjoy, cancel, |elapsed| {
            self.publish(lottery, winners, last, total, elapsed);
        });
        if completed {
            self.publish(lottery, winners, last, total, total);
        } else {
            tracing::info!(lottery = lottery.id, "Enjoy period cancelled");
        }
    }

    fn winners(&self, lottery: &Lottery) -> Result<Vec<LeafId>, LotteryError> {
        lottery.winners().map_err(|source| LotteryError::MalformedWinners {
            id: lottery.id,
            source,
        })
    }

    fn publish(
        &self,
        lottery: &Lottery,
        winners: &[LeafId],
        last_winner: Option<LeafId>,
        enjoy_total: u64,
        enjoy_current: u64,
    ) {
        self.notifier.lottery(LotteryProgress {
            lottery_id: lottery.id,
            state: lottery.state.to_string(),
            total_winners: lottery.total_winners,
            winners: winners.to_vec(),
            last_winner,
            enjoy_total,
            enjoy_current,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Notification;
    use crate::selection::ReplaySelector;
    use crate::store::MemoryStore;
    use chrono::Duration as TimeDelta;

    struct Fixture {
        store: Arc<MemoryStore>,
        lottery_id: u64,
        now: DateTime<Utc>,
    }

    fn fixture(leaves: usize) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        for _ in 0..leaves {
            store.insert_leaf(now - TimeDelta::minutes(5), vec![]).unwrap();
        }
        let lottery = store
            .create_lottery(Lottery::new(
                "test",
                now,
                now - TimeDelta::hours(1),
                now,
            ))
            .unwrap();
        Fixture {
            store,
            lottery_id: lottery.id,
            now,
        }
    }

    fn runner(store: &Arc<MemoryStore>, draws: Vec<f64>) -> LotteryRunner {
        LotteryRunner::new(
            store.clone(),
            store.clone(),
            Arc::new(ReplaySelector::new(draws)),
            Notifier::disabled(),
        )
        .with_enjoy(Duration::ZERO)
    }

    #[test]
    fn test_waits_for_start_time() {
        let f = fixture(5);
        let runner = runner(&f.store, vec![]);
        let cancel = CancellationToken::new();

        let outcome = runner
            .step_at(f.lottery_id, f.now - TimeDelta::seconds(1), &cancel)
            .unwrap();
        assert_eq!(outcome, StepOutcome::Waiting);
        let lottery = f.store.get_lottery(f.lottery_id).unwrap().unwrap();
        assert_eq!(lottery.state, LotteryState::Waiting);
    }

    #[test]
    fn test_draws_in_order() {
        let f = fixture(5);
        let runner = runner(&f.store, vec![0.0, 0.5, 0.0, 0.9]);
        let cancel = CancellationToken::new();

        assert_eq!(
            runner.step_at(f.lottery_id, f.now, &cancel).unwrap(),
            StepOutcome::Started { total_winners: 10 }
        );
        for _ in 0..3 {
            runner.step_at(f.lottery_id, f.now, &cancel).unwrap();
        }

        let lottery = f.store.get_lottery(f.lottery_id).unwrap().unwrap();
        assert_eq!(lottery.state, LotteryState::Running);
        assert_eq!(lottery.winners().unwrap(), vec![3, 1, 5]);
        let picked: Vec<LeafId> = f
            .store
            .selections(f.lottery_id)
            .unwrap()
            .iter()
            .map(|s| s.leaf_id)
            .collect();
        assert_eq!(picked, vec![3, 1, 5]);
    }

    #[test]
    fn test_target_steps_finish_lottery() {
        let f = fixture(3);
        let runner = LotteryRunner::new(
            f.store.clone(),
            f.store.clone(),
            Arc::new(ReplaySelector::cycling(vec![0.0])),
            Notifier::disabled(),
        )
        .with_enjoy(Duration::ZERO);
        let cancel = CancellationToken::new();

        runner.step_at(f.lottery_id, f.now, &cancel).unwrap();
        for i in 1..10 {
            assert!(matches!(
                runner.step_at(f.lottery_id, f.now, &cancel).unwrap(),
                StepOutcome::WinnerDrawn { drawn, .. } if drawn == i
            ));
        }
        let outcome = runner.step_at(f.lottery_id, f.now, &cancel).unwrap();

        // every draw hit index 0 of the unchanged pool
        assert_eq!(outcome, StepOutcome::Finished { winners: vec![1; 10] });
        let lottery = f.store.get_lottery(f.lottery_id).unwrap().unwrap();
        assert_eq!(lottery.state, LotteryState::Finished);
        assert!(lottery.finished_at.is_some());
        assert_eq!(f.store.selections(f.lottery_id).unwrap().len(), 10);
    }

    #[test]
    fn test_winner_may_repeat() {
        let f = fixture(2);
        let runner = runner(&f.store, vec![0.0, 0.7, 0.7]);
        let cancel = CancellationToken::new();

        runner.step_at(f.lottery_id, f.now, &cancel).unwrap();
        runner.step_at(f.lottery_id, f.now, &cancel).unwrap();
        runner.step_at(f.lottery_id, f.now, &cancel).unwrap();

        let lottery = f.store.get_lottery(f.lottery_id).unwrap().unwrap();
        assert_eq!(lottery.winners().unwrap(), vec![2, 2]);
    }

    #[test]
    fn test_finished_lottery_cannot_step() {
        let f = fixture(1);
        let mut lottery = f.store.get_lottery(f.lottery_id).unwrap().unwrap();
        lottery.state = LotteryState::Finished;
        f.store.save_lottery(&lottery).unwrap();

        let runner = runner(&f.store, vec![0.1]);
        assert!(matches!(
            runner.step(f.lottery_id, &CancellationToken::new()),
            Err(LotteryError::AlreadyFinished(_))
        ));
    }

    #[test]
    fn test_empty_pool_persists_nothing() {
        let f = fixture(0);
        let runner = runner(&f.store, vec![0.0, 0.5]);
        let cancel = CancellationToken::new();
        runner.step_at(f.lottery_id, f.now, &cancel).unwrap();
        let before = f.store.get_lottery(f.lottery_id).unwrap().unwrap();

        assert!(matches!(
            runner.step_at(f.lottery_id, f.now, &cancel),
            Err(LotteryError::EmptyPool(_))
        ));
        assert_eq!(f.store.get_lottery(f.lottery_id).unwrap().unwrap(), before);
    }

    #[test]
    fn test_malformed_winners() {
        let f = fixture(2);
        let runner = runner(&f.store, vec![0.0, 0.5]);
        let cancel = CancellationToken::new();
        runner.step_at(f.lottery_id, f.now, &cancel).unwrap();

        let mut lottery = f.store.get_lottery(f.lottery_id).unwrap().unwrap();
        lottery.winners = "{oops".into();
        f.store.save_lottery(&lottery).unwrap();

        assert!(matches!(
            runner.step_at(f.lottery_id, f.now, &cancel),
            Err(LotteryError::MalformedWinners { .. })
        ));
    }

    #[test]
    fn test_missing_lottery() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(&store, vec![]);
        assert!(matches!(
            runner.step(99, &CancellationToken::new()),
            Err(LotteryError::NotFound(99))
        ));
    }

    #[test]
    fn test_progress_published() {
        let f = fixture(3);
        let (notifier, receiver) = Notifier::channel(16);
        let runner = LotteryRunner::new(
            f.store.clone(),
            f.store.clone(),
            Arc::new(ReplaySelector::new(vec![0.0, 0.5])),
            notifier,
        )
        .with_enjoy(Duration::ZERO);
        let cancel = CancellationToken::new();

        runner.step_at(f.lottery_id, f.now, &cancel).unwrap();
        runner.step_at(f.lottery_id, f.now, &cancel).unwrap();

        let events: Vec<Notification> = receiver.try_iter().collect();
        assert_eq!(events.len(), 2);
        match &events[1] {
            Notification::Lottery(progress) => {
                assert_eq!(progress.state, "running");
                assert_eq!(progress.last_winner, Some(2));
                assert_eq!(progress.total_winners, 10);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_work_once_picks_started_lottery() {
        let f = fixture(1);
        let runner = runner(&f.store, vec![0.0]);
        let (id, outcome) = runner.work_once(&CancellationToken::new()).unwrap().unwrap();
        assert_eq!(id, f.lottery_id);
        assert!(matches!(outcome, StepOutcome::Started { .. }));
    }
}
