//! Lottery rows and selection records.

use crate::store::LeafId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a lottery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotteryState {
    /// Planned, no winners drawn yet.
    Waiting,
    /// Winner target drawn, winners being drawn.
    Running,
    /// All winners drawn.
    Finished,
}

impl std::fmt::Display for LotteryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// A lottery selecting winners among leaves created in a collect window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lottery {
    /// Store-assigned identifier (0 until created).
    pub id: u64,
    /// Free-form lottery type, e.g. `"daily"`.
    pub kind: String,
    /// Lifecycle state.
    pub state: LotteryState,
    /// Earliest moment the lottery may start.
    pub start_time: DateTime<Utc>,
    /// First creation time of eligible leaves.
    pub collect_period_start: DateTime<Utc>,
    /// Last creation time of eligible leaves (inclusive).
    pub collect_period_end: DateTime<Utc>,
    /// When the winner target was drawn.
    pub started_at: Option<DateTime<Utc>>,
    /// When the last winner was drawn.
    pub finished_at: Option<DateTime<Utc>>,
    /// Winner target, drawn when the lottery starts.
    pub total_winners: u64,
    /// Winners in draw order, as a JSON array.
    pub winners: String,
    /// Optimistic-concurrency counter maintained by the store.
    pub revision: u64,
}

impl Lottery {
    /// Creates an unsaved lottery in the `waiting` state.
    pub fn new(
        kind: impl Into<String>,
        start_time: DateTime<Utc>,
        collect_period_start: DateTime<Utc>,
        collect_period_end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            kind: kind.into(),
            state: LotteryState::Waiting,
            start_time,
            collect_period_start,
            collect_period_end,
            started_at: None,
            finished_at: None,
            total_winners: 0,
            winners: "[]".to_string(),
            revision: 0,
        }
    }

    /// Decodes the winners column.
    pub fn winners(&self) -> Result<Vec<LeafId>, serde_json::Error> {
        serde_json::from_str(&self.winners)
    }

    /// Encodes `winners` into the winners column.
    pub fn set_winners(&mut self, winners: &[LeafId]) -> Result<(), serde_json::Error> {
        self.winners = serde_json::to_string(winners)?;
        Ok(())
    }
}

/// One winner pick, appended as the lottery progresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Store-assigned identifier (0 until saved).
    pub id: u64,
    /// Winning leaf.
    pub leaf_id: LeafId,
    /// Lottery the pick belongs to.
    pub lottery_id: u64,
    /// When the pick was made.
    pub created_at: DateTime<Utc>,
}

impl Selection {
    /// Creates an unsaved selection.
    pub fn new(lottery_id: u64, leaf_id: LeafId) -> Self {
        Self {
            id: 0,
            leaf_id,
            lottery_id,
            created_at: Utc::now(),
        }
    }
}
