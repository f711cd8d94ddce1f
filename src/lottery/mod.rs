//! Multi-step lotteries.
//!
//! A lottery collects leaves created in a time window and draws a random
//! number of winners from them, one winner per step:
//!
//! ```text
//! waiting ──start_time──▶ running ──winners == target──▶ finished
//!                         (one draw per step)           (enjoy countdown)
//! ```
//!
//! Winners are drawn with replacement: prior winners stay in the pool, so a
//! leaf can win more than once.

mod model;
mod runner;
mod schedule;

pub use model::{Lottery, LotteryState, Selection};
pub use runner::{LotteryRunner, StepOutcome};
pub use schedule::{plan_daily_lottery, DAILY_KIND};

use crate::selection::SelectError;
use crate::store::StoreError;
use thiserror::Error;

/// Lottery step errors.
#[derive(Debug, Error)]
pub enum LotteryError {
    /// No lottery with this id.
    #[error("lottery {0} not found")]
    NotFound(u64),
    /// The lottery has already finished.
    #[error("lottery {0} is already finished")]
    AlreadyFinished(u64),
    /// No leaves were created in the collect window.
    #[error("lottery {0} has no leaves in its collect period")]
    EmptyPool(u64),
    /// The winners column is not a JSON array of ids.
    #[error("lottery {id} has malformed winners: {source}")]
    MalformedWinners {
        /// Lottery id.
        id: u64,
        /// Parse error.
        source: serde_json::Error,
    },
    /// The selector could not produce a draw.
    #[error("selection failed: {0}")]
    Select(#[from] SelectError),
    /// The store rejected a read or write.
    #[error("storage failed: {0}")]
    Store(#[from] StoreError),
}
