//! Hierarchical unities over leaf records.
//!
//! Leaves are grouped by identifier into unities of rank 100, 1000 and
//! 10000. Each unity elects a fixed number of leads from its children and
//! renders them into a composite thumbnail:
//!
//! ```text
//! 00XXXX (rank 10000, 64 leads) ── 000XXX .. 009XXX (rank 1000, 36 leads)
//!                                     └── 0000XX .. 0009XX (rank 100, 16 leads)
//!                                             └── leaves 0 .. 99
//! ```
//!
//! Work is driven entirely by the persisted `state` of each row, so a
//! unifier killed at any point picks up where the last commit left it.

mod mask;
mod model;
mod planner;
mod unifier;

pub use mask::{MaskError, UnityMask, PLACEHOLDER};
pub use model::{Rank, Unity, UnityState};
pub use planner::UnityPlanner;
pub use unifier::{Unifier, UnifyOutcome};

use crate::selection::SelectError;
use crate::store::{RangeDrawError, StoreError};
use thiserror::Error;

/// Unification and planning errors.
#[derive(Debug, Error)]
pub enum UnifyError {
    /// No unity with this mask.
    #[error("unity {0} not found")]
    NotFound(String),
    /// A stored or derived mask is invalid.
    #[error("invalid mask: {0}")]
    Mask(#[from] MaskError),
    /// A leads column is not a JSON array of ids.
    #[error("unity {mask} has malformed leads: {source}")]
    MalformedLeads {
        /// Unity holding the bad column.
        mask: String,
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

impl From<RangeDrawError> for UnifyError {
    fn from(e: RangeDrawError) -> Self {
        match e {
            RangeDrawError::Store(e) => Self::Store(e),
            RangeDrawError::Select(e) => Self::Select(e),
        }
    }
}
