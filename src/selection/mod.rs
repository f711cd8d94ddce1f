//! Entropy-backed selection.
//!
//! A [`Selector`] maps one oracle draw onto an index in `[0, total)`. It is
//! the only path from the workflows to the entropy source. The sampling
//! algorithms built on top of it live in [`sampling`] and are named by what
//! they guarantee, since the lottery and the unifier need different ones.

mod entropy;
mod replay;
pub mod sampling;

pub use entropy::EntropySelector;
pub use replay::ReplaySelector;
pub use sampling::{sample_with_replacement, DrawPool};

use crate::oracle::OracleError;
use thiserror::Error;

/// Selection errors.
#[derive(Debug, Error)]
pub enum SelectError {
    /// Selecting from an empty population.
    #[error("cannot select from an empty population")]
    InvalidPopulation,
    /// The camera or other adapter could not produce a frame.
    #[error("entropy source unavailable: {0}")]
    EntropySourceUnavailable(String),
    /// The frame could not be turned into a draw.
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// Draw counters of a selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectorStats {
    /// Successful selections.
    pub draws: u64,
    /// Selections that failed after reaching the entropy source.
    pub failures: u64,
}

/// Uniform index selection over a population of `total` items.
pub trait Selector: Send + Sync {
    /// Returns an index in `[0, total)`.
    fn select(&self, total: u64) -> Result<u64, SelectError>;

    /// Draw counters; selectors that do not count return zeros.
    fn stats(&self) -> SelectorStats {
        SelectorStats::default()
    }
}

impl<S: Selector + ?Sized> Selector for std::sync::Arc<S> {
    fn select(&self, total: u64) -> Result<u64, SelectError> {
        (**self).select(total)
    }

    fn stats(&self) -> SelectorStats {
        (**self).stats()
    }
}

/// Maps a draw in `[0, 1)` to an index in `[0, total)`.
///
/// `floor(total * draw)`, clamped so float rounding never yields `total`.
pub fn index_for(total: u64, draw: f64) -> Result<u64, SelectError> {
    if total == 0 {
        return Err(SelectError::InvalidPopulation);
    }
    let index = (total as f64 * draw).floor();
    if index <= 0.0 {
        return Ok(0);
    }
    Ok((index as u64).min(total - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_index_for_examples() {
        assert_eq!(index_for(5, 0.5).unwrap(), 2);
        assert_eq!(index_for(5, 0.0).unwrap(), 0);
        assert_eq!(index_for(5, 0.9).unwrap(), 4);
        assert_eq!(index_for(90, 0.0).unwrap(), 0);
        assert_eq!(index_for(1, 0.999).unwrap(), 0);
    }

    #[test]
    fn test_empty_population() {
        assert!(matches!(index_for(0, 0.3), Err(SelectError::InvalidPopulation)));
    }

    #[test]
    fn test_top_of_range_is_clamped() {
        let largest = 1.0 - f64::EPSILON / 2.0;
        assert_eq!(index_for(3, largest).unwrap(), 2);
        assert_eq!(index_for(3, 1.0).unwrap(), 2);
    }

    proptest! {
        #[test]
        fn prop_index_in_range(total in 1u64..1_000_000, draw in 0.0f64..1.0) {
            let index = index_for(total, draw).unwrap();
            prop_assert!(index < total);
        }

        #[test]
        fn prop_index_monotonic(total in 1u64..10_000, a in 0.0f64..1.0, b in 0.0f64..1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(index_for(total, lo).unwrap() <= index_for(total, hi).unwrap());
        }
    }
}
