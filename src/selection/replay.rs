//! Selector replaying recorded draw values.

use super::{index_for, SelectError, Selector, SelectorStats};
use crate::oracle::EntropyDecision;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Replays a fixed sequence of draw values through the normal index mapping.
///
/// Feeding it the outputs of recorded [`EntropyDecision`]s reproduces the
/// choices that were made from them.
pub struct ReplaySelector {
    values: Vec<f64>,
    cursor: Mutex<usize>,
    cycle: bool,
    draws: AtomicU64,
}

impl ReplaySelector {
    /// Replays `values` once; selecting past the end fails.
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            cursor: Mutex::new(0),
            cycle: false,
            draws: AtomicU64::new(0),
        }
    }

    /// Replays `values` forever.
    pub fn cycling(values: Vec<f64>) -> Self {
        Self {
            cycle: true,
            ..Self::new(values)
        }
    }

    /// Replays the outputs of recorded decisions, in order.
    pub fn from_decisions(decisions: &[EntropyDecision]) -> Self {
        Self::new(decisions.iter().map(|d| d.output).collect())
    }

    /// Values not yet consumed (always the full length when cycling).
    pub fn remaining(&self) -> usize {
        if self.cycle {
            return self.values.len();
        }
        let cursor = self.cursor.lock().map_or(self.values.len(), |c| *c);
        self.values.len().saturating_sub(cursor)
    }

    fn next_value(&self) -> Result<f64, SelectError> {
        let mut cursor = self
            .cursor
            .lock()
            .map_err(|_| SelectError::EntropySourceUnavailable("replay lock poisoned".into()))?;
        if self.values.is_empty() || (!self.cycle && *cursor >= self.values.len()) {
            return Err(SelectError::EntropySourceUnavailable(
                "replay sequence exhausted".into(),
            ));
        }
        let value = self.values[*cursor % self.values.len()];
        *cursor += 1;
        Ok(value)
    }
}

impl Selector for ReplaySelector {
    fn select(&self, total: u64) -> Result<u64, SelectError> {
        if total == 0 {
            return Err(SelectError::InvalidPopulation);
        }
        let value = self.next_value()?;
        self.draws.fetch_add(1, Ordering::Relaxed);
        index_for(total, value)
    }

    fn stats(&self) -> SelectorStats {
        SelectorStats {
            draws: self.draws.load(Ordering::Relaxed),
            failures: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replays_in_order() {
        let selector = ReplaySelector::new(vec![0.5, 0.0, 0.9]);
        assert_eq!(selector.select(5).unwrap(), 2);
        assert_eq!(selector.select(5).unwrap(), 0);
        assert_eq!(selector.select(5).unwrap(), 4);
        assert!(matches!(
            selector.select(5),
            Err(SelectError::EntropySourceUnavailable(_))
        ));
    }

    #[test]
    fn test_invalid_population_consumes_nothing() {
        let selector = ReplaySelector::new(vec![0.5]);
        assert!(selector.select(0).is_err());
        assert_eq!(selector.remaining(), 1);
    }

    #[test]
    fn test_cycling() {
        let selector = ReplaySelector::cycling(vec![0.25, 0.75]);
        let picks: Vec<u64> = (0..4).map(|_| selector.select(4).unwrap()).collect();
        assert_eq!(picks, vec![1, 3, 1, 3]);
        assert_eq!(selector.stats().draws, 4);
    }

    #[test]
    fn test_from_decisions() {
        let decisions = vec![
            EntropyDecision::new(0.125, vec![1], "image/x-portable-graymap"),
            EntropyDecision::new(0.625, vec![2], "image/x-portable-graymap"),
        ];
        let selector = ReplaySelector::from_decisions(&decisions);
        assert_eq!(selector.select(10).unwrap(), 1);
        assert_eq!(selector.select(10).unwrap(), 6);
    }
}
