//! Entropy oracle: frame in, decision out.
//!
//! ```text
//! frame → 4x2 grayscale grid → 64-bit word → mix → [0, 1)
//!                 ↓
//!        EntropyDecision (audit, persisted off the draw path)
//! ```
//!
//! The draw is a pure function of the frame bytes. Persisting the audit
//! record is fire-and-forget and can never fail a draw.

mod decision;
mod fold;
mod grid;

pub use decision::{DecisionRecorder, EntropyDecision};
pub use fold::{fold, mix, normalize};
pub use grid::{Grid, GRID_CELLS, GRID_HEIGHT, GRID_WIDTH};

use crate::capture::{pnm::PGM_CONTENT_TYPE, Frame};
use thiserror::Error;

/// Errors produced while turning a frame into a draw.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The frame has fewer pixels than grid cells.
    #[error("frame {width}x{height} is smaller than the decision grid")]
    FrameTooSmall {
        /// Frame width.
        width: u32,
        /// Frame height.
        height: u32,
    },
    /// Pixel buffer length does not match the frame size.
    #[error("frame buffer does not match its dimensions")]
    InvalidFrame,
}

/// One oracle draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Draw {
    /// Normalised value in `[0, 1)`.
    pub value: f64,
    /// Mixed 64-bit word the value was taken from.
    pub word: u64,
    /// Downsampled input.
    pub grid: Grid,
}

/// Deterministic frame-to-value oracle.
#[derive(Clone, Default)]
pub struct EntropyOracle {
    recorder: Option<DecisionRecorder>,
}

impl EntropyOracle {
    /// Creates an oracle that does not record decisions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an oracle that records every draw through `recorder`.
    pub fn with_recorder(recorder: DecisionRecorder) -> Self {
        Self {
            recorder: Some(recorder),
        }
    }

    /// Computes a draw without recording it.
    pub fn evaluate(&self, frame: &Frame) -> Result<Draw, OracleError> {
        let grid = Grid::from_frame(frame)?;
        let word = mix(fold(&grid));
        Ok(Draw {
            value: normalize(word),
            word,
            grid,
        })
    }

    /// Computes a draw and queues its audit record.
    pub fn draw(&self, frame: &Frame) -> Result<Draw, OracleError> {
        let draw = self.evaluate(frame)?;

        tracing::debug!(
            sequence = frame.sequence(),
            value = draw.value,
            word = %format!("{:064b}", draw.word),
            "Oracle draw"
        );

        if let Some(recorder) = &self.recorder {
            recorder.record(EntropyDecision::new(
                draw.value,
                draw.grid.to_pgm(),
                PGM_CONTENT_TYPE,
            ));
        }

        Ok(draw)
    }

    /// Returns decisions dropped by the recorder, if any.
    pub fn dropped_decisions(&self) -> u64 {
        self.recorder.as_ref().map_or(0, DecisionRecorder::dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Camera, CaptureConfig, MockCamera};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_same_frame_same_value() {
        let mut camera = MockCamera::with_seed(3);
        camera.open(&CaptureConfig::with_dimensions(64, 48)).unwrap();
        let frame = camera.capture().unwrap();

        let oracle = EntropyOracle::new();
        let a = oracle.draw(&frame).unwrap();
        let b = oracle.draw(&frame.clone()).unwrap();

        assert_eq!(a.value, b.value);
        assert!((0.0..1.0).contains(&a.value));
    }

    #[test]
    fn test_pixel_change_changes_value() {
        let oracle = EntropyOracle::new();
        let base = [12, 200, 37, 90, 0, 255, 128, 64];

        let reference = oracle.evaluate(&Frame::new(base.to_vec(), 4, 2, 1)).unwrap();
        for index in 0..base.len() {
            let mut changed = base;
            changed[index] = changed[index].wrapping_add(1);
            let draw = oracle.evaluate(&Frame::new(changed.to_vec(), 4, 2, 1)).unwrap();
            assert_ne!(draw.value, reference.value, "cell {} had no effect", index);
        }
    }

    #[test]
    fn test_draw_records_decision() {
        let store = Arc::new(MemoryStore::new());
        let (recorder, handle) = DecisionRecorder::spawn(store.clone(), 8).unwrap();
        let oracle = EntropyOracle::with_recorder(recorder);

        let draw = oracle
            .draw(&Frame::new(vec![9, 8, 7, 6, 5, 4, 3, 2], 4, 2, 1))
            .unwrap();
        drop(oracle);
        handle.join().unwrap();

        let decisions = store.decisions().unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].output, draw.value);
        assert_eq!(decisions[0].content_type, PGM_CONTENT_TYPE);
        assert!(decisions[0].verify());
    }

    #[test]
    fn test_small_frame_fails() {
        let oracle = EntropyOracle::new();
        let result = oracle.draw(&Frame::new(vec![1, 2], 2, 1, 1));
        assert!(matches!(result, Err(OracleError::FrameTooSmall { .. })));
    }
}
