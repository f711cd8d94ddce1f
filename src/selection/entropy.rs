//! Camera-backed selector.

use super::{index_for, SelectError, Selector, SelectorStats};
use crate::capture::Camera;
use crate::oracle::EntropyOracle;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Selector drawing one fresh frame per call.
///
/// The camera sits behind a mutex so both workflows can share one selector;
/// captures are serialised, which matches one physical device.
pub struct EntropySelector<C: Camera> {
    camera: Mutex<C>,
    oracle: EntropyOracle,
    draws: AtomicU64,
    failures: AtomicU64,
}

impl<C: Camera> EntropySelector<C> {
    /// Creates a selector over an opened camera.
    pub fn new(camera: C, oracle: EntropyOracle) -> Self {
        Self {
            camera: Mutex::new(camera),
            oracle,
            draws: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Returns the oracle used for draws.
    pub fn oracle(&self) -> &EntropyOracle {
        &self.oracle
    }

    fn draw(&self) -> Result<f64, SelectError> {
        let frame = {
            let mut camera = self
                .camera
                .lock()
                .map_err(|_| SelectError::EntropySourceUnavailable("camera lock poisoned".into()))?;
            camera
                .capture()
                .map_err(|e| SelectError::EntropySourceUnavailable(e.to_string()))?
        };
        Ok(self.oracle.draw(&frame)?.value)
    }
}

impl<C: Camera> Selector for EntropySelector<C> {
    fn select(&self, total: u64) -> Result<u64, SelectError> {
        if total == 0 {
            return Err(SelectError::InvalidPopulation);
        }

        match self.draw() {
            Ok(value) => {
                self.draws.fetch_add(1, Ordering::Relaxed);
                let index = index_for(total, value)?;
                tracing::trace!(total, index, value, "Selected");
                Ok(index)
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, total, "Entropy draw failed");
                Err(e)
            }
        }
    }

    fn stats(&self) -> SelectorStats {
        SelectorStats {
            draws: self.draws.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CameraError, CaptureConfig, Frame, MockCamera};
    use proptest::prelude::*;

    struct BrokenCamera;

    impl Camera for BrokenCamera {
        fn open(&mut self, _config: &CaptureConfig) -> Result<(), CameraError> {
            Ok(())
        }

        fn capture(&mut self) -> Result<Frame, CameraError> {
            Err(CameraError::CaptureFailed("lens cap on".into()))
        }

        fn is_open(&self) -> bool {
            true
        }

        fn close(&mut self) {}
    }

    fn mock_selector(seed: u64) -> EntropySelector<MockCamera> {
        let mut camera = MockCamera::with_seed(seed);
        camera.open(&CaptureConfig::with_dimensions(32, 16)).unwrap();
        EntropySelector::new(camera, EntropyOracle::new())
    }

    #[test]
    fn test_zero_total_does_not_capture() {
        let selector = mock_selector(1);
        assert!(matches!(selector.select(0), Err(SelectError::InvalidPopulation)));
        assert_eq!(selector.stats(), SelectorStats::default());
    }

    #[test]
    fn test_adapter_failure_is_reported() {
        let selector = EntropySelector::new(BrokenCamera, EntropyOracle::new());
        assert!(matches!(
            selector.select(10),
            Err(SelectError::EntropySourceUnavailable(_))
        ));
        assert_eq!(selector.stats().failures, 1);
    }

    #[test]
    fn test_same_seed_same_choices() {
        let a = mock_selector(42);
        let b = mock_selector(42);
        let left: Vec<u64> = (0..10).map(|_| a.select(1000).unwrap()).collect();
        let right: Vec<u64> = (0..10).map(|_| b.select(1000).unwrap()).collect();
        assert_eq!(left, right);
        assert_eq!(a.stats().draws, 10);
    }

    #[test]
    fn test_selector_from_small_frames() {
        let mut camera = MockCamera::with_seed(5);
        let mut config = CaptureConfig::with_dimensions(2, 1);
        config.grayscale = true;
        camera.open(&config).unwrap();
        let selector = EntropySelector::new(camera, EntropyOracle::new());

        assert!(matches!(selector.select(3), Err(SelectError::Oracle(_))));
    }

    proptest! {
        #[test]
        fn prop_select_in_range(seed in any::<u64>(), total in 1u64..100_000) {
            let selector = mock_selector(seed);
            let index = selector.select(total).unwrap();
            prop_assert!(index < total);
        }
    }
}
