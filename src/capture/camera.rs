//! Camera abstraction for frame capture.
//!
//! This is the entropy source adapter: one blocking `capture` call per
//! draw. Real hardware, HTTP snapshot endpoints, and the seeded mock all sit
//! behind the same trait.

use super::{CaptureConfig, Frame};
use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// No device matches the configured index.
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    /// The device exists but could not be opened.
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    /// The configuration was rejected.
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    /// A frame could not be read or decoded.
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    /// `capture` was called before `open`.
    #[error("camera not initialized")]
    NotInitialized,
}

/// Trait for camera implementations.
///
/// This abstraction allows swapping between real camera hardware
/// and mock implementations for testing.
pub trait Camera: Send {
    /// Opens and initializes the camera with the given configuration.
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError>;

    /// Captures a single frame.
    fn capture(&mut self) -> Result<Frame, CameraError>;

    /// Checks if the camera is currently open.
    fn is_open(&self) -> bool;

    /// Closes the camera and releases resources.
    fn close(&mut self);
}

impl<C: Camera + ?Sized> Camera for Box<C> {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        (**self).open(config)
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        (**self).capture()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Mock camera producing seeded pseudo-random noise frames.
///
/// The same seed always yields the same frame sequence, which makes every
/// draw built on top of it reproducible.
pub struct MockCamera {
    config: Option<CaptureConfig>,
    rng: ChaCha20Rng,
    seed: u64,
    sequence: u64,
}

impl MockCamera {
    /// Creates a mock camera with seed 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Creates a mock camera with an explicit noise seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            config: None,
            rng: ChaCha20Rng::seed_from_u64(seed),
            seed,
            sequence: 0,
        }
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCamera")
            .field("open", &self.config.is_some())
            .field("seed", &self.seed)
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl Camera for MockCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.config = Some(config.clone());
        self.rng = ChaCha20Rng::seed_from_u64(self.seed);
        self.sequence = 0;
        tracing::info!(seed = self.seed, "MockCamera opened with config: {:?}", config);
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let config = self.config.as_ref().ok_or(CameraError::NotInitialized)?;

        let channels: u8 = if config.grayscale { 1 } else { 3 };
        let mut pixels = vec![0u8; (config.width * config.height) as usize * channels as usize];
        self.rng.fill_bytes(&mut pixels);

        self.sequence += 1;
        Ok(Frame::with_channels(
            pixels,
            config.width,
            config.height,
            channels,
            self.sequence,
        ))
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn close(&mut self) {
        self.config = None;
        tracing::info!("MockCamera closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_camera_lifecycle() {
        let mut camera = MockCamera::new();
        let config = CaptureConfig::default();

        assert!(!camera.is_open());

        camera.open(&config).unwrap();
        assert!(camera.is_open());

        let frame = camera.capture().unwrap();
        assert!(frame.is_valid());
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.sequence(), 1);

        let frame2 = camera.capture().unwrap();
        assert_eq!(frame2.sequence(), 2);

        camera.close();
        assert!(!camera.is_open());
    }

    #[test]
    fn test_capture_without_open() {
        let mut camera = MockCamera::new();
        assert!(matches!(
            camera.capture(),
            Err(CameraError::NotInitialized)
        ));
    }

    #[test]
    fn test_same_seed_same_frames() {
        let config = CaptureConfig::with_dimensions(16, 8);
        let mut a = MockCamera::with_seed(7);
        let mut b = MockCamera::with_seed(7);
        a.open(&config).unwrap();
        b.open(&config).unwrap();

        assert_eq!(a.capture().unwrap().pixels(), b.capture().unwrap().pixels());
    }

    #[test]
    fn test_successive_frames_differ() {
        let mut camera = MockCamera::with_seed(1);
        camera.open(&CaptureConfig::with_dimensions(16, 8)).unwrap();

        let first = camera.capture().unwrap();
        let second = camera.capture().unwrap();
        assert_ne!(first.pixels(), second.pixels());
    }
}
