//! Local camera device backed by `nokhwa`.

use super::{Camera, CameraError, CaptureConfig, Frame};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};

/// Camera device opened per capture.
///
/// The device handle is not `Send`, so it lives only for the duration of
/// one `capture` call. Each draw therefore pays the stream start-up cost,
/// which is acceptable at the tick rates the workflows run at.
#[derive(Debug, Default)]
pub struct DeviceCamera {
    config: Option<CaptureConfig>,
    sequence: u64,
}

impl DeviceCamera {
    /// Creates a closed device camera.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Camera for DeviceCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.config = Some(config.clone());
        self.sequence = 0;
        tracing::info!(device = config.device_id, "DeviceCamera configured");
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let config = self.config.as_ref().ok_or(CameraError::NotInitialized)?;

        let format = CameraFormat::new(
            Resolution::new(config.width, config.height),
            FrameFormat::MJPEG,
            config.fps,
        );
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));
        let mut device = nokhwa::Camera::new(CameraIndex::Index(config.device_id), requested)
            .map_err(|e| CameraError::DeviceNotFound(e.to_string()))?;

        device
            .open_stream()
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;
        let buffer = device
            .frame()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()));
        if let Err(e) = device.stop_stream() {
            tracing::warn!(error = %e, "Failed to stop camera stream");
        }

        let decoded = buffer?
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        self.sequence += 1;
        let (width, height) = (decoded.width(), decoded.height());
        Ok(Frame::with_channels(
            decoded.into_raw(),
            width,
            height,
            3,
            self.sequence,
        ))
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn close(&mut self) {
        self.config = None;
        tracing::info!("DeviceCamera closed");
    }
}
