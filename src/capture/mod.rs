//! Camera input and frame handling.
//!
//! This module is the entropy source adapter: it captures one frame of the
//! physical signal on demand. The camera is treated as a source of raw
//! optical data; turning it into a decision is the oracle's job.

mod camera;
mod config;
#[cfg(feature = "camera")]
mod device;
mod frame;
#[cfg(feature = "http")]
mod http;
pub mod pnm;

pub use camera::{Camera, CameraError, MockCamera};
pub use config::{
    CaptureConfig, ConfigError, FileConfig, LotteryConfig, NotificationConfig, OutputConfig,
    SourceKind, UnityConfig,
};
#[cfg(feature = "camera")]
pub use device::DeviceCamera;
pub use frame::Frame;
#[cfg(feature = "http")]
pub use http::HttpCamera;

/// Builds and opens the camera selected by `config.source`.
pub fn open_camera(config: &CaptureConfig) -> Result<Box<dyn Camera>, CameraError> {
    let mut camera: Box<dyn Camera> = match config.source {
        SourceKind::Mock => Box::new(MockCamera::with_seed(config.mock_seed)),
        #[cfg(feature = "camera")]
        SourceKind::Camera => Box::new(DeviceCamera::new()),
        #[cfg(feature = "http")]
        SourceKind::Http => Box::new(HttpCamera::new()),
        #[allow(unreachable_patterns)]
        other => {
            return Err(CameraError::ConfigFailed(format!(
                "source {:?} is not compiled in",
                other
            )))
        }
    };
    camera.open(config)?;
    Ok(camera)
}
