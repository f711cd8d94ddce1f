//! Snapshot camera reachable over HTTP.
//!
//! The endpoint returns one still image: JPEG or PNG as webcams serve
//! them, or a binary PGM/PPM. Physical cameras behind HTTP proxies can be
//! slow, so the request timeout is generous and configurable.

use super::{pnm, Camera, CameraError, CaptureConfig, Frame};

/// Fetches one frame per capture from a snapshot URL.
#[derive(Default)]
pub struct HttpCamera {
    client: Option<reqwest::blocking::Client>,
    url: Option<String>,
    sequence: u64,
}

impl HttpCamera {
    /// Creates a closed snapshot camera.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Decodes a snapshot body into a frame.
///
/// PGM keeps its single channel; every other format is converted to RGB.
pub(crate) fn decode_snapshot(body: &[u8], sequence: u64) -> Result<Frame, CameraError> {
    if matches!(body.get(..2), Some(b"P5") | Some(b"P6")) {
        let image = pnm::decode(body).map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        return Ok(image.into_frame(sequence));
    }

    let rgb = image::load_from_memory(body)
        .map_err(|e| CameraError::CaptureFailed(e.to_string()))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Frame::with_channels(rgb.into_raw(), width, height, 3, sequence))
}

impl Camera for HttpCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        let url = config
            .url
            .clone()
            .ok_or_else(|| CameraError::ConfigFailed("missing url".into()))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        tracing::info!(url = %url, timeout = ?config.request_timeout(), "HttpCamera opened");
        self.client = Some(client);
        self.url = Some(url);
        self.sequence = 0;
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let (client, url) = match (&self.client, &self.url) {
            (Some(client), Some(url)) => (client, url),
            _ => return Err(CameraError::NotInitialized),
        };

        let response = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        let body = response
            .bytes()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        self.sequence += 1;
        decode_snapshot(&body, self.sequence)
    }

    fn is_open(&self) -> bool {
        self.client.is_some()
    }

    fn close(&mut self) {
        self.client = None;
        self.url = None;
        tracing::info!("HttpCamera closed");
    }
}
