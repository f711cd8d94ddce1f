//! Capture and service configuration.
//!
//! The whole service is configured from one TOML file. Every section has
//! defaults, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which entropy source adapter to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Seeded synthetic noise. Deterministic; for tests and demos only.
    #[default]
    Mock,
    /// Local camera device (requires the `camera` feature).
    Camera,
    /// Binary PGM/PPM snapshot fetched over HTTP (requires the `http` feature).
    Http,
}

/// Configuration for frame capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Adapter used to obtain frames.
    pub source: SourceKind,
    /// Camera device index.
    pub device_id: u32,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Target frames per second.
    pub fps: u32,
    /// Capture single-channel frames from the mock source.
    pub grayscale: bool,
    /// Snapshot URL for the HTTP source.
    pub url: Option<String>,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Seed for the mock source.
    pub mock_seed: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Mock,
            device_id: 0,
            width: 640,
            height: 480,
            fps: 30,
            grayscale: false,
            url: None,
            request_timeout_secs: 30,
            mock_seed: 0,
        }
    }
}

impl CaptureConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Returns the HTTP request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        if self.source == SourceKind::Http && self.url.is_none() {
            return Err(ConfigError::MissingUrl);
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidInterval("capture.request_timeout_secs"));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Width or height is zero.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// Frame rate outside 1-120.
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    /// The HTTP source has no URL.
    #[error("http source requires capture.url")]
    MissingUrl,
    /// A duration setting is zero.
    #[error("{0} must be greater than zero")]
    InvalidInterval(&'static str),
    /// Mask width outside 5-12.
    #[error("invalid mask width {0} (must be 5-12)")]
    InvalidMaskWidth(usize),
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The config file is not valid TOML.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Entropy source settings.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Lottery runner settings.
    #[serde(default)]
    pub lottery: LotteryConfig,
    /// Unifier and planner settings.
    #[serde(default)]
    pub unity: UnityConfig,
    /// Outbound progress queue settings.
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Metrics and demo settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Lottery runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LotteryConfig {
    /// Seconds between lottery ticks.
    pub interval_secs: u64,
    /// Length of the post-finish "enjoy" countdown in seconds.
    pub enjoy_secs: u64,
    /// Fixed lower bound of the winner target.
    pub min_winners: u64,
    /// Number of distinct winner targets above the lower bound.
    pub winner_spread: u64,
    /// Plan a daily lottery for the current day on every maintenance tick.
    pub plan_daily: bool,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            enjoy_secs: 10,
            min_winners: 10,
            winner_spread: 90,
            plan_daily: true,
        }
    }
}

impl LotteryConfig {
    /// Returns the tick interval.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Returns the enjoy period.
    pub fn enjoy(&self) -> Duration {
        Duration::from_secs(self.enjoy_secs)
    }
}

/// Unifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnityConfig {
    /// Seconds between unifier ticks.
    pub interval_secs: u64,
    /// Length of the post-unification grace period in seconds.
    pub grace_secs: u64,
    /// Total characters in a mask (digits plus placeholders).
    pub mask_width: usize,
    /// Seconds between maintenance ticks (top-level seeding, reunification).
    pub maintenance_interval_secs: u64,
}

impl Default for UnityConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            grace_secs: 10,
            mask_width: 6,
            maintenance_interval_secs: 60,
        }
    }
}

impl UnityConfig {
    /// Returns the tick interval.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Returns the grace period.
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    /// Returns the maintenance interval.
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }
}

/// Outbound notification queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Queue capacity; events beyond it are dropped.
    pub capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
    /// Synthetic leaf records created at startup by the demo runner.
    pub demo_leaves: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            metrics_port: 9090,
            demo_leaves: 250,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capture.validate()?;
        if self.lottery.interval_secs == 0 {
            return Err(ConfigError::InvalidInterval("lottery.interval_secs"));
        }
        if self.lottery.winner_spread == 0 {
            return Err(ConfigError::InvalidInterval("lottery.winner_spread"));
        }
        if self.unity.interval_secs == 0 {
            return Err(ConfigError::InvalidInterval("unity.interval_secs"));
        }
        if self.unity.maintenance_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval("unity.maintenance_interval_secs"));
        }
        if !(5..=12).contains(&self.unity.mask_width) {
            return Err(ConfigError::InvalidMaskWidth(self.unity.mask_width));
        }
        if self.notifications.capacity == 0 {
            return Err(ConfigError::InvalidInterval("notifications.capacity"));
        }
        Ok(())
    }
}
