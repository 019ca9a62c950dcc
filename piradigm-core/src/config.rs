//! Configuration for piradigm challenges
//!
//! Defaults carry the values the robot was tuned with; every section may be
//! overridden from a JSON, TOML or YAML document and a handful of
//! environment variables.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Camera capture profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Video device index
    pub device_id: u32,
    /// Capture resolution (width, height)
    pub resolution: (u32, u32),
    /// Target frame rate (frames per second)
    pub frame_rate: u32,
    /// Sensor gain, where the backend supports it
    pub iso: u32,
    /// Exposure time in microseconds
    pub shutter_speed_us: u32,
    /// Automatic white balance mode ("off", "incandescent", ...)
    pub awb_mode: String,
    /// Manual white balance gains (red, blue), used when `awb_mode` is "off"
    pub awb_gains: Option<(f32, f32)>,
    /// Consecutive failed reads before the capture thread gives up
    pub max_consecutive_failures: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            resolution: (160, 128),
            frame_rate: 30,
            iso: 800,
            shutter_speed_us: 12_000,
            awb_mode: "off".to_string(),
            awb_gains: Some((1.149, 2.193)),
            max_consecutive_failures: 10,
        }
    }
}

/// Challenge lifecycle timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    /// Hard limit on a challenge run, in seconds
    pub timeout_secs: f64,
    /// Supervisor polling period
    pub poll_interval_ms: u64,
    /// Pause between starting capture and starting processing
    pub settle_delay_ms: u64,
    /// Longest single wait of the processor for a new frame
    pub frame_wait_ms: u64,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120.0,
            poll_interval_ms: 10,
            settle_delay_ms: 2_000,
            frame_wait_ms: 1_000,
        }
    }
}

impl ChallengeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs.max(0.0))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn frame_wait(&self) -> Duration {
        Duration::from_millis(self.frame_wait_ms)
    }
}

/// Steering control law parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// Detections smaller than this are ignored
    pub min_size: f32,
    /// Size at which the robot starts backing away
    pub back_away_start: f32,
    /// Size below which backing away ends
    pub back_away_stop: f32,
    /// Proportional turn gain
    pub turn_p: f32,
    /// Derivative turn gain (reserved)
    pub turn_d: f32,
    /// Forward speed while tracking
    pub forward_speed: f32,
    /// Turn rate of a seek step
    pub seek_turn_speed: f32,
    /// Duration of the turning part of a seek step
    pub seek_turn_ms: u64,
    /// Pause after the turning part of a seek step
    pub seek_settle_ms: u64,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            min_size: 3.0,
            back_away_start: 60.0,
            back_away_stop: 40.0,
            turn_p: 2.0,
            turn_d: 0.3,
            forward_speed: 1.0,
            seek_turn_speed: 1.0,
            seek_turn_ms: 50,
            seek_settle_ms: 50,
        }
    }
}

/// Balloon tracking (Pi Noon) image and detector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Rows removed from the top of every frame
    pub crop_top: u32,
    /// Width of the centred column band that is kept
    pub crop_width: u32,
    /// Minimum distance between circle centres
    pub min_dist: f32,
    /// Gradient magnitude an edge pixel must reach
    pub edge_threshold: f32,
    /// Votes a circle centre needs
    pub accumulator_threshold: u32,
    pub min_radius: u32,
    pub max_radius: u32,
    /// When false, decisions are computed and logged but never sent to the motors
    pub driving: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            crop_top: 55,
            crop_width: 160,
            min_dist: 2.0,
            edge_threshold: 50.0,
            accumulator_threshold: 15,
            min_radius: 0,
            max_radius: 10,
            driving: true,
        }
    }
}

/// Implementation behind colour conversion, masking and detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionBackend {
    /// Pure Rust on `image`/`imageproc`, always available
    #[default]
    Native,
    /// OpenCV `imgproc`, needs the `opencv` feature of piradigm-eye
    Opencv,
}

impl FromStr for VisionBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(VisionBackend::Native),
            "opencv" => Ok(VisionBackend::Opencv),
            other => Err(Error::Parse(format!("Unknown vision backend: {}", other))),
        }
    }
}

impl fmt::Display for VisionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisionBackend::Native => f.write_str("native"),
            VisionBackend::Opencv => f.write_str("opencv"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub backend: VisionBackend,
}

/// Colour calibration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Standard deviations either side of the mean used by auto calibration
    pub sigma: f32,
    /// File holding the named colour ranges
    pub store_path: PathBuf,
    /// Name of the colour being calibrated
    pub colour_key: String,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            sigma: 1.5,
            store_path: PathBuf::from("colours.json"),
            colour_key: "red".to_string(),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PiradigmConfig {
    pub camera: CameraConfig,
    pub challenge: ChallengeConfig,
    pub steering: SteeringConfig,
    pub tracking: TrackingConfig,
    pub calibration: CalibrationConfig,
    pub vision: VisionConfig,
}

impl PiradigmConfig {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a JSON, TOML or YAML document
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        if let Ok(config) = serde_json::from_str::<PiradigmConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<PiradigmConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = serde_yaml::from_str::<PiradigmConfig>(content) {
            return Ok(config);
        }

        Err(Error::Parse("configuration is not valid JSON, TOML or YAML".to_string()))
    }

    /// Defaults overlaid with environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `PIRADIGM_*` environment variables onto this configuration
    pub fn apply_env(&mut self) {
        if let Ok(timeout) = std::env::var("PIRADIGM_TIMEOUT_SECS") {
            if let Ok(t) = timeout.parse::<f64>() {
                self.challenge.timeout_secs = t;
            }
        }

        if let Ok(device) = std::env::var("PIRADIGM_CAMERA_DEVICE") {
            if let Ok(d) = device.parse::<u32>() {
                self.camera.device_id = d;
            }
        }

        if let Ok(path) = std::env::var("PIRADIGM_CALIBRATION_FILE") {
            self.calibration.store_path = PathBuf::from(path);
        }

        if let Ok(backend) = std::env::var("PIRADIGM_VISION_BACKEND") {
            match backend.parse::<VisionBackend>() {
                Ok(b) => self.vision.backend = b,
                Err(e) => warn!("Ignoring PIRADIGM_VISION_BACKEND: {}", e),
            }
        }

        if let Ok(dry_run) = std::env::var("PIRADIGM_DRY_RUN") {
            if matches!(dry_run.as_str(), "1" | "true" | "yes") {
                self.tracking.driving = false;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        let camera = &self.camera;
        if camera.frame_rate == 0 || camera.frame_rate > 120 {
            return Err("Frame rate must be between 1 and 120".to_string());
        }

        if camera.resolution.0 == 0 || camera.resolution.1 == 0 {
            return Err("Resolution must be non-zero".to_string());
        }

        if camera.resolution.0 > 7680 || camera.resolution.1 > 4320 {
            return Err("Resolution too large (max 8K)".to_string());
        }

        if camera.max_consecutive_failures == 0 {
            return Err("Camera failure limit must be at least 1".to_string());
        }

        let challenge = &self.challenge;
        if !challenge.timeout_secs.is_finite() || challenge.timeout_secs < 0.0 {
            return Err("Timeout must be a non-negative number of seconds".to_string());
        }

        if challenge.poll_interval_ms == 0 || challenge.frame_wait_ms == 0 {
            return Err("Poll interval and frame wait must be greater than 0".to_string());
        }

        let steering = &self.steering;
        if steering.back_away_stop > steering.back_away_start {
            return Err("Back-away stop size must not exceed the start size".to_string());
        }

        if !(0.0..=1.0).contains(&steering.forward_speed)
            || !(0.0..=1.0).contains(&steering.seek_turn_speed)
        {
            return Err("Speeds must lie within [0, 1]".to_string());
        }

        let tracking = &self.tracking;
        if tracking.min_radius > tracking.max_radius {
            return Err("Minimum circle radius exceeds maximum radius".to_string());
        }

        if tracking.crop_top >= camera.resolution.1 {
            return Err("Crop removes the whole image height".to_string());
        }

        if tracking.crop_width == 0 {
            return Err("Crop width must be non-zero".to_string());
        }

        if !self.calibration.sigma.is_finite() || self.calibration.sigma < 0.0 {
            return Err("Calibration sigma must be a non-negative number".to_string());
        }

        if self.calibration.colour_key.trim().is_empty() {
            return Err("Colour key must not be empty".to_string());
        }

        Ok(())
    }
}
