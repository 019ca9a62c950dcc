//! piradigm-core: shared building blocks for the robot's timed challenges
//!
//! Holds the configuration model, the error type used by configuration
//! loading, and the small control vocabulary (modes, buttons, motor commands,
//! cancellation) that every other piradigm crate speaks.

pub mod config;
pub mod control;
pub mod error;

pub use config::{
    CalibrationConfig, CameraConfig, ChallengeConfig, PiradigmConfig, SteeringConfig,
    TrackingConfig, VisionBackend, VisionConfig,
};
pub use control::{Button, ButtonPresses, CancelToken, Mode, MotorCommand, StopReason};
pub use error::{Error, Result};
