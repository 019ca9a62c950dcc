//! piradigm-challenge: timed robot challenges
//!
//! A challenge pairs a camera pipeline with a frame handler:
//! - [`FrameSource`](piradigm_eye::FrameSource) captures frames on one thread
//! - [`FrameProcessor`] runs each latest frame through the handler on another
//! - [`ChallengeSupervisor`] starts both, enforces the deadline and tears
//!   everything down, finishing with a single drivetrain stop
//!
//! Handlers for the calibration and Pi Noon challenges live in
//! [`challenges`]; the steering law they share is in [`steering`].

pub mod challenges;
pub mod context;
pub mod drivetrain;
pub mod error;
pub mod input;
pub mod processor;
pub mod steering;
pub mod storage;
pub mod supervisor;

pub use challenges::{CalibrationChallenge, PiNoonChallenge};
pub use context::{Lifecycle, PipelineContext};
pub use drivetrain::{DriveEvent, DriveHandle, Drivetrain, LoggingDrivetrain, RecordingDrivetrain};
pub use error::{ChallengeError, Result};
pub use input::{ChannelInput, InputSource, NoInput};
pub use processor::{ButtonRelay, FrameContext, FrameHandler, FrameProcessor};
pub use steering::{
    steer, SeekStep, SteeringController, SteeringDecision, SteeringOutput, SteeringParams,
    SteeringState,
};
pub use storage::{CalibrationStore, JsonFileStore, MemoryStore};
pub use supervisor::{ChallengeHandle, ChallengeSupervisor, RunReport};
