//! Error types for piradigm-challenge

use piradigm_eye::VisionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChallengeError {
    #[error("Camera initialisation failed: {0}")]
    CameraInit(#[source] VisionError),

    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),

    #[error("Drive error: {0}")]
    Drive(String),

    #[error("Calibration storage error: {0}")]
    Storage(String),

    #[error("Thread error: {0}")]
    Thread(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<piradigm_core::Error> for ChallengeError {
    fn from(err: piradigm_core::Error) -> Self {
        ChallengeError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ChallengeError {
    fn from(err: serde_json::Error) -> Self {
        ChallengeError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChallengeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_init_keeps_source() {
        let err = ChallengeError::CameraInit(VisionError::Camera("no device".to_string()));
        assert!(err.to_string().contains("no device"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_from_core_error() {
        let err: ChallengeError = piradigm_core::Error::Configuration("bad".to_string()).into();
        assert!(matches!(err, ChallengeError::Config(_)));
    }
}
