//! Error types for piradigm-eye

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OpenCV error: {0}")]
    OpenCv(String),
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for VisionError {
    fn from(err: opencv::Error) -> Self {
        VisionError::OpenCv(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vision_error_display() {
        let err = VisionError::Camera("Test error".to_string());
        assert!(err.to_string().contains("Camera error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_vision_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such device");
        let vision_err: VisionError = io_err.into();
        match vision_err {
            VisionError::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }
}
