//! Frame handlers for the individual challenges

pub mod calibration;
pub mod pi_noon;

pub use calibration::CalibrationChallenge;
pub use pi_noon::PiNoonChallenge;
