//! Target-following control law
//!
//! ```text
//!   Searching ──target──▶ Tracking ◀──▶ BackingAway
//!       ▲                                   │
//!       └────────────── target lost ────────┘
//! ```
//!
//! Losing the target while tracking backs straight away first; losing it
//! while backing away (or never having had it) seeks by rotating in place.

use piradigm_core::{MotorCommand, SteeringConfig};
use piradigm_eye::Detection;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SteeringState {
    #[default]
    Searching,
    Tracking,
    BackingAway,
}

impl fmt::Display for SteeringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SteeringState::Searching => "searching",
            SteeringState::Tracking => "tracking",
            SteeringState::BackingAway => "backing away",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringParams {
    pub min_size: f32,
    pub back_away_start: f32,
    pub back_away_stop: f32,
    pub turn_p: f32,
    /// Carried for a derivative term; the law does not use it
    pub turn_d: f32,
    pub forward_speed: f32,
    pub seek: SeekStep,
}

impl Default for SteeringParams {
    fn default() -> Self {
        Self::from(&SteeringConfig::default())
    }
}

impl From<&SteeringConfig> for SteeringParams {
    fn from(config: &SteeringConfig) -> Self {
        Self {
            min_size: config.min_size,
            back_away_start: config.back_away_start,
            back_away_stop: config.back_away_stop,
            turn_p: config.turn_p,
            turn_d: config.turn_d,
            forward_speed: config.forward_speed,
            seek: SeekStep {
                turn_speed: config.seek_turn_speed,
                turn_time: Duration::from_millis(config.seek_turn_ms),
                settle_time: Duration::from_millis(config.seek_settle_ms),
            },
        }
    }
}

/// Rotate in place for `turn_time`, stop, then wait `settle_time`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekStep {
    pub turn_speed: f32,
    pub turn_time: Duration,
    pub settle_time: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SteeringDecision {
    Drive(MotorCommand),
    Seek(SeekStep),
}

/// Result of one control step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringOutput {
    pub state: SteeringState,
    pub decision: SteeringDecision,
    /// Normalised horizontal error, when a target was seen
    pub error: Option<f32>,
}

/// One step of the control law.
///
/// `centre_x` is the horizontal centre of the image the detection came
/// from. The error `e = (centre_x - x) / centre_x` is positive when the
/// target is left of centre.
pub fn steer(
    state: SteeringState,
    detection: Option<&Detection>,
    centre_x: f32,
    params: &SteeringParams,
) -> SteeringOutput {
    let target = detection.filter(|d| d.size.is_finite() && d.size >= params.min_size);

    let Some(target) = target else {
        return if state == SteeringState::Tracking {
            SteeringOutput {
                state: SteeringState::BackingAway,
                decision: SteeringDecision::Drive(MotorCommand::new(0.0, -params.forward_speed)),
                error: None,
            }
        } else {
            SteeringOutput {
                state: SteeringState::Searching,
                decision: SteeringDecision::Seek(params.seek),
                error: None,
            }
        };
    };

    let error = if centre_x > 0.0 {
        (centre_x - target.x) / centre_x
    } else {
        0.0
    };

    let too_close = target.size >= params.back_away_start
        || (target.size >= params.back_away_stop && state == SteeringState::BackingAway);

    if too_close {
        SteeringOutput {
            state: SteeringState::BackingAway,
            decision: SteeringDecision::Drive(MotorCommand::new(
                params.turn_p * error / 2.0,
                -params.forward_speed / 2.0,
            )),
            error: Some(error),
        }
    } else {
        SteeringOutput {
            state: SteeringState::Tracking,
            decision: SteeringDecision::Drive(MotorCommand::new(
                params.turn_p * error,
                params.forward_speed,
            )),
            error: Some(error),
        }
    }
}

/// [`steer`] with the state carried between frames
#[derive(Debug, Clone)]
pub struct SteeringController {
    params: SteeringParams,
    state: SteeringState,
    last_error: f32,
}

impl SteeringController {
    pub fn new(params: SteeringParams) -> Self {
        Self {
            params,
            state: SteeringState::Searching,
            last_error: 0.0,
        }
    }

    pub fn state(&self) -> SteeringState {
        self.state
    }

    pub fn last_error(&self) -> f32 {
        self.last_error
    }

    pub fn params(&self) -> &SteeringParams {
        &self.params
    }

    pub fn update(&mut self, detection: Option<&Detection>, centre_x: f32) -> SteeringDecision {
        let output = steer(self.state, detection, centre_x, &self.params);
        self.state = output.state;
        if let Some(error) = output.error {
            self.last_error = error;
        }
        output.decision
    }
}
