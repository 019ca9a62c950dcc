//! Pi Noon: chase balloons
//!
//! Balloons are found as circles in a hue-only rendering of the lower part
//! of the frame, where saturation and brightness changes cannot produce
//! edges.

use crate::error::Result;
use crate::processor::{FrameContext, FrameHandler};
use crate::steering::{SeekStep, SteeringController, SteeringDecision, SteeringParams, SteeringState};
use piradigm_core::{MotorCommand, SteeringConfig, TrackingConfig};
use piradigm_eye::frame::crop;
use piradigm_eye::{CircleDetector, CircleParams, Detection, Frame, Vision};
use tracing::{debug, info};

pub struct PiNoonChallenge {
    steering: SteeringController,
    vision: Vision,
    detector: Box<dyn CircleDetector>,
    crop_top: u32,
    crop_width: u32,
    driving: bool,
    last_detection: Option<Detection>,
}

impl PiNoonChallenge {
    pub fn new(tracking: &TrackingConfig, steering: &SteeringConfig) -> Self {
        Self::with_vision(tracking, steering, Vision::native())
    }

    /// Colour conversion and circle finding both go through `vision`
    pub fn with_vision(tracking: &TrackingConfig, steering: &SteeringConfig, vision: Vision) -> Self {
        let detector = vision.circle_detector(CircleParams::from(tracking));
        Self::build(tracking, steering, vision, detector)
    }

    pub fn with_detector(
        tracking: &TrackingConfig,
        steering: &SteeringConfig,
        detector: Box<dyn CircleDetector>,
    ) -> Self {
        Self::build(tracking, steering, Vision::native(), detector)
    }

    fn build(
        tracking: &TrackingConfig,
        steering: &SteeringConfig,
        vision: Vision,
        detector: Box<dyn CircleDetector>,
    ) -> Self {
        if !tracking.driving {
            info!("Motors disabled, steering decisions are only logged");
        }
        Self {
            steering: SteeringController::new(SteeringParams::from(steering)),
            vision,
            detector,
            crop_top: tracking.crop_top,
            crop_width: tracking.crop_width,
            driving: tracking.driving,
            last_detection: None,
        }
    }

    pub fn state(&self) -> SteeringState {
        self.steering.state()
    }

    pub fn last_detection(&self) -> Option<Detection> {
        self.last_detection
    }

    fn execute(&self, decision: SteeringDecision, ctx: &FrameContext<'_>) {
        if !self.driving {
            return;
        }
        match decision {
            SteeringDecision::Drive(command) => ctx.drive.drive(command),
            SteeringDecision::Seek(step) => seek(step, ctx),
        }
    }
}

/// Turn, stop, settle. Both pauses end early on cancellation.
fn seek(step: SeekStep, ctx: &FrameContext<'_>) {
    ctx.drive.drive(MotorCommand::new(step.turn_speed, 0.0));
    let cancelled = ctx.cancel.wait_timeout(step.turn_time);
    ctx.drive.drive(MotorCommand::STOP);
    if !cancelled {
        ctx.cancel.wait_timeout(step.settle_time);
    }
}

impl FrameHandler for PiNoonChallenge {
    fn name(&self) -> &str {
        "pi-noon"
    }

    fn process(&mut self, frame: &Frame, ctx: &FrameContext<'_>) -> Result<()> {
        let hsv = self.vision.to_hsv(frame)?;
        let width = self.crop_width.min(hsv.width());
        let x = (hsv.width() - width) / 2;
        let cropped = crop(&hsv, x, self.crop_top, width, hsv.height().saturating_sub(self.crop_top));
        let gray = self.vision.hue_only_gray(&cropped)?;

        let detection = self.detector.largest(&gray)?.map(|circle| circle.detection());
        let centre_x = cropped.width() as f32 / 2.0;
        let decision = self.steering.update(detection.as_ref(), centre_x);
        self.last_detection = detection;

        debug!(
            sequence = frame.sequence(),
            state = %self.steering.state(),
            ?detection,
            ?decision,
            "Steering"
        );
        self.execute(decision, ctx);
        Ok(())
    }
}
