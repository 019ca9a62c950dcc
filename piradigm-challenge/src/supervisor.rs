//! Challenge lifecycle: start the pipeline, watch the clock, tear down
//!
//! ```text
//! Initializing ──▶ Running ──▶ Stopping ──▶ Stopped
//!       │                          ▲
//!       └──── camera failure ──────┘
//! ```
//!
//! Every way out (deadline, `stop()`, interrupt, handler completion, camera
//! failure, an error while starting) goes through the same teardown: cancel,
//! join the capture and processing threads, release the camera, then send
//! the drivetrain one final stop.

use crate::context::{Lifecycle, PipelineContext};
use crate::drivetrain::{DriveHandle, Drivetrain};
use crate::error::{ChallengeError, Result};
use crate::input::{InputSource, NoInput};
use crate::processor::{FrameHandler, FrameProcessor};
use piradigm_core::{ChallengeConfig, StopReason};
use piradigm_eye::{Camera, FrameSlot, FrameSource};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Summary returned by [`ChallengeSupervisor::run`]
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub name: String,
    pub reason: StopReason,
    pub elapsed: Duration,
    pub frames_captured: u64,
    pub frames_processed: u64,
    /// Captures replaced before the processor took them
    pub frames_overwritten: u64,
    pub handler_errors: u64,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} after {:.2}s: {} captured, {} processed, {} dropped",
            self.name,
            self.reason,
            self.elapsed.as_secs_f64(),
            self.frames_captured,
            self.frames_processed,
            self.frames_overwritten
        )
    }
}

/// Controls a running challenge from other threads
#[derive(Clone, Debug)]
pub struct ChallengeHandle {
    context: PipelineContext,
    deadline: Instant,
}

impl ChallengeHandle {
    pub fn stop(&self) {
        if self.context.cancel(StopReason::Stopped) {
            info!("Stop requested");
        }
    }

    pub fn interrupt(&self) {
        if self.context.cancel(StopReason::Interrupted) {
            info!("Interrupted");
        }
    }

    /// Why the challenge should end now, if it should
    pub fn stop_reason(&self) -> Option<StopReason> {
        if let Some(reason) = self.context.cancel_token().reason() {
            return Some(reason);
        }
        if Instant::now() >= self.deadline {
            return Some(StopReason::Timeout);
        }
        if self.context.is_finished() {
            return Some(StopReason::Finished);
        }
        None
    }

    pub fn should_die(&self) -> bool {
        self.stop_reason().is_some()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.context.lifecycle()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

pub struct ChallengeSupervisor {
    name: String,
    timeout: Duration,
    started: Instant,
    timing: ChallengeConfig,
    max_camera_failures: u32,
    camera: Option<Box<dyn Camera>>,
    handler: Option<Box<dyn FrameHandler>>,
    drive: DriveHandle,
    input: Box<dyn InputSource>,
    context: PipelineContext,
}

impl ChallengeSupervisor {
    /// The deadline is fixed here: `timeout` counts from construction.
    pub fn new(
        name: impl Into<String>,
        timeout: Duration,
        camera: Box<dyn Camera>,
        handler: Box<dyn FrameHandler>,
        drivetrain: Box<dyn Drivetrain>,
    ) -> Self {
        Self {
            name: name.into(),
            timeout,
            started: Instant::now(),
            timing: ChallengeConfig::default(),
            max_camera_failures: 10,
            camera: Some(camera),
            handler: Some(handler),
            drive: DriveHandle::new(drivetrain),
            input: Box::new(NoInput),
            context: PipelineContext::new(),
        }
    }

    /// Poll interval, settle delay and frame wait from `config`; the
    /// timeout given to [`ChallengeSupervisor::new`] is kept.
    pub fn with_timing(mut self, config: &ChallengeConfig) -> Self {
        self.timing = config.clone();
        self
    }

    pub fn with_input(mut self, input: Box<dyn InputSource>) -> Self {
        self.input = input;
        self
    }

    pub fn with_max_camera_failures(mut self, failures: u32) -> Self {
        self.max_camera_failures = failures;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.context.lifecycle()
    }

    pub fn handle(&self) -> ChallengeHandle {
        ChallengeHandle {
            context: self.context.clone(),
            deadline: self.started + self.timeout,
        }
    }

    pub fn stop(&self) {
        self.handle().stop();
    }

    pub fn should_die(&self) -> bool {
        self.handle().should_die()
    }

    /// Run the challenge to completion. Blocks until the deadline passes,
    /// `stop()` or an interrupt arrives, the handler finishes or the camera
    /// fails. Returns an error only when the pipeline could not be started.
    pub fn run(mut self) -> Result<RunReport> {
        info!(challenge = %self.name, timeout = ?self.timeout, "Challenge starting");

        let mut pipeline = Pipeline::new(self.context.clone(), self.drive.clone());
        let outcome = self.start_and_watch(&mut pipeline);

        self.transition(Lifecycle::Stopping);
        let teardown = pipeline.teardown();
        self.transition(Lifecycle::Stopped);

        outcome?;
        teardown?;

        let report = RunReport {
            name: self.name.clone(),
            reason: self
                .context
                .cancel_token()
                .reason()
                .unwrap_or(StopReason::Stopped),
            elapsed: self.started.elapsed(),
            frames_captured: pipeline.captured,
            frames_processed: self.context.frames_processed(),
            frames_overwritten: pipeline.slot.stats().overwritten,
            handler_errors: self.context.handler_errors(),
        };
        info!("{}", report);
        Ok(report)
    }

    fn transition(&self, next: Lifecycle) {
        let previous = self.context.advance(next);
        if previous != next {
            info!(challenge = %self.name, from = %previous, to = %next, "Lifecycle changed");
        }
    }

    fn start_and_watch(&mut self, pipeline: &mut Pipeline) -> Result<()> {
        let handle = self.handle();
        let cancel = self.context.cancel_token().clone();

        let camera = self
            .camera
            .take()
            .ok_or_else(|| ChallengeError::Thread("Challenge already ran".to_string()))?;
        let source = FrameSource::start(
            camera,
            pipeline.slot.clone(),
            cancel.clone(),
            self.max_camera_failures,
        )
        .map_err(|e| {
            error!(challenge = %self.name, "Camera initialisation failed: {}", e);
            ChallengeError::CameraInit(e)
        })?;
        pipeline.source = Some(source);

        // let exposure and white balance settle before frames count
        let settle = self.timing.settle_delay().min(handle.remaining());
        cancel.wait_timeout(settle);
        if let Some(reason) = handle.stop_reason() {
            self.context.cancel(reason);
            info!(challenge = %self.name, %reason, "Challenge ended before processing started");
            return Ok(());
        }

        let handler = self
            .handler
            .take()
            .ok_or_else(|| ChallengeError::Thread("Challenge already ran".to_string()))?;
        let processor = FrameProcessor::start(
            handler,
            pipeline.slot.clone(),
            self.context.clone(),
            self.drive.clone(),
            self.timing.frame_wait(),
        )?;
        let buttons = processor.buttons();
        pipeline.processor = Some(processor);

        self.transition(Lifecycle::Running);

        loop {
            if let Some(reason) = handle.stop_reason() {
                self.context.cancel(reason);
                info!(challenge = %self.name, %reason, "Challenge ending");
                return Ok(());
            }

            let presses = self.input.poll();
            if !presses.is_empty() && buttons.send(presses).is_err() {
                warn!("Frame processor is gone, dropping button presses");
            }

            cancel.wait_timeout(self.timing.poll_interval().min(handle.remaining()));
        }
    }
}

/// Resources acquired by a run, released in order exactly once
struct Pipeline {
    context: PipelineContext,
    drive: DriveHandle,
    slot: Arc<FrameSlot>,
    source: Option<FrameSource>,
    processor: Option<FrameProcessor>,
    captured: u64,
    torn_down: bool,
}

impl Pipeline {
    fn new(context: PipelineContext, drive: DriveHandle) -> Self {
        Self {
            context,
            drive,
            slot: Arc::new(FrameSlot::new()),
            source: None,
            processor: None,
            captured: 0,
            torn_down: false,
        }
    }

    fn teardown(&mut self) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        self.context.cancel(StopReason::Stopped);
        self.slot.close();

        let mut first_error: Option<ChallengeError> = None;

        let camera = match self.source.take() {
            Some(source) => {
                self.captured = source.captured();
                match source.stop() {
                    Ok(camera) => Some(camera),
                    Err(e) => {
                        error!("Failed to stop frame source: {}", e);
                        first_error.get_or_insert(e.into());
                        None
                    }
                }
            }
            None => None,
        };

        if let Some(processor) = self.processor.take() {
            if let Err(e) = processor.stop() {
                error!("Failed to stop frame processor: {}", e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(mut camera) = camera {
            camera.close();
            debug!(camera = camera.name(), "Camera released");
        }

        if let Err(e) = self.drive.stop() {
            error!("Final drivetrain stop failed: {}", e);
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            error!("Teardown failed: {}", e);
        }
    }
}
