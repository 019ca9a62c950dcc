//! Consumer thread: one frame at a time through the active handler

use crate::context::PipelineContext;
use crate::drivetrain::DriveHandle;
use crate::error::{ChallengeError, Result};
use crossbeam::channel::{self, Receiver, Sender};
use piradigm_core::{ButtonPresses, CancelToken};
use piradigm_eye::{Frame, FrameSlot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// What a handler may touch while processing a frame
pub struct FrameContext<'a> {
    pub drive: &'a DriveHandle,
    /// Handlers that pause (e.g. a timed seek step) wait on this so teardown
    /// is not held up
    pub cancel: &'a CancelToken,
}

/// Per-challenge frame analysis
pub trait FrameHandler: Send {
    fn name(&self) -> &str;

    /// Analyse one frame. The frame is only borrowed for this call.
    fn process(&mut self, frame: &Frame, ctx: &FrameContext<'_>) -> Result<()>;

    /// Buttons relayed by the supervisor, applied between frames
    fn on_buttons(&mut self, _presses: ButtonPresses) -> Result<()> {
        Ok(())
    }

    /// True once the challenge has nothing more to do
    fn is_finished(&self) -> bool {
        false
    }
}

/// Delivers button presses to a running [`FrameProcessor`].
///
/// Sending also wakes the processor if it is waiting for a frame, so presses
/// are applied promptly even when the camera is slow or has stalled.
#[derive(Clone)]
pub struct ButtonRelay {
    tx: Sender<ButtonPresses>,
    slot: Arc<FrameSlot>,
}

impl ButtonRelay {
    pub fn send(&self, presses: ButtonPresses) -> Result<()> {
        self.tx
            .send(presses)
            .map_err(|_| ChallengeError::Thread("Frame processor is gone".to_string()))?;
        self.slot.wake();
        Ok(())
    }
}

pub struct FrameProcessor {
    handle: Option<JoinHandle<Box<dyn FrameHandler>>>,
    stop: Arc<AtomicBool>,
    slot: Arc<FrameSlot>,
    buttons: ButtonRelay,
}

impl FrameProcessor {
    pub fn start(
        handler: Box<dyn FrameHandler>,
        slot: Arc<FrameSlot>,
        context: PipelineContext,
        drive: DriveHandle,
        frame_wait: Duration,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, buttons) = channel::unbounded();
        let worker = ProcessLoop {
            slot: slot.clone(),
            context,
            drive,
            buttons,
            frame_wait,
            stop: stop.clone(),
        };

        info!(handler = handler.name(), "Frame processor starting");
        let handle = thread::Builder::new()
            .name("piradigm-process".to_string())
            .spawn(move || worker.run(handler))?;

        Ok(Self {
            handle: Some(handle),
            stop,
            buttons: ButtonRelay {
                tx,
                slot: slot.clone(),
            },
            slot,
        })
    }

    pub fn buttons(&self) -> ButtonRelay {
        self.buttons.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Request termination, wake the thread if it is waiting for a frame,
    /// join it and hand back the handler.
    pub fn stop(mut self) -> Result<Box<dyn FrameHandler>> {
        self.stop.store(true, Ordering::Release);
        self.slot.close();
        let handle = self
            .handle
            .take()
            .ok_or_else(|| ChallengeError::Thread("Frame processor already stopped".to_string()))?;
        handle
            .join()
            .map_err(|_| ChallengeError::Thread("Processing thread panicked".to_string()))
    }
}

impl Drop for FrameProcessor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop.store(true, Ordering::Release);
            self.slot.close();
            if handle.join().is_err() {
                error!("Processing thread panicked");
            }
        }
    }
}

struct ProcessLoop {
    slot: Arc<FrameSlot>,
    context: PipelineContext,
    drive: DriveHandle,
    buttons: Receiver<ButtonPresses>,
    frame_wait: Duration,
    stop: Arc<AtomicBool>,
}

impl ProcessLoop {
    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire) || self.context.is_cancelled()
    }

    fn run(self, mut handler: Box<dyn FrameHandler>) -> Box<dyn FrameHandler> {
        let ctx = FrameContext {
            drive: &self.drive,
            cancel: self.context.cancel_token(),
        };

        while !self.should_stop() {
            for presses in self.buttons.try_iter() {
                if let Err(e) = handler.on_buttons(presses) {
                    warn!("{} failed to apply buttons: {}", handler.name(), e);
                    self.context.record_handler_error();
                }
            }
            self.check_finished(handler.as_ref());

            // a timeout is routine; loop round and re-check termination
            let Some(frame) = self.slot.wait_for_frame(self.frame_wait) else {
                trace!("No frame within {:?}", self.frame_wait);
                continue;
            };

            match handler.process(&frame, &ctx) {
                Ok(()) => self.context.record_processed(),
                Err(e) => {
                    warn!(sequence = frame.sequence(), "{} failed on frame: {}", handler.name(), e);
                    self.context.record_handler_error();
                }
            }
            drop(frame);

            self.check_finished(handler.as_ref());
        }

        debug!(
            processed = self.context.frames_processed(),
            "Frame processor stopped"
        );
        handler
    }

    fn check_finished(&self, handler: &dyn FrameHandler) {
        if handler.is_finished() && !self.context.is_finished() {
            info!("{} finished", handler.name());
            self.context.mark_finished();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivetrain::RecordingDrivetrain;
    use image::RgbImage;
    use piradigm_core::{Button, StopReason};
    use std::time::Instant;

    struct Counting {
        frames: Arc<parking_lot::Mutex<Vec<u64>>>,
        finish_on: Option<Button>,
        finished: bool,
    }

    impl FrameHandler for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn process(&mut self, frame: &Frame, _ctx: &FrameContext<'_>) -> Result<()> {
            self.frames.lock().push(frame.sequence());
            Ok(())
        }

        fn on_buttons(&mut self, presses: ButtonPresses) -> Result<()> {
            if self.finish_on.is_some_and(|b| presses.contains(b)) {
                self.finished = true;
            }
            Ok(())
        }

        fn is_finished(&self) -> bool {
            self.finished
        }
    }

    fn frame(sequence: u64) -> Frame {
        Frame::new(RgbImage::new(4, 4), piradigm_eye::PixelFormat::Rgb, sequence)
    }

    fn start(
        finish_on: Option<Button>,
        frame_wait: Duration,
    ) -> (
        FrameProcessor,
        Arc<FrameSlot>,
        PipelineContext,
        ButtonRelay,
        Arc<parking_lot::Mutex<Vec<u64>>>,
    ) {
        let frames = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let handler = Counting {
            frames: frames.clone(),
            finish_on,
            finished: false,
        };
        let slot = Arc::new(FrameSlot::new());
        let context = PipelineContext::new();
        let processor = FrameProcessor::start(
            Box::new(handler),
            slot.clone(),
            context.clone(),
            DriveHandle::new(Box::new(RecordingDrivetrain::new())),
            frame_wait,
        )
        .unwrap();
        let buttons = processor.buttons();
        (processor, slot, context, buttons, frames)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(2) {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_processes_each_published_frame_once() {
        let (processor, slot, context, _tx, frames) = start(None, Duration::from_millis(20));

        for seq in 1..=3 {
            slot.publish(frame(seq));
            assert!(wait_until(|| context.frames_processed() == seq));
        }
        processor.stop().unwrap();

        assert_eq!(*frames.lock(), vec![1, 2, 3]);
        assert!(!slot.is_busy());
    }

    #[test]
    fn test_keeps_waiting_through_timeouts() {
        let (processor, slot, context, _tx, _frames) = start(None, Duration::from_millis(20));
        thread::sleep(Duration::from_millis(70));
        assert!(processor.is_running());

        slot.publish(frame(9));
        assert!(wait_until(|| context.frames_processed() == 1));
        processor.stop().unwrap();
    }

    #[test]
    fn test_finished_handler_marks_context() {
        let (processor, _slot, context, buttons, _frames) =
            start(Some(Button::R1), Duration::from_millis(20));
        buttons.send([Button::R1].into_iter().collect()).unwrap();
        assert!(wait_until(|| context.is_finished()));
        let handler = processor.stop().unwrap();
        assert!(handler.is_finished());
    }

    #[test]
    fn test_cancel_ends_loop() {
        let (processor, _slot, context, _tx, _frames) = start(None, Duration::from_millis(20));
        context.cancel(StopReason::Stopped);
        assert!(wait_until(|| !processor.is_running()));
        processor.stop().unwrap();
    }

    #[test]
    fn test_buttons_applied_while_waiting_for_frames() {
        let (processor, _slot, context, buttons, frames) =
            start(Some(Button::R1), Duration::from_secs(5));
        // let the loop settle into its long wait
        thread::sleep(Duration::from_millis(30));

        let sent = Instant::now();
        buttons.send([Button::R1].into_iter().collect()).unwrap();
        assert!(wait_until(|| context.is_finished()));
        assert!(sent.elapsed() < Duration::from_secs(1));
        assert!(frames.lock().is_empty());
        processor.stop().unwrap();
    }

    #[test]
    fn test_relay_fails_once_processor_is_gone() {
        let (processor, _slot, _context, buttons, _frames) =
            start(None, Duration::from_millis(20));
        processor.stop().unwrap();
        assert!(buttons.send([Button::L1].into_iter().collect()).is_err());
    }
}
