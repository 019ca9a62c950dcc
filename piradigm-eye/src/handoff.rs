//! Single-slot frame mailbox between the capture and processing threads
//!
//! The producer never waits for the consumer: publishing while an earlier
//! frame is still pending replaces it, so at most one frame is ever queued
//! and stale frames are dropped. The consumer takes the pending frame as a
//! [`FrameLease`]; dropping the lease clears the busy flag and returns the
//! pixel buffer to the slot for the producer to capture into again.

use crate::frame::Frame;
use image::RgbImage;
use parking_lot::{Condvar, Mutex};
use std::ops::Deref;
use std::time::{Duration, Instant};

/// Outcome of [`FrameSlot::publish`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    /// The slot was empty
    Delivered,
    /// An unconsumed frame was replaced
    Overwrote,
}

/// Counters kept by the slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    pub published: u64,
    pub consumed: u64,
    pub overwritten: u64,
}

#[derive(Default)]
struct SlotState {
    pending: Option<Frame>,
    busy: bool,
    closed: bool,
    woken: bool,
    spare: Option<RgbImage>,
    stats: SlotStats,
}

/// Latest-frame-wins mailbox
#[derive(Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `frame` in the slot and raise the ready signal.
    pub fn publish(&self, frame: Frame) -> Publish {
        let mut state = self.state.lock();
        state.stats.published += 1;
        let outcome = match state.pending.replace(frame) {
            Some(stale) => {
                state.stats.overwritten += 1;
                if state.spare.is_none() {
                    state.spare = Some(stale.into_pixels());
                }
                Publish::Overwrote
            }
            None => Publish::Delivered,
        };
        drop(state);
        self.ready.notify_one();
        outcome
    }

    /// A buffer released by the consumer (or by an overwrite), if any
    pub fn reclaim_buffer(&self) -> Option<RgbImage> {
        self.state.lock().spare.take()
    }

    /// True while a frame waits to be processed
    pub fn is_ready(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// True while the consumer holds a lease
    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    /// Number of queued frames; never more than one
    pub fn pending_len(&self) -> usize {
        usize::from(self.state.lock().pending.is_some())
    }

    pub fn stats(&self) -> SlotStats {
        self.state.lock().stats
    }

    /// Wake any waiting consumer and make further waits return immediately
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }

    /// Return a waiting consumer early, with no frame, so it can attend to
    /// something other than capture. A wake with nobody waiting is kept for
    /// the next wait.
    pub fn wake(&self) {
        self.state.lock().woken = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Wait up to `timeout` for a frame.
    ///
    /// Returns `None` when the wait times out, the slot is closed or
    /// [`FrameSlot::wake`] was called. None of these is an error, callers
    /// re-check their termination flag and wait again.
    pub fn wait_for_frame(&self, timeout: Duration) -> Option<FrameLease<'_>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let mut timed_out = false;
        loop {
            if state.closed {
                return None;
            }
            if let Some(frame) = state.pending.take() {
                state.woken = false;
                state.busy = true;
                state.stats.consumed += 1;
                return Some(FrameLease { slot: self, frame });
            }
            if state.woken {
                state.woken = false;
                return None;
            }
            if timed_out {
                return None;
            }
            timed_out = self.ready.wait_until(&mut state, deadline).timed_out();
        }
    }

    fn release(&self, frame: Frame) {
        let mut state = self.state.lock();
        state.busy = false;
        if state.spare.is_none() {
            state.spare = Some(frame.into_pixels());
        }
    }
}

/// Read-only access to one frame for one processing pass
pub struct FrameLease<'a> {
    slot: &'a FrameSlot,
    frame: Frame,
}

impl Deref for FrameLease<'_> {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.frame
    }
}

impl Drop for FrameLease<'_> {
    fn drop(&mut self) {
        let frame = std::mem::replace(&mut self.frame, Frame::placeholder());
        self.slot.release(frame);
    }
}
