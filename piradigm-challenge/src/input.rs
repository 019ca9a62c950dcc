//! Joystick / keyboard button input

use crossbeam::channel::{self, Receiver, Sender};
use piradigm_core::{Button, ButtonPresses};

/// Polled by the supervisor once per cycle
pub trait InputSource: Send {
    /// Buttons pressed since the previous poll
    fn poll(&mut self) -> ButtonPresses;
}

/// No buttons, ever
#[derive(Debug, Default)]
pub struct NoInput;

impl InputSource for NoInput {
    fn poll(&mut self) -> ButtonPresses {
        ButtonPresses::none()
    }
}

/// Button presses delivered over a channel, e.g. from a stdin reader thread
pub struct ChannelInput {
    rx: Receiver<Button>,
}

impl ChannelInput {
    pub fn new() -> (Self, Sender<Button>) {
        let (tx, rx) = channel::unbounded();
        (Self { rx }, tx)
    }
}

impl InputSource for ChannelInput {
    fn poll(&mut self) -> ButtonPresses {
        self.rx.try_iter().collect()
    }
}
