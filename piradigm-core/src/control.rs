//! Control vocabulary shared by the pipeline threads and the supervisor

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Drive command with both components normalised to [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorCommand {
    /// Positive turns left, negative turns right
    pub turn: f32,
    /// Positive drives forward, negative reverses
    pub speed: f32,
}

impl MotorCommand {
    pub const STOP: MotorCommand = MotorCommand { turn: 0.0, speed: 0.0 };

    /// Build a command, clamping both components into [-1, 1].
    /// Non-finite input collapses to zero.
    pub fn new(turn: f32, speed: f32) -> Self {
        Self {
            turn: clamp_unit(turn),
            speed: clamp_unit(speed),
        }
    }

    pub fn is_stop(&self) -> bool {
        self.turn == 0.0 && self.speed == 0.0
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

impl fmt::Display for MotorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(turn {:+.3}, speed {:+.3})", self.turn, self.speed)
    }
}

/// Processing mode of the calibration challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Waiting for a colour file to be chosen; nothing to analyse
    #[default]
    FileSelect,
    /// Derive a colour range from the centre of every frame
    AutoCalibrate,
    /// Range is adjusted from outside; frames are ignored
    ManualCalibrate,
    /// Apply the current range and locate the largest matching region
    ThresholdTest,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::FileSelect => "file selection",
            Mode::AutoCalibrate => "auto calibrating",
            Mode::ManualCalibrate => "manual calibrating",
            Mode::ThresholdTest => "thresholding",
        };
        f.write_str(name)
    }
}

/// Named joystick buttons the challenges react to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    Home,
    Select,
    L1,
    L2,
    R1,
    R2,
}

impl Button {
    pub const ALL: [Button; 6] = [
        Button::Home,
        Button::Select,
        Button::L1,
        Button::L2,
        Button::R1,
        Button::R2,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            Button::Home => "home",
            Button::Select => "select",
            Button::L1 => "l1",
            Button::L2 => "l2",
            Button::R1 => "r1",
            Button::R2 => "r2",
        }
    }
}

impl FromStr for Button {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Button::ALL
            .into_iter()
            .find(|b| b.name() == name)
            .ok_or_else(|| format!("unknown button '{}'", s.trim()))
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of buttons pressed since the previous poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonPresses(u8);

impl ButtonPresses {
    pub fn none() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, button: Button) {
        self.0 |= button.bit();
    }

    pub fn contains(&self, button: Button) -> bool {
        self.0 & button.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Pressed buttons in declaration order
    pub fn iter(&self) -> impl Iterator<Item = Button> + '_ {
        Button::ALL.into_iter().filter(move |b| self.contains(*b))
    }
}

impl FromIterator<Button> for ButtonPresses {
    fn from_iter<I: IntoIterator<Item = Button>>(iter: I) -> Self {
        let mut presses = ButtonPresses::none();
        for button in iter {
            presses.insert(button);
        }
        presses
    }
}

/// Why a challenge stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The challenge deadline passed
    Timeout,
    /// `stop()` was requested by a caller
    Stopped,
    /// User interrupt (Ctrl+C)
    Interrupted,
    /// The frame handler reported that it is done
    Finished,
    /// The camera stopped delivering frames
    CameraFailed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::Timeout => "timed out",
            StopReason::Stopped => "stopped",
            StopReason::Interrupted => "interrupted",
            StopReason::Finished => "finished",
            StopReason::CameraFailed => "camera failed",
        };
        f.write_str(text)
    }
}

/// Cancellation token shared by the supervisor and both pipeline threads.
///
/// The first reason recorded wins; later calls to [`CancelToken::cancel`]
/// are ignored. Waiters blocked in [`CancelToken::wait_timeout`] wake as soon
/// as the token is cancelled.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    reason: Mutex<Option<StopReason>>,
    signal: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel with `reason`. Returns `true` if this call did the cancelling.
    pub fn cancel(&self, reason: StopReason) -> bool {
        let mut guard = self.inner.reason.lock();
        if guard.is_some() {
            return false;
        }
        *guard = Some(reason);
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.signal.notify_all();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<StopReason> {
        *self.inner.reason.lock()
    }

    /// Sleep for up to `timeout`, returning early once cancelled.
    /// Returns `true` when the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.reason.lock();
        while guard.is_none() {
            if self.inner.signal.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        guard.is_some()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_motor_command_clamps() {
        let cmd = MotorCommand::new(3.0, -7.5);
        assert_eq!(cmd.turn, 1.0);
        assert_eq!(cmd.speed, -1.0);

        let cmd = MotorCommand::new(f32::NAN, f32::INFINITY);
        assert!(cmd.is_stop());
    }

    #[test]
    fn test_button_parse() {
        assert_eq!("home".parse::<Button>().unwrap(), Button::Home);
        assert_eq!(" R2 ".parse::<Button>().unwrap(), Button::R2);
        assert!("start".parse::<Button>().is_err());
    }

    #[test]
    fn test_button_presses_iterate_in_order() {
        let presses: ButtonPresses = [Button::R2, Button::Home, Button::L1].into_iter().collect();
        let pressed: Vec<Button> = presses.iter().collect();
        assert_eq!(pressed, vec![Button::Home, Button::L1, Button::R2]);
        assert!(!presses.contains(Button::Select));
        assert!(ButtonPresses::none().is_empty());
    }

    #[test]
    fn test_cancel_first_reason_wins() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel(StopReason::Timeout));
        assert!(!token.cancel(StopReason::Stopped));
        assert_eq!(token.reason(), Some(StopReason::Timeout));
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let start = Instant::now();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        token.cancel(StopReason::Interrupted);
        assert!(handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_wait_timeout_expires() {
        let token = CancelToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(10)));
    }
}
