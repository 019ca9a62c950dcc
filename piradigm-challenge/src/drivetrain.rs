//! Motor output

use crate::error::{ChallengeError, Result};
use parking_lot::Mutex;
use piradigm_core::MotorCommand;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Differential drive taking normalised turn and speed
pub trait Drivetrain: Send {
    fn drive(&mut self, command: MotorCommand) -> Result<()>;

    fn stop(&mut self) -> Result<()> {
        self.drive(MotorCommand::STOP)
    }
}

/// Shared access to the drivetrain.
///
/// The processor drives through it while the pipeline runs; the supervisor
/// issues the final stop after the processor has been joined.
#[derive(Clone)]
pub struct DriveHandle {
    inner: Arc<Mutex<Box<dyn Drivetrain>>>,
}

impl DriveHandle {
    pub fn new(drivetrain: Box<dyn Drivetrain>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(drivetrain)),
        }
    }

    /// Send a command; failures are logged, not returned
    pub fn drive(&self, command: MotorCommand) {
        if let Err(e) = self.try_drive(command) {
            warn!("Drive command {} failed: {}", command, e);
        }
    }

    /// Send a command, refusing components outside [-1, 1]. Commands built
    /// with [`MotorCommand::new`] always pass; literal or deserialized ones
    /// may not.
    pub fn try_drive(&self, command: MotorCommand) -> Result<()> {
        let in_range = |v: f32| v.is_finite() && (-1.0..=1.0).contains(&v);
        if !in_range(command.turn) || !in_range(command.speed) {
            return Err(ChallengeError::Drive(format!(
                "command out of range: turn {}, speed {}",
                command.turn, command.speed
            )));
        }
        self.inner.lock().drive(command)
    }

    pub fn stop(&self) -> Result<()> {
        self.inner.lock().stop()
    }
}

/// What a [`RecordingDrivetrain`] was asked to do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveEvent {
    Drive(MotorCommand),
    Stop,
}

/// Keeps every call for later inspection
#[derive(Clone, Default)]
pub struct RecordingDrivetrain {
    events: Arc<Mutex<Vec<DriveEvent>>>,
}

impl RecordingDrivetrain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DriveEvent> {
        self.events.lock().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, DriveEvent::Stop))
            .count()
    }
}

impl Drivetrain for RecordingDrivetrain {
    fn drive(&mut self, command: MotorCommand) -> Result<()> {
        self.events.lock().push(DriveEvent::Drive(command));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.events.lock().push(DriveEvent::Stop);
        Ok(())
    }
}

/// Drivetrain that only logs, for runs without motors attached
#[derive(Debug, Default)]
pub struct LoggingDrivetrain {
    last: Option<MotorCommand>,
}

impl LoggingDrivetrain {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Drivetrain for LoggingDrivetrain {
    fn drive(&mut self, command: MotorCommand) -> Result<()> {
        if self.last != Some(command) {
            debug!(turn = command.turn, speed = command.speed, "drive");
            self.last = Some(command);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        info!("Motors stopped");
        self.last = Some(MotorCommand::STOP);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_drivetrain_through_handle() {
        let recorder = RecordingDrivetrain::new();
        let handle = DriveHandle::new(Box::new(recorder.clone()));

        handle.drive(MotorCommand::new(0.5, 1.0));
        handle.stop().unwrap();

        assert_eq!(
            recorder.events(),
            vec![DriveEvent::Drive(MotorCommand::new(0.5, 1.0)), DriveEvent::Stop]
        );
        assert_eq!(recorder.stop_count(), 1);
    }

    #[test]
    fn test_default_stop_sends_zero_command() {
        struct Last(Option<MotorCommand>);
        impl Drivetrain for Last {
            fn drive(&mut self, command: MotorCommand) -> Result<()> {
                self.0 = Some(command);
                Ok(())
            }
        }

        let mut drivetrain = Last(None);
        drivetrain.stop().unwrap();
        assert!(drivetrain.0.unwrap().is_stop());
    }

    #[test]
    fn test_out_of_range_command_never_reaches_motors() {
        let recorder = RecordingDrivetrain::new();
        let handle = DriveHandle::new(Box::new(recorder.clone()));

        let wild = MotorCommand { turn: 0.0, speed: f32::NAN };
        assert!(matches!(handle.try_drive(wild), Err(ChallengeError::Drive(_))));
        handle.drive(MotorCommand { turn: 1.5, speed: 0.0 });
        assert!(recorder.events().is_empty());

        handle.try_drive(MotorCommand { turn: -1.0, speed: 1.0 }).unwrap();
        assert_eq!(recorder.events().len(), 1);
    }
}
