//! Colour calibration challenge
//!
//! Buttons switch between modes: `l2` derives the colour range from the
//! centre of each frame, `r2` checks it by masking the frame and locating
//! the largest matching region, `l1` hands adjustment to an external editor,
//! `home` returns to file selection. `select` stores the range and `r1` ends
//! the challenge.

use crate::error::Result;
use crate::processor::{FrameContext, FrameHandler};
use crate::storage::CalibrationStore;
use piradigm_core::{Button, ButtonPresses, CalibrationConfig, Mode};
use piradigm_eye::{ColourRange, Detection, Frame, Vision};
use tracing::{debug, info};

/// Order in which buttons from one poll are applied
const BUTTON_ORDER: [Button; 6] = [
    Button::Home,
    Button::Select,
    Button::R1,
    Button::R2,
    Button::L1,
    Button::L2,
];

pub struct CalibrationChallenge {
    mode: Mode,
    range: ColourRange,
    sigma: f32,
    colour_key: String,
    store: Box<dyn CalibrationStore>,
    vision: Vision,
    last_detection: Option<Detection>,
    finished: bool,
}

impl CalibrationChallenge {
    /// Starts in file selection with the stored range for the configured
    /// colour, or the full range when none is stored.
    pub fn new(config: &CalibrationConfig, store: Box<dyn CalibrationStore>) -> Result<Self> {
        let range = store.load(&config.colour_key)?.unwrap_or_default();
        info!(colour = %config.colour_key, ?range, "Calibration starting");
        Ok(Self {
            mode: Mode::FileSelect,
            range,
            sigma: config.sigma,
            colour_key: config.colour_key.clone(),
            store,
            vision: Vision::native(),
            last_detection: None,
            finished: false,
        })
    }

    pub fn with_vision(mut self, vision: Vision) -> Self {
        self.vision = vision;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            info!(from = %self.mode, to = %mode, "Calibration mode changed");
            self.mode = mode;
        }
    }

    pub fn range(&self) -> ColourRange {
        self.range
    }

    /// Replace the range, as an external editor does in manual mode
    pub fn set_range(&mut self, range: ColourRange) {
        self.range = range;
    }

    /// Centroid and area of the largest region from the last threshold test
    pub fn last_detection(&self) -> Option<Detection> {
        self.last_detection
    }

    pub fn save(&mut self) -> Result<()> {
        self.store.save(&self.colour_key, &self.range)?;
        info!(colour = %self.colour_key, range = ?self.range, "Colour range saved");
        Ok(())
    }
}

impl FrameHandler for CalibrationChallenge {
    fn name(&self) -> &str {
        "calibration"
    }

    fn process(&mut self, frame: &Frame, _ctx: &FrameContext<'_>) -> Result<()> {
        match self.mode {
            Mode::FileSelect => {}
            Mode::AutoCalibrate => {
                let hsv = self.vision.to_hsv(frame)?;
                if let Some(range) = self.vision.colour_limits(&hsv, self.sigma)? {
                    self.range = range.clamped();
                    debug!(lower = ?self.range.lower, upper = ?self.range.upper, "Auto calibrated");
                }
            }
            Mode::ManualCalibrate => {}
            Mode::ThresholdTest => {
                let hsv = self.vision.to_hsv(frame)?;
                let mask = self.vision.threshold(&hsv, &self.range)?;
                self.last_detection = self.vision.largest_region(&mask)?;
                match self.last_detection {
                    Some(found) => debug!(x = found.x, y = found.y, area = found.size, "Target found"),
                    None => debug!("No target in mask"),
                }
            }
        }
        Ok(())
    }

    fn on_buttons(&mut self, presses: ButtonPresses) -> Result<()> {
        for button in BUTTON_ORDER.into_iter().filter(|b| presses.contains(*b)) {
            match button {
                Button::Home => self.set_mode(Mode::FileSelect),
                Button::Select => {
                    if self.mode != Mode::FileSelect {
                        self.save()?;
                    }
                }
                Button::R1 => {
                    info!("Calibration finished");
                    self.finished = true;
                }
                Button::R2 => self.set_mode(Mode::ThresholdTest),
                Button::L1 => self.set_mode(Mode::ManualCalibrate),
                Button::L2 => self.set_mode(Mode::AutoCalibrate),
            }
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivetrain::{DriveHandle, RecordingDrivetrain};
    use crate::storage::MemoryStore;
    use image::{Rgb, RgbImage};
    use piradigm_core::CancelToken;

    fn challenge(store: MemoryStore) -> CalibrationChallenge {
        CalibrationChallenge::new(&CalibrationConfig::default(), Box::new(store)).unwrap()
    }

    fn presses(buttons: &[Button]) -> ButtonPresses {
        buttons.iter().copied().collect()
    }

    fn with_ctx(f: impl FnOnce(&FrameContext<'_>)) {
        let drive = DriveHandle::new(Box::new(RecordingDrivetrain::new()));
        let cancel = CancelToken::new();
        f(&FrameContext { drive: &drive, cancel: &cancel });
    }

    #[test]
    fn test_initial_range_is_full_without_stored_colour() {
        let challenge = challenge(MemoryStore::new());
        assert_eq!(challenge.mode(), Mode::FileSelect);
        assert_eq!(challenge.range(), ColourRange::full());
    }

    #[test]
    fn test_initial_range_comes_from_store() {
        let stored = ColourRange::new([170.0, 90.0, 90.0], [8.0, 255.0, 255.0]);
        let challenge = challenge(MemoryStore::new().with_range("red", stored));
        assert_eq!(challenge.range(), stored);
    }

    #[test]
    fn test_button_mapping() {
        let mut c = challenge(MemoryStore::new());
        c.on_buttons(presses(&[Button::L2])).unwrap();
        assert_eq!(c.mode(), Mode::AutoCalibrate);
        c.on_buttons(presses(&[Button::L1])).unwrap();
        assert_eq!(c.mode(), Mode::ManualCalibrate);
        c.on_buttons(presses(&[Button::R2])).unwrap();
        assert_eq!(c.mode(), Mode::ThresholdTest);
        c.on_buttons(presses(&[Button::Home])).unwrap();
        assert_eq!(c.mode(), Mode::FileSelect);
        assert!(!c.is_finished());
        c.on_buttons(presses(&[Button::R1])).unwrap();
        assert!(c.is_finished());
    }

    #[test]
    fn test_buttons_apply_in_fixed_order() {
        // home first, then l2: ends in auto calibration
        let mut c = challenge(MemoryStore::new());
        c.on_buttons(presses(&[Button::L2, Button::Home])).unwrap();
        assert_eq!(c.mode(), Mode::AutoCalibrate);
    }

    #[test]
    fn test_select_saves_only_outside_file_select() {
        let store = MemoryStore::new();
        let mut c = challenge(store.clone());

        c.on_buttons(presses(&[Button::Select])).unwrap();
        assert_eq!(store.get("red"), None);

        c.set_mode(Mode::ManualCalibrate);
        let range = ColourRange::new([1.0, 2.0, 3.0], [4.0, 5.0, 6.0]);
        c.set_range(range);
        c.on_buttons(presses(&[Button::Select])).unwrap();
        assert_eq!(store.get("red"), Some(range));
    }

    #[test]
    fn test_auto_calibrate_then_threshold_test() {
        let mut c = challenge(MemoryStore::new());
        let calibration = Frame::from_rgb(RgbImage::from_pixel(20, 20, Rgb([200, 30, 30])));
        let scene = Frame::from_rgb(RgbImage::from_fn(30, 20, |x, y| {
            if (5..11).contains(&x) && (4..9).contains(&y) {
                Rgb([200, 30, 30])
            } else {
                Rgb([30, 30, 200])
            }
        }));

        with_ctx(|ctx| {
            c.set_mode(Mode::AutoCalibrate);
            c.process(&calibration, ctx).unwrap();
            let range = c.range();
            assert_eq!(range.lower, range.upper);

            c.set_mode(Mode::ThresholdTest);
            c.process(&scene, ctx).unwrap();
        });

        let found = c.last_detection().unwrap();
        assert_eq!((found.x, found.y, found.size), (7.5, 6.0, 30.0));
    }

    #[test]
    fn test_idle_modes_leave_range_alone() {
        let mut c = challenge(MemoryStore::new());
        let frame = Frame::from_rgb(RgbImage::from_pixel(8, 8, Rgb([10, 200, 10])));
        with_ctx(|ctx| {
            for mode in [Mode::FileSelect, Mode::ManualCalibrate] {
                c.set_mode(mode);
                c.process(&frame, ctx).unwrap();
            }
        });
        assert_eq!(c.range(), ColourRange::full());
        assert!(c.last_detection().is_none());
    }
}
