//! Generic `Actuator` trait for the servo that points the scan head, and the
//! pulse-width calibration used by PWM servo drivers.

use std::time::Duration;

use scanbot_types::ScanError;
use serde::{Deserialize, Serialize};

/// A position-controlled head actuator.
///
/// `set_angle` returns once the head has had time to settle, so callers may
/// sample immediately afterwards.  The wait grows with the angular distance
/// travelled.
pub trait Actuator: Send {
    /// Stable identifier, e.g. `"head_servo"`.
    fn id(&self) -> &str;

    /// Move to `angle_deg` (0 = right, 90 = straight ahead, 180 = left).
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::HardwareFault`] if the command cannot be applied.
    fn set_angle(&mut self, angle_deg: f64) -> Result<(), ScanError>;

    /// Most recently commanded angle.
    fn angle(&self) -> f64;
}

/// Linear angle-to-pulse model of a hobby servo plus its settle rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoCalibration {
    /// High time at 0 degrees (µs).
    ///
    /// Calibration: step the pulse width by hand until the horn lines up with
    /// 0° on a protractor, repeat for 180°, and fit a line through the two
    /// points; this is its intercept.
    pub zero_offset_us: f64,
    /// Additional high time per degree (µs); the slope of the same fit.
    pub us_per_degree: f64,
    /// Settle wait per degree of travel (µs).
    ///
    /// Calibration: the smallest value for which a 180° jump followed by an
    /// echo read never sees the horn still moving.
    pub settle_us_per_degree: u64,
}

impl Default for ServoCalibration {
    fn default() -> Self {
        Self {
            zero_offset_us: 549.0,
            us_per_degree: 10.122,
            settle_us_per_degree: 5_000,
        }
    }
}

impl ServoCalibration {
    /// PWM high time for `angle_deg`, truncated to whole microseconds.
    pub fn pulse_width_us(&self, angle_deg: f64) -> u32 {
        (angle_deg * self.us_per_degree + self.zero_offset_us).max(0.0) as u32
    }

    /// Time to wait after moving from `from_deg` to `to_deg`.
    pub fn settle_time(&self, from_deg: f64, to_deg: f64) -> Duration {
        let millideg = ((to_deg - from_deg) * 1000.0).abs() as u64;
        Duration::from_micros(millideg * self.settle_us_per_degree / 1000)
    }
}
