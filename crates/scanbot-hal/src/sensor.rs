//! Generic `RangeSensor` trait for the dual-modality scan head, plus the
//! infrared ADC calibration.
//!
//! The head carries an infrared ranger (synchronous, one ADC conversion per
//! read) and an ultrasonic ranger (asynchronous, timed through
//! [`echo`][crate::echo]).  Drivers implement [`RangeSensor`]; the sweep only
//! ever talks to the trait.

use std::time::Duration;

use scanbot_types::ScanError;
use serde::{Deserialize, Serialize};

use crate::echo::{EchoConfig, await_echo};

/// Full-scale value of the 12-bit infrared ADC.
pub const IR_ADC_MAX: u16 = 0x0FFF;

/// A scan head with an infrared and an ultrasonic ranger.
pub trait RangeSensor: Send {
    /// Stable identifier, e.g. `"scan_head"`.
    fn id(&self) -> &str;

    /// One infrared range reading (cm).
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::HardwareFault`] if the conversion cannot run.
    fn read_infrared(&mut self) -> Result<i32, ScanError>;

    /// Reset the echo capture and fire one ultrasonic pulse.
    fn arm_echo(&mut self) -> Result<(), ScanError>;

    /// Pulse width of the armed echo in counter ticks, or `None` while the
    /// capture is still incomplete.  Never blocks.
    fn poll_echo(&mut self) -> Option<u32>;

    /// Counter and conversion calibration of the echo ranger.
    fn echo_config(&self) -> &EchoConfig;

    /// Arm, then wait up to `timeout` for the echo.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::EchoTimeout`] when the echo does not complete in
    /// time.
    fn measure_echo(&mut self, timeout: Duration) -> Result<u32, ScanError> {
        self.arm_echo()?;
        await_echo(timeout, || self.poll_echo())
    }

    /// Blocking ultrasonic range (cm) using the configured timeout.
    fn measure_echo_cm(&mut self) -> Result<i32, ScanError> {
        let config = *self.echo_config();
        let ticks = self.measure_echo(config.timeout())?;
        Ok(config.distance_cm(ticks))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Infrared calibration
// ────────────────────────────────────────────────────────────────────────────

/// Inverse-proportional model of the infrared ranger:
/// `distance_cm = scale / raw_adc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfraredCalibration {
    /// Model constant, unique to each physical sensor.
    ///
    /// Calibration: record the mean raw ADC value at 10, 20, …, 100 cm
    /// against a flat target and pass the pairs to
    /// [`InfraredCalibration::fit`].
    pub scale: i32,
}

impl Default for InfraredCalibration {
    fn default() -> Self {
        Self { scale: 38_647 }
    }
}

impl InfraredCalibration {
    /// Convert a raw ADC reading to centimetres.  A zero reading (no return
    /// at all) maps to `i32::MAX`.
    pub fn distance_cm(&self, raw: u16) -> i32 {
        if raw == 0 {
            i32::MAX
        } else {
            self.scale / i32::from(raw)
        }
    }

    /// Raw ADC value this model predicts for `distance_cm`, rounded down and
    /// clamped into the ADC range.
    pub fn raw_for(&self, distance_cm: i32) -> u16 {
        if distance_cm <= 0 {
            return IR_ADC_MAX;
        }
        (self.scale / distance_cm).clamp(1, i32::from(IR_ADC_MAX)) as u16
    }

    /// Fit `scale` to `(actual_cm, mean_raw)` pairs by coarse-to-fine search
    /// (steps of 1000, 100, 10, 1) minimising the summed relative error of
    /// the predicted raw value.  Returns `None` for empty or non-positive
    /// input.
    pub fn fit(pairs: &[(i32, f64)]) -> Option<Self> {
        if pairs.is_empty() || pairs.iter().any(|&(d, raw)| d <= 0 || raw <= 0.0) {
            return None;
        }
        let error = |scale: i64| -> f64 {
            pairs
                .iter()
                .map(|&(d, raw)| ((scale as f64 / f64::from(d)) - raw).abs() / raw)
                .sum()
        };

        let (mut low, mut high) = (1_i64, 100_000_i64);
        let mut best = low;
        for step in [1000_i64, 100, 10, 1] {
            let mut best_err = f64::INFINITY;
            let mut candidate = low;
            while candidate <= high {
                let e = error(candidate);
                if e < best_err {
                    best_err = e;
                    best = candidate;
                }
                candidate += step;
            }
            low = (best - step).max(1);
            high = best + step;
        }
        Some(Self {
            scale: i32::try_from(best).ok()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::echo::{EchoCapture, EdgeCapture, echo_channel};

    /// Sensor whose echo completes after a fixed number of polls.
    struct MockSensor {
        edges: EdgeCapture,
        echo: EchoCapture,
        polls_until_echo: u32,
        polls: u32,
    }

    impl MockSensor {
        fn new(polls_until_echo: u32) -> Self {
            let (edges, echo) = echo_channel(EchoConfig::default());
            Self {
                edges,
                echo,
                polls_until_echo,
                polls: 0,
            }
        }
    }

    impl RangeSensor for MockSensor {
        fn id(&self) -> &str {
            "mock_head"
        }

        fn read_infrared(&mut self) -> Result<i32, ScanError> {
            Ok(42)
        }

        fn arm_echo(&mut self) -> Result<(), ScanError> {
            self.polls = 0;
            self.echo.arm();
            self.edges.on_edge(100);
            Ok(())
        }

        fn poll_echo(&mut self) -> Option<u32> {
            self.polls += 1;
            if self.polls == self.polls_until_echo {
                self.edges.on_edge(100 + 46_648);
            }
            self.echo.poll_ticks()
        }

        fn echo_config(&self) -> &EchoConfig {
            self.echo.config()
        }
    }

    #[test]
    fn measure_echo_waits_for_second_edge() {
        let mut sensor = MockSensor::new(3);
        let ticks = sensor.measure_echo(Duration::from_secs(1)).unwrap();
        assert_eq!(ticks, 46_648);
        assert_eq!(sensor.polls, 3);
    }

    #[test]
    fn measure_echo_cm_converts() {
        let mut sensor = MockSensor::new(1);
        assert_eq!(sensor.measure_echo_cm().unwrap(), 50);
    }

    #[test]
    fn measure_echo_times_out() {
        let mut sensor = MockSensor::new(u32::MAX);
        let err = sensor.measure_echo(Duration::from_millis(2)).unwrap_err();
        assert!(matches!(err, ScanError::EchoTimeout { .. }));
    }

    #[test]
    fn ir_distance_is_inverse_of_raw() {
        let cal = InfraredCalibration::default();
        assert_eq!(cal.distance_cm(773), 49);
        assert_eq!(cal.distance_cm(0), i32::MAX);
    }

    #[test]
    fn raw_for_roundtrips_through_distance() {
        let cal = InfraredCalibration::default();
        for d in [10, 25, 48, 50, 99, 150] {
            assert_eq!(cal.distance_cm(cal.raw_for(d)), d, "distance {d}");
        }
        assert_eq!(cal.raw_for(0), IR_ADC_MAX);
    }

    #[test]
    fn fit_recovers_scale() {
        let truth = 38_647.0;
        let pairs: Vec<(i32, f64)> = (1..=10)
            .map(|i| {
                let d = i * 10;
                (d, truth / f64::from(d))
            })
            .collect();
        let cal = InfraredCalibration::fit(&pairs).unwrap();
        assert!((cal.scale - 38_647).abs() <= 1, "got {}", cal.scale);
    }

    #[test]
    fn fit_rejects_bad_input() {
        assert!(InfraredCalibration::fit(&[]).is_none());
        assert!(InfraredCalibration::fit(&[(0, 100.0)]).is_none());
        assert!(InfraredCalibration::fit(&[(10, 0.0)]).is_none());
    }
}
