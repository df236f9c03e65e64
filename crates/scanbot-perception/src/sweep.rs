//! Angle-indexed sensor sweep.
//!
//! [`sweep`] returns a lazy [`Sweep`] iterator: every call to `next` moves
//! the head one step, takes one ultrasonic and several averaged infrared
//! readings, and yields a [`RangeSample`].  After the last angle the head is
//! returned to the centre angle.  A sweep cannot be restarted or cancelled
//! part-way; each step blocks on the servo settle time and on sampling.
//!
//! # Example
//!
//! ```rust
//! use scanbot_hal::sim::{SimObstacle, SimRig, SimScene};
//! use scanbot_perception::sweep::{sweep, SweepConfig};
//!
//! let scene = SimScene::new().with_obstacle(SimObstacle::new(40.0, 50.0, 60));
//! let (mut sensor, mut servo) = SimRig::new(scene).build();
//! let config = SweepConfig::precise().without_delays();
//!
//! let samples: Vec<_> = sweep(&mut sensor, &mut servo, &config)
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(samples.len(), 181);
//! assert_eq!(samples[45].ping_distance_cm, 60);
//! ```

use std::time::Duration;

use scanbot_hal::sensor::RangeSensor;
use scanbot_hal::servo::Actuator;
use scanbot_types::{RangeSample, ScanError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::segment::{ObjectSegmenter, Segmentation, TriggerStrategy};

/// Echo range recorded for a step whose echo never completed.  Large enough
/// that no trigger rule treats it as an object.
pub const NO_ECHO_CM: i32 = i32::MAX;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// When the ultrasonic reading is taken relative to the infrared burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleOrder {
    /// Echo first, then the whole infrared burst.
    EchoFirst,
    /// Echo in the middle of the infrared burst.
    Interleaved,
}

/// Angle range, step and sampling pattern of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub start_deg: i32,
    pub end_deg: i32,
    pub step_deg: i32,
    /// Angle the head returns to after the sweep.
    pub center_deg: i32,
    /// Infrared readings averaged per step.
    pub ir_samples: u32,
    /// Pause between infrared readings (ms).
    pub ir_sample_delay_ms: u64,
    /// Pause after each step (ms).
    pub step_delay_ms: u64,
    pub sampling: SampleOrder,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self::precise()
    }
}

impl SweepConfig {
    /// Full-resolution sweep: 1° steps, echo first, 8 ms between infrared
    /// readings.
    pub fn precise() -> Self {
        Self {
            start_deg: 0,
            end_deg: 180,
            step_deg: 1,
            center_deg: 90,
            ir_samples: 4,
            ir_sample_delay_ms: 8,
            step_delay_ms: 50,
            sampling: SampleOrder::EchoFirst,
        }
    }

    /// Cheaper per-tick sweep: 2° steps, echo interleaved, 4 ms between
    /// infrared readings.
    pub fn coarse() -> Self {
        Self {
            step_deg: 2,
            ir_sample_delay_ms: 4,
            sampling: SampleOrder::Interleaved,
            ..Self::precise()
        }
    }

    /// Same sweep with every pause removed (simulation and tests).
    pub fn without_delays(mut self) -> Self {
        self.ir_sample_delay_ms = 0;
        self.step_delay_ms = 0;
        self
    }

    /// Number of samples this sweep produces.
    pub fn steps(&self) -> usize {
        if self.start_deg > self.end_deg {
            return 0;
        }
        ((self.end_deg - self.start_deg) / self.step_deg.max(1)) as usize + 1
    }
}

fn pause(ms: u64) {
    if ms > 0 {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sweep iterator
// ────────────────────────────────────────────────────────────────────────────

/// Lazy sweep over the configured angle range.  See the module docs.
pub struct Sweep<'a, S: RangeSensor + ?Sized, A: Actuator + ?Sized> {
    sensor: &'a mut S,
    actuator: &'a mut A,
    config: SweepConfig,
    next_angle: Option<i32>,
    finished: bool,
}

/// Start a sweep.  Nothing moves until the first call to `next`.
pub fn sweep<'a, S, A>(sensor: &'a mut S, actuator: &'a mut A, config: &SweepConfig) -> Sweep<'a, S, A>
where
    S: RangeSensor + ?Sized,
    A: Actuator + ?Sized,
{
    Sweep {
        sensor,
        actuator,
        config: *config,
        next_angle: (config.start_deg <= config.end_deg).then_some(config.start_deg),
        finished: false,
    }
}

impl<S: RangeSensor + ?Sized, A: Actuator + ?Sized> Sweep<'_, S, A> {
    fn sample_at(&mut self, angle: i32) -> Result<RangeSample, ScanError> {
        self.actuator.set_angle(f64::from(angle))?;

        let samples = self.config.ir_samples.max(1);
        let echo_after = match self.config.sampling {
            SampleOrder::EchoFirst => 0,
            SampleOrder::Interleaved => samples / 2,
        };

        let mut ping = None;
        let mut ir_sum: i64 = 0;
        for i in 0..samples {
            if i == echo_after {
                ping = Some(self.read_echo()?);
            }
            if i > 0 {
                pause(self.config.ir_sample_delay_ms);
            }
            ir_sum += i64::from(self.sensor.read_infrared()?);
        }
        let ping = match ping {
            Some(p) => p,
            None => self.read_echo()?,
        };
        let ir = (ir_sum / i64::from(samples)) as i32;

        debug!(angle, ir, ping, "sweep sample");
        pause(self.config.step_delay_ms);
        Ok(RangeSample::new(angle, ir, ping))
    }

    /// A timed-out echo degrades to [`NO_ECHO_CM`]; hardware faults propagate.
    fn read_echo(&mut self) -> Result<i32, ScanError> {
        match self.sensor.measure_echo_cm() {
            Ok(cm) => Ok(cm),
            Err(ScanError::EchoTimeout { waited_ms }) => {
                warn!(sensor = self.sensor.id(), waited_ms, "no echo; treating step as clear");
                Ok(NO_ECHO_CM)
            }
            Err(e) => Err(e),
        }
    }
}

impl<S: RangeSensor + ?Sized, A: Actuator + ?Sized> Iterator for Sweep<'_, S, A> {
    type Item = Result<RangeSample, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(angle) = self.next_angle {
            let following = angle + self.config.step_deg.max(1);
            self.next_angle = (following <= self.config.end_deg).then_some(following);
            let result = self.sample_at(angle);
            if result.is_err() {
                self.next_angle = None;
            }
            return Some(result);
        }
        if !self.finished {
            self.finished = true;
            if let Err(e) = self.actuator.set_angle(f64::from(self.config.center_deg)) {
                return Some(Err(e));
            }
        }
        None
    }
}

/// Run one sweep through an [`ObjectSegmenter`] driven by `rule`.
///
/// Hardware faults abort the sweep; a lost echo only blanks its step.
pub fn scan_objects<S, A, R>(
    sensor: &mut S,
    actuator: &mut A,
    config: &SweepConfig,
    rule: R,
) -> Result<Segmentation, ScanError>
where
    S: RangeSensor + ?Sized,
    A: Actuator + ?Sized,
    R: TriggerStrategy,
{
    let mut segmenter = ObjectSegmenter::new(rule);
    for sample in sweep(sensor, actuator, config) {
        segmenter.push(sample?);
    }
    Ok(segmenter.finish())
}

// ────────────────────────────────────────────────────────────────────────────
// Re-aim
// ────────────────────────────────────────────────────────────────────────────

/// Point the head at the midpoint of the sweep's primary object.  Returns the
/// angle aimed at, or `None` (head untouched) when there is no primary.
pub fn aim_at_primary<A: Actuator + ?Sized>(
    actuator: &mut A,
    segmentation: &Segmentation,
) -> Result<Option<i32>, ScanError> {
    match segmentation.primary() {
        Some(obj) => {
            let angle = obj.midpoint_deg();
            actuator.set_angle(f64::from(angle))?;
            Ok(Some(angle))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::TriggerRule;
    use scanbot_hal::sim::{SimObstacle, SimRig, SimScene};
    use scanbot_types::DetectedObject;

    fn scene() -> SimScene {
        SimScene::new().with_obstacle(SimObstacle::new(40.0, 50.0, 60))
    }

    #[test]
    fn precise_sweep_visits_every_degree_and_recentres() {
        let (mut sensor, mut servo) = SimRig::new(scene()).build();
        let config = SweepConfig::precise().without_delays();
        let samples: Vec<RangeSample> = sweep(&mut sensor, &mut servo, &config)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(samples.len(), config.steps());
        assert!(samples.windows(2).all(|w| w[1].angle_deg == w[0].angle_deg + 1));
        assert_eq!(samples.first().unwrap().angle_deg, 0);
        assert_eq!(samples.last().unwrap().angle_deg, 180);
        assert_eq!(servo.history().last().copied(), Some(90.0));
        assert_eq!(servo.history().len(), 182);
    }

    #[test]
    fn samples_average_infrared_and_take_one_echo() {
        let (mut sensor, mut servo) = SimRig::new(scene()).build();
        let config = SweepConfig::precise().without_delays();
        let samples: Vec<RangeSample> = sweep(&mut sensor, &mut servo, &config)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(sensor.ir_reads(), 181 * 4);
        assert_eq!(sensor.pings(), 181);
        assert_eq!(samples[45], RangeSample::new(45, 60, 60));
        assert_eq!(samples[90], RangeSample::new(90, 250, 300));
    }

    #[test]
    fn coarse_sweep_steps_by_two() {
        let (mut sensor, mut servo) = SimRig::new(scene()).build();
        let config = SweepConfig::coarse().without_delays();
        let angles: Vec<i32> = sweep(&mut sensor, &mut servo, &config)
            .map(|s| s.unwrap().angle_deg)
            .collect();
        assert_eq!(angles.len(), 91);
        assert!(angles.iter().all(|a| a % 2 == 0));
        assert_eq!(sensor.pings(), 91);
    }

    #[test]
    fn sweep_is_lazy() {
        let (mut sensor, mut servo) = SimRig::new(scene()).build();
        let config = SweepConfig::precise().without_delays();
        let mut it = sweep(&mut sensor, &mut servo, &config);
        let first = it.next().unwrap().unwrap();
        assert_eq!(first.angle_deg, 0);
        drop(it);
        assert_eq!(servo.history(), &[0.0]);
    }

    #[test]
    fn lost_echo_degrades_to_no_echo() {
        let (mut sensor, mut servo) = SimRig::new(scene()).with_lost_echo().build();
        let config = SweepConfig {
            start_deg: 44,
            end_deg: 46,
            ..SweepConfig::precise().without_delays()
        };
        let samples: Vec<RangeSample> = sweep(&mut sensor, &mut servo, &config)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(samples.len(), 3);
        assert!(samples.iter().all(|s| s.ping_distance_cm == NO_ECHO_CM));
    }

    #[test]
    fn empty_range_only_recentres() {
        let (mut sensor, mut servo) = SimRig::new(scene()).build();
        let config = SweepConfig {
            start_deg: 100,
            end_deg: 10,
            ..SweepConfig::precise().without_delays()
        };
        assert_eq!(config.steps(), 0);
        assert_eq!(sweep(&mut sensor, &mut servo, &config).count(), 0);
        assert_eq!(servo.history(), &[90.0]);
    }

    #[test]
    fn scan_objects_finds_obstacle_with_either_rule() {
        let (mut sensor, mut servo) = SimRig::new(scene()).build();
        let precise = SweepConfig::precise().without_delays();
        let found = scan_objects(&mut sensor, &mut servo, &precise, TriggerRule::default()).unwrap();
        assert_eq!(found.objects(), &[DetectedObject::new(40, 50, 60)]);

        let coarse = SweepConfig::coarse().without_delays();
        let rule = TriggerRule::from_name("coarse").unwrap();
        let found = scan_objects(&mut sensor, &mut servo, &coarse, rule).unwrap();
        assert_eq!(found.objects(), &[DetectedObject::new(40, 50, 60)]);
        assert_eq!(found.primary_index(), Some(0));
    }

    #[test]
    fn empty_scene_yields_nothing() {
        let (mut sensor, mut servo) = SimRig::new(SimScene::new()).build();
        let config = SweepConfig::precise().without_delays();
        let found = scan_objects(&mut sensor, &mut servo, &config, TriggerRule::default()).unwrap();
        assert!(found.objects().is_empty());
        assert_eq!(found.count(), 0);
    }

    #[test]
    fn aim_at_primary_uses_midpoint() {
        let (_, mut servo) = SimRig::new(scene()).build();
        let seg = Segmentation::from_objects(vec![
            DetectedObject::new(10, 30, 60),
            DetectedObject::new(100, 104, 60),
        ]);
        assert_eq!(aim_at_primary(&mut servo, &seg).unwrap(), Some(102));
        assert_eq!(servo.history(), &[102.0]);

        let none = Segmentation::from_objects(vec![DetectedObject::new(5, 5, 20)]);
        assert_eq!(aim_at_primary(&mut servo, &none).unwrap(), None);
        assert_eq!(servo.history().len(), 1);
    }
}
