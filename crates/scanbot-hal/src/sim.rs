//! In-process simulation of the scan head for tests and headless runs.
//!
//! [`SimRig`] builds a matched [`SimRangeSensor`] / [`SimServo`] pair that
//! share one head angle and look at a scripted [`SimScene`].  The sensor's
//! echo ranger goes through the real [`echo`][crate::echo] capture: arming
//! fires simulated rising/falling edges from a free-running counter that
//! wraps at the configured full scale, so wraparound correction is exercised
//! on every sweep that straddles the wrap point.
//!
//! # Example
//!
//! ```rust
//! use scanbot_hal::sensor::RangeSensor;
//! use scanbot_hal::servo::Actuator;
//! use scanbot_hal::sim::{SimObstacle, SimRig, SimScene};
//!
//! let scene = SimScene::new().with_obstacle(SimObstacle::new(80.0, 100.0, 40));
//! let (mut sensor, mut servo) = SimRig::new(scene).build();
//!
//! servo.set_angle(90.0).unwrap();
//! assert_eq!(sensor.read_infrared().unwrap(), 40);
//! assert_eq!(sensor.measure_echo_cm().unwrap(), 40);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use scanbot_types::ScanError;

use crate::diagnostics::DiagnosticsSink;
use crate::echo::{EchoCapture, EchoConfig, EdgeCapture, echo_channel};
use crate::sensor::{InfraredCalibration, RangeSensor};
use crate::servo::{Actuator, ServoCalibration};

/// Counter ticks between consecutive simulated pings (21 ms at 16 MHz).
const PING_PERIOD_TICKS: u64 = 336_000;

// ────────────────────────────────────────────────────────────────────────────
// Scene
// ────────────────────────────────────────────────────────────────────────────

/// An object occupying an angular span at a fixed range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimObstacle {
    pub start_deg: f64,
    pub end_deg: f64,
    pub range_cm: i32,
    /// Added to the infrared reading only, to model sensor disagreement.
    pub ir_bias_cm: i32,
}

impl SimObstacle {
    pub fn new(start_deg: f64, end_deg: f64, range_cm: i32) -> Self {
        Self {
            start_deg: start_deg.min(end_deg),
            end_deg: start_deg.max(end_deg),
            range_cm,
            ir_bias_cm: 0,
        }
    }

    pub fn with_ir_bias(mut self, bias_cm: i32) -> Self {
        self.ir_bias_cm = bias_cm;
        self
    }
}

/// What the head sees at every angle.
#[derive(Debug, Clone, PartialEq)]
pub struct SimScene {
    obstacles: Vec<SimObstacle>,
    /// Infrared reading with nothing in view.
    pub background_ir_cm: i32,
    /// Echo reading with nothing in view.
    pub background_ping_cm: i32,
}

impl Default for SimScene {
    fn default() -> Self {
        Self {
            obstacles: Vec::new(),
            background_ir_cm: 250,
            background_ping_cm: 300,
        }
    }
}

impl SimScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_obstacle(mut self, obstacle: SimObstacle) -> Self {
        self.obstacles.push(obstacle);
        self
    }

    /// `(ir_cm, ping_cm)` at `angle_deg`; the nearest covering obstacle wins.
    pub fn ranges_at(&self, angle_deg: f64) -> (i32, i32) {
        self.obstacles
            .iter()
            .filter(|o| angle_deg >= o.start_deg && angle_deg <= o.end_deg)
            .min_by_key(|o| o.range_cm)
            .map(|o| (o.range_cm + o.ir_bias_cm, o.range_cm))
            .unwrap_or((self.background_ir_cm, self.background_ping_cm))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared head angle
// ────────────────────────────────────────────────────────────────────────────

/// Head angle shared between the simulated servo and sensor.
#[derive(Debug, Clone, Default)]
pub struct HeadAngle(Arc<AtomicU64>);

impl HeadAngle {
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn set(&self, angle_deg: f64) {
        self.0.store(angle_deg.to_bits(), Ordering::Release);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated servo
// ────────────────────────────────────────────────────────────────────────────

/// A simulated head servo that records every commanded angle and the PWM
/// pulse width a real driver would emit.  Always succeeds.
pub struct SimServo {
    id: String,
    head: HeadAngle,
    calibration: ServoCalibration,
    history: Vec<f64>,
    last_pulse_us: u32,
    realtime: bool,
}

impl SimServo {
    pub fn new(id: impl Into<String>, head: HeadAngle, calibration: ServoCalibration) -> Self {
        Self {
            id: id.into(),
            head,
            calibration,
            history: Vec::new(),
            last_pulse_us: 0,
            realtime: false,
        }
    }

    /// Actually sleep for the settle time on every move.
    pub fn realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    /// Every angle commanded so far, in order.
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    pub fn last_pulse_us(&self) -> u32 {
        self.last_pulse_us
    }
}

impl Actuator for SimServo {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_angle(&mut self, angle_deg: f64) -> Result<(), ScanError> {
        let settle = self.calibration.settle_time(self.head.get(), angle_deg);
        self.last_pulse_us = self.calibration.pulse_width_us(angle_deg);
        self.head.set(angle_deg);
        self.history.push(angle_deg);
        if self.realtime && !settle.is_zero() {
            std::thread::sleep(settle);
        }
        Ok(())
    }

    fn angle(&self) -> f64 {
        self.head.get()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated sensor
// ────────────────────────────────────────────────────────────────────────────

/// A simulated dual-modality scan head looking at a [`SimScene`].
pub struct SimRangeSensor {
    id: String,
    scene: SimScene,
    head: HeadAngle,
    infrared: InfraredCalibration,
    edges: EdgeCapture,
    echo: EchoCapture,
    counter: u32,
    lose_echo: bool,
    ir_reads: usize,
    pings: usize,
}

impl SimRangeSensor {
    pub fn new(id: impl Into<String>, scene: SimScene, head: HeadAngle, echo: EchoConfig) -> Self {
        let (edges, echo) = echo_channel(echo);
        Self {
            id: id.into(),
            scene,
            head,
            infrared: InfraredCalibration::default(),
            edges,
            echo,
            counter: 0,
            lose_echo: false,
            ir_reads: 0,
            pings: 0,
        }
    }

    pub fn ir_reads(&self) -> usize {
        self.ir_reads
    }

    pub fn pings(&self) -> usize {
        self.pings
    }

    fn wrap(&self) -> u64 {
        u64::from(self.echo.config().wrap_ticks.max(1))
    }
}

impl RangeSensor for SimRangeSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn read_infrared(&mut self) -> Result<i32, ScanError> {
        self.ir_reads += 1;
        let (ir_cm, _) = self.scene.ranges_at(self.head.get());
        let raw = self.infrared.raw_for(ir_cm);
        Ok(self.infrared.distance_cm(raw))
    }

    fn arm_echo(&mut self) -> Result<(), ScanError> {
        self.pings += 1;
        self.echo.arm();

        let (_, ping_cm) = self.scene.ranges_at(self.head.get());
        let config = *self.echo.config();
        // Half a centimetre of margin so truncation lands on `ping_cm`.
        let ticks = ((f64::from(ping_cm.max(0)) + 0.5) / config.ticks_to_cm) as u64;
        let rising = self.counter;
        let falling = ((u64::from(rising) + ticks) % self.wrap()) as u32;

        self.edges.on_edge(rising);
        if !self.lose_echo {
            self.edges.on_edge(falling);
        }
        self.counter = ((u64::from(self.counter) + PING_PERIOD_TICKS) % self.wrap()) as u32;
        Ok(())
    }

    fn poll_echo(&mut self) -> Option<u32> {
        self.echo.poll_ticks()
    }

    fn echo_config(&self) -> &EchoConfig {
        self.echo.config()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRig builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for a matched simulated sensor / servo pair.
pub struct SimRig {
    scene: SimScene,
    echo: EchoConfig,
    infrared: InfraredCalibration,
    servo: ServoCalibration,
    counter_start: u32,
    lose_echo: bool,
    realtime: bool,
}

impl SimRig {
    pub fn new(scene: SimScene) -> Self {
        Self {
            scene,
            echo: EchoConfig::default(),
            infrared: InfraredCalibration::default(),
            servo: ServoCalibration::default(),
            counter_start: 0,
            lose_echo: false,
            realtime: false,
        }
    }

    pub fn with_echo_config(mut self, echo: EchoConfig) -> Self {
        self.echo = echo;
        self
    }

    pub fn with_infrared(mut self, infrared: InfraredCalibration) -> Self {
        self.infrared = infrared;
        self
    }

    pub fn with_servo(mut self, servo: ServoCalibration) -> Self {
        self.servo = servo;
        self
    }

    /// Initial value of the free-running capture counter.
    pub fn with_counter_start(mut self, tick: u32) -> Self {
        self.counter_start = tick;
        self
    }

    /// Drop every falling edge so that echo measurements time out.
    pub fn with_lost_echo(mut self) -> Self {
        self.lose_echo = true;
        self
    }

    /// Sleep for the servo settle time on every move.
    pub fn realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    pub fn build(self) -> (SimRangeSensor, SimServo) {
        let head = HeadAngle::default();
        let mut sensor = SimRangeSensor::new("scan_head", self.scene, head.clone(), self.echo);
        sensor.infrared = self.infrared;
        sensor.counter = self.counter_start % self.echo.wrap_ticks.max(1);
        sensor.lose_echo = self.lose_echo;

        let mut servo = SimServo::new("head_servo", head, self.servo);
        if self.realtime {
            servo = servo.realtime();
        }
        (sensor, servo)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Recording sink
// ────────────────────────────────────────────────────────────────────────────

/// Diagnostics sink that keeps every emitted line.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub lines: Vec<String>,
}

impl DiagnosticsSink for MemorySink {
    fn emit(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}
