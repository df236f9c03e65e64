//! `scanbot-hal` – Hardware abstraction for the scan head.
//!
//! Everything above this crate talks to hardware through two traits, so the
//! perception pipeline runs unchanged against real drivers or the simulator.
//!
//! # Modules
//!
//! - [`echo`] – [`EchoCapture`][echo::EchoCapture] /
//!   [`EdgeCapture`][echo::EdgeCapture]: the two-edge capture state machine
//!   shared between the edge-capture interrupt and the foreground, with
//!   counter wraparound correction.
//! - [`sensor`] – [`RangeSensor`][sensor::RangeSensor]: infrared + ultrasonic
//!   ranging, and the infrared ADC calibration model.
//! - [`servo`] – [`Actuator`][servo::Actuator]: the head servo, and the
//!   angle-to-pulse calibration model.
//! - [`diagnostics`] – [`DiagnosticsSink`][diagnostics::DiagnosticsSink]:
//!   fire-and-forget text output.
//! - [`sim`] – [`SimRig`][sim::SimRig]: simulated head, servo and scene for
//!   tests and headless runs.

pub mod diagnostics;
pub mod echo;
pub mod sensor;
pub mod servo;
pub mod sim;

pub use diagnostics::{DiagnosticsSink, TracingSink};
pub use echo::{CaptureState, EchoCapture, EchoConfig, EdgeCapture, echo_channel};
pub use sensor::{InfraredCalibration, RangeSensor};
pub use servo::{Actuator, ServoCalibration};
