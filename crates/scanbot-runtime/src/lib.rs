//! `scanbot-runtime` – Session state and ambient services.
//!
//! Owns the pieces that live for a whole session and wires the perception
//! core to configuration, diagnostics and logging.
//!
//! # Modules
//!
//! - [`state`] – [`RobotState`][state::RobotState]: the pose estimate and the
//!   occupancy grid, passed by `&mut` to every operation that touches them,
//!   and the full scan cycle (clear, sweep, segment, project, re-aim,
//!   report).
//! - [`config`] – [`Config`][config::Config]: every unit-specific constant as
//!   a named, documented field, loaded from `~/.scanbot/config.toml` with
//!   `SCANBOT_*` environment overrides.
//! - [`hazard`] – [`classify`][hazard::classify]: cliff, edge and bump events
//!   from the drive base's safety sensors.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.

pub mod config;
pub mod hazard;
pub mod state;
pub mod telemetry;

pub use config::Config;
pub use hazard::{HazardConfig, HazardEvent, HazardSignals};
pub use state::RobotState;
