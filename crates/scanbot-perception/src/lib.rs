//! `scanbot-perception` – Fusion and geometry core.
//!
//! Turns a sweep of the dual-modality range head into bounded object
//! detections and writes them, together with hazard events, onto a
//! dead-reckoned occupancy grid.
//!
//! # Modules
//!
//! - [`sweep`] – [`sweep`][sweep::sweep]: lazy, angle-indexed sampling of a
//!   [`RangeSensor`][scanbot_hal::RangeSensor] behind an
//!   [`Actuator`][scanbot_hal::Actuator].
//! - [`segment`] – [`ObjectSegmenter`][segment::ObjectSegmenter]: run
//!   detection over the sample stream with a pluggable
//!   [`TriggerStrategy`][segment::TriggerStrategy], primary-target ranking and
//!   pair classification.
//! - [`pose`] – [`PoseTracker`][pose::PoseTracker]: dead-reckoning from
//!   turn/drive odometry.
//! - [`grid`] – [`OccupancyGrid`][grid::OccupancyGrid]: polar-to-grid
//!   projection with clipping, hazard marking and text rendering.

pub mod grid;
pub mod pose;
pub mod segment;
pub mod sweep;

pub use grid::{GridConfig, OccupancyGrid};
pub use pose::PoseTracker;
pub use segment::{ObjectSegmenter, PairBands, Segmentation, TriggerRule, TriggerStrategy};
pub use sweep::{SweepConfig, aim_at_primary, scan_objects, sweep};
