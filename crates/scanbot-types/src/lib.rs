//! `scanbot-types` – data model shared by every layer of the scan head stack.
//!
//! The sweep produces [`RangeSample`]s, the segmenter turns them into
//! [`DetectedObject`]s, the pose tracker integrates [`OdometryDelta`]s into a
//! [`Pose`], and the occupancy grid stores one [`GridCell`] per cell.

use std::f64::consts::PI;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Degrees-to-radians factor used by every polar computation.
pub const DEG_TO_RAD: f64 = PI / 180.0;

// ────────────────────────────────────────────────────────────────────────────
// Sweep data
// ────────────────────────────────────────────────────────────────────────────

/// One sweep step: the head angle and the two fused range readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSample {
    /// Head angle in degrees, `0..=180`.
    pub angle_deg: i32,
    /// Averaged infrared range (cm).
    pub ir_distance_cm: i32,
    /// Ultrasonic echo range (cm).
    pub ping_distance_cm: i32,
}

impl RangeSample {
    pub fn new(angle_deg: i32, ir_distance_cm: i32, ping_distance_cm: i32) -> Self {
        Self {
            angle_deg,
            ir_distance_cm,
            ping_distance_cm,
        }
    }
}

/// A contiguous angular run believed to contain one physical object.
///
/// `start_angle == end_angle` marks a degenerate ("dud") detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub start_angle: i32,
    pub end_angle: i32,
    /// Echo range recorded when the run was opened (cm).
    pub range_cm: i32,
}

impl DetectedObject {
    /// Create an object spanning `a..=b`.  The boundaries are ordered so that
    /// `start_angle <= end_angle` always holds.
    pub fn new(a: i32, b: i32, range_cm: i32) -> Self {
        Self {
            start_angle: a.min(b),
            end_angle: a.max(b),
            range_cm,
        }
    }

    /// True for a single-angle run.
    pub fn is_dud(&self) -> bool {
        self.start_angle == self.end_angle
    }

    /// `1 + end - start`.
    pub fn angular_width_deg(&self) -> i32 {
        1 + self.end_angle - self.start_angle
    }

    /// Arc length subtended at `range_cm`; never negative.
    pub fn linear_width_cm(&self) -> f64 {
        f64::from(self.angular_width_deg()) * f64::from(self.range_cm.max(0)) * DEG_TO_RAD
    }

    /// Integer midpoint of the run, used to aim the head at the object.
    pub fn midpoint_deg(&self) -> i32 {
        (self.start_angle + self.end_angle) / 2
    }
}

/// Advisory relation between two finalized objects of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairRelation {
    /// Index of the first object in the sweep's object list.
    pub first: usize,
    /// Index of the second object.
    pub second: usize,
    /// Centre-to-centre separation (cm).
    pub separation_cm: f64,
    /// Both objects narrow and evenly spaced, like a pair of goal posts.
    pub post_pair: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Dead reckoning
// ────────────────────────────────────────────────────────────────────────────

/// Normalise `deg` into `[0, 360)`.
pub fn normalize_heading(deg: f64) -> f64 {
    let h = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if h >= 360.0 { 0.0 } else { h }
}

/// Running position/heading estimate.  Position is in decimetres, which is
/// also the grid cell size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x_dm: f64,
    pub y_dm: f64,
    /// Counter-clockwise from +x, always in `[0, 360)`.
    pub heading_deg: f64,
}

impl Pose {
    pub fn new(x_dm: f64, y_dm: f64, heading_deg: f64) -> Self {
        Self {
            x_dm,
            y_dm,
            heading_deg: normalize_heading(heading_deg),
        }
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "heading {:.0} deg ccw of +x, position ({:.2}, {:.2})",
            self.heading_deg, self.x_dm, self.y_dm
        )
    }
}

/// Odometry accumulated between two pose commits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OdometryDelta {
    pub turned_deg: f64,
    pub moved_mm: f64,
}

impl OdometryDelta {
    pub fn new(turned_deg: f64, moved_mm: f64) -> Self {
        Self {
            turned_deg,
            moved_mm,
        }
    }

    pub fn turn(turned_deg: f64) -> Self {
        Self::new(turned_deg, 0.0)
    }

    pub fn drive(moved_mm: f64) -> Self {
        Self::new(0.0, moved_mm)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Map
// ────────────────────────────────────────────────────────────────────────────

/// Symbol drawn for the robot when a grid is rendered.
pub const ROBOT_MARKER: char = 'R';

/// Symbolic classification of one occupancy grid cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridCell {
    /// Observed and free.
    Empty,
    /// Never observed.
    #[default]
    Unexplored,
    /// A detected object boundary.
    Object,
    /// A drop-off reported by the cliff sensors.
    Cliff,
    /// A boundary line reported by the cliff signal strength.
    Edge,
    /// A bumper contact.
    Bump,
}

impl GridCell {
    /// One-character rendering of the cell.
    pub fn symbol(self) -> char {
        match self {
            GridCell::Empty => ' ',
            GridCell::Unexplored => '#',
            GridCell::Object => 'B',
            GridCell::Cliff => 'C',
            GridCell::Edge => 'G',
            GridCell::Bump => 'L',
        }
    }
}

/// Hazard event reported while driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hazard {
    Cliff,
    Edge,
    Bump,
}

impl Hazard {
    /// Grid symbol written under the robot for this hazard.
    pub fn cell(self) -> GridCell {
        match self {
            Hazard::Cliff => GridCell::Cliff,
            Hazard::Edge => GridCell::Edge,
            Hazard::Bump => GridCell::Bump,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Diagnostics
// ────────────────────────────────────────────────────────────────────────────

/// Summary of one scan cycle, emitted to the diagnostics sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Pose the objects were projected from.
    pub pose: Pose,
    /// Every finalized object, duds included, in sweep order.
    pub objects: Vec<DetectedObject>,
    /// Number of non-dud objects.
    pub object_count: usize,
    /// Index of the narrowest non-dud object, if any.
    pub primary: Option<usize>,
    pub pairs: Vec<PairRelation>,
}

impl ScanReport {
    /// Stamp a new report with a fresh id and the current time.
    pub fn new(
        pose: Pose,
        objects: Vec<DetectedObject>,
        primary: Option<usize>,
        pairs: Vec<PairRelation>,
    ) -> Self {
        let object_count = objects.iter().filter(|o| !o.is_dud()).count();
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            pose,
            objects,
            object_count,
            primary,
            pairs,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by the hardware traits and the scan pipeline.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScanError {
    #[error("Echo timeout after {waited_ms} ms")]
    EchoTimeout { waited_ms: u64 },

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_boundaries_are_ordered() {
        let obj = DetectedObject::new(40, 30, 50);
        assert_eq!(obj.start_angle, 30);
        assert_eq!(obj.end_angle, 40);
        assert!(obj.start_angle <= obj.end_angle);
    }

    #[test]
    fn object_widths() {
        let obj = DetectedObject::new(10, 19, 50);
        assert_eq!(obj.angular_width_deg(), 10);
        let expected = 10.0 * 50.0 * DEG_TO_RAD;
        assert!((obj.linear_width_cm() - expected).abs() < 1e-9);
        assert_eq!(obj.midpoint_deg(), 14);
    }

    #[test]
    fn dud_has_unit_angular_width() {
        let obj = DetectedObject::new(90, 90, 40);
        assert!(obj.is_dud());
        assert_eq!(obj.angular_width_deg(), 1);
    }

    #[test]
    fn negative_range_never_yields_negative_width() {
        let obj = DetectedObject::new(0, 5, -12);
        assert!(obj.linear_width_cm() >= 0.0);
    }

    #[test]
    fn heading_normalisation() {
        assert!((normalize_heading(370.0) - 10.0).abs() < 1e-9);
        assert!((normalize_heading(-90.0) - 270.0).abs() < 1e-9);
        assert_eq!(normalize_heading(360.0), 0.0);
        let tiny = normalize_heading(-1e-20);
        assert!((0.0..360.0).contains(&tiny));
    }

    #[test]
    fn pose_display_mentions_heading_and_position() {
        let pose = Pose::new(47.0, 47.0, 90.0);
        let s = pose.to_string();
        assert!(s.contains("heading 90 deg"));
        assert!(s.contains("(47.00, 47.00)"));
    }

    #[test]
    fn grid_cell_symbols_are_distinct() {
        let cells = [
            GridCell::Empty,
            GridCell::Unexplored,
            GridCell::Object,
            GridCell::Cliff,
            GridCell::Edge,
            GridCell::Bump,
        ];
        let mut symbols: Vec<char> = cells.iter().map(|c| c.symbol()).collect();
        symbols.push(ROBOT_MARKER);
        let len = symbols.len();
        symbols.sort_unstable();
        symbols.dedup();
        assert_eq!(symbols.len(), len);
    }

    #[test]
    fn hazard_maps_to_cell() {
        assert_eq!(Hazard::Cliff.cell(), GridCell::Cliff);
        assert_eq!(Hazard::Edge.cell(), GridCell::Edge);
        assert_eq!(Hazard::Bump.cell(), GridCell::Bump);
    }

    #[test]
    fn scan_report_roundtrip() {
        let report = ScanReport::new(
            Pose::new(1.0, 2.0, 45.0),
            vec![DetectedObject::new(10, 20, 55), DetectedObject::new(60, 60, 70)],
            Some(0),
            vec![],
        );
        assert_eq!(report.object_count, 1);
        let json = serde_json::to_string(&report).unwrap();
        let back: ScanReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, report.id);
        assert_eq!(back.objects, report.objects);
        assert_eq!(back.primary, Some(0));
    }

    #[test]
    fn scan_error_display() {
        let err = ScanError::EchoTimeout { waited_ms: 30 };
        assert!(err.to_string().contains("30 ms"));

        let err2 = ScanError::HardwareFault {
            component: "head_servo".to_string(),
            details: "stalled".to_string(),
        };
        assert!(err2.to_string().contains("head_servo"));
    }
}
