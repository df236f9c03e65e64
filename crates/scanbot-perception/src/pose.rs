//! Dead-reckoning pose integrator.
//!
//! [`PoseTracker`] folds buffered [`OdometryDelta`]s into a running [`Pose`].
//! There is no filtering and no uncertainty estimate; drift is unbounded.
//!
//! # Example
//!
//! ```rust
//! use scanbot_perception::pose::PoseTracker;
//! use scanbot_types::{OdometryDelta, Pose};
//!
//! let mut tracker = PoseTracker::new(Pose::new(47.0, 47.0, 90.0), 1.0);
//! let pose = tracker.commit(OdometryDelta::drive(250.0));
//! assert!((pose.y_dm - 49.5).abs() < 1e-9);
//! ```

use scanbot_types::{DEG_TO_RAD, OdometryDelta, Pose, normalize_heading};
use tracing::info;

/// Wheel odometry reports millimetres; the pose and grid use decimetres.
const MM_PER_DM: f64 = 100.0;

/// Empirical heading correction of the reference drive base.
pub const DEFAULT_TURN_GAIN: f64 = 1.3;

/// Running pose estimate.
#[derive(Debug, Clone)]
pub struct PoseTracker {
    origin: Pose,
    pose: Pose,
    turn_gain: f64,
}

impl PoseTracker {
    /// Start at `origin`.  Every reported turn is multiplied by `turn_gain`
    /// before it is applied.
    pub fn new(origin: Pose, turn_gain: f64) -> Self {
        Self {
            origin,
            pose: origin,
            turn_gain,
        }
    }

    pub fn turn_gain(&self) -> f64 {
        self.turn_gain
    }

    pub fn origin(&self) -> Pose {
        self.origin
    }

    /// Heading change `delta` actually causes, after the turn gain.
    pub fn applied_turn_deg(&self, delta: &OdometryDelta) -> f64 {
        delta.turned_deg * self.turn_gain
    }

    /// Apply one tick of odometry and return the new pose.
    ///
    /// A non-zero turn is applied first; a non-zero drive then moves along
    /// the updated heading.  Both may apply in the same commit.
    pub fn commit(&mut self, delta: OdometryDelta) -> Pose {
        if delta.turned_deg != 0.0 {
            let turned_deg = self.applied_turn_deg(&delta);
            self.pose.heading_deg = normalize_heading(self.pose.heading_deg + turned_deg);
            info!(heading_deg = self.pose.heading_deg, "turned {:.0} deg ccw", turned_deg);
        }
        if delta.moved_mm != 0.0 {
            let distance_dm = delta.moved_mm / MM_PER_DM;
            let heading_rad = self.pose.heading_deg * DEG_TO_RAD;
            self.pose.x_dm += distance_dm * heading_rad.cos();
            self.pose.y_dm += distance_dm * heading_rad.sin();
            info!(
                x_dm = self.pose.x_dm,
                y_dm = self.pose.y_dm,
                "moved {:.0} cm forward",
                delta.moved_mm / 10.0
            );
        }
        self.pose
    }

    pub fn snapshot(&self) -> Pose {
        self.pose
    }

    /// Return to the origin.
    pub fn reset(&mut self) {
        self.pose = self.origin;
    }

    /// Move the origin and return to it.
    pub fn reset_to(&mut self, origin: Pose) {
        self.origin = origin;
        self.pose = origin;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Smallest angular distance between two headings.
    fn heading_diff(a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(360.0);
        d.min(360.0 - d)
    }

    #[test]
    fn four_quarter_turns_match_one_full_turn() {
        for start in [0.0, 45.0, 90.0, 359.5] {
            let mut tracker = PoseTracker::new(Pose::new(0.0, 0.0, start), DEFAULT_TURN_GAIN);
            for _ in 0..4 {
                tracker.commit(OdometryDelta::turn(90.0));
            }
            let expected = normalize_heading(start + 360.0 * DEFAULT_TURN_GAIN);
            assert!(heading_diff(tracker.snapshot().heading_deg, expected) < 1e-9);
        }
    }

    #[test]
    fn unit_gain_full_circle_is_identity() {
        let mut tracker = PoseTracker::new(Pose::new(0.0, 0.0, 30.0), 1.0);
        for _ in 0..4 {
            tracker.commit(OdometryDelta::turn(90.0));
        }
        assert!(heading_diff(tracker.snapshot().heading_deg, 30.0) < 1e-9);
    }

    #[test]
    fn heading_stays_normalised() {
        let mut tracker = PoseTracker::new(Pose::new(0.0, 0.0, 10.0), 1.0);
        let pose = tracker.commit(OdometryDelta::turn(-30.0));
        assert!((pose.heading_deg - 340.0).abs() < 1e-9);
        let pose = tracker.commit(OdometryDelta::turn(740.0));
        assert!((0.0..360.0).contains(&pose.heading_deg));
        assert!((pose.heading_deg - 0.0).abs() < 1e-9);
    }

    #[test]
    fn drive_moves_along_heading_in_decimetres() {
        let mut tracker = PoseTracker::new(Pose::new(47.0, 47.0, 0.0), 1.0);
        let pose = tracker.commit(OdometryDelta::drive(300.0));
        assert!((pose.x_dm - 50.0).abs() < 1e-9);
        assert!((pose.y_dm - 47.0).abs() < 1e-9);

        let pose = tracker.commit(OdometryDelta::drive(-100.0));
        assert!((pose.x_dm - 49.0).abs() < 1e-9);
    }

    #[test]
    fn combined_commit_turns_before_driving() {
        let mut tracker = PoseTracker::new(Pose::new(0.0, 0.0, 0.0), 1.0);
        let pose = tracker.commit(OdometryDelta::new(90.0, 200.0));
        assert!((pose.heading_deg - 90.0).abs() < 1e-9);
        assert!(pose.x_dm.abs() < 1e-9);
        assert!((pose.y_dm - 2.0).abs() < 1e-9);
    }

    #[test]
    fn reported_turn_includes_gain() {
        let mut tracker = PoseTracker::new(Pose::new(0.0, 0.0, 0.0), 1.3);
        let delta = OdometryDelta::turn(10.0);
        assert!((tracker.applied_turn_deg(&delta) - 13.0).abs() < 1e-9);
        let pose = tracker.commit(delta);
        assert!((pose.heading_deg - 13.0).abs() < 1e-9);
    }

    #[test]
    fn zero_delta_changes_nothing() {
        let origin = Pose::new(3.0, 4.0, 123.0);
        let mut tracker = PoseTracker::new(origin, DEFAULT_TURN_GAIN);
        assert_eq!(tracker.commit(OdometryDelta::default()), origin);
    }

    #[test]
    fn reset_returns_to_origin() {
        let origin = Pose::new(47.0, 47.0, 90.0);
        let mut tracker = PoseTracker::new(origin, DEFAULT_TURN_GAIN);
        tracker.commit(OdometryDelta::new(15.0, 500.0));
        assert_ne!(tracker.snapshot(), origin);
        tracker.reset();
        assert_eq!(tracker.snapshot(), origin);

        let moved = Pose::new(10.0, 10.0, 0.0);
        tracker.reset_to(moved);
        assert_eq!(tracker.snapshot(), moved);
        assert_eq!(tracker.origin(), moved);
    }
}
