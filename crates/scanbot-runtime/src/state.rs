//! Explicitly owned session state: the pose estimate and the map.
//!
//! [`RobotState`] is created once per session from a [`Config`] and passed by
//! `&mut` to everything that reads or writes the pose or the grid.
//!
//! # Example
//!
//! ```rust
//! use scanbot_hal::sim::{MemorySink, SimObstacle, SimRig, SimScene};
//! use scanbot_runtime::{Config, RobotState};
//!
//! let mut config = Config::default();
//! config.sweep = config.sweep.without_delays();
//!
//! let scene = SimScene::new().with_obstacle(SimObstacle::new(80.0, 100.0, 40));
//! let (mut sensor, mut servo) = SimRig::new(scene).build();
//! let mut sink = MemorySink::default();
//!
//! let mut state = RobotState::new(config);
//! let report = state.scan_cycle(&mut sensor, &mut servo, &mut sink).unwrap();
//! assert_eq!(report.object_count, 1);
//! assert_eq!(sink.lines.len(), 1);
//! ```

use scanbot_hal::{Actuator, DiagnosticsSink, RangeSensor};
use scanbot_perception::{OccupancyGrid, PoseTracker, aim_at_primary, scan_objects};
use scanbot_types::{Hazard, OdometryDelta, Pose, ScanError, ScanReport};
use tracing::{info, info_span, warn};

use crate::config::Config;
use crate::hazard::{HazardEvent, HazardSignals, classify};

/// Pose tracker, occupancy grid and the configuration they were built from.
#[derive(Debug, Clone)]
pub struct RobotState {
    config: Config,
    pose: PoseTracker,
    grid: OccupancyGrid,
}

impl RobotState {
    /// Fresh session: an unexplored grid with the robot at its centre,
    /// facing `pose.origin_heading_deg`.
    pub fn new(config: Config) -> Self {
        let grid = OccupancyGrid::new(config.grid.half_extent);
        let (x, y) = grid.center();
        let origin = Pose::new(x, y, config.pose.origin_heading_deg);
        Self {
            pose: PoseTracker::new(origin, config.pose.turn_gain),
            grid,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pose(&self) -> Pose {
        self.pose.snapshot()
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    /// Fold one tick of odometry into the pose.
    pub fn commit_odometry(&mut self, delta: OdometryDelta) -> Pose {
        self.pose.commit(delta)
    }

    /// Mark `hazard` under the robot.  Returns `false` if the robot has
    /// wandered off the grid.
    pub fn mark_hazard(&mut self, hazard: Hazard) -> bool {
        let pose = self.pose.snapshot();
        self.grid.mark_hazard(&pose, hazard)
    }

    /// Classify one snapshot of the safety sensors, mark every hazard found
    /// (cliff, then edge, then bump) and report each on `sink`.
    pub fn record_hazards(
        &mut self,
        signals: &HazardSignals,
        sink: &mut dyn DiagnosticsSink,
    ) -> Vec<HazardEvent> {
        let events = classify(signals, &self.config.hazards);
        for event in &events {
            warn!(hazard = ?event.hazard, sides = ?event.sides, "hazard");
            sink.emit(&event.to_string());
            self.mark_hazard(event.hazard);
        }
        events
    }

    /// Centre the head and take one echo reading straight ahead.  Returns
    /// `true` when the obstacle is inside `hazards.imminent_range_cm` and a
    /// forward drive must stop.  A lost echo reads as a clear path.
    ///
    /// # Errors
    ///
    /// Hardware faults from the sensor or actuator.
    pub fn obstacle_ahead<S, A>(&self, sensor: &mut S, actuator: &mut A) -> Result<bool, ScanError>
    where
        S: RangeSensor + ?Sized,
        A: Actuator + ?Sized,
    {
        actuator.set_angle(f64::from(self.config.sweep.center_deg))?;
        let range_cm = match sensor.measure_echo_cm() {
            Ok(cm) => cm,
            Err(ScanError::EchoTimeout { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };
        let imminent = self.config.hazards.obstacle_imminent(range_cm);
        if imminent {
            warn!(range_cm, "obstacle ahead, stop driving");
        }
        Ok(imminent)
    }

    /// One full scan from the current pose.
    ///
    /// Clears the near field, sweeps, segments, projects every non-dud object
    /// onto the grid, classifies pairs, re-aims the head at the primary
    /// object and emits the JSON [`ScanReport`] on `sink`.
    ///
    /// # Errors
    ///
    /// Hardware faults from the sensor or actuator abort the cycle.  Lost
    /// echoes do not.
    pub fn scan_cycle<S, A>(
        &mut self,
        sensor: &mut S,
        actuator: &mut A,
        sink: &mut dyn DiagnosticsSink,
    ) -> Result<ScanReport, ScanError>
    where
        S: RangeSensor + ?Sized,
        A: Actuator + ?Sized,
    {
        let _span = info_span!("scan_cycle", trigger = self.config.trigger.name()).entered();
        let pose = self.pose.snapshot();

        let cleared = self.grid.clear_arc(&pose, &self.config.grid);
        let segmentation = scan_objects(sensor, actuator, &self.config.sweep, self.config.trigger)?;

        let mut projected = 0;
        for object in segmentation.objects().iter().filter(|o| !o.is_dud()) {
            projected += self.grid.project_object(object, &pose);
        }
        let pairs = segmentation.pairs(&self.config.pairs);
        let aimed_deg = aim_at_primary(actuator, &segmentation)?;

        let report = ScanReport::new(
            pose,
            segmentation.objects().to_vec(),
            segmentation.primary_index(),
            pairs,
        );
        let line = serde_json::to_string(&report).map_err(|e| ScanError::Serialization(e.to_string()))?;
        sink.emit(&line);

        info!(
            objects = report.object_count,
            cleared,
            projected,
            aimed_deg = ?aimed_deg,
            "scan cycle complete"
        );
        Ok(report)
    }

    /// Bordered text map with the robot overlaid.
    pub fn render(&self) -> String {
        self.grid.render(&self.pose.snapshot())
    }

    /// Wipe the map back to unexplored.  The pose is kept.
    pub fn reset_map(&mut self) {
        self.grid.reset();
    }

    /// Wipe the map and return the robot to the origin.
    pub fn reset(&mut self) {
        self.grid.reset();
        self.pose.reset();
    }
}
