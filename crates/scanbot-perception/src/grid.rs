//! Fixed-size symbolic occupancy grid.
//!
//! The grid is `2H × 2H` cells of one decimetre, indexed `(x, y)` with the
//! robot's start pose at the centre `(H, H)`.  Object boundaries are projected
//! from the sensor's polar frame into grid coordinates; anything that lands
//! outside `[0, 2H)` on either axis is dropped without error.
//!
//! # Example
//!
//! ```rust
//! use scanbot_perception::grid::OccupancyGrid;
//! use scanbot_types::{DetectedObject, GridCell, Pose};
//!
//! let mut grid = OccupancyGrid::new(47);
//! let pose = Pose::new(47.0, 47.0, 90.0);
//!
//! // Straight ahead, 50 cm out.
//! let written = grid.project_object(&DetectedObject::new(90, 90, 50), &pose);
//! assert_eq!(written, 2);
//! assert_eq!(grid.get(47, 52), Some(GridCell::Object));
//! ```

use scanbot_types::{DEG_TO_RAD, DetectedObject, GridCell, Hazard, Pose, ROBOT_MARKER};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Grid size and free-space clearing pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// H: the grid is `2H` cells (decimetres) on a side.  Pick it so the
    /// whole arena fits when the robot starts in the middle.
    pub half_extent: usize,
    /// Angular spacing of the clearing rays (degrees).
    pub clear_arc_step_deg: i32,
    /// Clearing stops short of this range (cm).
    pub clear_range_cm: i32,
    /// Radial spacing along each clearing ray (cm).
    pub clear_range_step_cm: i32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            half_extent: 47,
            clear_arc_step_deg: 5,
            clear_range_cm: 50,
            clear_range_step_cm: 5,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OccupancyGrid
// ────────────────────────────────────────────────────────────────────────────

/// Square grid of [`GridCell`]s.  See the module docs.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
    half_extent: usize,
    side: usize,
    cells: Vec<GridCell>,
}

impl OccupancyGrid {
    /// A `2·half_extent` square grid, entirely [`GridCell::Unexplored`].
    pub fn new(half_extent: usize) -> Self {
        let side = half_extent * 2;
        Self {
            half_extent,
            side,
            cells: vec![GridCell::Unexplored; side * side],
        }
    }

    pub fn half_extent(&self) -> usize {
        self.half_extent
    }

    pub fn side(&self) -> usize {
        self.side
    }

    /// Grid coordinates of the robot's start pose.
    pub fn center(&self) -> (f64, f64) {
        (self.half_extent as f64, self.half_extent as f64)
    }

    pub fn get(&self, x: usize, y: usize) -> Option<GridCell> {
        (x < self.side && y < self.side).then(|| self.cells[y * self.side + x])
    }

    /// Write one cell.  Returns `false` (and writes nothing) out of bounds.
    pub fn set(&mut self, x: usize, y: usize, cell: GridCell) -> bool {
        if x >= self.side || y >= self.side {
            return false;
        }
        self.cells[y * self.side + x] = cell;
        true
    }

    /// Fill every cell with [`GridCell::Unexplored`].
    pub fn reset(&mut self) {
        self.cells.fill(GridCell::Unexplored);
    }

    /// Number of cells holding `cell`.
    pub fn count(&self, cell: GridCell) -> usize {
        self.cells.iter().filter(|c| **c == cell).count()
    }

    /// Truncate a continuous coordinate to a cell, or `None` if it lies
    /// outside `[0, 2H)` on either axis.
    pub fn cell_at(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let side = self.side as f64;
        if x >= 0.0 && y >= 0.0 && x < side && y < side {
            Some((x as usize, y as usize))
        } else {
            None
        }
    }

    /// Cell seen at `angle_deg` on the head (90 = straight ahead) and
    /// `range_cm` from the robot at `pose`.
    pub fn project_point(&self, pose: &Pose, angle_deg: f64, range_cm: f64) -> Option<(usize, usize)> {
        let theta = (pose.heading_deg - 90.0 + angle_deg) * DEG_TO_RAD;
        let reach_dm = range_cm / 10.0;
        self.cell_at(pose.x_dm + reach_dm * theta.cos(), pose.y_dm + reach_dm * theta.sin())
    }

    /// Write `hazard` under the robot.  Returns `false` if the robot is off
    /// the grid.
    pub fn mark_hazard(&mut self, pose: &Pose, hazard: Hazard) -> bool {
        match self.cell_at(pose.x_dm, pose.y_dm) {
            Some((x, y)) => {
                debug!(?hazard, x, y, "hazard marked");
                self.set(x, y, hazard.cell())
            }
            None => {
                trace!(?hazard, x_dm = pose.x_dm, y_dm = pose.y_dm, "hazard off grid");
                false
            }
        }
    }

    /// Write both boundaries of `object` as [`GridCell::Object`].  Returns the
    /// number of boundaries that landed on the grid (0, 1 or 2).
    pub fn project_object(&mut self, object: &DetectedObject, pose: &Pose) -> usize {
        let range = f64::from(object.range_cm);
        let mut written = 0;
        for boundary in [object.start_angle, object.end_angle] {
            match self.project_point(pose, f64::from(boundary), range) {
                Some((x, y)) => {
                    self.set(x, y, GridCell::Object);
                    written += 1;
                }
                None => trace!(boundary, range_cm = object.range_cm, "projection clipped"),
            }
        }
        written
    }

    /// Mark the near field in front of the head as free.
    ///
    /// Walks rays every `clear_arc_step_deg` across 0–180° at ranges
    /// `0, step, …` below `clear_range_cm`, and turns every
    /// [`GridCell::Unexplored`] or [`GridCell::Object`] cell it hits into
    /// [`GridCell::Empty`].  Hazard cells are left alone.  Returns the number
    /// of cells changed.
    pub fn clear_arc(&mut self, pose: &Pose, config: &GridConfig) -> usize {
        let angle_step = config.clear_arc_step_deg.max(1) as usize;
        let range_step = config.clear_range_step_cm.max(1) as usize;
        let mut cleared = 0;
        for angle in (0..=180i32).step_by(angle_step) {
            for range in (0..config.clear_range_cm.max(0)).step_by(range_step) {
                let Some((x, y)) = self.project_point(pose, f64::from(angle), f64::from(range)) else {
                    continue;
                };
                if matches!(self.get(x, y), Some(GridCell::Unexplored | GridCell::Object)) {
                    self.set(x, y, GridCell::Empty);
                    cleared += 1;
                }
            }
        }
        cleared
    }

    /// Bordered text rendering, top row first (`y = 2H - 1`), with the robot
    /// drawn as [`ROBOT_MARKER`] when it is on the grid.
    pub fn render(&self, pose: &Pose) -> String {
        let robot = self.cell_at(pose.x_dm, pose.y_dm);
        let border = "-".repeat(self.side + 2);
        let mut out = String::with_capacity((self.side + 3) * (self.side + 2));
        out.push_str(&border);
        out.push('\n');
        for y in (0..self.side).rev() {
            out.push('|');
            for x in 0..self.side {
                if robot == Some((x, y)) {
                    out.push(ROBOT_MARKER);
                } else {
                    out.push(self.cells[y * self.side + x].symbol());
                }
            }
            out.push_str("|\n");
        }
        out.push_str(&border);
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn center_pose(grid: &OccupancyGrid) -> Pose {
        let (x, y) = grid.center();
        Pose::new(x, y, 90.0)
    }

    #[test]
    fn new_grid_is_unexplored() {
        let grid = OccupancyGrid::new(47);
        assert_eq!(grid.side(), 94);
        assert_eq!(grid.count(GridCell::Unexplored), 94 * 94);
        assert_eq!(grid.get(94, 0), None);
    }

    #[test]
    fn object_ahead_lands_inside_grid() {
        let mut grid = OccupancyGrid::new(47);
        let pose = center_pose(&grid);
        let obj = DetectedObject::new(90, 90, 50);
        assert_eq!(grid.project_object(&obj, &pose), 2);
        assert_eq!(grid.count(GridCell::Object), 1);
        assert_eq!(grid.get(47, 52), Some(GridCell::Object));
    }

    #[test]
    fn head_angle_is_relative_to_heading() {
        let mut grid = OccupancyGrid::new(47);
        let pose = center_pose(&grid);
        // Head at 0 points right of the robot; robot faces +y so that is +x.
        assert_eq!(grid.project_point(&pose, 0.0, 100.0), Some((57, 47)));
        // Head at 180 points left, i.e. -x.
        let (x, y) = grid.project_point(&pose, 180.0, 100.0).unwrap();
        assert!(x == 36 || x == 37);
        assert!(y == 46 || y == 47);

        let facing_east = Pose::new(47.0, 47.0, 0.0);
        grid.project_object(&DetectedObject::new(90, 90, 100), &facing_east);
        assert_eq!(grid.get(57, 47), Some(GridCell::Object));
    }

    #[test]
    fn out_of_range_projection_leaves_grid_untouched() {
        let mut grid = OccupancyGrid::new(47);
        let pose = center_pose(&grid);
        let before = grid.clone();
        let obj = DetectedObject::new(80, 100, 1000);
        assert_eq!(grid.project_object(&obj, &pose), 0);
        assert_eq!(grid, before);

        // Behind the robot: negative coordinates are dropped too.
        let backwards = Pose::new(47.0, 47.0, 270.0);
        assert_eq!(grid.project_object(&DetectedObject::new(90, 90, 600), &backwards), 0);
        assert_eq!(grid, before);
    }

    #[test]
    fn partially_clipped_object_writes_visible_boundary() {
        let mut grid = OccupancyGrid::new(5);
        let pose = Pose::new(1.0, 5.0, 90.0);
        // Start boundary to the right (inside), end boundary to the left (off grid).
        let obj = DetectedObject::new(0, 180, 40);
        assert_eq!(grid.project_object(&obj, &pose), 1);
        assert_eq!(grid.get(5, 5), Some(GridCell::Object));
    }

    #[test]
    fn hazard_is_written_under_truncated_pose() {
        let mut grid = OccupancyGrid::new(47);
        assert!(grid.mark_hazard(&Pose::new(10.9, 20.2, 0.0), Hazard::Cliff));
        assert_eq!(grid.get(10, 20), Some(GridCell::Cliff));
        assert!(grid.mark_hazard(&Pose::new(10.1, 20.7, 0.0), Hazard::Bump));
        assert_eq!(grid.get(10, 20), Some(GridCell::Bump));
        assert!(!grid.mark_hazard(&Pose::new(-0.5, 3.0, 0.0), Hazard::Edge));
        assert!(!grid.mark_hazard(&Pose::new(94.0, 3.0, 0.0), Hazard::Edge));
        assert_eq!(grid.count(GridCell::Edge), 0);
    }

    #[test]
    fn clear_arc_frees_near_field_but_keeps_hazards() {
        let mut grid = OccupancyGrid::new(47);
        let pose = center_pose(&grid);
        grid.set(47, 49, GridCell::Object);
        grid.set(47, 50, GridCell::Cliff);
        let cleared = grid.clear_arc(&pose, &GridConfig::default());
        assert!(cleared > 0);
        assert_eq!(grid.get(47, 47), Some(GridCell::Empty));
        assert_eq!(grid.get(47, 49), Some(GridCell::Empty));
        assert_eq!(grid.get(47, 50), Some(GridCell::Cliff));
        // Nothing behind the robot is touched.
        assert_eq!(grid.get(47, 44), Some(GridCell::Unexplored));
        // A second pass has nothing left to do.
        assert_eq!(grid.clear_arc(&pose, &GridConfig::default()), 0);
    }

    #[test]
    fn reset_round_trip_restores_unexplored() {
        let mut grid = OccupancyGrid::new(47);
        let pose = center_pose(&grid);
        grid.reset();
        grid.clear_arc(&pose, &GridConfig::default());
        grid.project_object(&DetectedObject::new(30, 60, 40), &pose);
        grid.mark_hazard(&pose, Hazard::Edge);
        grid.mark_hazard(&Pose::new(3.0, 90.0, 0.0), Hazard::Bump);
        assert!(grid.count(GridCell::Unexplored) < 94 * 94);
        grid.reset();
        assert_eq!(grid, OccupancyGrid::new(47));
    }

    #[test]
    fn render_draws_border_rows_top_down_and_robot() {
        let mut grid = OccupancyGrid::new(2);
        grid.set(0, 3, GridCell::Object);
        grid.set(3, 0, GridCell::Cliff);
        grid.set(1, 1, GridCell::Empty);
        let text = grid.render(&Pose::new(2.5, 2.5, 90.0));
        let expected = "\
------
|B###|
|##R#|
|# ##|
|###C|
------
";
        assert_eq!(text, expected);
    }

    #[test]
    fn render_omits_robot_off_grid() {
        let grid = OccupancyGrid::new(1);
        let text = grid.render(&Pose::new(-1.0, 0.0, 0.0));
        assert_eq!(text, "----\n|##|\n|##|\n----\n");
    }
}
