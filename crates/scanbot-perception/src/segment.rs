//! Object segmentation over a sweep's sample stream.
//!
//! [`ObjectSegmenter`] consumes [`RangeSample`]s in angle order and keeps one
//! [`ObjectCandidate`] open at a time.  Whether a sample opens or extends a
//! run is decided by a [`TriggerStrategy`]; anything it rejects closes the
//! open run.  Two strategies ship:
//!
//! - [`PreciseRule`] – infrared/echo agreement with a sharp-drop edge
//!   detector, for full-resolution sweeps.
//! - [`CoarseRule`] – infrared falling edge to open, echo tolerance band to
//!   continue, for cheap 2° sweeps.
//!
//! [`TriggerRule`] wraps both so the choice is a configuration value.
//!
//! # Example
//!
//! ```rust
//! use scanbot_perception::segment::{ObjectSegmenter, TriggerRule};
//! use scanbot_types::RangeSample;
//!
//! let mut seg = ObjectSegmenter::new(TriggerRule::default());
//! seg.push(RangeSample::new(0, 50, 48));
//! seg.push(RangeSample::new(1, 50, 49));
//! let closed = seg.push(RangeSample::new(2, 150, 150)).unwrap();
//! assert_eq!((closed.start_angle, closed.end_angle), (0, 1));
//!
//! let result = seg.finish();
//! assert_eq!(result.count(), 1);
//! ```

use scanbot_types::{DEG_TO_RAD, DetectedObject, PairRelation, RangeSample};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ────────────────────────────────────────────────────────────────────────────
// Bands
// ────────────────────────────────────────────────────────────────────────────

/// Open interval `(low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        value > self.low && value < self.high
    }

    /// `low·den < num < high·den`, i.e. `num / den` in the band without
    /// dividing.  Always false for `den <= 0`.
    pub fn contains_ratio(&self, num: i32, den: i32) -> bool {
        let (num, den) = (f64::from(num), f64::from(den));
        num > self.low * den && num < self.high * den
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trigger strategies
// ────────────────────────────────────────────────────────────────────────────

/// The open run of a segmenter.  Exactly one exists per sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectCandidate {
    pub start_angle: i32,
    pub end_angle: i32,
    pub range_cm: i32,
    pub active: bool,
}

impl ObjectCandidate {
    fn open(angle: i32, range_cm: i32) -> Self {
        Self {
            start_angle: angle,
            end_angle: angle,
            range_cm,
            active: true,
        }
    }
}

/// Decides, per sample, whether the sample belongs to an object.
pub trait TriggerStrategy {
    /// `true` to open a run (or extend the active one) at `sample`; `false`
    /// closes the active run.  `prev_ir` is the previous sample's infrared
    /// range, 0 before the first sample.
    fn admits(&self, sample: &RangeSample, prev_ir: i32, candidate: &ObjectCandidate) -> bool;
}

/// Infrared/echo agreement rule used by the full-resolution sweep.
///
/// A sample is admitted when any of these holds:
/// - a run is open, both readings are near and `ir / ping` is in
///   `continue_band`;
/// - `ir` dropped below `sharp_drop_ratio · prev_ir`, the projected next
///   reading `(ir / prev_ir) · ir` (integer division) is under `ping`, both
///   readings are near and `ir / ping` is in `drop_band`;
/// - both readings are near and `ir / ping` is in `agree_band`.
///
/// "Near" means under `max_range_cm`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreciseRule {
    pub continue_band: Band,
    pub sharp_drop_ratio: f64,
    pub drop_band: Band,
    pub agree_band: Band,
    /// Both sensors read past this (cm) on open floor.
    pub max_range_cm: i32,
}

impl Default for PreciseRule {
    fn default() -> Self {
        Self {
            continue_band: Band::new(0.8, 1.3),
            sharp_drop_ratio: 0.7,
            drop_band: Band::new(1.05, 1.5),
            agree_band: Band::new(0.9, 1.1),
            max_range_cm: 100,
        }
    }
}

impl TriggerStrategy for PreciseRule {
    fn admits(&self, sample: &RangeSample, prev_ir: i32, candidate: &ObjectCandidate) -> bool {
        let ir = sample.ir_distance_cm;
        let ping = sample.ping_distance_cm;
        let near = ir < self.max_range_cm && ping < self.max_range_cm;
        if !near {
            return false;
        }

        let continuing = candidate.active && self.continue_band.contains_ratio(ir, ping);
        let sharp_drop = prev_ir > 0
            && f64::from(ir) < self.sharp_drop_ratio * f64::from(prev_ir)
            && projected_ir(ir, prev_ir) < i64::from(ping)
            && self.drop_band.contains_ratio(ir, ping);
        let agreeing = self.agree_band.contains_ratio(ir, ping);

        continuing || sharp_drop || agreeing
    }
}

/// Next infrared reading if the drop from `prev_ir` to `ir` repeats, in
/// whole steps.  Any drop of more than half truncates to 0.
fn projected_ir(ir: i32, prev_ir: i32) -> i64 {
    (i64::from(ir) / i64::from(prev_ir)) * i64::from(ir)
}

/// Falling-edge rule used by the coarse sweep.
///
/// Opens a run when the infrared range falls through `ir_edge_cm` with the
/// echo under `max_ping_cm`; keeps it open while the infrared range stays
/// under `ir_edge_cm` and the echo stays strictly within `tolerance_cm` of
/// the range recorded at the opening sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoarseRule {
    pub ir_edge_cm: i32,
    pub max_ping_cm: i32,
    pub tolerance_cm: i32,
}

impl Default for CoarseRule {
    fn default() -> Self {
        Self {
            ir_edge_cm: 100,
            max_ping_cm: 80,
            tolerance_cm: 5,
        }
    }
}

impl TriggerStrategy for CoarseRule {
    fn admits(&self, sample: &RangeSample, prev_ir: i32, candidate: &ObjectCandidate) -> bool {
        let ir = sample.ir_distance_cm;
        let ping = sample.ping_distance_cm;
        if candidate.active {
            ir < self.ir_edge_cm
                && ping > candidate.range_cm - self.tolerance_cm
                && ping < candidate.range_cm + self.tolerance_cm
        } else {
            prev_ir > self.ir_edge_cm && ir < self.ir_edge_cm && ping < self.max_ping_cm
        }
    }
}

/// Configured trigger strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerRule {
    Precise(PreciseRule),
    Coarse(CoarseRule),
}

impl Default for TriggerRule {
    fn default() -> Self {
        TriggerRule::Precise(PreciseRule::default())
    }
}

impl TriggerRule {
    pub fn name(&self) -> &'static str {
        match self {
            TriggerRule::Precise(_) => "precise",
            TriggerRule::Coarse(_) => "coarse",
        }
    }

    /// Default-threshold rule for `"precise"` or `"coarse"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "precise" => Some(TriggerRule::Precise(PreciseRule::default())),
            "coarse" => Some(TriggerRule::Coarse(CoarseRule::default())),
            _ => None,
        }
    }
}

impl TriggerStrategy for TriggerRule {
    fn admits(&self, sample: &RangeSample, prev_ir: i32, candidate: &ObjectCandidate) -> bool {
        match self {
            TriggerRule::Precise(rule) => rule.admits(sample, prev_ir, candidate),
            TriggerRule::Coarse(rule) => rule.admits(sample, prev_ir, candidate),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ObjectSegmenter
// ────────────────────────────────────────────────────────────────────────────

/// Stateful run detector for one sweep.  See the module docs.
#[derive(Debug)]
pub struct ObjectSegmenter<R = TriggerRule> {
    rule: R,
    candidate: ObjectCandidate,
    prev_ir: i32,
    objects: Vec<DetectedObject>,
}

impl<R: TriggerStrategy> ObjectSegmenter<R> {
    pub fn new(rule: R) -> Self {
        Self {
            rule,
            candidate: ObjectCandidate::default(),
            prev_ir: 0,
            objects: Vec::new(),
        }
    }

    /// The open run, if any.
    pub fn candidate(&self) -> Option<&ObjectCandidate> {
        self.candidate.active.then_some(&self.candidate)
    }

    /// Feed the next sample.  Returns the object this sample closed, if any.
    pub fn push(&mut self, sample: RangeSample) -> Option<DetectedObject> {
        let closed = if self.rule.admits(&sample, self.prev_ir, &self.candidate) {
            if self.candidate.active {
                self.candidate.end_angle = sample.angle_deg;
            } else {
                debug!(angle = sample.angle_deg, range_cm = sample.ping_distance_cm, "run opened");
                self.candidate = ObjectCandidate::open(sample.angle_deg, sample.ping_distance_cm);
            }
            None
        } else {
            self.close()
        };
        self.prev_ir = sample.ir_distance_cm;
        closed
    }

    /// Close any open run and return everything found.
    pub fn finish(mut self) -> Segmentation {
        self.close();
        Segmentation::from_objects(self.objects)
    }

    fn close(&mut self) -> Option<DetectedObject> {
        if !self.candidate.active {
            return None;
        }
        self.candidate.active = false;
        let c = self.candidate;
        let object = DetectedObject::new(c.start_angle, c.end_angle, c.range_cm);
        if object.is_dud() {
            debug!(angle = object.start_angle, "single-angle run kept as dud");
        } else {
            info!(
                start = object.start_angle,
                end = object.end_angle,
                range_cm = object.range_cm,
                width_cm = object.linear_width_cm(),
                "object detected"
            );
        }
        self.objects.push(object);
        Some(object)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Segmentation result
// ────────────────────────────────────────────────────────────────────────────

/// Objects found by one sweep, in angle order, duds included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segmentation {
    objects: Vec<DetectedObject>,
    count: usize,
}

impl Segmentation {
    pub fn from_objects(objects: Vec<DetectedObject>) -> Self {
        let count = objects.iter().filter(|o| !o.is_dud()).count();
        Self { objects, count }
    }

    pub fn objects(&self) -> &[DetectedObject] {
        &self.objects
    }

    pub fn into_objects(self) -> Vec<DetectedObject> {
        self.objects
    }

    /// Number of non-dud objects.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Index of the narrowest non-dud object; the first one wins a tie.
    pub fn primary_index(&self) -> Option<usize> {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, o)| !o.is_dud())
            .min_by(|(_, a), (_, b)| a.linear_width_cm().total_cmp(&b.linear_width_cm()))
            .map(|(i, _)| i)
    }

    pub fn primary(&self) -> Option<&DetectedObject> {
        self.primary_index().map(|i| &self.objects[i])
    }

    /// Separation and post-pair classification for every pair of objects.
    pub fn pairs(&self, bands: &PairBands) -> Vec<PairRelation> {
        let mut pairs = Vec::new();
        for (i, a) in self.objects.iter().enumerate() {
            for (j, b) in self.objects.iter().enumerate().skip(i + 1) {
                let separation_cm = separation_cm(a, b);
                let post_pair = bands.is_post_pair(a, b, separation_cm);
                if post_pair {
                    info!(first = i, second = j, separation_cm, "post pair");
                }
                pairs.push(PairRelation {
                    first: i,
                    second: j,
                    separation_cm,
                    post_pair,
                });
            }
        }
        pairs
    }
}

/// Centre-to-centre distance between two objects (law of cosines over the
/// two ranges and the angle between the run midpoints).
pub fn separation_cm(a: &DetectedObject, b: &DetectedObject) -> f64 {
    let ra = f64::from(a.range_cm);
    let rb = f64::from(b.range_cm);
    let mid = |o: &DetectedObject| f64::from(o.start_angle + o.end_angle) / 2.0;
    let theta = (mid(a) - mid(b)) * DEG_TO_RAD;
    (ra * ra + rb * rb - 2.0 * ra * rb * theta.cos()).max(0.0).sqrt()
}

/// Bands for the goal/post pair classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairBands {
    /// Centre-to-centre separation (cm).
    pub separation_cm: Band,
    /// Linear width of each object (cm).
    pub width_cm: Band,
}

impl Default for PairBands {
    fn default() -> Self {
        Self {
            separation_cm: Band::new(53.0, 68.0),
            width_cm: Band::new(3.0, 8.0),
        }
    }
}

impl PairBands {
    pub fn is_post_pair(&self, a: &DetectedObject, b: &DetectedObject, separation_cm: f64) -> bool {
        self.separation_cm.contains(separation_cm)
            && self.width_cm.contains(a.linear_width_cm())
            && self.width_cm.contains(b.linear_width_cm())
    }
}
