//! Hazard classification from the drive base's cliff and bumper sensors.
//!
//! [`classify`] turns one snapshot of [`HazardSignals`] into the hazard
//! events it implies, always in the order cliff, edge, bump.  Writing them to
//! the map in that order means a later hazard overwrites an earlier one on
//! the robot's cell.

use std::fmt;

use scanbot_types::Hazard;
use serde::{Deserialize, Serialize};

/// Thresholds applied to the raw drive-base signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardConfig {
    /// Cliff sensor reflectance at or above which the floor is a boundary
    /// line rather than plain floor.
    ///
    /// Calibration: log the four cliff signals over plain floor and over the
    /// boundary tape, and pick a value between the two clusters.
    pub edge_signal_threshold: u16,
    /// Echo range (cm) at or under which a forward drive must stop.
    pub imminent_range_cm: i32,
}

impl Default for HazardConfig {
    fn default() -> Self {
        Self {
            edge_signal_threshold: 2640,
            imminent_range_cm: 20,
        }
    }
}

impl HazardConfig {
    /// `true` when an obstacle is close enough that driving on would hit it.
    pub fn obstacle_imminent(&self, ping_cm: i32) -> bool {
        ping_cm <= self.imminent_range_cm
    }
}

/// Sensor position on the drive base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    FrontLeft,
    FrontRight,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Left => "Left",
            Side::FrontLeft => "Front Left",
            Side::FrontRight => "Front Right",
            Side::Right => "Right",
        })
    }
}

const CLIFF_SIDES: [Side; 4] = [Side::Left, Side::FrontLeft, Side::FrontRight, Side::Right];

/// One snapshot of the drive base's safety sensors.  Arrays are ordered
/// left, front-left, front-right, right.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardSignals {
    pub cliff: [bool; 4],
    pub cliff_signal: [u16; 4],
    pub bump_left: bool,
    pub bump_right: bool,
}

/// A hazard and the sensors that reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardEvent {
    pub hazard: Hazard,
    pub sides: Vec<Side>,
}

impl fmt::Display for HazardEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.hazard {
            Hazard::Cliff => "cliff",
            Hazard::Edge => "edge",
            Hazard::Bump => "bump",
        };
        write!(f, "{what} detected at: ")?;
        for (i, side) in self.sides.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{side}")?;
        }
        Ok(())
    }
}

/// Every hazard present in `signals`, in the order cliff, edge, bump.
pub fn classify(signals: &HazardSignals, config: &HazardConfig) -> Vec<HazardEvent> {
    let pick = |flags: [bool; 4]| -> Vec<Side> {
        CLIFF_SIDES
            .iter()
            .zip(flags)
            .filter_map(|(side, set)| set.then_some(*side))
            .collect()
    };

    let cliff = pick(signals.cliff);
    let edge = pick(signals.cliff_signal.map(|s| s >= config.edge_signal_threshold));
    let mut bump = Vec::new();
    if signals.bump_left {
        bump.push(Side::Left);
    }
    if signals.bump_right {
        bump.push(Side::Right);
    }

    [(Hazard::Cliff, cliff), (Hazard::Edge, edge), (Hazard::Bump, bump)]
        .into_iter()
        .filter(|(_, sides)| !sides.is_empty())
        .map(|(hazard, sides)| HazardEvent { hazard, sides })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_signals_yield_nothing() {
        let signals = HazardSignals {
            cliff_signal: [1200, 1300, 1250, 1100],
            ..HazardSignals::default()
        };
        assert!(classify(&signals, &HazardConfig::default()).is_empty());
    }

    #[test]
    fn cliff_flags_report_their_sides() {
        let signals = HazardSignals {
            cliff: [true, false, true, false],
            ..HazardSignals::default()
        };
        let events = classify(&signals, &HazardConfig::default());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].hazard, Hazard::Cliff);
        assert_eq!(events[0].sides, vec![Side::Left, Side::FrontRight]);
        assert_eq!(events[0].to_string(), "cliff detected at: Left, Front Right");
    }

    #[test]
    fn edge_threshold_is_inclusive() {
        let signals = HazardSignals {
            cliff_signal: [2639, 2640, 2700, 0],
            ..HazardSignals::default()
        };
        let events = classify(&signals, &HazardConfig::default());
        assert_eq!(events[0].hazard, Hazard::Edge);
        assert_eq!(events[0].sides, vec![Side::FrontLeft, Side::FrontRight]);
    }

    #[test]
    fn events_come_in_cliff_edge_bump_order() {
        let signals = HazardSignals {
            cliff: [false, false, false, true],
            cliff_signal: [3000, 0, 0, 0],
            bump_left: true,
            bump_right: true,
        };
        let kinds: Vec<Hazard> = classify(&signals, &HazardConfig::default())
            .into_iter()
            .map(|e| e.hazard)
            .collect();
        assert_eq!(kinds, vec![Hazard::Cliff, Hazard::Edge, Hazard::Bump]);
    }

    #[test]
    fn imminent_range_is_inclusive() {
        let config = HazardConfig::default();
        assert!(config.obstacle_imminent(20));
        assert!(!config.obstacle_imminent(21));
    }
}
