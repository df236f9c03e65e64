//! Calibration and tuning file – reads/writes `~/.scanbot/config.toml`.
//!
//! Every constant that depends on the physical unit (counter width, sensor
//! scale factors, servo pulse model, thresholds) lives here with its
//! calibration procedure.  A missing section or field falls back to the
//! calibration of the reference robot.

use std::fs;
use std::path::{Path, PathBuf};

use scanbot_hal::{EchoConfig, InfraredCalibration, ServoCalibration};
use scanbot_perception::{GridConfig, PairBands, SweepConfig, TriggerRule};
use scanbot_types::ScanError;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::hazard::HazardConfig;

/// Dead-reckoning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Multiplier applied to every reported turn angle.
    ///
    /// Calibration: command ten full turns in place, compare the heading the
    /// drive base reports with the true rotation, and take the ratio.
    pub turn_gain: f64,
    /// Heading of the robot at start-up (degrees ccw of +x).
    pub origin_heading_deg: f64,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            turn_gain: scanbot_perception::pose::DEFAULT_TURN_GAIN,
            origin_heading_deg: 90.0,
        }
    }
}

/// Persisted configuration stored in `~/.scanbot/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub echo: EchoConfig,
    pub infrared: InfraredCalibration,
    pub servo: ServoCalibration,
    pub sweep: SweepConfig,
    /// Segmentation strategy, `kind = "precise"` or `kind = "coarse"`.
    pub trigger: TriggerRule,
    pub pose: PoseConfig,
    pub grid: GridConfig,
    pub pairs: PairBands,
    pub hazards: HazardConfig,
}

impl Config {
    /// Reject values no physical unit can have.
    pub fn validate(&self) -> Result<(), ScanError> {
        let invalid = |msg: &str| Err(ScanError::InvalidConfig(msg.to_string()));

        if self.echo.wrap_ticks == 0 {
            return invalid("echo.wrap_ticks must be non-zero");
        }
        if !(self.echo.ticks_to_cm.is_finite() && self.echo.ticks_to_cm > 0.0) {
            return invalid("echo.ticks_to_cm must be positive");
        }
        if self.infrared.scale <= 0 {
            return invalid("infrared.scale must be positive");
        }
        if !(self.servo.us_per_degree.is_finite() && self.servo.zero_offset_us.is_finite()) {
            return invalid("servo calibration must be finite");
        }

        let sweep = &self.sweep;
        if sweep.step_deg <= 0 {
            return invalid("sweep.step_deg must be positive");
        }
        if sweep.start_deg < 0 || sweep.end_deg > 180 || sweep.start_deg > sweep.end_deg {
            return invalid("sweep range must satisfy 0 <= start_deg <= end_deg <= 180");
        }
        if !(0..=180).contains(&sweep.center_deg) {
            return invalid("sweep.center_deg must be within 0..=180");
        }
        if sweep.ir_samples == 0 {
            return invalid("sweep.ir_samples must be at least 1");
        }

        if !self.pose.turn_gain.is_finite() {
            return invalid("pose.turn_gain must be finite");
        }
        if self.grid.half_extent == 0 {
            return invalid("grid.half_extent must be non-zero");
        }
        if self.grid.clear_arc_step_deg <= 0 || self.grid.clear_range_step_cm <= 0 {
            return invalid("grid clearing steps must be positive");
        }
        Ok(())
    }
}

/// Return the path to `~/.scanbot/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".scanbot").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path, with environment overrides applied.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `SCANBOT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SCANBOT_TRIGGER` | `trigger` (`precise` or `coarse`, default thresholds) |
/// | `SCANBOT_TURN_GAIN` | `pose.turn_gain` |
/// | `SCANBOT_HALF_EXTENT` | `grid.half_extent` |
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides_from(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("SCANBOT_TRIGGER") {
        match TriggerRule::from_name(&v) {
            Some(rule) => cfg.trigger = rule,
            None => warn!(value = %v, "ignoring unknown SCANBOT_TRIGGER"),
        }
    }
    if let Some(v) = lookup("SCANBOT_TURN_GAIN")
        && let Ok(gain) = v.trim().parse::<f64>()
    {
        cfg.pose.turn_gain = gain;
    }
    if let Some(v) = lookup("SCANBOT_HALF_EXTENT")
        && let Ok(h) = v.trim().parse::<usize>()
    {
        cfg.grid.half_extent = h;
    }
}

/// Save the config to disk, creating `~/.scanbot/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
