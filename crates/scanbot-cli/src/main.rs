//! `scanbot` – headless scan demo.
//!
//! Runs the full perception pipeline against the simulated scan head:
//!
//! 1. Loads `~/.scanbot/config.toml` (or `--config <path>`), falling back to
//!    the reference calibration, and validates it.
//! 2. Sweeps a scripted scene with a pair of goal posts and a wall segment,
//!    drives forward, and sweeps again.
//! 3. Prints each scan report and the resulting map.
//!
//! Flags: `--config <path>` (or `SCANBOT_CONFIG`), `--init` (write the
//! default config and exit), `--realtime` (keep servo settle and sampling
//! delays).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::{ColoredString, Colorize};
use tracing::info;

use scanbot_hal::TracingSink;
use scanbot_hal::sim::{SimObstacle, SimRig, SimScene};
use scanbot_runtime::config::{self, Config};
use scanbot_runtime::{RobotState, telemetry};
use scanbot_types::{OdometryDelta, ROBOT_MARKER, ScanReport};

#[derive(Parser, Debug)]
#[command(name = "scanbot", version, about, long_about = None)]
struct Args {
    /// Config file to load instead of `~/.scanbot/config.toml`.
    #[arg(long, env = "SCANBOT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write the default config and exit.
    #[arg(long)]
    init: bool,

    /// Keep servo settle and sampling delays.
    #[arg(long)]
    realtime: bool,
}

fn main() -> ExitCode {
    let _guard = telemetry::init_tracing("scanbot");

    let args = Args::parse();

    print_banner();

    if args.init {
        let path = args.config.clone().unwrap_or_else(config::config_path);
        return match config::save_to(&Config::default(), &path) {
            Ok(()) => {
                println!("  Wrote default config to {}", path.display().to_string().bold());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {}", "Config error".red(), e);
                ExitCode::FAILURE
            }
        };
    }

    let cfg = load_config(&args);
    if let Err(e) = cfg.validate() {
        eprintln!("{}: {}", "Config error".red(), e);
        return ExitCode::FAILURE;
    }

    match run_demo(cfg, args.realtime) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Scan failed".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Config {
    let loaded = match &args.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    };
    match loaded {
        Ok(Some(cfg)) => {
            let path = args.config.clone().unwrap_or_else(config::config_path);
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) => {
            println!("  No config file; using reference calibration.");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using reference calibration.");
            Config::default()
        }
    }
}

fn demo_scene() -> SimScene {
    SimScene::new()
        .with_obstacle(SimObstacle::new(58.0, 62.0, 60))
        .with_obstacle(SimObstacle::new(118.0, 122.0, 60))
        .with_obstacle(SimObstacle::new(150.0, 170.0, 45).with_ir_bias(2))
}

fn run_demo(mut cfg: Config, realtime: bool) -> Result<(), scanbot_types::ScanError> {
    if !realtime {
        cfg.sweep = cfg.sweep.without_delays();
    }
    let mut rig = SimRig::new(demo_scene())
        .with_echo_config(cfg.echo)
        .with_infrared(cfg.infrared)
        .with_servo(cfg.servo);
    if realtime {
        rig = rig.realtime();
    }
    let (mut sensor, mut servo) = rig.build();

    info!(trigger = cfg.trigger.name(), realtime, "starting scan demo");
    let mut state = RobotState::new(cfg);
    let mut sink = TracingSink;

    let report = state.scan_cycle(&mut sensor, &mut servo, &mut sink)?;
    print_report(&report);

    state.commit_odometry(OdometryDelta::turn(20.0));
    if state.obstacle_ahead(&mut sensor, &mut servo)? {
        println!("  {}", "Obstacle ahead, holding position".yellow());
    } else {
        state.commit_odometry(OdometryDelta::drive(300.0));
    }
    let report = state.scan_cycle(&mut sensor, &mut servo, &mut sink)?;
    print_report(&report);

    println!();
    for line in state.render().lines() {
        let row: Vec<String> = line.chars().map(|c| paint(c).to_string()).collect();
        println!("{}", row.concat());
    }
    println!("\n  {}", state.pose());
    Ok(())
}

fn paint(symbol: char) -> ColoredString {
    let s = symbol.to_string();
    match symbol {
        c if c == ROBOT_MARKER => s.green().bold(),
        'B' => s.red().bold(),
        'C' | 'G' | 'L' => s.yellow(),
        '#' => s.dimmed(),
        _ => s.normal(),
    }
}

fn print_report(report: &ScanReport) {
    println!();
    println!("  {} {}", "Scan".bold(), report.id.to_string().dimmed());
    println!("  {}", report.pose);
    for (i, obj) in report.objects.iter().enumerate() {
        let tag = if obj.is_dud() {
            "dud".dimmed()
        } else if report.primary == Some(i) {
            "primary".green()
        } else {
            "object".normal()
        };
        println!(
            "    [{i}] {:>3}..{:<3} deg  {:>4} cm  {:>6.2} cm wide  {}",
            obj.start_angle,
            obj.end_angle,
            obj.range_cm,
            obj.linear_width_cm(),
            tag
        );
    }
    for pair in report.pairs.iter().filter(|p| p.post_pair) {
        println!(
            "    {} [{}] and [{}], {:.1} cm apart",
            "post pair".cyan(),
            pair.first,
            pair.second,
            pair.separation_cm
        );
    }
}

fn print_banner() {
    println!("{}", "scanbot".bold().cyan());
    println!("{}", "  sweep · segment · map".dimmed());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let a = Args::try_parse_from(["scanbot", "--config", "/tmp/x.toml", "--realtime"]).unwrap();
        assert_eq!(a.config, Some(PathBuf::from("/tmp/x.toml")));
        assert!(a.realtime);
        assert!(!a.init);

        let a = Args::try_parse_from(["scanbot", "--init"]).unwrap();
        assert!(a.init);
        assert!(!a.realtime);
    }

    #[test]
    fn rejects_unknown_and_incomplete_flags() {
        assert!(Args::try_parse_from(["scanbot", "--config"]).is_err());
        assert!(Args::try_parse_from(["scanbot", "--fast"]).is_err());
    }

    #[test]
    fn args_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn demo_scene_sweeps_cleanly() {
        assert!(run_demo(Config::default(), false).is_ok());
    }
}
