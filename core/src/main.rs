use clap::{Args, Parser, ValueEnum};
use log::{error, info};

use std::error::Error;
use std::path::PathBuf;

use mcl::Pose;
use mcl::map::{LandmarkMap, MapLimits};
use mcl::motion::OdometryNoise;
use mcl::particle::{AveragingStrategy, FilterConfig, ParticleFilter, ResamplingStrategy};
use mcl::sim::{LocalizationResult, SensorRecord, group_records, run_localization};

const LONG_ABOUT: &str = "MCL-SIM: A simulation and analysis tool for landmark-based Monte Carlo localization.

This program replays a recorded sensor log (odometry deltas plus range observations of
known landmarks) through a particle filter and writes the per-timestep pose estimates
to a CSV file for evaluation.

The filter can be initialized in two modes:

- uniform: particles are scattered uniformly over a rectangular region of the map
  (global localization). The region defaults to the landmark bounding box padded by
  one map unit and can be overridden with the --x-min/--x-max/--y-min/--y-max flags.

- tracking: particles are drawn from a Gaussian centered at a known start pose
  (--start-x/--start-y/--start-theta) with configurable scatter.

Input data format:
* Map CSV: columns id,x,y with one row per landmark.
* Sensor log CSV: columns timestep,rot1,trans,rot2,landmark_id,range,bearing with one
  row per observation; rows sharing a timestep repeat the odometry columns, and a
  timestep without observations is a single row with empty measurement columns.";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about, long_about = LONG_ABOUT)]
struct Cli {
    /// Input sensor log CSV file path
    #[arg(short, long, value_parser)]
    input: PathBuf,
    /// Landmark map CSV file path
    #[arg(short, long, value_parser)]
    map: PathBuf,
    /// Output CSV file path
    #[arg(short, long, value_parser)]
    output: PathBuf,
    /// Filter configuration
    #[command(flatten)]
    filter: FilterArgs,
    /// Initialization configuration
    #[command(flatten)]
    init: InitArgs,
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Args, Clone, Debug)]
struct FilterArgs {
    /// Number of particles
    #[arg(long, default_value_t = 500)]
    particles: usize,
    /// RNG seed (applies to initialization, motion sampling, and resampling)
    #[arg(long, default_value_t = 123)]
    seed: u64,
    /// Odometry noise: rotation noise per unit rotation
    #[arg(long, default_value_t = 0.1)]
    alpha1: f64,
    /// Odometry noise: rotation noise per unit translation
    #[arg(long, default_value_t = 0.1)]
    alpha2: f64,
    /// Odometry noise: translation noise per unit translation
    #[arg(long, default_value_t = 0.05)]
    alpha3: f64,
    /// Odometry noise: translation noise per unit rotation
    #[arg(long, default_value_t = 0.05)]
    alpha4: f64,
    /// Minimum motion sampling standard deviation (guards against particle collapse
    /// when the robot is stationary)
    #[arg(long, default_value_t = 1e-4)]
    noise_floor: f64,
    /// Range measurement noise standard deviation
    #[arg(long, default_value_t = 0.2)]
    range_std: f64,
    /// Resampling strategy
    #[arg(long, value_enum, default_value_t = ResamplingStrategy::Systematic)]
    resampling: ResamplingStrategy,
    /// Point-estimate strategy
    #[arg(long, value_enum, default_value_t = AveragingStrategy::WeightedMean)]
    averaging: AveragingStrategy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum InitMode {
    /// Scatter particles uniformly over the map region (global localization)
    #[default]
    Uniform,
    /// Draw particles from a Gaussian around a known start pose
    Tracking,
}
impl std::fmt::Display for InitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitMode::Uniform => write!(f, "uniform"),
            InitMode::Tracking => write!(f, "tracking"),
        }
    }
}

#[derive(Args, Clone, Debug)]
struct InitArgs {
    /// Initialization mode
    #[arg(long, value_enum, default_value_t = InitMode::Uniform)]
    init: InitMode,
    /// Uniform mode: minimum x of the initialization region (default: map bounding box)
    #[arg(long)]
    x_min: Option<f64>,
    /// Uniform mode: maximum x of the initialization region
    #[arg(long)]
    x_max: Option<f64>,
    /// Uniform mode: minimum y of the initialization region
    #[arg(long)]
    y_min: Option<f64>,
    /// Uniform mode: maximum y of the initialization region
    #[arg(long)]
    y_max: Option<f64>,
    /// Tracking mode: start pose x
    #[arg(long, default_value_t = 0.0)]
    start_x: f64,
    /// Tracking mode: start pose y
    #[arg(long, default_value_t = 0.0)]
    start_y: f64,
    /// Tracking mode: start pose heading in radians
    #[arg(long, default_value_t = 0.0)]
    start_theta: f64,
    /// Tracking mode: standard deviation of the initial position scatter
    #[arg(long, default_value_t = 0.5)]
    start_position_std: f64,
    /// Tracking mode: standard deviation of the initial heading scatter in radians
    #[arg(long, default_value_t = 0.2)]
    start_heading_std: f64,
}

fn init_logger(log_level: &str) {
    let level = log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{log_level}', defaulting to 'info'");
        log::LevelFilter::Info
    });
    env_logger::Builder::new().filter_level(level).init();
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    info!("Reading landmark map from {}", cli.map.display());
    let map = LandmarkMap::from_csv(&cli.map)?;
    info!("Loaded {} landmarks", map.len());

    info!("Reading sensor log from {}", cli.input.display());
    let records = SensorRecord::from_csv(&cli.input)?;
    let timesteps = group_records(&records);
    info!(
        "Loaded {} records spanning {} timesteps",
        records.len(),
        timesteps.len()
    );

    let motion_noise = OdometryNoise::new(
        cli.filter.alpha1,
        cli.filter.alpha2,
        cli.filter.alpha3,
        cli.filter.alpha4,
        cli.filter.noise_floor,
    )?;
    let config = FilterConfig {
        num_particles: cli.filter.particles,
        motion_noise,
        range_std: cli.filter.range_std,
        resampling: cli.filter.resampling,
        averaging: cli.filter.averaging,
        seed: cli.filter.seed,
    };

    let default_limits = map.bounding_limits(1.0);
    let map = map.shared();
    let mut filter = match cli.init.init {
        InitMode::Uniform => {
            let limits = MapLimits::new(
                cli.init.x_min.unwrap_or(default_limits.x_min),
                cli.init.x_max.unwrap_or(default_limits.x_max),
                cli.init.y_min.unwrap_or(default_limits.y_min),
                cli.init.y_max.unwrap_or(default_limits.y_max),
            )?;
            info!(
                "Initializing {} particles uniformly over x [{:.2}, {:.2}], y [{:.2}, {:.2}]",
                config.num_particles, limits.x_min, limits.x_max, limits.y_min, limits.y_max
            );
            ParticleFilter::uniform(map, limits, &config)?
        }
        InitMode::Tracking => {
            let start = Pose::new(cli.init.start_x, cli.init.start_y, cli.init.start_theta);
            info!(
                "Initializing {} particles around start pose {}",
                config.num_particles, start
            );
            ParticleFilter::tracking(
                map,
                start,
                cli.init.start_position_std,
                cli.init.start_heading_std,
                &config,
            )?
        }
    };

    let results = run_localization(&mut filter, &timesteps);
    if let Some(last) = results.last() {
        info!(
            "Final estimate: ({:.3}, {:.3}, {:.3} rad), ESS {:.1}, {} degenerate resets",
            last.x, last.y, last.theta, last.effective_sample_size, last.degenerate_resets
        );
    }

    LocalizationResult::to_csv(&results, &cli.output)?;
    info!("Wrote {} result rows to {}", results.len(), cli.output.display());
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logger(&cli.log_level);
    if let Err(e) = run(&cli) {
        error!("{e}");
        std::process::exit(1);
    }
}
