use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use drag_fit::constants::{
    DEFAULT_CD_MAX, DEFAULT_CD_MIN, DEFAULT_DATA_PATH, DEFAULT_INITIAL_CD, GRAVITY_MPS2,
    OPTIMIZATION_HORIZON, SIGHT_HEIGHT,
};
use drag_fit::report::TrajectoryPoint;
use drag_fit::{
    build_report, calibrate_drag_coefficient, landing_point, load_observations_or_empty,
    predict_trajectory, render_report, Bounds, CalibrationOptions, CalibrationOutcome, FitReport,
    LandingPoint, PlotConfig, SimulationSettings,
};

#[derive(Parser)]
#[command(name = "drag-fit")]
#[command(version)]
#[command(about = "Fit a drag coefficient to measured landing points", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the drag coefficient to an observation file
    Calibrate {
        /// Observation CSV (angle,target_x,target_y,bullet_speed)
        #[arg(short = 'd', long, env = "DRAG_FIT_DATA", default_value = DEFAULT_DATA_PATH)]
        data: PathBuf,

        /// Starting guess for the drag coefficient
        #[arg(long, default_value_t = DEFAULT_INITIAL_CD)]
        initial_cd: f64,

        /// Lower bound for the drag coefficient
        #[arg(long, default_value_t = DEFAULT_CD_MIN)]
        cd_min: f64,

        /// Upper bound for the drag coefficient
        #[arg(long, default_value_t = DEFAULT_CD_MAX)]
        cd_max: f64,

        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        output: OutputFormat,

        /// Directory for rendered SVG plots
        #[arg(long)]
        plot_dir: Option<PathBuf>,

        /// Plot title
        #[arg(long, default_value = "Fitted trajectories")]
        title: String,

        /// Evaluate observations in parallel
        #[arg(long)]
        parallel: bool,
    },

    /// Integrate a single trajectory
    Simulate {
        /// Muzzle speed (m/s)
        #[arg(short = 'v', long)]
        speed: f64,

        /// Launch angle (degrees)
        #[arg(short = 'a', long, default_value = "0.0", allow_hyphen_values = true)]
        angle: f64,

        /// Drag coefficient
        #[arg(long, default_value = "0.0")]
        cd: f64,

        /// Stop when the projectile crosses this horizontal position (m)
        #[arg(long)]
        target_x: Option<f64>,

        /// Time horizon (s)
        #[arg(long, default_value_t = OPTIMIZATION_HORIZON)]
        t_max: f64,

        /// Number of trajectory samples to print
        #[arg(long, default_value = "20")]
        samples: usize,

        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        output: OutputFormat,
    },

    /// Display model information
    Info,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
    Table,
}

#[derive(Serialize)]
struct CalibrationSummary<'a> {
    converged: bool,
    message: String,
    initial_cd: f64,
    report: &'a FitReport,
}

#[derive(Serialize)]
struct SimulationOutput {
    cd: f64,
    landing: LandingPoint,
    trajectory: Vec<TrajectoryPoint>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Calibrate {
            data,
            initial_cd,
            cd_min,
            cd_max,
            output,
            plot_dir,
            title,
            parallel,
        } => {
            let observations = load_observations_or_empty(&data);
            if observations.is_empty() {
                println!("No data points loaded. Exiting.");
                return Ok(());
            }

            let bounds = Bounds::new(cd_min, cd_max)?;
            let options = CalibrationOptions {
                parallel,
                ..CalibrationOptions::default()
            };

            let outcome = calibrate_drag_coefficient(initial_cd, &observations, &bounds, &options);
            let report = build_report(outcome.cd(), &observations, &options.settings)
                .context("failed to evaluate the fitted trajectories")?;

            display_calibration(&outcome, initial_cd, &report, output)?;

            if let Some(dir) = plot_dir {
                let config = PlotConfig::default().with_output_dir(&dir).with_title(&title);
                let rendered = render_report(&report, &config)
                    .with_context(|| format!("failed to render plots into {}", dir.display()))?;
                eprintln!(
                    "Plots written to {} and {}",
                    rendered.trajectories.display(),
                    rendered.histogram.display()
                );
            }
        }

        Commands::Simulate {
            speed,
            angle,
            cd,
            target_x,
            t_max,
            samples,
            output,
        } => {
            let settings = SimulationSettings::default();
            let solution =
                predict_trajectory(speed, angle.to_radians(), cd, target_x, t_max, &settings)
                    .context("trajectory integration failed")?;
            let landing = landing_point(&solution);
            let trajectory = solution
                .sample(landing.t, samples.max(2))
                .into_iter()
                .map(|(t, state)| TrajectoryPoint {
                    t,
                    x: state[0],
                    y: state[2],
                })
                .collect();

            display_simulation(
                &SimulationOutput {
                    cd,
                    landing,
                    trajectory,
                },
                output,
            )?;
        }

        Commands::Info => {
            println!("╔════════════════════════════════════════╗");
            println!("║         DRAG FIT v{:<8}             ║", env!("CARGO_PKG_VERSION"));
            println!("╠════════════════════════════════════════╣");
            println!("║ Point-mass projectile with quadratic   ║");
            println!("║ drag, fitted to measured landings.     ║");
            println!("╠════════════════════════════════════════╣");
            println!("║ dvx/dt = -Cd·v·vx                      ║");
            println!("║ dvy/dt = -Cd·v²·vy - g                 ║");
            println!("║ g:                 {:>8.3} m/s²       ║", GRAVITY_MPS2);
            println!("║ Sight height:      {:>8.3} m          ║", SIGHT_HEIGHT);
            println!("╠════════════════════════════════════════╣");
            println!("║ Features:                              ║");
            println!("║ • RKF 7(8) with dense output           ║");
            println!("║ • Terminal event at target distance    ║");
            println!("║ • Bounded quasi-Newton calibration     ║");
            println!("║ • SVG trajectory and error plots       ║");
            println!("╚════════════════════════════════════════╝");
        }
    }

    Ok(())
}

fn display_calibration(
    outcome: &CalibrationOutcome,
    initial_cd: f64,
    report: &FitReport,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            eprintln!("{}", outcome.message());
            let summary = CalibrationSummary {
                converged: outcome.is_converged(),
                message: outcome.message(),
                initial_cd,
                report,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        OutputFormat::Csv => {
            eprintln!("{}", outcome.message());
            report.write_csv(std::io::stdout().lock())?;
        }

        OutputFormat::Table => {
            println!("{}", outcome.message());
            println!();
            println!("╔════════════════════════════════════════════════════════════╗");
            println!("║                   CALIBRATION RESULTS                      ║");
            println!("╠════════════════════════════════════════════════════════════╣");
            println!("║ Drag coefficient:  {:>12.8}                            ║", report.cd);
            println!("║ Initial guess:     {:>12.8}                            ║", initial_cd);
            if let CalibrationOutcome::Converged {
                objective,
                iterations,
                evaluations,
                ..
            } = outcome
            {
                println!("║ Objective:         {:>12.6e}                            ║", objective);
                println!("║ Iterations:        {:>12}                            ║", iterations);
                println!("║ Evaluations:       {:>12}                            ║", evaluations);
            }
            println!("╠════════════════════════════════════════════════════════════╣");
            println!("║  Angle (°)  Target x  Target y   Pred. x   Pred. y   Error ║");
            println!("╠════════════════════════════════════════════════════════════╣");
            for entry in &report.entries {
                println!(
                    "║ {:>10.3} {:>9.3} {:>9.3} {:>9.3} {:>9.3} {:>7.4} ║",
                    entry.observation.launch_angle_deg(),
                    entry.observation.target_x,
                    entry.observation.target_y,
                    entry.landing.x,
                    entry.landing.y,
                    entry.error
                );
            }
            println!("╠════════════════════════════════════════════════════════════╣");
            println!(
                "║ Mean error:        {:>10.4} m                            ║",
                report.mean_error
            );
            println!(
                "║ Max error:         {:>10.4} m                            ║",
                report.max_error
            );
            println!("╚════════════════════════════════════════════════════════════╝");
        }
    }
    Ok(())
}

fn display_simulation(result: &SimulationOutput, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }

        OutputFormat::Csv => {
            println!("t,x,y");
            for p in &result.trajectory {
                println!("{:.6},{:.6},{:.6}", p.t, p.x, p.y);
            }
        }

        OutputFormat::Table => {
            println!("╔════════════════════════════════════════╗");
            println!("║         TRAJECTORY RESULTS             ║");
            println!("╠════════════════════════════════════════╣");
            println!("║ Drag coefficient:  {:>10.6}          ║", result.cd);
            println!("║ Landing time:      {:>10.6} s        ║", result.landing.t);
            println!("║ Landing x:         {:>10.6} m        ║", result.landing.x);
            println!("║ Landing y:         {:>10.6} m        ║", result.landing.y);
            println!(
                "║ Target reached:    {:>10}          ║",
                if result.landing.event_fired { "yes" } else { "no" }
            );
            println!("╠════════════════════════════════════════╣");
            println!("║    Time (s)      x (m)      y (m)      ║");
            println!("╠════════════════════════════════════════╣");
            for p in &result.trajectory {
                println!("║ {:>11.5} {:>10.4} {:>10.4}      ║", p.t, p.x, p.y);
            }
            println!("╚════════════════════════════════════════╝");
        }
    }
    Ok(())
}
