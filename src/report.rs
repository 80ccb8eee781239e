//! Post-fit report: per-observation landing errors and sampled trajectories.

use std::io::Write;

use log::info;
use serde::Serialize;

use crate::constants::{REPORT_HORIZON, TRAJECTORY_SAMPLES};
use crate::error::Result;
use crate::evaluator::{compare_landing, landing_point, LandingPoint};
use crate::observation::Observation;
use crate::trajectory::{predict_trajectory, SimulationSettings};

/// A sampled trajectory point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    pub t: f64,
    pub x: f64,
    pub y: f64,
}

/// Fit quality for one observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub observation: Observation,
    pub landing: LandingPoint,
    /// Euclidean distance between predicted and measured landing points
    pub error: f64,
    /// Trajectory from launch to the predicted landing point
    pub trajectory: Vec<TrajectoryPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitReport {
    pub cd: f64,
    pub entries: Vec<ReportEntry>,
    pub mean_error: f64,
    pub max_error: f64,
    pub sum_squared_error: f64,
}

/// Re-simulate every observation with the fitted `cd` and collect the errors.
pub fn build_report(
    cd: f64,
    observations: &[Observation],
    settings: &SimulationSettings,
) -> Result<FitReport> {
    let mut entries = Vec::with_capacity(observations.len());
    let mut sum_squared_error = 0.0;

    for obs in observations {
        let solution = predict_trajectory(
            obs.muzzle_speed,
            obs.launch_angle_rad,
            cd,
            Some(obs.target_x),
            REPORT_HORIZON,
            settings,
        )?;
        let landing = landing_point(&solution);
        let error = compare_landing(obs, landing);
        sum_squared_error += error.squared_distance;

        let trajectory = solution
            .sample(landing.t, TRAJECTORY_SAMPLES)
            .into_iter()
            .map(|(t, state)| TrajectoryPoint {
                t,
                x: state[0],
                y: state[2],
            })
            .collect();

        entries.push(ReportEntry {
            observation: *obs,
            landing,
            error: error.distance,
            trajectory,
        });
    }

    let mean_error = if entries.is_empty() {
        0.0
    } else {
        entries.iter().map(|e| e.error).sum::<f64>() / entries.len() as f64
    };
    let max_error = entries.iter().map(|e| e.error).fold(0.0_f64, f64::max);

    info!(
        "Report for cd = {:.6}: mean error {:.4} m, max error {:.4} m",
        cd, mean_error, max_error
    );

    Ok(FitReport {
        cd,
        entries,
        mean_error,
        max_error,
        sum_squared_error,
    })
}

/// Flat CSV row for one report entry
#[derive(Debug, Serialize)]
struct ReportRow {
    angle_deg: f64,
    target_x: f64,
    target_y: f64,
    predicted_x: f64,
    predicted_y: f64,
    landing_time: f64,
    error: f64,
    event_fired: bool,
}

impl FitReport {
    /// Write one CSV row per observation
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for entry in &self.entries {
            csv_writer.serialize(ReportRow {
                angle_deg: entry.observation.launch_angle_deg(),
                target_x: entry.observation.target_x,
                target_y: entry.observation.target_y,
                predicted_x: entry.landing.x,
                predicted_y: entry.landing.y,
                landing_time: entry.landing.t,
                error: entry.error,
                event_fired: entry.landing.event_fired,
            })?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Errors of all entries in observation order
    pub fn errors(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.error).collect()
    }
}
