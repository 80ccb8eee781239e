//! Landing-point extraction and per-observation error measures.

use log::{debug, warn};
use serde::Serialize;

use crate::constants::{DEGENERATE_ERROR_PENALTY, OPTIMIZATION_HORIZON, REPORT_HORIZON};
use crate::integrator::{DenseSolution, IntegrationError};
use crate::observation::Observation;
use crate::trajectory::{predict_trajectory, SimulationSettings};

/// Predicted landing point of one trajectory
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LandingPoint {
    pub t: f64,
    pub x: f64,
    pub y: f64,
    /// Whether the target-crossing event stopped the trajectory
    pub event_fired: bool,
}

/// Two-dimensional landing error for one observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LandingError {
    pub landing: LandingPoint,
    pub distance: f64,
    pub squared_distance: f64,
}

/// Where the trajectory ended up.
///
/// With a fired event the dense solution is evaluated at the event time,
/// clamped into the integrated domain; otherwise the last step is used.
pub fn landing_point(solution: &DenseSolution<4>) -> LandingPoint {
    if let Some(t_event) = solution.first_event_time() {
        let t = solution.clamp_time(t_event);
        if t != t_event {
            debug!(
                "event time {} outside [{}, {}], clamped to {}",
                t_event,
                solution.t_first(),
                solution.t_last(),
                t
            );
        }
        let state = solution.sol(t).unwrap_or_else(|| solution.final_state());
        return LandingPoint {
            t,
            x: state[0],
            y: state[2],
            event_fired: true,
        };
    }

    let state = solution.final_state();
    LandingPoint {
        t: solution.t_last(),
        x: state[0],
        y: state[2],
        event_fired: false,
    }
}

fn simulate_landing(
    obs: &Observation,
    cd: f64,
    horizon: f64,
    settings: &SimulationSettings,
) -> Result<LandingPoint, IntegrationError> {
    let solution = predict_trajectory(
        obs.muzzle_speed,
        obs.launch_angle_rad,
        cd,
        Some(obs.target_x),
        horizon,
        settings,
    )?;
    Ok(landing_point(&solution))
}

/// Squared vertical miss `(y_pred - target_y)²` used as the optimisation error.
///
/// Trajectories that fail to integrate or land on a non-finite point
/// contribute [`DEGENERATE_ERROR_PENALTY`].
pub fn vertical_squared_error(obs: &Observation, cd: f64, settings: &SimulationSettings) -> f64 {
    match simulate_landing(obs, cd, OPTIMIZATION_HORIZON, settings) {
        Ok(landing) => {
            let err = (landing.y - obs.target_y).powi(2);
            if err.is_finite() {
                debug!(
                    "cd={:.8} angle={:.3}°: y_pred={:.6} target={:.6} err={:.3e}",
                    cd,
                    obs.launch_angle_deg(),
                    landing.y,
                    obs.target_y,
                    err
                );
                err
            } else {
                warn!(
                    "non-finite landing for cd={} at angle {:.3}°, using penalty",
                    cd,
                    obs.launch_angle_deg()
                );
                DEGENERATE_ERROR_PENALTY
            }
        }
        Err(e) => {
            warn!(
                "trajectory failed for cd={} at angle {:.3}°: {}; using penalty",
                cd,
                obs.launch_angle_deg(),
                e
            );
            DEGENERATE_ERROR_PENALTY
        }
    }
}

/// Euclidean distance between the predicted and measured landing points
pub fn landing_error(
    obs: &Observation,
    cd: f64,
    settings: &SimulationSettings,
) -> Result<LandingError, IntegrationError> {
    let landing = simulate_landing(obs, cd, REPORT_HORIZON, settings)?;
    Ok(compare_landing(obs, landing))
}

/// Compare an already computed landing point against its observation
pub fn compare_landing(obs: &Observation, landing: LandingPoint) -> LandingError {
    let dx = landing.x - obs.target_x;
    let dy = landing.y - obs.target_y;
    let squared_distance = dx * dx + dy * dy;

    LandingError {
        landing,
        distance: squared_distance.sqrt(),
        squared_distance,
    }
}
