//! Drag coefficient calibration against measured landing points.

use log::{info, warn};
use rayon::prelude::*;

use crate::evaluator::vertical_squared_error;
use crate::observation::Observation;
use crate::optimizer::{minimize_bounded, Bounds, MinimizeError, MinimizerOptions};
use crate::trajectory::SimulationSettings;

/// Configuration for one calibration run
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalibrationOptions {
    pub settings: SimulationSettings,
    pub minimizer: MinimizerOptions,
    /// Evaluate observations in parallel inside each objective call
    pub parallel: bool,
}

/// How a calibration run ended
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationOutcome {
    Converged {
        cd: f64,
        objective: f64,
        iterations: usize,
        evaluations: usize,
    },
    /// The minimiser failed; `cd` is the initial guess, unchanged
    Fallback { cd: f64, reason: MinimizeError },
}

impl CalibrationOutcome {
    /// Best-effort drag coefficient
    pub fn cd(&self) -> f64 {
        match self {
            CalibrationOutcome::Converged { cd, .. }
            | CalibrationOutcome::Fallback { cd, .. } => *cd,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, CalibrationOutcome::Converged { .. })
    }

    /// One-line status for the user
    pub fn message(&self) -> String {
        match self {
            CalibrationOutcome::Converged { objective, .. } => {
                format!("Optimization successful. Final error: {:.6}", objective)
            }
            CalibrationOutcome::Fallback { reason, .. } => {
                format!("Optimization failed: {}", reason)
            }
        }
    }
}

/// Sum of squared vertical landing errors over all observations
pub fn objective(cd: f64, observations: &[Observation], options: &CalibrationOptions) -> f64 {
    let settings = &options.settings;
    if options.parallel {
        observations
            .par_iter()
            .map(|obs| vertical_squared_error(obs, cd, settings))
            .sum()
    } else {
        observations
            .iter()
            .map(|obs| vertical_squared_error(obs, cd, settings))
            .sum()
    }
}

/// Fit the drag coefficient to `observations` within `bounds`.
pub fn calibrate_drag_coefficient(
    initial_cd: f64,
    observations: &[Observation],
    bounds: &Bounds,
    options: &CalibrationOptions,
) -> CalibrationOutcome {
    info!(
        "Calibrating drag coefficient on {} observations, initial guess {}, bounds [{}, {}]",
        observations.len(),
        initial_cd,
        bounds.lower(),
        bounds.upper()
    );
    calibrate_with_objective(initial_cd, bounds, options, |cd| {
        objective(cd, observations, options)
    })
}

/// Run the calibration driver over an arbitrary objective of `Cd`.
pub fn calibrate_with_objective<F>(
    initial_cd: f64,
    bounds: &Bounds,
    options: &CalibrationOptions,
    f: F,
) -> CalibrationOutcome
where
    F: FnMut(f64) -> f64,
{
    match minimize_bounded(f, initial_cd, bounds, &options.minimizer) {
        Ok(min) => {
            info!(
                "Converged to cd = {:.8} (objective {:.6e}, {} iterations, {} evaluations, {:?})",
                min.x, min.f, min.iterations, min.evaluations, min.reason
            );
            CalibrationOutcome::Converged {
                cd: min.x,
                objective: min.f,
                iterations: min.iterations,
                evaluations: min.evaluations,
            }
        }
        Err(reason) => {
            warn!(
                "Calibration did not converge ({}); keeping initial guess cd = {}",
                reason, initial_cd
            );
            CalibrationOutcome::Fallback {
                cd: initial_cd,
                reason,
            }
        }
    }
}
