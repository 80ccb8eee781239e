//! # Drag Fit
//!
//! Drag coefficient calibration for a point-mass projectile model.
//!
//! Trajectories are integrated with an adaptive Runge-Kutta-Fehlberg 7(8)
//! scheme with dense output and a terminal event at the target's horizontal
//! position. The single drag coefficient is then fitted to measured landing
//! points with a bounded quasi-Newton minimiser.

// Re-export the main types and functions
pub use calibration::{
    calibrate_drag_coefficient, calibrate_with_objective, objective, CalibrationOptions,
    CalibrationOutcome,
};
pub use error::CalibrationError;
pub use evaluator::{
    landing_error, landing_point, vertical_squared_error, LandingError, LandingPoint,
};
pub use integrator::{DenseSolution, IntegrationError};
pub use observation::{load_observations, load_observations_or_empty, Observation};
pub use optimizer::{Bounds, MinimizeError, MinimizerOptions};
pub use plotting::{render_report, PlotConfig, RenderedPlots};
pub use report::{build_report, FitReport};
pub use trajectory::{predict_trajectory, ProjectileModel, SimulationSettings, State};

// Module declarations
pub mod calibration;
pub mod coefficients;
pub mod constants;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod integrator;
pub mod observation;
pub mod optimizer;
pub mod plotting;
pub mod report;
pub mod trajectory;
