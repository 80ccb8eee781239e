/// Physical and numerical constants used by the trajectory model and calibration

/// Gravitational acceleration in m/s² used by the calibration model
pub const GRAVITY_MPS2: f64 = 9.8;

/// Height of the sight line above the launch point (m)
///
/// Measured landing heights are recorded relative to the sight line, so every
/// observation's target height is shifted down by this amount once at ingestion.
pub const SIGHT_HEIGHT: f64 = 0.375;

// Integrator settings
/// Absolute tolerance of the adaptive integrator
pub const DEFAULT_ATOL: f64 = 1e-9;

/// Relative tolerance of the adaptive integrator
pub const DEFAULT_RTOL: f64 = 1e-9;

/// Maximum internal integrator step (s)
pub const DEFAULT_MAX_STEP: f64 = 0.001;

/// Hard cap on attempted integrator steps for a single trajectory
pub const DEFAULT_MAX_STEPS: u64 = 2_000_000;

/// Initial trial step handed to the integrator (s)
pub const INITIAL_STEP: f64 = 1e-4;

/// Root tolerance for locating the target-crossing event (s)
pub const EVENT_ROOT_TOLERANCE: f64 = 1e-13;

// Time horizons
/// Time horizon for trajectories evaluated inside the optimisation loop (s)
pub const OPTIMIZATION_HORIZON: f64 = 5.0;

/// Time horizon for trajectories evaluated for the post-fit report (s)
pub const REPORT_HORIZON: f64 = 1.5;

/// Number of samples drawn from each fitted trajectory for plotting
pub const TRAJECTORY_SAMPLES: usize = 200;

// Calibration defaults
/// Default starting guess for the drag coefficient
pub const DEFAULT_INITIAL_CD: f64 = 0.005;

/// Default lower bound for the drag coefficient
pub const DEFAULT_CD_MIN: f64 = 0.0;

/// Default upper bound for the drag coefficient
pub const DEFAULT_CD_MAX: f64 = 300.0;

/// Squared error substituted when a trajectory cannot be evaluated
pub const DEGENERATE_ERROR_PENALTY: f64 = 1e6;

/// Default location of the measured observation file
pub const DEFAULT_DATA_PATH: &str = "data/measured_data.csv";
