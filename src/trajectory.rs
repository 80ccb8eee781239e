//! Point-mass trajectory model with quadratic drag.
//!
//! State layout is `[x, vx, y, vy]`. The drag terms are deliberately
//! asymmetric: the horizontal component decays with `Cd * v * vx` while the
//! vertical component decays with `Cd * v² * vy`.

use log::debug;
use nalgebra::Vector4;

use crate::constants::{
    DEFAULT_ATOL, DEFAULT_MAX_STEP, DEFAULT_MAX_STEPS, DEFAULT_RTOL, EVENT_ROOT_TOLERANCE,
    GRAVITY_MPS2, INITIAL_STEP,
};
use crate::events::{BrentSolver, Event};
use crate::integrator::{DenseSolution, IntegrationError, Integrator, OdeSystem, Tolerances};

/// Projectile state `[x, vx, y, vy]`
pub type State = Vector4<f64>;

/// Integrator configuration for a single trajectory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSettings {
    pub atol: f64,
    pub rtol: f64,
    pub max_step: f64,
    pub gravity: f64,
    pub max_steps: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            atol: DEFAULT_ATOL,
            rtol: DEFAULT_RTOL,
            max_step: DEFAULT_MAX_STEP,
            gravity: GRAVITY_MPS2,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// Equations of motion for a given drag coefficient
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileModel {
    pub cd: f64,
    pub gravity: f64,
}

impl ProjectileModel {
    pub fn new(cd: f64, gravity: f64) -> Self {
        Self { cd, gravity }
    }

    /// Time derivative of the state
    pub fn derivatives(&self, state: &State) -> State {
        let vx = state[1];
        let vy = state[3];
        let v = (vx * vx + vy * vy).sqrt();

        Vector4::new(
            vx,
            -self.cd * v * vx,
            vy,
            -self.cd * v * v * vy - self.gravity,
        )
    }
}

impl OdeSystem<4> for ProjectileModel {
    fn rhs(&self, _t: f64, y: &State) -> State {
        self.derivatives(y)
    }
}

/// Launch state at the origin for a muzzle speed (m/s) and angle (rad)
pub fn initial_state(speed: f64, angle: f64) -> State {
    Vector4::new(0.0, speed * angle.cos(), 0.0, speed * angle.sin())
}

/// Integrate one trajectory from launch up to `t_max`.
///
/// With `target_x` set, integration stops at the first time the projectile
/// crosses that horizontal position; otherwise the solution covers
/// `[0, t_max]`.
pub fn predict_trajectory(
    initial_speed: f64,
    launch_angle: f64,
    cd: f64,
    target_x: Option<f64>,
    t_max: f64,
    settings: &SimulationSettings,
) -> Result<DenseSolution<4>, IntegrationError> {
    let model = ProjectileModel::new(cd, settings.gravity);
    let y0 = initial_state(initial_speed, launch_angle);

    let mut integrator = Integrator::new(Tolerances::new(settings.atol, settings.rtol))
        .with_max_step(settings.max_step)
        .with_max_steps(settings.max_steps);
    integrator.root_solver = BrentSolver::new(EVENT_ROOT_TOLERANCE, 100);

    let h0 = INITIAL_STEP.min(settings.max_step);

    let solution = match target_x {
        Some(target_x) => {
            let event = Event::terminal(move |_t: f64, y: &State| y[0] - target_x);
            integrator.integrate_with_event(&model, &event, 0.0, &y0, t_max, h0)?
        }
        None => integrator.integrate(&model, 0.0, &y0, t_max, h0)?,
    };

    debug!(
        "trajectory cd={:.6} angle={:.4} rad: {} steps, {} rejected, t_end={:.6}, event={}",
        cd,
        launch_angle,
        solution.stats.accepted_steps,
        solution.stats.rejected_steps,
        solution.t_last(),
        solution.terminated_by_event()
    );

    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_derivatives_drag_free() {
        let model = ProjectileModel::new(0.0, 9.8);
        let d = model.derivatives(&Vector4::new(1.0, 10.0, 2.0, 5.0));
        assert_eq!(d, Vector4::new(10.0, 0.0, 5.0, -9.8));
    }

    #[test]
    fn test_derivatives_asymmetric_drag() {
        let model = ProjectileModel::new(0.01, 9.8);
        // v = 5 for (3, 4)
        let d = model.derivatives(&Vector4::new(0.0, 3.0, 0.0, 4.0));
        assert_relative_eq!(d[1], -0.01 * 5.0 * 3.0, epsilon = 1e-15);
        assert_relative_eq!(d[3], -0.01 * 25.0 * 4.0 - 9.8, epsilon = 1e-15);
    }

    #[test]
    fn test_initial_state() {
        let s = initial_state(17.0, 0.0);
        assert_eq!(s, Vector4::new(0.0, 17.0, 0.0, 0.0));

        let s = initial_state(10.0, std::f64::consts::FRAC_PI_2);
        assert!(s[1].abs() < 1e-12);
        assert_relative_eq!(s[3], 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_drag_free_matches_parabola() {
        let settings = SimulationSettings::default();
        let speed = 17.0;
        let angle = 10.0_f64.to_radians();
        let solution = predict_trajectory(speed, angle, 0.0, Some(3.0), 5.0, &settings).unwrap();

        assert!(solution.terminated_by_event());
        let y = solution.final_state();
        let x = y[0];
        let expected = x * angle.tan() - 9.8 * x * x / (2.0 * speed * speed * angle.cos().powi(2));
        assert!((x - 3.0).abs() < 1e-9);
        assert!((y[2] - expected).abs() < 1e-8, "y = {}, expected {}", y[2], expected);
    }

    #[test]
    fn test_no_target_runs_to_horizon() {
        let settings = SimulationSettings::default();
        let solution = predict_trajectory(17.0, 0.1, 0.01, None, 0.25, &settings).unwrap();

        assert!(!solution.terminated_by_event());
        assert_relative_eq!(solution.t_last(), 0.25, epsilon = 1e-12);
        assert!(solution.t.len() >= 250);
    }

    #[test]
    fn test_unreachable_target_ends_at_horizon() {
        let settings = SimulationSettings::default();
        let solution = predict_trajectory(17.0, -0.1, 0.01, Some(500.0), 1.0, &settings).unwrap();

        assert!(solution.t_events.is_empty());
        assert_relative_eq!(solution.t_last(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_identical_inputs_identical_output() {
        let settings = SimulationSettings::default();
        let a = predict_trajectory(17.0, -0.05, 0.0086, Some(4.0), 5.0, &settings).unwrap();
        let b = predict_trajectory(17.0, -0.05, 0.0086, Some(4.0), 5.0, &settings).unwrap();

        assert_eq!(a.t, b.t);
        assert_eq!(a.y, b.y);
        assert_eq!(a.t_events, b.t_events);
    }

    #[test]
    fn test_negative_horizon_rejected() {
        let settings = SimulationSettings::default();
        let result = predict_trajectory(17.0, 0.0, 0.01, None, -1.0, &settings);
        assert!(matches!(result, Err(IntegrationError::InvalidInput { .. })));
    }
}
