//! Adaptive Runge-Kutta-Fehlberg 7(8) integrator with dense output and
//! event location.
//!
//! Every accepted step stores `(t, y, f(t, y))`, so the returned
//! [`DenseSolution`] can be queried at any time inside the achieved domain
//! through a cubic Hermite interpolant. Events are checked at accepted step
//! boundaries and located with Brent's method on that interpolant.

use nalgebra::SVector;
use thiserror::Error;

use crate::coefficients::{A, B, B_ERR, C, STAGES};
use crate::events::{sign_change_detected, BrentSolver, Event};

/// System of ordinary differential equations dy/dt = f(t, y)
pub trait OdeSystem<const N: usize> {
    fn rhs(&self, t: f64, y: &SVector<f64, N>) -> SVector<f64, N>;
}

/// Mixed error control: |err_i| <= atol + rtol * |y_i|
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    pub atol: f64,
    pub rtol: f64,
}

impl Tolerances {
    pub fn new(atol: f64, rtol: f64) -> Self {
        Self { atol, rtol }
    }
}

/// I-controller: h_new = safety * h * err^(-1/8), clamped per step
#[derive(Debug, Clone)]
pub struct StepController {
    pub safety: f64,
    pub max_factor: f64,
    pub min_factor: f64,
    exponent: f64,
}

impl Default for StepController {
    fn default() -> Self {
        Self {
            safety: 0.9,
            max_factor: 5.0,
            min_factor: 0.2,
            exponent: 1.0 / 8.0,
        }
    }
}

impl StepController {
    pub fn compute_factor(&self, error: f64) -> f64 {
        if error == 0.0 {
            return self.max_factor;
        }
        let factor = self.safety * error.powf(-self.exponent);
        factor.clamp(self.min_factor, self.max_factor)
    }
}

/// Integration statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub fn_evals: u64,
    pub accepted_steps: u64,
    pub rejected_steps: u64,
}

/// Outcome of a single attempted step
#[derive(Debug, Clone)]
pub struct StepResult<const N: usize> {
    pub y: SVector<f64, N>,
    pub t: f64,
    /// Normalised error estimate, accepted when <= 1
    pub error: f64,
    pub h_next: f64,
    pub accepted: bool,
}

/// How an integration run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationStatus {
    /// Reached the final time
    Completed,
    /// Stopped by a terminal event
    Terminated,
}

#[derive(Debug, Clone, Error)]
pub enum IntegrationError {
    #[error("step size {h} too small at t = {t}")]
    StepSizeTooSmall { t: f64, h: f64 },

    #[error("maximum number of integration steps ({steps}) exceeded at t = {t}")]
    MaxStepsExceeded { t: f64, steps: u64 },

    #[error("event location failed: {message}")]
    EventLocationFailed { message: String },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("non-finite state detected at t = {t}")]
    NonFiniteState { t: f64 },
}

/// Continuous solution of one integration run.
///
/// `t`/`y` are the accepted step points (the first entry is the initial
/// condition, the last is either the final time or the terminal event).
#[derive(Debug, Clone)]
pub struct DenseSolution<const N: usize> {
    pub t: Vec<f64>,
    pub y: Vec<SVector<f64, N>>,
    dydt: Vec<SVector<f64, N>>,
    pub t_events: Vec<f64>,
    pub y_events: Vec<SVector<f64, N>>,
    pub status: IntegrationStatus,
    pub stats: Stats,
}

impl<const N: usize> DenseSolution<N> {
    fn start(t0: f64, y0: SVector<f64, N>, f0: SVector<f64, N>) -> Self {
        Self {
            t: vec![t0],
            y: vec![y0],
            dydt: vec![f0],
            t_events: Vec::new(),
            y_events: Vec::new(),
            status: IntegrationStatus::Completed,
            stats: Stats::default(),
        }
    }

    fn push(&mut self, t: f64, y: SVector<f64, N>, f: SVector<f64, N>) {
        let last = self.t.len() - 1;
        if t <= self.t[last] {
            // an event located exactly on the previous step point
            self.y[last] = y;
            self.dydt[last] = f;
            return;
        }
        self.t.push(t);
        self.y.push(y);
        self.dydt.push(f);
    }

    fn record_event(&mut self, t: f64, y: SVector<f64, N>) {
        self.t_events.push(t);
        self.y_events.push(y);
    }

    pub fn t_first(&self) -> f64 {
        self.t[0]
    }

    pub fn t_last(&self) -> f64 {
        self.t[self.t.len() - 1]
    }

    /// State at the last accepted point
    pub fn final_state(&self) -> SVector<f64, N> {
        self.y[self.y.len() - 1]
    }

    /// Whether a terminal event stopped the run
    pub fn terminated_by_event(&self) -> bool {
        self.status == IntegrationStatus::Terminated
    }

    /// First recorded event time, if any
    pub fn first_event_time(&self) -> Option<f64> {
        self.t_events.first().copied()
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.t_first() && t <= self.t_last()
    }

    /// Pull `t` back into `[t_first, t_last]`; NaN maps to `t_last`
    pub fn clamp_time(&self, t: f64) -> f64 {
        if t.is_nan() {
            return self.t_last();
        }
        t.clamp(self.t_first(), self.t_last())
    }

    /// Evaluate the dense interpolant at `t`; `None` outside the achieved domain.
    pub fn sol(&self, t: f64) -> Option<SVector<f64, N>> {
        if !self.contains(t) {
            return None;
        }
        let idx = self.t.partition_point(|&ti| ti < t);
        if idx == 0 {
            return Some(self.y[0]);
        }
        if self.t[idx] == t {
            return Some(self.y[idx]);
        }
        let i = idx - 1;
        Some(hermite(
            t,
            self.t[i],
            &self.y[i],
            &self.dydt[i],
            self.t[idx],
            &self.y[idx],
            &self.dydt[idx],
        ))
    }

    /// `n` evenly spaced `(t, y)` samples from `t_first` to `t_end`
    /// (`t_end` is clamped into the domain).
    pub fn sample(&self, t_end: f64, n: usize) -> Vec<(f64, SVector<f64, N>)> {
        let t0 = self.t_first();
        let t_end = self.clamp_time(t_end);
        if n < 2 {
            return vec![(t_end, self.sol(t_end).unwrap_or_else(|| self.final_state()))];
        }
        let dt = (t_end - t0) / (n - 1) as f64;
        (0..n)
            .map(|i| {
                let t = if i == n - 1 { t_end } else { t0 + dt * i as f64 };
                (t, self.sol(t).unwrap_or_else(|| self.final_state()))
            })
            .collect()
    }
}

/// Cubic Hermite interpolation on [t_a, t_b] from states and derivatives
fn hermite<const N: usize>(
    t: f64,
    t_a: f64,
    y_a: &SVector<f64, N>,
    f_a: &SVector<f64, N>,
    t_b: f64,
    y_b: &SVector<f64, N>,
    f_b: &SVector<f64, N>,
) -> SVector<f64, N> {
    let dt = t_b - t_a;
    if dt == 0.0 {
        return *y_b;
    }
    let s = (t - t_a) / dt;
    let s2 = s * s;
    let s3 = s2 * s;
    let h00 = 1.0 - 3.0 * s2 + 2.0 * s3;
    let h10 = s - 2.0 * s2 + s3;
    let h01 = 3.0 * s2 - 2.0 * s3;
    let h11 = s3 - s2;
    y_a * h00 + f_a * (h10 * dt) + y_b * h01 + f_b * (h11 * dt)
}

/// Runge-Kutta-Fehlberg 7(8) integrator
///
/// ```
/// use drag_fit::integrator::{Integrator, OdeSystem, Tolerances};
/// use nalgebra::Vector1;
///
/// struct Decay;
/// impl OdeSystem<1> for Decay {
///     fn rhs(&self, _t: f64, y: &Vector1<f64>) -> Vector1<f64> {
///         -y
///     }
/// }
///
/// let mut integrator = Integrator::new(Tolerances::new(1e-12, 1e-12));
/// let solution = integrator.integrate(&Decay, 0.0, &Vector1::new(1.0), 1.0, 0.1).unwrap();
/// assert!((solution.final_state()[0] - (-1.0_f64).exp()).abs() < 1e-10);
/// ```
#[derive(Debug, Clone)]
pub struct Integrator<const N: usize> {
    tol: Tolerances,
    controller: StepController,
    /// Smallest step the controller may take
    pub h_min: f64,
    /// Largest step the controller may take
    pub max_step: f64,
    /// Attempted-step budget for one run
    pub max_steps: u64,
    /// Root finder used to locate events
    pub root_solver: BrentSolver,
    k: [SVector<f64, N>; STAGES],
    pub stats: Stats,
}

impl<const N: usize> Integrator<N> {
    pub fn new(tol: Tolerances) -> Self {
        Self {
            tol,
            controller: StepController::default(),
            h_min: 1e-14,
            max_step: f64::INFINITY,
            max_steps: 10_000_000,
            root_solver: BrentSolver::default(),
            k: [SVector::zeros(); STAGES],
            stats: Stats::default(),
        }
    }

    pub fn with_max_step(mut self, max_step: f64) -> Self {
        self.max_step = max_step;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn tolerances(&self) -> Tolerances {
        self.tol
    }

    /// Attempt one step of size `h` from `(t, y)`
    pub fn step<S: OdeSystem<N>>(
        &mut self,
        sys: &S,
        t: f64,
        y: &SVector<f64, N>,
        h: f64,
    ) -> StepResult<N> {
        let h = h.clamp(self.h_min, self.max_step);

        self.compute_stages(sys, t, y, h);

        let mut increment = SVector::<f64, N>::zeros();
        let mut err = SVector::<f64, N>::zeros();
        for i in 0..STAGES {
            increment += self.k[i] * B[i];
            err += self.k[i] * B_ERR[i];
        }
        let y_new = y + increment * h;
        let err = err * h;

        let error = err
            .iter()
            .zip(y_new.iter())
            .map(|(e, yn)| e.abs() / (self.tol.atol + self.tol.rtol * yn.abs()))
            .fold(0.0_f64, f64::max);

        let accepted = error <= 1.0;
        let h_next = (h * self.controller.compute_factor(error)).clamp(self.h_min, self.max_step);

        self.stats.fn_evals += STAGES as u64;
        if accepted {
            self.stats.accepted_steps += 1;
        } else {
            self.stats.rejected_steps += 1;
        }

        StepResult {
            y: y_new,
            t: t + h,
            error,
            h_next,
            accepted,
        }
    }

    fn compute_stages<S: OdeSystem<N>>(&mut self, sys: &S, t: f64, y: &SVector<f64, N>, h: f64) {
        self.k[0] = sys.rhs(t, y);
        for i in 1..STAGES {
            let mut acc = SVector::<f64, N>::zeros();
            for j in 0..i {
                if A[i][j] != 0.0 {
                    acc += self.k[j] * A[i][j];
                }
            }
            let y_stage = y + acc * h;
            self.k[i] = sys.rhs(t + C[i] * h, &y_stage);
        }
    }

    /// Integrate from `t0` to `tf` with no events
    pub fn integrate<S: OdeSystem<N>>(
        &mut self,
        sys: &S,
        t0: f64,
        y0: &SVector<f64, N>,
        tf: f64,
        h0: f64,
    ) -> Result<DenseSolution<N>, IntegrationError> {
        self.run::<S, fn(f64, &SVector<f64, N>) -> f64>(sys, None, t0, y0, tf, h0)
    }

    /// Integrate from `t0` to `tf`, watching `event`.
    ///
    /// A terminal event truncates the solution at the located crossing; a
    /// recording event only appends to `t_events`/`y_events`.
    pub fn integrate_with_event<S, F>(
        &mut self,
        sys: &S,
        event: &Event<F>,
        t0: f64,
        y0: &SVector<f64, N>,
        tf: f64,
        h0: f64,
    ) -> Result<DenseSolution<N>, IntegrationError>
    where
        S: OdeSystem<N>,
        F: Fn(f64, &SVector<f64, N>) -> f64,
    {
        self.run(sys, Some(event), t0, y0, tf, h0)
    }

    fn run<S, F>(
        &mut self,
        sys: &S,
        event: Option<&Event<F>>,
        t0: f64,
        y0: &SVector<f64, N>,
        tf: f64,
        h0: f64,
    ) -> Result<DenseSolution<N>, IntegrationError>
    where
        S: OdeSystem<N>,
        F: Fn(f64, &SVector<f64, N>) -> f64,
    {
        self.validate_inputs(t0, y0, tf, h0)?;
        self.stats = Stats::default();

        let mut f_prev = sys.rhs(t0, y0);
        self.stats.fn_evals += 1;
        let mut solution = DenseSolution::start(t0, *y0, f_prev);

        let mut t = t0;
        let mut y = *y0;
        let mut h = h0.min(self.max_step);
        let mut g_prev = event.map(|e| e.eval(t, &y));
        let mut step_count = 0u64;

        while tf - t > self.h_min {
            if t + h > tf {
                h = tf - t;
            }

            let result = self.step(sys, t, &y, h);

            if result.accepted {
                if !result.y.iter().all(|v| v.is_finite()) {
                    return Err(IntegrationError::NonFiniteState { t: result.t });
                }
                let f_new = sys.rhs(result.t, &result.y);
                self.stats.fn_evals += 1;

                if let (Some(event), Some(g_old)) = (event, g_prev) {
                    let g_new = event.eval(result.t, &result.y);
                    if sign_change_detected(g_old, g_new, event.direction) {
                        let (t_event, y_event) = self.locate_event(
                            event, t, &y, &f_prev, result.t, &result.y, &f_new, g_old, g_new,
                        )?;
                        solution.record_event(t_event, y_event);

                        if event.terminal {
                            let f_event = sys.rhs(t_event, &y_event);
                            self.stats.fn_evals += 1;
                            solution.push(t_event, y_event, f_event);
                            solution.status = IntegrationStatus::Terminated;
                            solution.stats = self.stats.clone();
                            return Ok(solution);
                        }
                    }
                    g_prev = Some(g_new);
                }

                t = result.t;
                y = result.y;
                f_prev = f_new;
                solution.push(t, y, f_new);
            }

            h = result.h_next;

            step_count += 1;
            if step_count > self.max_steps {
                return Err(IntegrationError::MaxStepsExceeded {
                    t,
                    steps: self.max_steps,
                });
            }

            if !result.accepted && result.h_next <= self.h_min && tf - t > self.h_min {
                return Err(IntegrationError::StepSizeTooSmall {
                    t,
                    h: result.h_next,
                });
            }
        }

        solution.stats = self.stats.clone();
        Ok(solution)
    }

    #[allow(clippy::too_many_arguments)]
    fn locate_event<F>(
        &mut self,
        event: &Event<F>,
        t_a: f64,
        y_a: &SVector<f64, N>,
        f_a: &SVector<f64, N>,
        t_b: f64,
        y_b: &SVector<f64, N>,
        f_b: &SVector<f64, N>,
        g_a: f64,
        g_b: f64,
    ) -> Result<(f64, SVector<f64, N>), IntegrationError>
    where
        F: Fn(f64, &SVector<f64, N>) -> f64,
    {
        let interp = |t: f64| hermite(t, t_a, y_a, f_a, t_b, y_b, f_b);
        let g = |t: f64| event.eval(t, &interp(t));

        let t_event = self
            .root_solver
            .find_root(g, t_a, t_b, Some(g_a), Some(g_b))
            .map_err(|e| IntegrationError::EventLocationFailed {
                message: e.to_string(),
            })?;
        Ok((t_event, interp(t_event)))
    }

    fn validate_inputs(
        &self,
        t0: f64,
        y0: &SVector<f64, N>,
        tf: f64,
        h0: f64,
    ) -> Result<(), IntegrationError> {
        if !t0.is_finite() || !tf.is_finite() || !h0.is_finite() {
            return Err(IntegrationError::InvalidInput {
                message: "t0, tf, and h0 must be finite".to_string(),
            });
        }
        if tf < t0 {
            return Err(IntegrationError::InvalidInput {
                message: format!("tf ({}) must not precede t0 ({})", tf, t0),
            });
        }
        if h0 <= 0.0 {
            return Err(IntegrationError::InvalidInput {
                message: "h0 must be positive".to_string(),
            });
        }
        if let Some(i) = y0.iter().position(|v| !v.is_finite()) {
            return Err(IntegrationError::InvalidInput {
                message: format!("y0[{}] is not finite", i),
            });
        }
        if !self.tol.atol.is_finite() || self.tol.atol <= 0.0 {
            return Err(IntegrationError::InvalidInput {
                message: "atol must be positive and finite".to_string(),
            });
        }
        if !self.tol.rtol.is_finite() || self.tol.rtol < 0.0 {
            return Err(IntegrationError::InvalidInput {
                message: "rtol must be non-negative and finite".to_string(),
            });
        }
        if !(self.max_step > 0.0) {
            return Err(IntegrationError::InvalidInput {
                message: "max_step must be positive".to_string(),
            });
        }
        Ok(())
    }
}
