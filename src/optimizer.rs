//! Bounded scalar minimisation.
//!
//! A one-dimensional projected quasi-Newton method: finite-difference
//! gradients, a secant estimate of the inverse curvature, and a projected
//! backtracking line search with the Armijo condition. The iterate never
//! leaves the box `[lower, upper]`.

use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::error::CalibrationError;

/// Closed interval `[lower, upper]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    lower: f64,
    upper: f64,
}

impl Bounds {
    pub fn new(lower: f64, upper: f64) -> Result<Self, CalibrationError> {
        if !lower.is_finite() || !upper.is_finite() || lower > upper {
            return Err(CalibrationError::InvalidBounds { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower && x <= self.upper
    }

    /// Nearest point of the interval; NaN maps to the lower bound
    pub fn project(&self, x: f64) -> f64 {
        if x.is_nan() {
            return self.lower;
        }
        x.clamp(self.lower, self.upper)
    }

    /// Gradient with components pointing out of the box removed
    pub fn projected_gradient(&self, x: f64, g: f64) -> f64 {
        if (x <= self.lower && g > 0.0) || (x >= self.upper && g < 0.0) {
            0.0
        } else {
            g
        }
    }
}

/// Stopping and step parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimizerOptions {
    /// Relative reduction tolerance
    pub ftol: f64,
    /// Projected gradient tolerance
    pub gtol: f64,
    pub max_iter: usize,
    pub max_fun_evals: usize,
    /// Finite-difference step for the gradient
    pub fd_step: f64,
    /// Backtracking trials per line search
    pub max_line_search: usize,
    /// Sufficient-decrease constant
    pub armijo: f64,
}

impl Default for MinimizerOptions {
    fn default() -> Self {
        Self {
            ftol: 1e-9,
            gtol: 1e-9,
            max_iter: 2000,
            max_fun_evals: 15000,
            fd_step: 1e-8,
            max_line_search: 20,
            armijo: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConvergenceReason {
    /// |projected gradient| <= gtol
    ProjectedGradient,
    /// relative reduction of the objective <= ftol
    RelativeReduction,
    /// no acceptable step, but the objective is flat within ftol
    LineSearchStalled,
}

/// Result of a successful minimisation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Minimum {
    pub x: f64,
    pub f: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub reason: ConvergenceReason,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MinimizeError {
    #[error("objective is not finite at the starting point x = {x} (f = {value})")]
    NonFiniteStart { x: f64, value: f64 },

    #[error("finite-difference gradient is not finite at x = {x}")]
    NonFiniteGradient { x: f64 },

    #[error("line search failed to find a decreasing point from x = {x} (f = {f})")]
    LineSearchFailed { x: f64, f: f64 },

    #[error("maximum number of iterations ({iterations}) reached at x = {x} (f = {f})")]
    MaxIterations { iterations: usize, x: f64, f: f64 },

    #[error("maximum number of function evaluations ({evaluations}) reached")]
    MaxEvaluations { evaluations: usize },
}

/// Objective wrapper enforcing the evaluation budget
struct CountedObjective<F> {
    f: F,
    evaluations: usize,
    budget: usize,
}

impl<F: FnMut(f64) -> f64> CountedObjective<F> {
    fn call(&mut self, x: f64) -> Result<f64, MinimizeError> {
        if self.evaluations >= self.budget {
            return Err(MinimizeError::MaxEvaluations {
                evaluations: self.evaluations,
            });
        }
        self.evaluations += 1;
        Ok((self.f)(x))
    }
}

fn finite_difference_gradient<F: FnMut(f64) -> f64>(
    objective: &mut CountedObjective<F>,
    x: f64,
    fx: f64,
    bounds: &Bounds,
    step: f64,
) -> Result<f64, MinimizeError> {
    let g = if x + step <= bounds.upper() {
        (objective.call(x + step)? - fx) / step
    } else if x - step >= bounds.lower() {
        (fx - objective.call(x - step)?) / step
    } else {
        // interval narrower than the difference step
        0.0
    };

    if g.is_finite() {
        Ok(g)
    } else {
        Err(MinimizeError::NonFiniteGradient { x })
    }
}

/// Minimise `f` over `bounds` starting from `x0` (projected into the box).
///
/// ```
/// use drag_fit::optimizer::{minimize_bounded, Bounds, MinimizerOptions};
///
/// let bounds = Bounds::new(0.0, 10.0).unwrap();
/// let options = MinimizerOptions::default();
/// let min = minimize_bounded(|x| (x - 3.0).powi(2), 1.0, &bounds, &options).unwrap();
/// assert!((min.x - 3.0).abs() < 1e-4);
/// ```
pub fn minimize_bounded<F>(
    f: F,
    x0: f64,
    bounds: &Bounds,
    options: &MinimizerOptions,
) -> Result<Minimum, MinimizeError>
where
    F: FnMut(f64) -> f64,
{
    let mut objective = CountedObjective {
        f,
        evaluations: 0,
        budget: options.max_fun_evals,
    };

    let mut x = bounds.project(x0);
    let mut fx = objective.call(x)?;
    if !fx.is_finite() {
        return Err(MinimizeError::NonFiniteStart { x, value: fx });
    }
    let mut g = finite_difference_gradient(&mut objective, x, fx, bounds, options.fd_step)?;
    let mut inverse_curvature: Option<f64> = None;

    for iteration in 1..=options.max_iter {
        let pg = bounds.projected_gradient(x, g);
        if pg.abs() <= options.gtol {
            return Ok(Minimum {
                x,
                f: fx,
                iterations: iteration - 1,
                evaluations: objective.evaluations,
                reason: ConvergenceReason::ProjectedGradient,
            });
        }

        // first step has unit length; later steps use the secant curvature
        let direction = match inverse_curvature {
            Some(h) => -h * g,
            None => -g.signum(),
        };

        let mut alpha = 1.0;
        let mut accepted: Option<(f64, f64)> = None;
        let mut smallest_change: Option<f64> = None;

        for _ in 0..options.max_line_search {
            let x_trial = bounds.project(x + alpha * direction);
            if x_trial == x {
                // step below the resolution of x
                smallest_change = Some(0.0);
                break;
            }
            let f_trial = objective.call(x_trial)?;
            if f_trial.is_finite() {
                if f_trial <= fx + options.armijo * g * (x_trial - x) {
                    accepted = Some((x_trial, f_trial));
                    break;
                }
                smallest_change = Some((f_trial - fx).abs());
            } else {
                smallest_change = None;
            }
            alpha *= 0.5;
        }

        let (x_new, f_new) = match accepted {
            Some(point) => point,
            None => {
                let flat = smallest_change
                    .map(|delta| delta <= options.ftol * fx.abs().max(1.0))
                    .unwrap_or(false);
                if flat {
                    debug!("line search stalled at x = {:.10}, objective flat", x);
                    return Ok(Minimum {
                        x,
                        f: fx,
                        iterations: iteration,
                        evaluations: objective.evaluations,
                        reason: ConvergenceReason::LineSearchStalled,
                    });
                }
                return Err(MinimizeError::LineSearchFailed { x, f: fx });
            }
        };

        let g_new =
            finite_difference_gradient(&mut objective, x_new, f_new, bounds, options.fd_step)?;

        let s = x_new - x;
        let y = g_new - g;
        if s * y > 0.0 {
            inverse_curvature = Some(s / y);
        }

        let reduction = (fx - f_new) / fx.abs().max(f_new.abs()).max(1.0);
        debug!(
            "iter {}: x = {:.10}, f = {:.6e}, g = {:.3e}, reduction = {:.3e}",
            iteration, x_new, f_new, g_new, reduction
        );

        x = x_new;
        fx = f_new;
        g = g_new;

        if reduction <= options.ftol {
            return Ok(Minimum {
                x,
                f: fx,
                iterations: iteration,
                evaluations: objective.evaluations,
                reason: ConvergenceReason::RelativeReduction,
            });
        }
    }

    Err(MinimizeError::MaxIterations {
        iterations: options.max_iter,
        x,
        f: fx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_validation() {
        assert!(Bounds::new(0.0, 300.0).is_ok());
        assert!(Bounds::new(1.0, 1.0).is_ok());
        assert!(matches!(
            Bounds::new(2.0, 1.0),
            Err(CalibrationError::InvalidBounds { .. })
        ));
        assert!(Bounds::new(f64::NAN, 1.0).is_err());
        assert!(Bounds::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_projection() {
        let bounds = Bounds::new(0.0, 1.0).unwrap();
        assert_eq!(bounds.project(-1.0), 0.0);
        assert_eq!(bounds.project(2.0), 1.0);
        assert_eq!(bounds.project(0.5), 0.5);
        assert_eq!(bounds.projected_gradient(0.0, 3.0), 0.0);
        assert_eq!(bounds.projected_gradient(0.0, -3.0), -3.0);
        assert_eq!(bounds.projected_gradient(1.0, -3.0), 0.0);
    }

    #[test]
    fn test_interior_quadratic() {
        let bounds = Bounds::new(0.0, 300.0).unwrap();
        let min = minimize_bounded(
            |x| 100.0 * (x - 0.0086).powi(2) + 0.001,
            0.005,
            &bounds,
            &MinimizerOptions::default(),
        )
        .unwrap();
        assert!((min.x - 0.0086).abs() < 1e-4, "x = {}", min.x);
        assert!(bounds.contains(min.x));
    }

    #[test]
    fn test_minimum_on_lower_bound() {
        let bounds = Bounds::new(0.0, 10.0).unwrap();
        let options = MinimizerOptions::default();
        let min = minimize_bounded(|x| (x + 1.0).powi(2), 2.0, &bounds, &options).unwrap();
        assert_eq!(min.x, 0.0);
        assert_eq!(min.f, 1.0);
    }

    #[test]
    fn test_minimum_on_upper_bound() {
        let bounds = Bounds::new(0.0, 5.0).unwrap();
        let min = minimize_bounded(|x| -x, 1.0, &bounds, &MinimizerOptions::default()).unwrap();
        assert_eq!(min.x, 5.0);
    }

    #[test]
    fn test_start_outside_bounds_is_projected() {
        let bounds = Bounds::new(0.0, 10.0).unwrap();
        let options = MinimizerOptions::default();
        let min = minimize_bounded(|x| (x - 4.0).powi(2), 50.0, &bounds, &options).unwrap();
        assert!((min.x - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_nan_start_fails() {
        let bounds = Bounds::new(0.0, 10.0).unwrap();
        let result = minimize_bounded(|_| f64::NAN, 1.0, &bounds, &MinimizerOptions::default());
        assert!(matches!(result, Err(MinimizeError::NonFiniteStart { .. })));
    }

    #[test]
    fn test_evaluation_budget() {
        let bounds = Bounds::new(-100.0, 100.0).unwrap();
        let options = MinimizerOptions {
            max_fun_evals: 3,
            ..MinimizerOptions::default()
        };
        let result = minimize_bounded(|x| (x - 50.0).powi(4), -90.0, &bounds, &options);
        assert!(matches!(result, Err(MinimizeError::MaxEvaluations { evaluations: 3 })));
    }

    #[test]
    fn test_iteration_budget() {
        let bounds = Bounds::new(-1e6, 1e6).unwrap();
        let options = MinimizerOptions {
            max_iter: 1,
            ..MinimizerOptions::default()
        };
        let result = minimize_bounded(|x| (x - 100.0).powi(2), 0.0, &bounds, &options);
        assert!(matches!(result, Err(MinimizeError::MaxIterations { iterations: 1, .. })));
    }
}
