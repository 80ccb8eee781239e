//! Event descriptors and root location for integration events.
//!
//! An event is a continuous condition `g(t, y)` watched during integration.
//! When `g` changes sign between two accepted steps, the crossing time is
//! located with Brent's method on the dense interpolant of that step.

use log::debug;
use nalgebra::SVector;
use thiserror::Error;

/// Which sign changes of the event condition count as a crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventDirection {
    /// g goes from negative to positive
    Rising,
    /// g goes from positive to negative
    Falling,
    /// Either direction
    #[default]
    Any,
}

/// Explicit event descriptor handed to the integrator.
///
/// `condition` returns the signed distance to the event surface, `terminal`
/// decides whether integration stops at the first crossing, and `direction`
/// filters which crossings count.
///
/// ```
/// use drag_fit::events::{Event, EventDirection};
/// use nalgebra::Vector4;
///
/// let target_x = 2.0;
/// let event = Event::terminal(move |_t: f64, y: &Vector4<f64>| y[0] - target_x);
/// assert!(event.terminal);
/// assert_eq!(event.direction, EventDirection::Any);
/// ```
#[derive(Debug, Clone)]
pub struct Event<F> {
    pub condition: F,
    pub terminal: bool,
    pub direction: EventDirection,
}

impl<F> Event<F> {
    /// Event that stops integration at its first crossing in either direction
    pub fn terminal(condition: F) -> Self {
        Self {
            condition,
            terminal: true,
            direction: EventDirection::Any,
        }
    }

    /// Event that is recorded at every crossing without stopping integration
    pub fn recording(condition: F) -> Self {
        Self {
            condition,
            terminal: false,
            direction: EventDirection::Any,
        }
    }

    pub fn with_direction(mut self, direction: EventDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Evaluate the condition
    pub fn eval<const N: usize>(&self, t: f64, y: &SVector<f64, N>) -> f64
    where
        F: Fn(f64, &SVector<f64, N>) -> f64,
    {
        (self.condition)(t, y)
    }
}

/// Errors from Brent's method
#[derive(Debug, Clone, Error)]
pub enum BrentError {
    #[error("root not bracketed: f({a}) = {fa}, f({b}) = {fb} (same sign)")]
    NotBracketed { a: f64, b: f64, fa: f64, fb: f64 },
}

/// Brent's method for bracketed root finding
///
/// Combines bisection, the secant method and inverse quadratic
/// interpolation. Reference: Brent, R.P. (1973). "Algorithms for
/// Minimization without Derivatives". Prentice-Hall.
#[derive(Debug, Clone)]
pub struct BrentSolver {
    pub tol: f64,
    pub max_iter: usize,
}

impl Default for BrentSolver {
    fn default() -> Self {
        Self {
            tol: 1e-13,
            max_iter: 100,
        }
    }
}

impl BrentSolver {
    pub fn new(tol: f64, max_iter: usize) -> Self {
        Self { tol, max_iter }
    }

    /// Find a root of `f` in `[a, b]`; `fa`/`fb` may be passed when already known.
    ///
    /// If `max_iter` runs out first, the best estimate so far is returned.
    pub fn find_root<F>(
        &self,
        mut f: F,
        mut a: f64,
        mut b: f64,
        fa: Option<f64>,
        fb: Option<f64>,
    ) -> Result<f64, BrentError>
    where
        F: FnMut(f64) -> f64,
    {
        let mut fa = fa.unwrap_or_else(|| f(a));
        let mut fb = fb.unwrap_or_else(|| f(b));

        if fa * fb > 0.0 {
            return Err(BrentError::NotBracketed { a, b, fa, fb });
        }

        if fa.abs() < fb.abs() {
            std::mem::swap(&mut a, &mut b);
            std::mem::swap(&mut fa, &mut fb);
        }

        let mut c = a;
        let mut fc = fa;
        let mut mflag = true;
        let mut d = b - a;

        for _ in 0..self.max_iter {
            if fa.abs() < fb.abs() {
                std::mem::swap(&mut a, &mut b);
                std::mem::swap(&mut fa, &mut fb);
            }

            if fb == 0.0 || (b - a).abs() <= self.tol {
                return Ok(b);
            }

            let s = if fa != fc && fb != fc && fa != fb {
                // inverse quadratic interpolation
                a * fb * fc / ((fa - fb) * (fa - fc))
                    + b * fa * fc / ((fb - fa) * (fb - fc))
                    + c * fa * fb / ((fc - fa) * (fc - fb))
            } else if fb != fa {
                b - fb * (b - a) / (fb - fa)
            } else {
                (a + b) / 2.0
            };

            let use_bisection = (s - (3.0 * a + b) / 4.0) * (s - b) > 0.0
                || (mflag && (s - b).abs() >= (b - c).abs() / 2.0)
                || (!mflag && (s - b).abs() >= (c - d).abs() / 2.0)
                || (mflag && (b - c).abs() < self.tol)
                || (!mflag && (c - d).abs() < self.tol);

            let s = if use_bisection {
                mflag = true;
                (a + b) / 2.0
            } else {
                mflag = false;
                s
            };

            let fs = f(s);
            d = c;
            c = b;
            fc = fb;

            if fa * fs < 0.0 {
                b = s;
                fb = fs;
            } else {
                a = s;
                fa = fs;
            }
        }

        debug!(
            "Brent stopped after {} iterations at {} (f = {})",
            self.max_iter, b, fb
        );
        Ok(b)
    }
}

/// True when going from `g_old` to `g_new` is a crossing in `direction`.
///
/// A step that lands exactly on zero counts; one that starts on zero does not,
/// so a crossing is never reported twice.
pub fn sign_change_detected(g_old: f64, g_new: f64, direction: EventDirection) -> bool {
    if g_old * g_new > 0.0 {
        return false;
    }
    if g_new == 0.0 {
        return match direction {
            EventDirection::Rising => g_old < 0.0,
            EventDirection::Falling => g_old > 0.0,
            EventDirection::Any => g_old != 0.0,
        };
    }
    if g_old == 0.0 {
        return false;
    }

    match direction {
        EventDirection::Rising => g_old < 0.0 && g_new > 0.0,
        EventDirection::Falling => g_old > 0.0 && g_new < 0.0,
        EventDirection::Any => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector2;

    #[test]
    fn test_brent_simple_root() {
        let solver = BrentSolver::default();
        let root = solver.find_root(|x| x * x - 2.0, 0.0, 2.0, None, None).unwrap();
        assert!((root - 2.0_f64.sqrt()).abs() < 1e-12, "root = {}", root);
        assert!((root * root - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_brent_trigonometric() {
        let solver = BrentSolver::default();
        let root = solver.find_root(|x| x.sin(), 3.0, 4.0, None, None).unwrap();
        assert!((root - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn test_brent_not_bracketed() {
        let solver = BrentSolver::default();
        let result = solver.find_root(|x| x * x + 1.0, -1.0, 1.0, None, None);
        assert!(matches!(result, Err(BrentError::NotBracketed { .. })));
    }

    #[test]
    fn test_brent_root_at_endpoint() {
        let solver = BrentSolver::default();
        let root = solver.find_root(|x| x + 1.0, -1.0, 1.0, None, None).unwrap();
        assert!((root + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_brent_exhausted_returns_best_estimate() {
        let solver = BrentSolver::new(1e-15, 2);
        let root = solver.find_root(|x| x.powi(3) - 0.3, 0.0, 1.0, None, None).unwrap();
        assert!((0.0..=1.0).contains(&root));

        let converged = BrentSolver::default()
            .find_root(|x| x.powi(3) - 0.3, 0.0, 1.0, None, None)
            .unwrap();
        assert!((converged - 0.3_f64.cbrt()).abs() < 1e-12);
        assert!((root - converged).abs() > 1e-12);
    }

    #[test]
    fn test_sign_change_detection() {
        assert!(sign_change_detected(-1.0, 1.0, EventDirection::Rising));
        assert!(!sign_change_detected(1.0, -1.0, EventDirection::Rising));
        assert!(sign_change_detected(1.0, -1.0, EventDirection::Falling));
        assert!(!sign_change_detected(-1.0, 1.0, EventDirection::Falling));
        assert!(sign_change_detected(-1.0, 1.0, EventDirection::Any));
        assert!(sign_change_detected(1.0, -1.0, EventDirection::Any));

        assert!(!sign_change_detected(1.0, 2.0, EventDirection::Any));
        assert!(!sign_change_detected(-1.0, -2.0, EventDirection::Any));

        // landing on zero counts once, leaving zero does not
        assert!(sign_change_detected(-1.0, 0.0, EventDirection::Any));
        assert!(!sign_change_detected(0.0, 1.0, EventDirection::Any));
        assert!(!sign_change_detected(1.0, 0.0, EventDirection::Rising));
    }

    #[test]
    fn test_event_descriptor() {
        let event = Event::terminal(|_t: f64, y: &Vector2<f64>| y[0] - 3.0);
        assert!(event.terminal);
        assert_eq!(event.eval(0.0, &Vector2::new(5.0, 0.0)), 2.0);

        let event = Event::recording(|t: f64, _y: &Vector2<f64>| t - 1.0)
            .with_direction(EventDirection::Rising);
        assert!(!event.terminal);
        assert_eq!(event.direction, EventDirection::Rising);
    }
}
