//! Limited-memory BFGS engine over box bounds.
//!
//! A standalone minimizer driving a `(value, gradient)` callback: two-loop
//! recursion over a bounded secant history, Armijo backtracking along the
//! projected step, and a projected-gradient stopping test. The policy that
//! decides when a *dual* run is finished lives in the caller's callback;
//! this engine only knows first-order stationarity. In particular a callback
//! that returns a zero gradient makes the next stationarity test succeed,
//! which is how the caller cancels the run from inside.

use std::collections::VecDeque;

use super::dot;

/// Engine parameters.
#[derive(Debug, Clone)]
pub struct EngineParams {
    /// Maximum number of accepted steps.
    pub max_iter: usize,

    /// Secant history size.
    pub memory: usize,

    /// Projected-gradient 2-norm below which the point is stationary.
    pub pg_tolerance: f64,

    /// Armijo sufficient-decrease constant.
    pub armijo_c: f64,

    /// Backtracking halvings per line search.
    pub max_backtracks: usize,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            max_iter: 100,
            memory: 50,
            pg_tolerance: 1e-12,
            armijo_c: 1e-4,
            max_backtracks: 30,
        }
    }
}

/// Final engine state.
#[derive(Debug, Clone)]
pub struct EngineRun {
    pub x: Vec<f64>,
    pub value: f64,
    /// Accepted steps taken.
    pub iterations: usize,
    /// Total callback invocations, line-search probes included.
    pub evaluations: usize,
}

impl EngineParams {
    /// Minimize `eval` over the box `[lower, upper]` starting from `x0`.
    ///
    /// `eval` is called once to bootstrap value and gradient before the
    /// first step, then once per line-search probe.
    pub fn minimize<F>(&self, x0: Vec<f64>, lower: &[f64], upper: &[f64], mut eval: F) -> EngineRun
    where
        F: FnMut(&[f64]) -> (f64, Vec<f64>),
    {
        let n = x0.len();
        debug_assert_eq!(lower.len(), n);
        debug_assert_eq!(upper.len(), n);

        let mut x = clamp(&x0, lower, upper);
        let (mut value, mut grad) = eval(&x);
        let mut evaluations = 1usize;
        let mut iterations = 0usize;

        let mut s_hist: VecDeque<Vec<f64>> = VecDeque::with_capacity(self.memory);
        let mut y_hist: VecDeque<Vec<f64>> = VecDeque::with_capacity(self.memory);
        let mut rho_hist: VecDeque<f64> = VecDeque::with_capacity(self.memory);

        for _ in 0..self.max_iter {
            if !value.is_finite() || grad.iter().any(|g| !g.is_finite()) {
                break;
            }
            if projected_gradient_norm(&x, &grad, lower, upper) <= self.pg_tolerance {
                break;
            }

            let mut dir = two_loop_direction(&grad, &s_hist, &y_hist, &rho_hist);
            if dot(&grad, &dir) >= 0.0 {
                // History produced an ascent direction; fall back to
                // steepest descent.
                dir = grad.iter().map(|&g| -g).collect();
            }

            // Armijo backtracking along the projected path. Each probe is a
            // real callback invocation at a point the engine may abandon.
            let mut accepted: Option<(Vec<f64>, f64, Vec<f64>)> = None;
            let mut t = 1.0;
            for _ in 0..=self.max_backtracks {
                let cand: Vec<f64> = x.iter().zip(dir.iter()).map(|(&xi, &di)| xi + t * di).collect();
                let cand = clamp(&cand, lower, upper);
                let step: Vec<f64> = cand.iter().zip(x.iter()).map(|(&c, &xi)| c - xi).collect();
                if step.iter().all(|&si| si == 0.0) {
                    break;
                }
                let (fc, gc) = eval(&cand);
                evaluations += 1;
                let decrease = dot(&grad, &step);
                if fc <= value + self.armijo_c * decrease {
                    accepted = Some((cand, fc, gc));
                    break;
                }
                t *= 0.5;
            }

            let Some((x_new, f_new, g_new)) = accepted else {
                // Line search exhausted without sufficient decrease: the
                // engine has settled.
                break;
            };

            let s: Vec<f64> = x_new.iter().zip(x.iter()).map(|(&a, &b)| a - b).collect();
            let y: Vec<f64> = g_new.iter().zip(grad.iter()).map(|(&a, &b)| a - b).collect();
            let sy = dot(&s, &y);
            // Curvature guard: only pairs with y's > 0 keep the inverse
            // Hessian approximation positive definite.
            if sy > 1e-10 {
                if s_hist.len() == self.memory {
                    s_hist.pop_front();
                    y_hist.pop_front();
                    rho_hist.pop_front();
                }
                rho_hist.push_back(1.0 / sy);
                s_hist.push_back(s);
                y_hist.push_back(y);
            }

            x = x_new;
            value = f_new;
            grad = g_new;
            iterations += 1;
        }

        EngineRun {
            x,
            value,
            iterations,
            evaluations,
        }
    }
}

fn clamp(x: &[f64], lower: &[f64], upper: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(lower.iter().zip(upper.iter()))
        .map(|(&xi, (&lo, &hi))| xi.clamp(lo, hi))
        .collect()
}

/// Gradient with components pointing out of the box zeroed.
fn projected_gradient_norm(x: &[f64], grad: &[f64], lower: &[f64], upper: &[f64]) -> f64 {
    let mut norm_sq = 0.0;
    for i in 0..x.len() {
        let g = grad[i];
        let pg = if x[i] <= lower[i] && g > 0.0 {
            0.0
        } else if x[i] >= upper[i] && g < 0.0 {
            0.0
        } else {
            g
        };
        norm_sq += pg * pg;
    }
    norm_sq.sqrt()
}

/// Two-loop recursion: apply the implicit inverse Hessian to the gradient
/// and negate, yielding the quasi-Newton descent direction.
fn two_loop_direction(
    grad: &[f64],
    s_hist: &VecDeque<Vec<f64>>,
    y_hist: &VecDeque<Vec<f64>>,
    rho_hist: &VecDeque<f64>,
) -> Vec<f64> {
    let k = s_hist.len();
    if k == 0 {
        return grad.iter().map(|&g| -g).collect();
    }

    let mut q = grad.to_vec();
    let mut alpha = vec![0.0; k];

    for i in (0..k).rev() {
        let a = rho_hist[i] * dot(&s_hist[i], &q);
        alpha[i] = a;
        for (qj, yj) in q.iter_mut().zip(y_hist[i].iter()) {
            *qj -= a * yj;
        }
    }

    // Initial Hessian scaling from the most recent pair.
    let sy = 1.0 / rho_hist[k - 1];
    let yy = dot(&y_hist[k - 1], &y_hist[k - 1]);
    let gamma = if yy > 1e-30 { sy / yy } else { 1.0 };
    for qj in q.iter_mut() {
        *qj *= gamma;
    }

    for i in 0..k {
        let beta = rho_hist[i] * dot(&y_hist[i], &q);
        for (qj, sj) in q.iter_mut().zip(s_hist[i].iter()) {
            *qj += (alpha[i] - beta) * sj;
        }
    }

    for qj in q.iter_mut() {
        *qj = -*qj;
    }
    q
}
