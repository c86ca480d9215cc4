//! Non-linear least squares on top of the `levenberg-marquardt` crate.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::debug;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

/// A least-squares problem over a dense parameter vector.
pub trait NllsProblem {
    fn num_params(&self) -> usize;

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Jacobian of [`Self::residuals`]; rows match residuals, columns parameters.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64>;
}

/// Termination controls for [`solve`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Evaluation budget, as `max_iterations * (free parameters + 1)`.
    pub max_iterations: usize,
    /// Relative cost reduction below which the solve ends.
    pub ftol: f64,
    /// Relative step length below which the solve ends.
    pub xtol: f64,
    /// Orthogonality of residuals and Jacobian columns below which the solve ends.
    pub gtol: f64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    /// Residual evaluations spent by the solver.
    pub iterations: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub converged: bool,
}

const INVALID_RESIDUAL: f64 = 1e8;

fn cost(r: &DVector<f64>) -> f64 {
    0.5 * r.norm_squared()
}

/// Exposes the free sub-vector of `x` to the solver.
struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    x: DVector<f64>,
    free: Vec<usize>,
}

impl<P: NllsProblem> LeastSquaresProblem<f64, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, p: &DVector<f64>) {
        for (k, &i) in self.free.iter().enumerate() {
            self.x[i] = p[k];
        }
    }

    fn params(&self) -> DVector<f64> {
        self.x.select_rows(self.free.iter())
    }

    /// Non-finite residuals become [`INVALID_RESIDUAL`] so the step is rejected.
    fn residuals(&self) -> Option<DVector<f64>> {
        let r = self.problem.residuals(&self.x);
        Some(r.map(|v| if v.is_finite() { v } else { INVALID_RESIDUAL }))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let j = self.problem.jacobian(&self.x).select_columns(self.free.iter());
        j.iter().all(|v| v.is_finite()).then_some(j)
    }
}

/// Minimize `½‖r(x)‖²` starting at `x0`, updating only parameters not marked in `fixed`.
///
/// `fixed` may be shorter than the parameter vector; missing entries are free.
pub fn solve<P: NllsProblem>(
    problem: &P,
    x0: DVector<f64>,
    fixed: &[bool],
    opts: &SolveOptions,
) -> (DVector<f64>, SolveReport) {
    let free: Vec<usize> = (0..problem.num_params())
        .filter(|&i| !fixed.get(i).copied().unwrap_or(false))
        .collect();
    let initial_cost = cost(&problem.residuals(&x0));

    if free.is_empty() {
        return (
            x0,
            SolveReport {
                iterations: 0,
                initial_cost,
                final_cost: initial_cost,
                converged: true,
            },
        );
    }

    let lm = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.xtol)
        .with_gtol(opts.gtol)
        .with_patience(opts.max_iterations.max(1));
    let wrapper = LmWrapper {
        problem,
        x: x0,
        free,
    };
    let (wrapper, report) = lm.minimize(wrapper);
    debug!(
        "lm finished after {} evaluations: {:?}, cost {:.6e} -> {:.6e}",
        report.number_of_evaluations, report.termination, initial_cost, report.objective_function
    );

    let final_cost = cost(&problem.residuals(&wrapper.x));
    (
        wrapper.x,
        SolveReport {
            iterations: report.number_of_evaluations,
            initial_cost,
            final_cost,
            converged: report.termination.was_successful(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Offset;

    impl NllsProblem for Offset {
        fn num_params(&self) -> usize {
            1
        }

        fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_element(1, x[0] - 3.0)
        }

        fn jacobian(&self, _x: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_element(1, 1, 1.0)
        }
    }

    /// Fit `y = a exp(b t)`.
    struct ExpFit {
        t: Vec<f64>,
        y: Vec<f64>,
    }

    impl NllsProblem for ExpFit {
        fn num_params(&self) -> usize {
            2
        }

        fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_iterator(
                self.t.len(),
                self.t.iter().zip(&self.y).map(|(t, y)| x[0] * (x[1] * t).exp() - y),
            )
        }

        fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
            let mut j = DMatrix::zeros(self.t.len(), 2);
            for (row, t) in self.t.iter().enumerate() {
                let e = (x[1] * t).exp();
                j[(row, 0)] = e;
                j[(row, 1)] = x[0] * t * e;
            }
            j
        }
    }

    fn exp_fit() -> ExpFit {
        let t: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        let y = t.iter().map(|t| 2.5 * (-1.3 * t).exp()).collect();
        ExpFit { t, y }
    }

    #[test]
    fn solves_trivial_problem() {
        let (x, report) = solve(
            &Offset,
            DVector::from_element(1, 10.0),
            &[],
            &SolveOptions::default(),
        );
        assert!((x[0] - 3.0).abs() < 1e-9, "{x}");
        assert!(report.converged, "{report:?}");
        assert!(report.iterations > 0);
        assert!(report.final_cost < 1e-18);
    }

    #[test]
    fn fits_exponential() {
        let problem = exp_fit();
        let (x, report) = solve(
            &problem,
            DVector::from_vec(vec![1.0, 0.0]),
            &[],
            &SolveOptions::default(),
        );
        assert!((x[0] - 2.5).abs() < 1e-6, "{x}");
        assert!((x[1] + 1.3).abs() < 1e-6, "{x}");
        assert!(report.final_cost < 1e-12);
        assert!(report.final_cost < report.initial_cost);
    }

    #[test]
    fn fixed_parameters_are_not_touched() {
        let problem = exp_fit();
        let (x, report) = solve(
            &problem,
            DVector::from_vec(vec![2.0, 0.0]),
            &[true],
            &SolveOptions::default(),
        );
        assert_eq!(2.0, x[0]);
        assert!(x[1] < 0.0);
        assert!(report.final_cost < report.initial_cost);
    }

    #[test]
    fn fully_fixed_problem_returns_start() {
        let problem = exp_fit();
        let x0 = DVector::from_vec(vec![2.0, -1.0]);
        let (x, report) = solve(&problem, x0.clone(), &[true, true], &SolveOptions::default());
        assert_eq!(x0, x);
        assert_eq!(0, report.iterations);
        assert_eq!(report.initial_cost, report.final_cost);
    }
}
