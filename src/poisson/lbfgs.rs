//! Quasi-Newton minimization of the Poisson loss
//!
use argmin::core::{CostFunction, Executor, Gradient, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Zip};

use super::PoissonValidParams;
use crate::error::{Result, UoiError};
use crate::model::GlmCoefficients;
use crate::Float;

/// Number of past updates kept by L-BFGS
const HISTORY_SIZE: usize = 10;

/// Mean Poisson loss and its gradient
///
/// The loss is `mean(exp(x beta) - y * x beta) + 0.5 * l2_weight * ||beta||^2`, the gradient
/// `x^T (exp(x beta) - y) / n + l2_weight * beta`. If `beta` holds one entry more than `x` has
/// columns, the last entry is an unpenalized intercept.
///
/// # Errors
///
/// Returns [`InvalidInitialParametersGuessSize`](UoiError::InvalidInitialParametersGuessSize)
/// if `beta` has neither `n_features` nor `n_features + 1` entries.
pub fn poisson_loss_and_grad<F: Float>(
    beta: ArrayView1<F>,
    x: ArrayView2<F>,
    y: ArrayView1<F>,
    l2_weight: F,
) -> Result<(F, Array1<F>)> {
    let n_features = x.ncols();
    if beta.len() != n_features && beta.len() != n_features + 1 {
        return Err(UoiError::InvalidInitialParametersGuessSize);
    }
    let n_samples = F::cast(x.nrows());

    let with_intercept = beta.len() == n_features + 1;
    let coef = beta.slice(s![..n_features]);
    let intercept = if with_intercept {
        beta[n_features]
    } else {
        F::zero()
    };

    let eta = x.dot(&coef) + intercept;
    let mu = eta.mapv(|eta| eta.exp());

    let nll = Zip::from(&mu)
        .and(&eta)
        .and(&y)
        .fold(F::zero(), |acc, &mu, &eta, &y| acc + mu - y * eta);
    let loss = nll / n_samples + F::cast(0.5) * l2_weight * coef.dot(&coef);

    let residual = &mu - &y;
    let mut grad = Array1::zeros(beta.len());
    grad.slice_mut(s![..n_features])
        .assign(&(x.t().dot(&residual) / n_samples + &coef * l2_weight));
    if with_intercept {
        grad[n_features] = residual.sum() / n_samples;
    }

    Ok((loss, grad))
}

/// Intercept minimizing the Poisson loss for the linear predictor `x beta`
///
/// `ln(mean(y)) - ln(mean(exp(x beta)))`, the second term evaluated with the largest entry
/// factored out.
fn profiled_intercept(linear: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
    let max = linear.fold(f64::NEG_INFINITY, |max, &v| max.max(v));
    let mean_exp = linear.mapv(|v| (v - max).exp()).sum() / linear.len() as f64;

    (y.sum() / y.len() as f64).ln() - (max + mean_exp.ln())
}

/// Mean Poisson loss over `beta` alone, with the intercept at its optimum
///
/// The gradient with respect to `beta` has the same form as without intercept, evaluated at the
/// optimal intercept. Returns the loss, the gradient and that intercept.
fn profiled_loss_and_grad(
    beta: ArrayView1<f64>,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    l2_weight: f64,
) -> (f64, Array1<f64>, f64) {
    let n_samples = x.nrows() as f64;
    let linear = x.dot(&beta);
    let intercept = profiled_intercept(linear.view(), y);

    let eta = linear + intercept;
    let mu = eta.mapv(f64::exp);
    let nll = Zip::from(&mu)
        .and(&eta)
        .and(&y)
        .fold(0.0, |acc, &mu, &eta, &y| acc + mu - y * eta);
    let loss = nll / n_samples + 0.5 * l2_weight * beta.dot(&beta);
    let grad = x.t().dot(&(&mu - &y)) / n_samples + &beta * l2_weight;

    (loss, grad, intercept)
}

/// Smooth part of the mean-scaled objective, in double precision
///
/// With `profile_intercept` the parameters are the coefficients only and the intercept is
/// eliminated in closed form, so an L1 term applied by the optimizer never reaches it.
struct PoissonProblem {
    x: Array2<f64>,
    y: Array1<f64>,
    l2_weight: f64,
    profile_intercept: bool,
}

impl PoissonProblem {
    fn loss_and_grad(&self, p: &Array1<f64>) -> Result<(f64, Array1<f64>)> {
        if self.profile_intercept {
            let (loss, grad, _) =
                profiled_loss_and_grad(p.view(), self.x.view(), self.y.view(), self.l2_weight);
            Ok((loss, grad))
        } else {
            poisson_loss_and_grad(p.view(), self.x.view(), self.y.view(), self.l2_weight)
        }
    }
}

impl CostFunction for PoissonProblem {
    type Param = Array1<f64>;
    type Output = f64;

    fn cost(&self, p: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        Ok(self.loss_and_grad(p)?.0)
    }
}

impl Gradient for PoissonProblem {
    type Param = Array1<f64>;
    type Gradient = Array1<f64>;

    fn gradient(&self, p: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        Ok(self.loss_and_grad(p)?.1)
    }
}

fn to_f64<F: Float>(v: F) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}

impl<F: Float> PoissonValidParams<F> {
    /// Minimize the penalized objective with L-BFGS, orthant-wise when the L1 weight is positive
    ///
    /// The objective is divided by the number of samples, which leaves the minimizer unchanged.
    /// With an L1 weight and an intercept the intercept is profiled out of the problem, so only
    /// the coefficients are penalized. All-zero counts have no finite profiled intercept and are
    /// handed to IRLS instead.
    pub(crate) fn lbfgs(
        &self,
        x: ArrayView2<F>,
        y: ArrayView1<F>,
        beta: Array1<F>,
        intercept: F,
    ) -> Result<GlmCoefficients<F>> {
        let n_features = x.ncols();
        let n_samples = x.nrows() as f64;
        let l1_weight = to_f64(self.l1_penalty()) / n_samples;
        let profile_intercept = self.with_intercept && l1_weight > 0.0;

        if profile_intercept && y.iter().all(|y| *y == F::zero()) {
            log::debug!("all counts are zero, fitting by IRLS");
            return Ok(self.irls(x, y, beta, intercept));
        }

        let mut init = beta.mapv(to_f64).to_vec();
        if self.with_intercept && !profile_intercept {
            init.push(to_f64(intercept));
        }

        let problem = PoissonProblem {
            x: x.mapv(to_f64),
            y: y.mapv(to_f64),
            l2_weight: to_f64(self.l2_penalty()) / n_samples,
            profile_intercept,
        };

        let linesearch = MoreThuenteLineSearch::new();
        let mut solver =
            LBFGS::new(linesearch, HISTORY_SIZE).with_tolerance_grad(to_f64(self.tolerance))?;
        if l1_weight > 0.0 {
            solver = solver.with_l1_regularization(l1_weight)?;
        }

        let max_iters = self.max_iterations as u64;
        let mut result = Executor::new(problem, solver)
            .configure(|state| state.param(Array1::from(init)).max_iters(max_iters))
            .run()?;

        let n_iterations = result.state.get_iter();
        let converged = n_iterations < max_iters;
        if !converged {
            log::warn!(
                "L-BFGS did not converge within {} iterations, returning the best iterate",
                self.max_iterations
            );
        }
        log::debug!(
            "L-BFGS finished after {} iterations with cost {}",
            n_iterations,
            result.state.get_best_cost()
        );

        let params = result.state.take_best_param().unwrap_or_default();
        if params.len() < n_features {
            return Err(UoiError::InvalidValues);
        }
        let coef = params.slice(s![..n_features]);
        let intercept = if profile_intercept {
            profiled_intercept(x.mapv(to_f64).dot(&coef).view(), y.mapv(to_f64).view())
        } else if self.with_intercept {
            params[n_features]
        } else {
            0.0
        };

        Ok(GlmCoefficients::new(
            coef.mapv(F::cast),
            F::cast(intercept),
            n_iterations as usize,
            converged,
        ))
    }
}
