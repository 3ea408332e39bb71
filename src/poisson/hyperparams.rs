#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{Result, UoiError};
use crate::{Float, ParamGuard};

/// Optimizer used to minimize the penalized Poisson objective
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Solver {
    /// L-BFGS for an unpenalized model, coordinate descent otherwise
    Auto,
    /// Iteratively reweighted least squares with a soft-thresholding coordinate descent inner loop
    CoordinateDescent,
    /// Quasi-Newton minimization of the smooth loss, orthant-wise when an L1 weight is present
    Lbfgs,
}

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
/// A verified hyper-parameter set ready for the estimation of a penalized Poisson model
///
/// See [`PoissonParams`](crate::PoissonParams) for more information.
pub struct PoissonValidParams<F> {
    pub(crate) alpha: F,
    pub(crate) l1_ratio: F,
    pub(crate) with_intercept: bool,
    pub(crate) max_iterations: usize,
    pub(crate) tolerance: F,
    pub(crate) solver: Solver,
}

impl<F: Float> PoissonValidParams<F> {
    pub fn alpha(&self) -> F {
        self.alpha
    }

    pub fn l1_ratio(&self) -> F {
        self.l1_ratio
    }

    pub fn with_intercept(&self) -> bool {
        self.with_intercept
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn tolerance(&self) -> F {
        self.tolerance
    }

    pub fn solver(&self) -> Solver {
        self.solver
    }

    /// Weight of the L1 term, `alpha * l1_ratio`
    pub fn l1_penalty(&self) -> F {
        self.alpha * self.l1_ratio
    }

    /// Weight of the L2 term, `alpha * (1 - l1_ratio)`
    pub fn l2_penalty(&self) -> F {
        self.alpha * (F::one() - self.l1_ratio)
    }

    /// The optimizer `fit` dispatches to, with `Auto` resolved
    pub fn resolved_solver(&self) -> Solver {
        match self.solver {
            Solver::Auto if self.alpha == F::zero() => Solver::Lbfgs,
            Solver::Auto => Solver::CoordinateDescent,
            solver => solver,
        }
    }
}

/// A hyper-parameter set for penalized Poisson regression
///
/// Configures and minimizes the following objective function:
/// ```ignore
/// sum(exp(Xw + b) - y * (Xw + b))
///     + alpha * l1_ratio * ||w||_1
///     + 0.5 * alpha * (1 - l1_ratio) * ||w||^2_2
/// ```
///
/// The parameter set can be verified into a
/// [`PoissonValidParams`](crate::PoissonValidParams) by calling
/// [ParamGuard::check](Self::check). It is also possible to directly fit a model with
/// [Fit::fit](crate::traits::Fit::fit) which implicitely verifies the parameter set prior to the
/// model estimation and forwards any error.
///
/// # Parameters
/// | Name | Default | Purpose | Range |
/// | :--- | :--- | :---| :--- |
/// | [alpha](Self::alpha) | `1.0` | Overall parameter penalty | `[0, inf)` |
/// | [l1_ratio](Self::l1_ratio) | `0.5` | Distribution of penalty to L1 and L2 regularizations | `[0.0, 1.0]` |
/// | [with_intercept](Self::with_intercept) | `true` | Enable intercept | `false`, `true` |
/// | [tolerance](Self::tolerance) | `1e-5` | Absolute change of any of the parameters | `(0, inf)` |
/// | [max_iterations](Self::max_iterations) | `1000` | Maximum number of outer iterations | `[1, inf)` |
/// | [solver](Self::solver) | `Auto` | Optimizer | [`Solver`] |
///
/// # Errors
///
/// Returns [`InvalidPenalty`](UoiError::InvalidPenalty) if the penalty is negative or not finite.
///
/// Returns [`InvalidL1Ratio`](UoiError::InvalidL1Ratio) if the L1 ratio is not in unit range.
///
/// Returns [`InvalidTolerance`](UoiError::InvalidTolerance) if the tolerance is not positive.
///
/// Returns [`InvalidMaxIterations`](UoiError::InvalidMaxIterations) for zero iterations.
///
/// # Example
///
/// ```rust
/// use linfa_uoi::{Fit, ParamGuard, PoissonParams, UoiError};
/// use ndarray::array;
///
/// let x = array![[0.1, 0.4], [0.3, -0.2], [-0.5, 0.1], [0.2, 0.3]];
/// let y = array![1.0, 2.0, 0.0, 1.0];
///
/// // create a new parameter set with penalty equals `0.1`
/// let unchecked_params = PoissonParams::new().alpha(0.1);
///
/// // fit model with unchecked parameter set
/// let model = unchecked_params.fit(&x, &y)?;
///
/// // transform into a verified parameter set
/// let checked_params = unchecked_params.check()?;
///
/// // Regenerate model with the verified parameters, this only returns
/// // errors originating from the fitting process
/// let model = checked_params.fit(&x, &y)?;
/// let counts = model.predict(&x)?;
/// # Ok::<(), UoiError>(())
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct PoissonParams<F>(PoissonValidParams<F>);

impl<F: Float> Default for PoissonParams<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> PoissonParams<F> {
    /// Create default penalized Poisson hyper parameters
    pub fn new() -> PoissonParams<F> {
        Self(PoissonValidParams {
            alpha: F::one(),
            l1_ratio: F::cast(0.5),
            with_intercept: true,
            max_iterations: 1000,
            tolerance: F::cast(1e-5),
            solver: Solver::Auto,
        })
    }

    /// Set the overall penalty weight. Use `l1_ratio` to configure how the penalty is
    /// distributed to L1 and L2 regularization.
    pub fn alpha(mut self, alpha: F) -> Self {
        self.0.alpha = alpha;
        self
    }

    /// Set l1_ratio parameter of the elastic net. Setting `l1_ratio` to 1.0 is equivalent to a
    /// "Lasso" penalization, setting it to 0.0 is equivalent to "Ridge" penalization.
    ///
    /// Defaults to `0.5` if not set
    pub fn l1_ratio(mut self, l1_ratio: F) -> Self {
        self.0.l1_ratio = l1_ratio;
        self
    }

    /// Configure the model to fit an intercept.
    /// Defaults to `true` if not set.
    pub fn with_intercept(mut self, with_intercept: bool) -> Self {
        self.0.with_intercept = with_intercept;
        self
    }

    /// Set the tolerance which is the minimum absolute change in any of the
    /// model parameters needed for the parameter optimization to continue.
    ///
    /// Defaults to `1e-5` if not set
    pub fn tolerance(mut self, tolerance: F) -> Self {
        self.0.tolerance = tolerance;
        self
    }

    /// Set the maximum number of outer iterations for the optimization routine.
    ///
    /// Defaults to `1000` if not set
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.0.max_iterations = max_iterations;
        self
    }

    /// Select the optimizer.
    ///
    /// Defaults to [`Solver::Auto`] if not set
    pub fn solver(mut self, solver: Solver) -> Self {
        self.0.solver = solver;
        self
    }
}

impl<F: Float> ParamGuard for PoissonParams<F> {
    type Checked = PoissonValidParams<F>;
    type Error = UoiError;

    /// Validate the hyper parameters
    fn check_ref(&self) -> Result<&Self::Checked> {
        if self.0.alpha < F::zero() || !self.0.alpha.is_finite() {
            Err(UoiError::InvalidPenalty(
                self.0.alpha.to_f32().unwrap_or(f32::NAN),
            ))
        } else if !(F::zero()..=F::one()).contains(&self.0.l1_ratio) {
            Err(UoiError::InvalidL1Ratio(
                self.0.l1_ratio.to_f32().unwrap_or(f32::NAN),
            ))
        } else if !self.0.tolerance.is_finite() || self.0.tolerance <= F::zero() {
            Err(UoiError::InvalidTolerance(
                self.0.tolerance.to_f32().unwrap_or(f32::NAN),
            ))
        } else if self.0.max_iterations == 0 {
            Err(UoiError::InvalidMaxIterations)
        } else {
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let params = PoissonParams::<f64>::new().check().unwrap();
        assert_eq!(params.alpha(), 1.0);
        assert_eq!(params.l1_ratio(), 0.5);
        assert!(params.with_intercept());
        assert_eq!(params.resolved_solver(), Solver::CoordinateDescent);
        assert_eq!(params.l1_penalty(), 0.5);
        assert_eq!(params.l2_penalty(), 0.5);
    }

    #[test]
    fn unpenalized_model_uses_lbfgs() {
        let params = PoissonParams::<f64>::new().alpha(0.).check().unwrap();
        assert_eq!(params.resolved_solver(), Solver::Lbfgs);

        let params = PoissonParams::<f64>::new()
            .alpha(0.)
            .solver(Solver::CoordinateDescent)
            .check()
            .unwrap();
        assert_eq!(params.resolved_solver(), Solver::CoordinateDescent);
    }

    #[test]
    fn invalid_params_are_rejected() {
        let res = PoissonParams::<f64>::new().alpha(-1.).check();
        assert!(matches!(res, Err(UoiError::InvalidPenalty(_))));

        let res = PoissonParams::<f64>::new().l1_ratio(1.2).check();
        assert!(matches!(res, Err(UoiError::InvalidL1Ratio(_))));

        let res = PoissonParams::<f64>::new().tolerance(0.).check();
        assert!(matches!(res, Err(UoiError::InvalidTolerance(_))));

        let res = PoissonParams::<f64>::new().max_iterations(0).check();
        assert!(matches!(res, Err(UoiError::InvalidMaxIterations)));
    }
}
