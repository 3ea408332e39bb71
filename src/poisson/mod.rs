//! Penalized Poisson regression
//!
//! `Poisson` fits a generalized linear model with log link to count data, with an elastic net
//! penalty on the coefficients. Two optimizers are available, see [`Solver`]:
//!
//! * iteratively reweighted least squares, each working problem solved by soft-thresholding
//!   coordinate descent over the currently active features,
//! * L-BFGS on the smooth loss, in its orthant-wise form when an L1 weight is present.
//!
mod hyperparams;
mod irls;
mod lbfgs;

use ndarray::{Array1, ArrayBase, ArrayView1, ArrayView2, Data, Ix1, Ix2};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{Result, UoiError};
use crate::model::{FitState, GlmCoefficients};
use crate::traits::{Fit, PredictMean};
use crate::Float;

pub use hyperparams::{PoissonParams, PoissonValidParams, Solver};
pub use irls::{adjusted_response, soft_threshold, MU_FLOOR};
pub use lbfgs::poisson_loss_and_grad;

/// Poisson regression with an elastic net penalty
///
/// The estimator is created unfit from a verified parameter set and becomes fitted either by
/// [`fit`](Poisson::fit) or by installing coefficients with
/// [`set_coefficients`](Poisson::set_coefficients). Every accessor fails with
/// [`UoiError::NotFitted`] before that.
///
/// # Example
///
/// ```rust
/// use linfa_uoi::{ParamGuard, Poisson, UoiError};
/// use ndarray::array;
///
/// let x = array![[0.1, 0.4], [0.3, -0.2], [-0.5, 0.1], [0.2, 0.3], [0.0, 0.0]];
/// let y = array![1.0, 2.0, 0.0, 1.0, 1.0];
///
/// let mut model = Poisson::new(Poisson::params().alpha(0.1).check()?);
/// model.fit(&x, &y, None)?;
///
/// let means = model.predict_mean(&x)?;
/// assert_eq!(means.len(), 5);
/// # Ok::<(), UoiError>(())
/// ```
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct Poisson<F> {
    params: PoissonValidParams<F>,
    state: FitState<GlmCoefficients<F>>,
}

impl<F: Float> Poisson<F> {
    /// Create default hyper parameters for a penalized Poisson model
    pub fn params() -> PoissonParams<F> {
        PoissonParams::new()
    }

    /// Create an unfit estimator
    pub fn new(params: PoissonValidParams<F>) -> Poisson<F> {
        Poisson {
            params,
            state: FitState::Unfit,
        }
    }

    /// The hyper parameters of this estimator
    pub fn hyperparameters(&self) -> &PoissonValidParams<F> {
        &self.params
    }

    /// Fit the model to the feature matrix `x` of shape `(n_samples, n_features)` and the counts
    /// `y` of shape `(n_samples)`
    ///
    /// Optimization starts from `init` when given, from zero otherwise. The intercept always
    /// starts at zero. A failed fit leaves the previous state in place.
    pub fn fit<D1: Data<Elem = F>, D2: Data<Elem = F>>(
        &mut self,
        x: &ArrayBase<D1, Ix2>,
        y: &ArrayBase<D2, Ix1>,
        init: Option<ArrayView1<F>>,
    ) -> Result<&mut Self> {
        validate_data(x, y)?;
        let beta = match init {
            Some(init) => {
                if init.len() != x.ncols() {
                    return Err(UoiError::InvalidInitialParametersGuessSize);
                }
                if init.iter().any(|b| !b.is_finite()) {
                    return Err(UoiError::InvalidValues);
                }
                init.to_owned()
            }
            None => Array1::zeros(x.ncols()),
        };

        let coefficients = self.params.solve(x.view(), y.view(), beta, F::zero())?;
        self.state = FitState::Fitted(coefficients);
        Ok(self)
    }

    /// Install coefficients by hand, marking the estimator as fitted
    pub fn set_coefficients(&mut self, coef: Array1<F>, intercept: F) -> &mut Self {
        self.state = FitState::Fitted(GlmCoefficients::fixed(coef, intercept));
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_fitted()
    }

    /// The fitted coefficients together with the optimizer report
    pub fn coefficients(&self) -> Result<&GlmCoefficients<F>> {
        self.state.fitted()
    }

    pub fn coef(&self) -> Result<&Array1<F>> {
        Ok(self.state.fitted()?.coef())
    }

    pub fn intercept(&self) -> Result<F> {
        Ok(self.state.fitted()?.intercept())
    }

    /// Number of outer iterations used by the optimizer
    pub fn n_iterations(&self) -> Result<usize> {
        Ok(self.state.fitted()?.n_iterations())
    }

    /// Whether the optimizer met its stopping criterion
    pub fn converged(&self) -> Result<bool> {
        Ok(self.state.fitted()?.converged())
    }

    /// Predict counts as the mode `floor(exp(x β + intercept))` of the fitted distribution
    pub fn predict<D: Data<Elem = F>>(&self, x: &ArrayBase<D, Ix2>) -> Result<Array1<u64>> {
        self.state.fitted()?.mode(x)
    }

    /// Predict the conditional mean `exp(x β + intercept)`
    pub fn predict_mean<D: Data<Elem = F>>(&self, x: &ArrayBase<D, Ix2>) -> Result<Array1<F>> {
        self.state.fitted()?.mean(x)
    }
}

impl<F: Float> PredictMean<F> for Poisson<F> {
    fn predict_mean<D: Data<Elem = F>>(&self, x: &ArrayBase<D, Ix2>) -> Result<Array1<F>> {
        Poisson::predict_mean(self, x)
    }
}

impl<F: Float> PoissonValidParams<F> {
    /// Run the configured optimizer from `beta` and `intercept`
    pub(crate) fn solve(
        &self,
        x: ArrayView2<F>,
        y: ArrayView1<F>,
        beta: Array1<F>,
        intercept: F,
    ) -> Result<GlmCoefficients<F>> {
        match self.resolved_solver() {
            Solver::Lbfgs => self.lbfgs(x, y, beta, intercept),
            Solver::CoordinateDescent | Solver::Auto => Ok(self.irls(x, y, beta, intercept)),
        }
    }
}

impl<F: Float, D1: Data<Elem = F>, D2: Data<Elem = F>>
    Fit<ArrayBase<D1, Ix2>, ArrayBase<D2, Ix1>, UoiError> for PoissonValidParams<F>
{
    type Object = Poisson<F>;

    /// Fit a penalized Poisson model given a feature matrix `x` and counts `y`
    ///
    /// The feature matrix `x` must have shape `(n_samples, n_features)`
    ///
    /// The counts `y` must have shape `(n_samples)` and be non-negative
    fn fit(&self, x: &ArrayBase<D1, Ix2>, y: &ArrayBase<D2, Ix1>) -> Result<Poisson<F>> {
        let mut model = Poisson::new(self.clone());
        model.fit(x, y, None)?;
        Ok(model)
    }
}

/// Check that `x` and `y` describe the same, non-empty set of samples with finite values and
/// non-negative counts
pub(crate) fn validate_data<F: Float, D1: Data<Elem = F>, D2: Data<Elem = F>>(
    x: &ArrayBase<D1, Ix2>,
    y: &ArrayBase<D2, Ix1>,
) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(UoiError::MismatchedShapes(x.nrows(), y.len()));
    }
    if x.nrows() == 0 {
        return Err(UoiError::EmptyDataset);
    }
    if x.iter().any(|x| !x.is_finite()) || y.iter().any(|y| !y.is_finite()) {
        return Err(UoiError::InvalidValues);
    }
    if y.iter().any(|&y| y < F::zero()) {
        return Err(UoiError::NegativeTargets);
    }
    Ok(())
}
