//! Fitted state shared by the estimators
//!
use ndarray::{Array1, ArrayBase, Data, Ix2};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{Result, UoiError};
use crate::Float;

/// Explicit fitted-state tag of an estimator
///
/// Every accessor of an estimator goes through [`FitState::fitted`], so an estimator which has
/// not been fitted fails with [`UoiError::NotFitted`] instead of handing out placeholder
/// coefficients.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub enum FitState<M> {
    Unfit,
    Fitted(M),
}

impl<M> Default for FitState<M> {
    fn default() -> Self {
        FitState::Unfit
    }
}

impl<M> FitState<M> {
    pub fn is_fitted(&self) -> bool {
        matches!(self, FitState::Fitted(_))
    }

    pub fn fitted(&self) -> Result<&M> {
        match self {
            FitState::Fitted(model) => Ok(model),
            FitState::Unfit => Err(UoiError::NotFitted),
        }
    }
}

/// Coefficients of a log-link generalized linear model
///
/// Besides the hyperplane and intercept this records how the optimizer terminated: the number
/// of outer iterations it used and whether its stopping criterion was met before running out of
/// iterations.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct GlmCoefficients<F> {
    pub(crate) coef: Array1<F>,
    pub(crate) intercept: F,
    pub(crate) n_iterations: usize,
    pub(crate) converged: bool,
}

impl<F: Float> GlmCoefficients<F> {
    pub(crate) fn new(coef: Array1<F>, intercept: F, n_iterations: usize, converged: bool) -> Self {
        GlmCoefficients {
            coef,
            intercept,
            n_iterations,
            converged,
        }
    }

    /// Coefficients which were not produced by an optimizer
    pub(crate) fn fixed(coef: Array1<F>, intercept: F) -> Self {
        GlmCoefficients::new(coef, intercept, 0, true)
    }

    pub fn coef(&self) -> &Array1<F> {
        &self.coef
    }

    pub fn intercept(&self) -> F {
        self.intercept
    }

    pub fn n_iterations(&self) -> usize {
        self.n_iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    /// `exp(x β + intercept)`
    pub fn mean<D: Data<Elem = F>>(&self, x: &ArrayBase<D, Ix2>) -> Result<Array1<F>> {
        if x.ncols() != self.coef.len() {
            return Err(UoiError::MismatchedFeatures(x.ncols(), self.coef.len()));
        }
        Ok((x.dot(&self.coef) + self.intercept).mapv_into(|eta| eta.exp()))
    }

    /// The mode of the Poisson distribution, `floor(mean)`, saturating at `u64::MAX`
    pub fn mode<D: Data<Elem = F>>(&self, x: &ArrayBase<D, Ix2>) -> Result<Array1<u64>> {
        Ok(self
            .mean(x)?
            .mapv(|mu| mu.floor().to_u64().unwrap_or(u64::MAX)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn unfit_state_refuses_access() {
        let state: FitState<GlmCoefficients<f64>> = FitState::default();
        assert!(!state.is_fitted());
        assert!(matches!(state.fitted(), Err(UoiError::NotFitted)));
    }

    #[test]
    fn mean_and_mode_follow_log_link() {
        let coefs = GlmCoefficients::fixed(array![1.0, 0.0], 0.5);
        let x = array![[0.0, 3.0], [1.0, -2.0]];

        let mean = coefs.mean(&x).unwrap();
        assert_abs_diff_eq!(mean, array![0.5f64.exp(), 1.5f64.exp()], epsilon = 1e-12);
        assert_eq!(coefs.mode(&x).unwrap(), array![1, 4]);
    }

    #[test]
    fn feature_mismatch_is_rejected() {
        let coefs = GlmCoefficients::fixed(array![1.0, 0.0], 0.0);
        let x = array![[0.0, 3.0, 1.0]];
        assert!(matches!(
            coefs.mean(&x),
            Err(UoiError::MismatchedFeatures(3, 2))
        ));
    }
}
