#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use super::{Metric, StabilitySelection};
use crate::error::{Result, UoiError};
use crate::poisson::{PoissonValidParams, Solver};
use crate::{Float, ParamGuard};

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
/// A verified hyper-parameter set ready for Union of Intersections Poisson regression
///
/// See [`UoiPoissonParams`](crate::UoiPoissonParams) for more information.
pub struct UoiPoissonValidParams<F> {
    pub(crate) n_boots_sel: usize,
    pub(crate) n_boots_est: usize,
    pub(crate) selection_frac: F,
    pub(crate) estimation_frac: F,
    pub(crate) n_lambdas: usize,
    pub(crate) eps: F,
    pub(crate) stability_selection: StabilitySelection,
    pub(crate) estimation_score: Metric,
    pub(crate) l1_ratio: F,
    pub(crate) with_intercept: bool,
    pub(crate) max_iterations: usize,
    pub(crate) tolerance: F,
    pub(crate) seed: Option<u64>,
}

impl<F: Float> UoiPoissonValidParams<F> {
    pub fn n_boots_sel(&self) -> usize {
        self.n_boots_sel
    }

    pub fn n_boots_est(&self) -> usize {
        self.n_boots_est
    }

    pub fn selection_frac(&self) -> F {
        self.selection_frac
    }

    pub fn estimation_frac(&self) -> F {
        self.estimation_frac
    }

    pub fn n_lambdas(&self) -> usize {
        self.n_lambdas
    }

    pub fn eps(&self) -> F {
        self.eps
    }

    pub fn stability_selection(&self) -> &StabilitySelection {
        &self.stability_selection
    }

    pub fn estimation_score(&self) -> Metric {
        self.estimation_score
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

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Coordinate descent solver for one point of the regularization path
    pub(crate) fn selection_solver(&self, alpha: F) -> PoissonValidParams<F> {
        PoissonValidParams {
            alpha,
            l1_ratio: self.l1_ratio,
            with_intercept: self.with_intercept,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            solver: Solver::CoordinateDescent,
        }
    }

    /// Unpenalized solver used to refit the candidate supports
    pub(crate) fn estimation_solver(&self) -> PoissonValidParams<F> {
        PoissonValidParams {
            alpha: F::zero(),
            l1_ratio: self.l1_ratio,
            with_intercept: self.with_intercept,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            solver: Solver::Auto,
        }
    }
}

/// A hyper-parameter set for Union of Intersections Poisson regression
///
/// The selection step fits penalized Poisson models along a regularization path on
/// `n_boots_sel` subsamples and intersects their supports. The estimation step refits every
/// candidate support without penalty on `n_boots_est` resamples, keeps the best candidate of
/// each resample according to `estimation_score` and takes the median of the kept estimates.
///
/// # Parameters
/// | Name | Default | Purpose | Range |
/// | :--- | :--- | :---| :--- |
/// | [n_boots_sel](Self::n_boots_sel) | `48` | Number of selection subsamples | `[2, inf)` |
/// | [n_boots_est](Self::n_boots_est) | `48` | Number of estimation resamples | `[1, inf)` |
/// | [selection_frac](Self::selection_frac) | `0.9` | Fraction of samples in each selection subsample | `(0, 1]` |
/// | [estimation_frac](Self::estimation_frac) | `0.9` | Fraction of samples used for fitting in each estimation resample | `(0, 1]` |
/// | [n_lambdas](Self::n_lambdas) | `48` | Length of the regularization path | `[1, inf)` |
/// | [eps](Self::eps) | `1e-3` | Ratio of the smallest to the largest regularization strength | `(0, 1)` |
/// | [stability_selection](Self::stability_selection) | `1.0` | Bootstrap agreement required for the intersection | [`StabilitySelection`] |
/// | [estimation_score](Self::estimation_score) | `log` | Score of the candidate supports | [`Metric`] |
/// | [l1_ratio](Self::l1_ratio) | `1.0` | Distribution of penalty to L1 and L2 regularizations | `(0.0, 1.0]` |
/// | [with_intercept](Self::with_intercept) | `true` | Enable intercept | `false`, `true` |
/// | [max_iterations](Self::max_iterations) | `1000` | Maximum number of iterations of every fit | `[1, inf)` |
/// | [tolerance](Self::tolerance) | `1e-5` | Absolute change of any of the parameters | `(0, inf)` |
/// | [seed](Self::seed) | `None` | Seed of the resampling, drawn from entropy if unset | |
///
/// # Errors
///
/// Returns [`InvalidBootstraps`](UoiError::InvalidBootstraps) for too few bootstraps.
///
/// Returns [`InvalidFraction`](UoiError::InvalidFraction) if a subsample fraction is not in
/// `(0, 1]`.
///
/// Returns [`InvalidLambdaGrid`](UoiError::InvalidLambdaGrid) for an empty path or `eps` outside
/// of `(0, 1)`.
///
/// Returns [`InvalidStabilitySelection`](UoiError::InvalidStabilitySelection) if the stability
/// criterion cannot be resolved against `n_boots_sel`.
///
/// Returns [`InvalidL1Ratio`](UoiError::InvalidL1Ratio) if the L1 ratio is not in `(0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct UoiPoissonParams<F>(UoiPoissonValidParams<F>);

impl<F: Float> Default for UoiPoissonParams<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> UoiPoissonParams<F> {
    /// Create default Union of Intersections hyper parameters
    pub fn new() -> UoiPoissonParams<F> {
        Self(UoiPoissonValidParams {
            n_boots_sel: 48,
            n_boots_est: 48,
            selection_frac: F::cast(0.9),
            estimation_frac: F::cast(0.9),
            n_lambdas: 48,
            eps: F::cast(1e-3),
            stability_selection: StabilitySelection::default(),
            estimation_score: Metric::Log,
            l1_ratio: F::one(),
            with_intercept: true,
            max_iterations: 1000,
            tolerance: F::cast(1e-5),
            seed: None,
        })
    }

    pub fn n_boots_sel(mut self, n_boots_sel: usize) -> Self {
        self.0.n_boots_sel = n_boots_sel;
        self
    }

    pub fn n_boots_est(mut self, n_boots_est: usize) -> Self {
        self.0.n_boots_est = n_boots_est;
        self
    }

    pub fn selection_frac(mut self, selection_frac: F) -> Self {
        self.0.selection_frac = selection_frac;
        self
    }

    pub fn estimation_frac(mut self, estimation_frac: F) -> Self {
        self.0.estimation_frac = estimation_frac;
        self
    }

    pub fn n_lambdas(mut self, n_lambdas: usize) -> Self {
        self.0.n_lambdas = n_lambdas;
        self
    }

    pub fn eps(mut self, eps: F) -> Self {
        self.0.eps = eps;
        self
    }

    /// Set the bootstrap agreement required for a feature to enter a support, either as a
    /// fraction of `n_boots_sel` or as an absolute count
    pub fn stability_selection<S: Into<StabilitySelection>>(mut self, selection: S) -> Self {
        self.0.stability_selection = selection.into();
        self
    }

    pub fn estimation_score(mut self, metric: Metric) -> Self {
        self.0.estimation_score = metric;
        self
    }

    pub fn l1_ratio(mut self, l1_ratio: F) -> Self {
        self.0.l1_ratio = l1_ratio;
        self
    }

    pub fn with_intercept(mut self, with_intercept: bool) -> Self {
        self.0.with_intercept = with_intercept;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.0.max_iterations = max_iterations;
        self
    }

    pub fn tolerance(mut self, tolerance: F) -> Self {
        self.0.tolerance = tolerance;
        self
    }

    /// Make the resampling reproducible
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = Some(seed);
        self
    }
}

fn in_unit_interval<F: Float>(fraction: F) -> bool {
    fraction > F::zero() && fraction <= F::one()
}

impl<F: Float> ParamGuard for UoiPoissonParams<F> {
    type Checked = UoiPoissonValidParams<F>;
    type Error = UoiError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let params = &self.0;
        let as_f32 = |v: F| v.to_f32().unwrap_or(f32::NAN);

        if params.n_boots_sel < 2 {
            return Err(UoiError::InvalidBootstraps {
                expected: 2,
                found: params.n_boots_sel,
            });
        }
        if params.n_boots_est < 1 {
            return Err(UoiError::InvalidBootstraps {
                expected: 1,
                found: params.n_boots_est,
            });
        }
        if !in_unit_interval(params.selection_frac) {
            return Err(UoiError::InvalidFraction(as_f32(params.selection_frac)));
        }
        if !in_unit_interval(params.estimation_frac) {
            return Err(UoiError::InvalidFraction(as_f32(params.estimation_frac)));
        }
        if params.n_lambdas == 0 || !(params.eps > F::zero() && params.eps < F::one()) {
            return Err(UoiError::InvalidLambdaGrid(as_f32(params.eps)));
        }
        params.stability_selection.thresholds(params.n_boots_sel)?;
        if !in_unit_interval(params.l1_ratio) {
            return Err(UoiError::InvalidL1Ratio(as_f32(params.l1_ratio)));
        }
        if params.max_iterations == 0 {
            return Err(UoiError::InvalidMaxIterations);
        }
        if !params.tolerance.is_finite() || params.tolerance <= F::zero() {
            return Err(UoiError::InvalidTolerance(as_f32(params.tolerance)));
        }

        Ok(params)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
