use ndarray::{s, Array1, Array2, Array3, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Ix1, Ix2};
use rand::rngs::SmallRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use super::{intersection, score_predictions, UoiPoissonParams, UoiPoissonValidParams};
use crate::error::{Result, UoiError};
use crate::model::{FitState, GlmCoefficients};
use crate::poisson::{validate_data, Poisson, Solver, MU_FLOOR};
use crate::traits::{Fit, PredictMean};
use crate::Float;

/// Everything learned by a Union of Intersections fit
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
struct UoiFit<F> {
    coefficients: GlmCoefficients<F>,
    reg_params: Array1<F>,
    selection_thresholds: Vec<usize>,
    supports: Array2<bool>,
    best_supports: Array2<bool>,
}

/// Union of Intersections Poisson regression
///
/// Feature selection and estimation are separated: the intersection of the supports of
/// penalized fits on many subsamples provides a family of candidate supports, the union step
/// refits each candidate without penalty and averages the best ones over resamples by their
/// median. See [`UoiPoissonParams`] for the configuration.
///
/// # Example
///
/// ```rust
/// use linfa_uoi::{ParamGuard, UoiPoisson, UoiError};
/// use ndarray::Array2;
///
/// let x = Array2::from_shape_fn((60, 3), |(i, j)| ((i * (j + 2)) % 7) as f64 / 7.0 - 0.4);
/// let y = x.column(0).mapv(|v| (1.0 + 2.0 * v).exp().round());
///
/// let mut model = UoiPoisson::new(
///     UoiPoisson::params()
///         .n_boots_sel(4)
///         .n_boots_est(4)
///         .n_lambdas(8)
///         .seed(42)
///         .check()?,
/// );
/// model.fit(&x, &y)?;
///
/// assert_eq!(model.coef()?.len(), 3);
/// # Ok::<(), UoiError>(())
/// ```
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct UoiPoisson<F> {
    params: UoiPoissonValidParams<F>,
    state: FitState<UoiFit<F>>,
}

impl<F: Float> UoiPoisson<F> {
    /// Create default Union of Intersections hyper parameters
    pub fn params() -> UoiPoissonParams<F> {
        UoiPoissonParams::new()
    }

    /// Create an unfit estimator
    pub fn new(params: UoiPoissonValidParams<F>) -> UoiPoisson<F> {
        UoiPoisson {
            params,
            state: FitState::Unfit,
        }
    }

    pub fn hyperparameters(&self) -> &UoiPoissonValidParams<F> {
        &self.params
    }

    /// Run selection and estimation on the feature matrix `x` of shape
    /// `(n_samples, n_features)` and the counts `y` of shape `(n_samples)`
    pub fn fit<D1: Data<Elem = F>, D2: Data<Elem = F>>(
        &mut self,
        x: &ArrayBase<D1, Ix2>,
        y: &ArrayBase<D2, Ix1>,
    ) -> Result<&mut Self> {
        validate_data(x, y)?;
        let params = &self.params;
        let (x, y) = (x.view(), y.view());

        let mut rng = match params.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        let selection_thresholds = params.stability_selection.thresholds(params.n_boots_sel)?;
        let reg_params = params.reg_params(x, y)?;

        log::debug!(
            "selection over {} subsamples and {} regularization strengths",
            params.n_boots_sel,
            reg_params.len()
        );
        let selection_coefs = params.selection_sweep(x, y, reg_params.view(), &mut rng);
        let supports = intersection(&selection_coefs, &selection_thresholds);

        log::debug!(
            "estimation of {} candidate supports over {} resamples",
            supports.nrows(),
            params.n_boots_est
        );
        let (estimates, intercepts, best_supports) =
            params.estimation_sweep(x, y, &supports, &mut rng)?;

        let coef = estimates.map_axis(Axis(0), |column| median(column.iter().copied()));
        let intercept = median(intercepts.iter().copied());

        self.state = FitState::Fitted(UoiFit {
            coefficients: GlmCoefficients::fixed(coef, intercept),
            reg_params,
            selection_thresholds,
            supports,
            best_supports,
        });
        Ok(self)
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_fitted()
    }

    /// Median of the best estimates of every resample
    pub fn coef(&self) -> Result<&Array1<F>> {
        Ok(self.state.fitted()?.coefficients.coef())
    }

    /// Median of the intercepts of the best estimates
    pub fn intercept(&self) -> Result<F> {
        Ok(self.state.fitted()?.coefficients.intercept())
    }

    /// Candidate supports, one row per stability threshold and regularization strength
    pub fn supports(&self) -> Result<&Array2<bool>> {
        Ok(&self.state.fitted()?.supports)
    }

    /// The regularization path, in decreasing order
    pub fn reg_params(&self) -> Result<&Array1<F>> {
        Ok(&self.state.fitted()?.reg_params)
    }

    pub fn selection_thresholds(&self) -> Result<&[usize]> {
        Ok(&self.state.fitted()?.selection_thresholds)
    }

    /// Support of the best candidate of every estimation resample
    pub fn best_supports(&self) -> Result<&Array2<bool>> {
        Ok(&self.state.fitted()?.best_supports)
    }

    /// Predict counts as the mode `floor(exp(x β + intercept))` of the fitted distribution
    pub fn predict<D: Data<Elem = F>>(&self, x: &ArrayBase<D, Ix2>) -> Result<Array1<u64>> {
        self.state.fitted()?.coefficients.mode(x)
    }

    /// Predict the conditional mean `exp(x β + intercept)`
    pub fn predict_mean<D: Data<Elem = F>>(&self, x: &ArrayBase<D, Ix2>) -> Result<Array1<F>> {
        self.state.fitted()?.coefficients.mean(x)
    }
}

impl<F: Float> PredictMean<F> for UoiPoisson<F> {
    fn predict_mean<D: Data<Elem = F>>(&self, x: &ArrayBase<D, Ix2>) -> Result<Array1<F>> {
        UoiPoisson::predict_mean(self, x)
    }
}

impl<F: Float, D1: Data<Elem = F>, D2: Data<Elem = F>>
    Fit<ArrayBase<D1, Ix2>, ArrayBase<D2, Ix1>, UoiError> for UoiPoissonValidParams<F>
{
    type Object = UoiPoisson<F>;

    fn fit(&self, x: &ArrayBase<D1, Ix2>, y: &ArrayBase<D2, Ix1>) -> Result<UoiPoisson<F>> {
        let mut model = UoiPoisson::new(self.clone());
        model.fit(x, y)?;
        Ok(model)
    }
}

impl<F: Float> UoiPoissonValidParams<F> {
    /// Geometric regularization path from the smallest strength with an empty support down to
    /// `eps` times that value
    ///
    /// Strengths are per sample, a subsample of `m` rows is fitted with penalty `m * λ`.
    pub(crate) fn reg_params(&self, x: ArrayView2<F>, y: ArrayView1<F>) -> Result<Array1<F>> {
        let n_samples = F::cast(x.nrows());
        let centre = if self.with_intercept {
            y.sum() / n_samples
        } else {
            F::one()
        };

        let correlation = x.t().dot(&y.mapv(|y| y - centre));
        let lambda_max = correlation.fold(F::zero(), |max, c| max.max(c.abs()))
            / (n_samples * self.l1_ratio);
        if !(lambda_max.is_finite() && lambda_max > F::zero()) {
            return Err(UoiError::DegenerateResponse);
        }

        if self.n_lambdas == 1 {
            return Ok(Array1::from_elem(1, lambda_max));
        }
        let last = F::cast(self.n_lambdas - 1);
        Ok(Array1::from_shape_fn(self.n_lambdas, |i| {
            lambda_max * self.eps.powf(F::cast(i) / last)
        }))
    }

    /// Penalized fits along the path for every selection subsample, with shape
    /// `(n_boots_sel, n_lambdas, n_features)`
    fn selection_sweep<R: Rng>(
        &self,
        x: ArrayView2<F>,
        y: ArrayView1<F>,
        reg_params: ArrayView1<F>,
        rng: &mut R,
    ) -> Array3<F> {
        let (n_samples, n_features) = x.dim();
        let n_subsample = subsample_size(self.selection_frac, n_samples);
        let scale = F::cast(n_subsample);

        let mut coefs = Array3::zeros((self.n_boots_sel, reg_params.len(), n_features));
        for boot in 0..self.n_boots_sel {
            let mut rows = index::sample(rng, n_samples, n_subsample).into_vec();
            rows.sort_unstable();
            let xs = x.select(Axis(0), &rows);
            let ys = y.select(Axis(0), &rows);

            // warm start along the decreasing path
            let mut beta = Array1::zeros(n_features);
            let mut intercept = F::zero();
            for (l, &lambda) in reg_params.iter().enumerate() {
                let fitted = self.selection_solver(lambda * scale).irls(
                    xs.view(),
                    ys.view(),
                    beta,
                    intercept,
                );
                coefs.slice_mut(s![boot, l, ..]).assign(fitted.coef());
                beta = fitted.coef().clone();
                intercept = fitted.intercept();
            }
            log::debug!("selection subsample {} done", boot);
        }

        coefs
    }

    /// Refit every distinct candidate support on each resample and keep the best one
    ///
    /// Returns the kept coefficients, padded with zeros to all features, the kept intercepts
    /// and the kept supports, one row per resample.
    fn estimation_sweep<R: Rng>(
        &self,
        x: ArrayView2<F>,
        y: ArrayView1<F>,
        supports: &Array2<bool>,
        rng: &mut R,
    ) -> Result<(Array2<F>, Array1<F>, Array2<bool>)> {
        let (n_samples, n_features) = x.dim();
        let n_train = subsample_size(self.estimation_frac, n_samples);
        let candidates = distinct_rows(supports);

        let mut estimates = Array2::zeros((self.n_boots_est, n_features));
        let mut intercepts = Array1::zeros(self.n_boots_est);
        let mut best_supports = Array2::from_elem((self.n_boots_est, n_features), false);

        for boot in 0..self.n_boots_est {
            let permutation = index::sample(rng, n_samples, n_samples).into_vec();
            let mut train = permutation[..n_train].to_vec();
            let mut test = permutation[n_train..].to_vec();
            train.sort_unstable();
            test.sort_unstable();

            let (x_train, y_train) = (x.select(Axis(0), &train), y.select(Axis(0), &train));
            let score_on_train = self.estimation_score.is_information_criterion() || test.is_empty();
            let (x_eval, y_eval) = if score_on_train {
                (x_train.clone(), y_train.clone())
            } else {
                (x.select(Axis(0), &test), y.select(Axis(0), &test))
            };

            let mut best: Option<(F, usize, Poisson<F>)> = None;
            for &candidate in &candidates {
                let support = supports.row(candidate);
                let selected = selected_features(support);
                let model = self.refit(&x_train.select(Axis(1), &selected), &y_train)?;

                let support = support.to_vec();
                let score =
                    score_predictions(self.estimation_score, &model, &x_eval, &y_eval, &support)?;

                let improves = match &best {
                    None => true,
                    Some((best_score, _, _)) => is_better(score, *best_score),
                };
                if improves {
                    best = Some((score, candidate, model));
                }
            }

            if let Some((score, candidate, model)) = best {
                log::debug!(
                    "estimation resample {}: support {} scored {:?}",
                    boot,
                    candidate,
                    score
                );
                let selected = selected_features(supports.row(candidate));
                let coef = model.coef()?;
                for (&j, &c) in selected.iter().zip(coef.iter()) {
                    estimates[[boot, j]] = c;
                }
                intercepts[boot] = model.intercept()?;
                best_supports.row_mut(boot).assign(&supports.row(candidate));
            }
        }

        Ok((estimates, intercepts, best_supports))
    }

    /// Unpenalized fit on the selected columns
    fn refit(&self, x: &Array2<F>, y: &Array1<F>) -> Result<Poisson<F>> {
        if x.ncols() > 0 {
            let mut model = Poisson::new(self.estimation_solver());
            match model.fit(x, y, None) {
                Ok(_) => return Ok(model),
                Err(UoiError::Argmin(err)) => {
                    log::warn!("L-BFGS refit failed ({}), refitting by coordinate descent", err);
                    let mut params = self.estimation_solver();
                    params.solver = Solver::CoordinateDescent;
                    let mut model = Poisson::new(params);
                    model.fit(x, y, None)?;
                    return Ok(model);
                }
                Err(err) => return Err(err),
            }
        }

        let mut model = Poisson::new(self.estimation_solver());

        // an empty support leaves at most the intercept, which has a closed form
        let intercept = if self.with_intercept {
            let mean = y.sum() / F::cast(y.len());
            mean.max(F::cast(MU_FLOOR)).ln()
        } else {
            F::zero()
        };
        model.set_coefficients(Array1::zeros(0), intercept);
        Ok(model)
    }
}

/// Whether `score` beats `best`; non-finite scores never win and ties keep `best`
fn is_better<F: Float>(score: F, best: F) -> bool {
    match (score.is_finite(), best.is_finite()) {
        (true, true) => score > best,
        (true, false) => true,
        (false, _) => false,
    }
}

/// `floor(fraction * n_samples)`, at least one sample
fn subsample_size<F: Float>(fraction: F, n_samples: usize) -> usize {
    let size = (fraction * F::cast(n_samples)).floor().to_usize().unwrap_or(n_samples);
    size.clamp(1, n_samples)
}

fn selected_features(support: ArrayView1<bool>) -> Vec<usize> {
    support
        .iter()
        .enumerate()
        .filter(|(_, s)| **s)
        .map(|(j, _)| j)
        .collect()
}

/// Indices of the first occurrence of every distinct row
fn distinct_rows(supports: &Array2<bool>) -> Vec<usize> {
    let mut seen: Vec<ArrayView1<bool>> = Vec::new();
    let mut distinct = Vec::new();
    for (i, row) in supports.outer_iter().enumerate() {
        if !seen.contains(&row) {
            seen.push(row);
            distinct.push(i);
        }
    }
    distinct
}

/// Median of the values, the mean of the two central values for an even count
fn median<F: Float, I: Iterator<Item = F>>(values: I) -> F {
    let mut values: Vec<F> = values.collect();
    if values.is_empty() {
        return F::nan();
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / F::cast(2.)
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Metric, ParamGuard};
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand_distr::{Distribution, Normal, Poisson as PoissonDist};
    use ndarray_rand::RandomExt;
    use rand_isaac::Isaac64Rng;

    fn sparse_problem(n_samples: usize) -> (Array2<f64>, Array1<f64>) {
        let mut rng = Isaac64Rng::seed_from_u64(3);
        let x = Array2::random_using((n_samples, 5), Normal::new(0., 0.5).unwrap(), &mut rng);
        let beta = array![1.0, 0.0, 0.0, -1.0, 0.0];
        let y = x
            .dot(&beta)
            .mapv(|eta: f64| PoissonDist::new((eta + 1.0).exp()).unwrap().sample(&mut rng));
        (x, y)
    }

    #[test]
    fn autotraits() {
        fn has_autotraits<T: Send + Sync + Sized + Unpin>() {}
        has_autotraits::<UoiPoisson<f64>>();
        has_autotraits::<UoiPoissonParams<f64>>();
        has_autotraits::<UoiPoissonValidParams<f64>>();
    }

    #[test]
    fn median_of_odd_and_even_counts() {
        assert_eq!(median(vec![3.0, 1.0, 2.0].into_iter()), 2.0);
        assert_eq!(median(vec![4.0, 1.0, 3.0, 2.0].into_iter()), 2.5);
    }

    #[test]
    fn non_finite_scores_never_win() {
        assert!(is_better(-3.0, f64::NAN));
        assert!(is_better(-3.0, f64::NEG_INFINITY));
        assert!(!is_better(f64::INFINITY, -3.0));
        assert!(!is_better(f64::NAN, -3.0));
        assert!(!is_better(f64::NAN, f64::NAN));
        assert!(!is_better(-3.0, -3.0));
        assert!(is_better(-2.0, -3.0));
        assert!(!is_better(f64::NEG_INFINITY, -3.0));
    }

    #[test]
    fn subsample_sizes() {
        assert_eq!(subsample_size(0.9, 10), 9);
        assert_eq!(subsample_size(0.01, 10), 1);
        assert_eq!(subsample_size(1.0, 10), 10);
    }

    #[test]
    fn distinct_rows_keep_first_occurrence() {
        let supports = array![[true, false], [false, false], [true, false], [false, true]];
        assert_eq!(distinct_rows(&supports), vec![0, 1, 3]);
    }

    #[test]
    fn regularization_path_is_geometric() {
        let params = UoiPoisson::<f64>::params()
            .n_lambdas(3)
            .eps(0.01)
            .check_unwrap();
        let x = array![[1.0, 0.0], [0.0, 1.0], [-1.0, 0.0], [0.0, -1.0]];
        let y = array![3.0, 1.0, 1.0, 1.0];

        let path = params.reg_params(x.view(), y.view()).unwrap();
        // ȳ = 1.5, x^T (y - ȳ) = [2, 0]
        assert_abs_diff_eq!(path, array![0.5, 0.05, 0.005], epsilon = 1e-12);

        let res = params.reg_params(x.view(), array![1.0, 1.0, 1.0, 1.0].view());
        assert!(matches!(res, Err(UoiError::DegenerateResponse)));
    }

    #[test]
    fn accessors_require_fit() {
        let model = UoiPoisson::new(UoiPoisson::<f64>::params().check_unwrap());
        assert!(matches!(model.coef(), Err(UoiError::NotFitted)));
        assert!(matches!(model.supports(), Err(UoiError::NotFitted)));
        assert!(matches!(
            model.predict(&array![[0.0]]),
            Err(UoiError::NotFitted)
        ));
    }

    #[test]
    fn selects_true_support() {
        let (x, y) = sparse_problem(400);
        let model = UoiPoisson::params()
            .n_boots_sel(8)
            .n_boots_est(8)
            .n_lambdas(16)
            .seed(0)
            .fit(&x, &y)
            .unwrap();

        let coef = model.coef().unwrap();
        assert_abs_diff_eq!(coef[0], 1.0, epsilon = 0.3);
        assert_abs_diff_eq!(coef[3], -1.0, epsilon = 0.3);
        assert_abs_diff_eq!(model.intercept().unwrap(), 1.0, epsilon = 0.3);

        let supports = model.supports().unwrap();
        assert_eq!(supports.dim(), (16, 5));
        assert_eq!(model.selection_thresholds().unwrap(), &[8]);
        assert_eq!(model.best_supports().unwrap().dim(), (8, 5));
        // the weakest penalty keeps both informative features in every subsample
        let last = supports.row(supports.nrows() - 1);
        assert!(last[0] && last[3]);

        let reg_params = model.reg_params().unwrap();
        assert!(reg_params.windows(2).into_iter().all(|w| w[0] > w[1]));
    }

    #[test]
    fn fits_are_reproducible_with_seed() {
        let (x, y) = sparse_problem(200);
        let params = UoiPoisson::params()
            .n_boots_sel(4)
            .n_boots_est(4)
            .n_lambdas(8)
            .estimation_score(Metric::Bic)
            .seed(11)
            .check_unwrap();

        let first = params.fit(&x, &y).unwrap();
        let second = params.fit(&x, &y).unwrap();
        assert_eq!(first.coef().unwrap(), second.coef().unwrap());
        assert_eq!(first.predict(&x).unwrap(), second.predict(&x).unwrap());
    }
}
