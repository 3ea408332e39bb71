//! Iteratively reweighted least squares with a coordinate descent inner loop
//!
use ndarray::{Array, Array1, ArrayBase, ArrayView1, ArrayView2, Data, Dimension, Zip};

use super::PoissonValidParams;
use crate::model::GlmCoefficients;
use crate::Float;

/// Smallest conditional mean used for the working weights
pub const MU_FLOOR: f64 = 1e-6;

/// Upper bound on coordinate sweeps per working response
const MAX_INNER_ITERATIONS: usize = 50;

/// Upper bound on step halvings before a trial step is abandoned
const MAX_STEP_HALVINGS: usize = 30;

/// Elementwise soft-thresholding operator `sign(x) * max(|x| - threshold, 0)`
///
/// This is the proximal operator of `threshold * |x|` and works on arrays of any dimension. The
/// threshold is expected to be non-negative.
pub fn soft_threshold<F: Float, S: Data<Elem = F>, D: Dimension>(
    x: &ArrayBase<S, D>,
    threshold: F,
) -> Array<F, D> {
    x.mapv(|v| shrink(v, threshold))
}

fn shrink<F: Float>(value: F, threshold: F) -> F {
    value.signum() * F::max(value.abs() - threshold, F::zero())
}

/// Linearize the log-link Poisson likelihood around `beta` and `intercept`
///
/// Returns the working weights `w = exp(η)` and the working response `z = η + (y - μ) / μ`,
/// where `η = x beta + intercept`. Means below [`MU_FLOOR`] are clamped to it before either is
/// computed, so neither the weights nor the response can blow up.
pub fn adjusted_response<F: Float>(
    x: ArrayView2<F>,
    y: ArrayView1<F>,
    beta: ArrayView1<F>,
    intercept: F,
) -> (Array1<F>, Array1<F>) {
    let floor = F::cast(MU_FLOOR);
    let eta = x.dot(&beta) + intercept;

    let mut n_floored = 0usize;
    let mu = eta.mapv(|eta| {
        let mu = eta.exp();
        if mu < floor {
            n_floored += 1;
            floor
        } else {
            mu
        }
    });
    if n_floored > 0 {
        log::warn!(
            "{} of {} conditional means floored at {:e}",
            n_floored,
            mu.len(),
            MU_FLOOR
        );
    }

    let z = Zip::from(&eta)
        .and(&y)
        .and(&mu)
        .map_collect(|&eta, &y, &mu| eta + (y - mu) / mu);

    (mu, z)
}

impl<F: Float> PoissonValidParams<F> {
    /// One coordinate descent pass over the `active` features
    ///
    /// Every partial residual is taken against the input iterate, so the result does not depend
    /// on the visiting order. Features outside `active` keep their value, the intercept is left
    /// untouched when it is not fitted. Returns the updated coefficients and intercept.
    pub fn coordinate_sweep(
        &self,
        x: ArrayView2<F>,
        w: ArrayView1<F>,
        z: ArrayView1<F>,
        beta: ArrayView1<F>,
        intercept: F,
        active: &[usize],
    ) -> (Array1<F>, F) {
        let l1_penalty = self.l1_penalty();
        let l2_penalty = self.l2_penalty();

        let residual = &z - &x.dot(&beta) - intercept;
        let mut beta_new = beta.to_owned();

        for &j in active {
            let x_j = x.column(j);
            let wx_j = &w * &x_j;
            let norm = wx_j.dot(&x_j) + l2_penalty;
            beta_new[j] = if norm > F::zero() {
                let partial = &residual + &(&x_j * beta[j]);
                shrink(wx_j.dot(&partial), l1_penalty) / norm
            } else {
                F::zero()
            };
        }

        let intercept_new = if self.with_intercept {
            intercept + w.dot(&residual) / w.sum()
        } else {
            intercept
        };

        (beta_new, intercept_new)
    }

    /// Penalized negative log-likelihood, without the `ln y!` constant
    pub(crate) fn objective(
        &self,
        x: ArrayView2<F>,
        y: ArrayView1<F>,
        beta: ArrayView1<F>,
        intercept: F,
    ) -> F {
        let eta = x.dot(&beta) + intercept;
        let nll = Zip::from(&eta)
            .and(&y)
            .fold(F::zero(), |acc, &eta, &y| acc + eta.exp() - y * eta);

        nll + self.penalty(beta)
    }

    fn penalty(&self, beta: ArrayView1<F>) -> F {
        let l1_norm = beta.fold(F::zero(), |acc, b| acc + b.abs());
        self.l1_penalty() * l1_norm + F::cast(0.5) * self.l2_penalty() * beta.dot(&beta)
    }

    /// Penalized weighted least squares problem approximating the objective at the last working
    /// response
    fn surrogate(
        &self,
        x: ArrayView2<F>,
        w: ArrayView1<F>,
        z: ArrayView1<F>,
        beta: ArrayView1<F>,
        intercept: F,
    ) -> F {
        let residual = &z - &x.dot(&beta) - intercept;
        let rss = Zip::from(&w)
            .and(&residual)
            .fold(F::zero(), |acc, &w, &r| acc + w * r * r);

        F::cast(0.5) * rss + self.penalty(beta)
    }

    /// Features outside the active set whose gradient exceeds the L1 weight
    fn kkt_violators(
        &self,
        x: ArrayView2<F>,
        y: ArrayView1<F>,
        beta: ArrayView1<F>,
        intercept: F,
        active: &[usize],
    ) -> Vec<usize> {
        let (w, z) = adjusted_response(x, y, beta, intercept);
        let weighted_residual = (&z - &x.dot(&beta) - intercept) * &w;
        let l1_penalty = self.l1_penalty();

        (0..x.ncols())
            .filter(|j| !active.contains(j))
            .filter(|&j| x.column(j).dot(&weighted_residual).abs() > l1_penalty)
            .collect()
    }

    /// Solve the penalized problem by IRLS, starting from `beta` and `intercept`
    ///
    /// Every accepted iterate has a finite objective which does not exceed the one of its
    /// predecessor. Running out of iterations is reported through
    /// [`GlmCoefficients::converged`] and a warning, not as an error.
    pub(crate) fn irls(
        &self,
        x: ArrayView2<F>,
        y: ArrayView1<F>,
        mut beta: Array1<F>,
        mut intercept: F,
    ) -> GlmCoefficients<F> {
        let mut active: Vec<usize> = (0..x.ncols()).collect();
        let mut objective = self.objective(x, y, beta.view(), intercept);
        let mut converged = false;
        let mut stalled = false;
        let mut n_iterations = 0;
        // features readmitted at the last stationary point
        let mut readmitted: Vec<usize> = Vec::new();

        while n_iterations < self.max_iterations {
            n_iterations += 1;

            let (w, z) = adjusted_response(x, y, beta.view(), intercept);
            let (inner_beta, inner_intercept) =
                self.minimize_surrogate(x, w.view(), z.view(), &beta, intercept, &active);

            // step halving on the true objective
            let accepted = backtrack(
                (&beta, intercept),
                (&inner_beta, inner_intercept),
                |b, c| self.objective(x, y, b, c),
                |value| value.is_finite() && (!objective.is_finite() || value <= objective),
            );

            let change = match accepted {
                Some((new_beta, new_intercept, new_objective)) => {
                    let change = max_change(beta.view(), new_beta.view())
                        .max((new_intercept - intercept).abs());
                    beta = new_beta;
                    intercept = new_intercept;
                    objective = new_objective;
                    change
                }
                None => F::zero(),
            };

            log::debug!(
                "irls iteration {}: objective {:?}, change {:?}, {} active features",
                n_iterations,
                objective,
                change,
                active.len()
            );

            active = (0..beta.len()).filter(|&j| beta[j] != F::zero()).collect();

            if change < self.tolerance {
                let violators = self.kkt_violators(x, y, beta.view(), intercept, &active);
                match stationarity(violators, &readmitted) {
                    Stationarity::Optimal => {
                        converged = true;
                        break;
                    }
                    Stationarity::Stalled(violators) => {
                        log::warn!(
                            "IRLS stalled after {} iterations, features {:?} still violate the optimality conditions",
                            n_iterations,
                            violators
                        );
                        stalled = true;
                        break;
                    }
                    Stationarity::Readmit(violators) => {
                        log::debug!("{} features re-enter the active set", violators.len());
                        active.extend(violators.iter().copied());
                        active.sort_unstable();
                        readmitted = violators;
                    }
                }
            } else {
                readmitted.clear();
            }
        }

        if !converged && !stalled {
            log::warn!(
                "IRLS did not converge within {} iterations, returning the last iterate",
                self.max_iterations
            );
        }

        GlmCoefficients::new(beta, intercept, n_iterations, converged)
    }

    /// Repeated coordinate sweeps on the weighted least squares surrogate
    fn minimize_surrogate(
        &self,
        x: ArrayView2<F>,
        w: ArrayView1<F>,
        z: ArrayView1<F>,
        beta: &Array1<F>,
        intercept: F,
        active: &[usize],
    ) -> (Array1<F>, F) {
        let mut beta = beta.clone();
        let mut intercept = intercept;
        let mut surrogate = self.surrogate(x, w, z, beta.view(), intercept);

        for _ in 0..MAX_INNER_ITERATIONS {
            let (swept_beta, swept_intercept) =
                self.coordinate_sweep(x, w, z, beta.view(), intercept, active);

            let accepted = backtrack(
                (&beta, intercept),
                (&swept_beta, swept_intercept),
                |b, c| self.surrogate(x, w, z, b, c),
                |value| value <= surrogate,
            );

            let (new_beta, new_intercept, new_surrogate) = match accepted {
                Some(trial) => trial,
                None => break,
            };

            let change =
                max_change(beta.view(), new_beta.view()).max((new_intercept - intercept).abs());
            beta = new_beta;
            intercept = new_intercept;
            surrogate = new_surrogate;

            if change < self.tolerance {
                break;
            }
        }

        (beta, intercept)
    }
}

/// Outcome of the optimality check at an iterate that stopped moving
#[derive(Debug, PartialEq)]
enum Stationarity {
    /// No inactive feature violates the L1 optimality condition
    Optimal,
    /// Violators to add to the active set
    Readmit(Vec<usize>),
    /// The violators readmitted last time are back without the iterate having moved
    Stalled(Vec<usize>),
}

fn stationarity(violators: Vec<usize>, readmitted: &[usize]) -> Stationarity {
    if violators.is_empty() {
        Stationarity::Optimal
    } else if violators == readmitted {
        Stationarity::Stalled(violators)
    } else {
        Stationarity::Readmit(violators)
    }
}

/// Halve the step from `from` towards `to` until `accept` holds for `value` of the trial point
///
/// Every step length is first tried with the coordinates which `to` sets to zero held at exactly
/// zero, then as the plain interpolation. Returns the accepted coefficients, intercept and value.
fn backtrack<F, V, A>(
    from: (&Array1<F>, F),
    to: (&Array1<F>, F),
    mut value: V,
    accept: A,
) -> Option<(Array1<F>, F, F)>
where
    F: Float,
    V: FnMut(ArrayView1<F>, F) -> F,
    A: Fn(F) -> bool,
{
    let (beta, intercept) = from;
    let (target, target_intercept) = to;

    let mut step = F::one();
    for _ in 0..MAX_STEP_HALVINGS {
        let trial_intercept = intercept + (target_intercept - intercept) * step;
        let plain = beta + &((target - beta) * step);
        let snapped = Zip::from(&plain)
            .and(target)
            .map_collect(|&b, &t| if t == F::zero() { F::zero() } else { b });

        let trials = if snapped == plain {
            vec![plain]
        } else {
            vec![snapped, plain]
        };
        for trial in trials {
            let trial_value = value(trial.view(), trial_intercept);
            if accept(trial_value) {
                return Some((trial, trial_intercept, trial_value));
            }
        }
        step = step * F::cast(0.5);
    }

    None
}

fn max_change<F: Float>(old: ArrayView1<F>, new: ArrayView1<F>) -> F {
    Zip::from(&old)
        .and(&new)
        .fold(F::zero(), |acc, &a, &b| acc.max((a - b).abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ParamGuard, PoissonParams};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::{Distribution, Normal, Poisson as PoissonDist};
    use ndarray_rand::RandomExt;
    use rand_isaac::Isaac64Rng;

    fn design() -> Array2<f64> {
        array![
            [0.35, 0.84, 0.95, 0.77, 0.88],
            [0.43, 0.76, 0.47, 0.09, 0.34],
            [0.41, 0.40, 0.08, 0.82, 0.49],
            [0.73, 0.93, 0.39, 0.77, 0.72],
            [0.69, 0.88, 0.32, 0.54, 0.26],
            [0.34, 0.10, 0.55, 0.20, 0.20],
            [0.20, 0.15, 0.23, 0.16, 0.74],
            [0.94, 0.08, 0.97, 0.03, 0.48],
            [0.61, 0.55, 0.72, 0.21, 0.27],
            [0.54, 0.21, 0.98, 0.26, 0.01]
        ]
    }

    fn counts() -> Array1<f64> {
        array![2., 6., 0., 4., 6., 3., 0., 16., 8., 7.]
    }

    #[test]
    fn soft_threshold_matches_reference() {
        let expected = array![
            [0., 0.34, 0.45, 0.27, 0.38],
            [0., 0.26, 0., 0., 0.],
            [0., 0., 0., 0.32, 0.],
            [0.23, 0.43, 0., 0.27, 0.22],
            [0.19, 0.38, 0., 0.04, 0.],
            [0., 0., 0.05, 0., 0.],
            [0., 0., 0., 0., 0.24],
            [0.44, 0., 0.47, 0., 0.],
            [0.11, 0.05, 0.22, 0., 0.],
            [0.04, 0., 0.48, 0., 0.]
        ];

        assert_abs_diff_eq!(soft_threshold(&design(), 0.5), expected, epsilon = 1e-12);
    }

    #[test]
    fn soft_threshold_keeps_sign_and_is_idempotent_at_zero() {
        let x = array![-2.0, -0.5, 0.0, 0.5, 2.0];
        let shrunk = soft_threshold(&x, 1.0);
        assert_abs_diff_eq!(shrunk, array![-1.0, 0.0, 0.0, 0.0, 1.0]);
        assert_abs_diff_eq!(soft_threshold(&shrunk, 0.0), shrunk);
    }

    #[test]
    fn adjusted_response_matches_reference() {
        let beta = array![3., 1., 0., -2., 0.];
        let (w, z) = adjusted_response(design().view(), counts().view(), beta.view(), 0.0);

        let w_expected = array![
            1.419067548593257,
            6.488296399286710,
            0.990049833749168,
            4.854955811237434,
            6.488296399286709,
            2.054433210643888,
            1.537257523548281,
            17.115765537145876,
            7.099327065156633,
            3.706173712210199
        ];
        let z_expected = array![
            0.759376179437427,
            1.794741970890788,
            -1.01,
            1.403900392819534,
            1.794741970890788,
            1.180256767879915,
            -0.57,
            2.774810655432013,
            2.086867367368360,
            2.198740394692808
        ];

        assert_abs_diff_eq!(w, w_expected, epsilon = 1e-10);
        assert_abs_diff_eq!(z, z_expected, epsilon = 1e-10);
    }

    #[test]
    fn adjusted_response_floors_tiny_means() {
        let x = array![[-100.0], [0.0]];
        let y = array![0.0, 1.0];
        let (w, z) = adjusted_response(x.view(), y.view(), array![1.0].view(), 0.0);

        assert_abs_diff_eq!(w, array![MU_FLOOR, 1.0]);
        assert!(z.iter().all(|z| z.is_finite()));
    }

    #[test]
    fn coordinate_sweep_matches_reference() {
        let params = PoissonParams::new().with_intercept(false).check_unwrap();
        let (x, y) = (design(), counts());
        let beta = array![3., 1., 0., -2., 0.];

        let (w, z) = adjusted_response(x.view(), y.view(), beta.view(), 0.0);
        let active: Vec<usize> = (0..beta.len()).filter(|&j| beta[j] != 0.0).collect();
        let (beta_new, intercept_new) =
            params.coordinate_sweep(x.view(), w.view(), z.view(), beta.view(), 0.0, &active);

        assert_abs_diff_eq!(
            beta_new,
            array![
                2.922553187460584,
                0.909849302128083,
                0.,
                -1.850644198436912,
                0.
            ],
            epsilon = 1e-10
        );
        assert_eq!(intercept_new, 0.0);
        // inputs are left untouched
        assert_eq!(beta, array![3., 1., 0., -2., 0.]);
    }

    #[test]
    fn coordinate_sweep_centers_intercept() {
        let params = PoissonParams::new().alpha(0.0).check_unwrap();
        let x = array![[0.0], [0.0], [0.0]];
        let w = array![1.0, 1.0, 2.0];
        let z = array![1.0, 2.0, 3.0];

        let (_, intercept) =
            params.coordinate_sweep(x.view(), w.view(), z.view(), array![0.0].view(), 0.0, &[0]);
        assert_abs_diff_eq!(intercept, 9.0 / 4.0);
    }

    #[test]
    fn irls_lowers_objective() {
        let params = PoissonParams::new().alpha(0.5).l1_ratio(0.8).check_unwrap();
        let (x, y) = (design(), counts());
        let start = Array1::zeros(x.ncols());

        let objective_start = params.objective(x.view(), y.view(), start.view(), 0.0);
        let coefs = params.irls(x.view(), y.view(), start, 0.0);
        let objective_end = params.objective(x.view(), y.view(), coefs.coef().view(), coefs.intercept());

        assert!(objective_end < objective_start);
        assert!(coefs.converged());
        assert!(coefs.n_iterations() >= 1);
    }

    #[test]
    fn strong_penalty_gives_empty_support() {
        let params = PoissonParams::new().alpha(1e4).l1_ratio(1.0).check_unwrap();
        let (x, y) = (design(), counts());
        let coefs = params.irls(x.view(), y.view(), Array1::zeros(x.ncols()), 0.0);

        assert_abs_diff_eq!(coefs.coef(), &Array1::zeros(x.ncols()));
        // the intercept alone matches the average count
        assert_abs_diff_eq!(coefs.intercept(), y.mean().unwrap().ln(), epsilon = 1e-4);
    }

    #[test]
    fn irls_recovers_sparse_coefficients() {
        let mut rng = Isaac64Rng::seed_from_u64(42);
        let x = Array2::random_using((2000, 4), Normal::new(0., 0.5).unwrap(), &mut rng);
        let beta = array![1.0, 0.0, -0.5, 0.0];
        let y = x
            .dot(&beta)
            .mapv(|eta: f64| PoissonDist::new((eta + 0.5).exp()).unwrap().sample(&mut rng));

        let params = PoissonParams::new().alpha(1.0).l1_ratio(0.5).check_unwrap();
        let coefs = params.irls(x.view(), y.view(), Array1::zeros(4), 0.0);

        assert!(coefs.converged());
        assert_abs_diff_eq!(coefs.coef(), &beta, epsilon = 0.15);
        assert_abs_diff_eq!(coefs.intercept(), 0.5, epsilon = 0.15);
    }

    #[test]
    fn exhausted_iterations_are_reported() {
        let params = PoissonParams::new()
            .alpha(0.1)
            .max_iterations(1)
            .tolerance(1e-12)
            .check_unwrap();
        let (x, y) = (design(), counts());
        let coefs = params.irls(x.view(), y.view(), Array1::zeros(x.ncols()), 0.0);

        assert!(!coefs.converged());
        assert_eq!(coefs.n_iterations(), 1);
        assert!(coefs.coef().iter().all(|c| c.is_finite()));
    }

    #[test]
    fn shortened_steps_keep_thresholded_coefficients_at_zero() {
        // the full step overshoots, half a step reaches the minimum of the first coordinate
        let from = array![1.0, 1.0];
        let to = array![3.0, 0.0];
        let value = |b: ArrayView1<f64>, _: f64| (b[0] - 2.0).powi(2);

        let (beta, intercept, objective) =
            backtrack((&from, 0.0), (&to, 0.0), value, |v| v <= 0.5).unwrap();
        assert_eq!(beta, array![2.0, 0.0]);
        assert_eq!(intercept, 0.0);
        assert_eq!(objective, 0.0);

        assert!(backtrack((&from, 0.0), (&to, 0.0), value, |v| v < 0.0).is_none());
    }

    #[test]
    fn collinear_design_yields_exact_zeros() {
        let mut rng = Isaac64Rng::seed_from_u64(17);
        let z = Array2::random_using((1000, 1), Normal::new(0., 1.).unwrap(), &mut rng);
        let x = Array2::random_using((1000, 8), Normal::new(0., 0.05).unwrap(), &mut rng) + &z;
        let y = z
            .column(0)
            .mapv(|z: f64| PoissonDist::new((0.5 * z).exp()).unwrap().sample(&mut rng));

        let params = PoissonParams::new()
            .alpha(1.0)
            .l1_ratio(0.5)
            .solver(crate::Solver::CoordinateDescent)
            .check_unwrap();
        let coefs = params.irls(x.view(), y.view(), Array1::zeros(8), 0.0);

        for &c in coefs.coef() {
            assert!(c == 0.0 || c.abs() > 1e-10, "coefficient {:e} is neither zero nor selected", c);
        }

        // the support seen by the intersection is exactly the set of nonzero coefficients
        let mut stacked = ndarray::Array3::zeros((3, 1, 8));
        for mut fit in stacked.outer_iter_mut() {
            fit.row_mut(0).assign(coefs.coef());
        }
        let supports = crate::intersection(&stacked, &[3]);
        assert_eq!(supports.row(0), coefs.coef().mapv(|c| c != 0.0));
    }

    #[test]
    fn repeated_violators_stall_instead_of_converging() {
        assert_eq!(stationarity(vec![], &[1, 2]), Stationarity::Optimal);
        assert_eq!(stationarity(vec![3], &[]), Stationarity::Readmit(vec![3]));
        assert_eq!(stationarity(vec![3], &[1]), Stationarity::Readmit(vec![3]));
        assert_eq!(stationarity(vec![1, 2], &[1, 2]), Stationarity::Stalled(vec![1, 2]));
    }
}
