//! Likelihood based scores of candidate supports
//!
use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayBase, Axis, Data, Ix1, Ix2, Zip};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{Result, UoiError};
use crate::traits::PredictMean;
use crate::Float;

/// Score used to rank the candidate supports of one estimation bootstrap
///
/// All scores are oriented so that larger values indicate the better model. The information
/// criteria are therefore the negated textbook quantities.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    /// Mean Poisson log-likelihood
    Log,
    /// Akaike information criterion
    Aic,
    /// Akaike information criterion with small sample correction
    Aicc,
    /// Bayesian information criterion
    Bic,
}

impl Default for Metric {
    fn default() -> Self {
        Metric::Log
    }
}

impl FromStr for Metric {
    type Err = UoiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "log" => Ok(Metric::Log),
            "AIC" => Ok(Metric::Aic),
            "AICc" => Ok(Metric::Aicc),
            "BIC" => Ok(Metric::Bic),
            other => Err(UoiError::UnknownMetric(other.to_string())),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Log => "log",
            Metric::Aic => "AIC",
            Metric::Aicc => "AICc",
            Metric::Bic => "BIC",
        };
        f.write_str(name)
    }
}

impl Metric {
    /// Whether the score is computed on the data the candidate was fitted on
    pub fn is_information_criterion(&self) -> bool {
        !matches!(self, Metric::Log)
    }

    /// Score a model with mean log-likelihood `ll`, `n_features` selected features and
    /// `n_samples` observations
    pub fn score<F: Float>(&self, ll: F, n_features: usize, n_samples: usize) -> F {
        let two = F::cast(2.);
        let k = F::cast(n_features);
        let n = F::cast(n_samples);

        match self {
            Metric::Log => ll,
            Metric::Aic => -(two * k - two * ll),
            Metric::Aicc => {
                if n_samples <= n_features + 1 {
                    return F::neg_infinity();
                }
                let aic = two * k - two * ll;
                -(aic + two * k * (k + F::one()) / (n - k - F::one()))
            }
            Metric::Bic => -(k * n.ln() - two * ll),
        }
    }
}

/// Mean Poisson log-likelihood `mean(y ln μ - μ)` of counts `y` under means `mu`
///
/// The `ln y!` term is left out, samples with zero counts contribute `-μ`.
pub fn log_likelihood_glm<F: Float, D1: Data<Elem = F>, D2: Data<Elem = F>>(
    y: &ArrayBase<D1, Ix1>,
    mu: &ArrayBase<D2, Ix1>,
) -> F {
    let sum = Zip::from(y).and(mu).fold(F::zero(), |acc, &y, &mu| {
        if y == F::zero() {
            acc - mu
        } else {
            acc + y * mu.ln() - mu
        }
    });

    sum / F::cast(y.len())
}

/// Score `fitter`, which was fitted on the columns of `x` selected by `support`, on `x` and `y`
///
/// # Errors
///
/// Returns [`InvalidSupportSize`](UoiError::InvalidSupportSize) if `support` does not match the
/// columns of `x`, and forwards errors of the fitter such as
/// [`NotFitted`](UoiError::NotFitted).
pub fn score_predictions<F, P, D1, D2>(
    metric: Metric,
    fitter: &P,
    x: &ArrayBase<D1, Ix2>,
    y: &ArrayBase<D2, Ix1>,
    support: &[bool],
) -> Result<F>
where
    F: Float,
    P: PredictMean<F>,
    D1: Data<Elem = F>,
    D2: Data<Elem = F>,
{
    if support.len() != x.ncols() {
        return Err(UoiError::InvalidSupportSize(support.len(), x.ncols()));
    }
    if x.nrows() != y.len() {
        return Err(UoiError::MismatchedShapes(x.nrows(), y.len()));
    }

    let selected: Vec<usize> = support
        .iter()
        .enumerate()
        .filter(|(_, s)| **s)
        .map(|(j, _)| j)
        .collect();
    let mu = fitter.predict_mean(&x.select(Axis(1), &selected))?;
    let ll = log_likelihood_glm(y, &mu);

    Ok(metric.score(ll, selected.len(), y.len()))
}
