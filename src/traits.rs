//! Provide traits for the estimators of this crate
//!
use ndarray::{Array1, ArrayBase, Data, Ix2};
use std::error::Error;

use crate::error::Result;

/// Fittable algorithms
///
/// A fittable algorithm takes a design matrix and a vector of counts and creates a model
/// which can make predictions. The hyperparameters live in `self`, the learned coefficients in
/// the returned object.
pub trait Fit<R, T, E: Error> {
    type Object;

    fn fit(&self, records: &R, targets: &T) -> std::result::Result<Self::Object, E>;
}

/// Models predicting the conditional mean of a count response
///
/// Implemented by every fitted estimator of this crate; candidate supports are scored through
/// this trait, so any model exposing a conditional mean can be ranked.
pub trait PredictMean<F> {
    /// Returns `E[y | x]` for every row of `x`, or [`NotFitted`](crate::UoiError::NotFitted)
    fn predict_mean<D: Data<Elem = F>>(&self, x: &ArrayBase<D, Ix2>) -> Result<Array1<F>>;
}
