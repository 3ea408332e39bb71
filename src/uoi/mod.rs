//! Union of Intersections for Poisson regression
//!
//! The selection step fits penalized models on subsamples along a regularization path and
//! intersects their supports according to a stability criterion. The estimation step refits
//! the resulting candidate supports without penalty, ranks them with a likelihood based score
//! and aggregates the winners by their median.
//!
mod estimator;
mod hyperparams;
mod intersection;
mod scoring;
mod stability;

pub use estimator::UoiPoisson;
pub use hyperparams::{UoiPoissonParams, UoiPoissonValidParams};
pub use intersection::intersection;
pub use scoring::{log_likelihood_glm, score_predictions, Metric};
pub use stability::{stability_selection_to_threshold, SelectionValue, StabilitySelection};
