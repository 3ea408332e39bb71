//! `linfa-uoi` provides penalized Poisson regression and the Union of Intersections (UoI)
//! framework for sparse, low-bias estimation of count models.
//!
//! ## The big picture
//!
//! UoI separates feature selection from estimation. Selection fits many penalized models on
//! subsamples of the data along a regularization path and keeps, for every penalty strength,
//! the features which are nonzero in enough of the subsamples. Estimation refits each of these
//! candidate supports without penalty on resampled data, ranks them with a likelihood based
//! score and aggregates the best ones by their median.
//!
//! ## Current state
//!
//! The crate implements
//!
//! * [`Poisson`], a log-link generalized linear model with an elastic net penalty, fitted by
//!   iteratively reweighted least squares with a coordinate descent inner loop or by L-BFGS,
//! * the building blocks of UoI: [`stability_selection_to_threshold`], [`intersection`] and
//!   [`score_predictions`],
//! * [`UoiPoisson`], the complete selection and estimation procedure.
//!
//! ## Example
//!
//! ```rust
//! use linfa_uoi::prelude::*;
//! use ndarray::array;
//!
//! let x = array![[0.1, 1.2], [0.5, 0.3], [0.9, -0.4], [1.3, 0.8], [1.7, 0.1], [2.1, -0.2]];
//! let y = array![1.0, 2.0, 2.0, 4.0, 6.0, 9.0];
//!
//! let model = Poisson::params().alpha(0.1).l1_ratio(1.0).fit(&x, &y)?;
//! let counts = model.predict(&x)?;
//! assert_eq!(counts.len(), 6);
//! # Ok::<(), UoiError>(())
//! ```
//!

pub mod error;
mod float;
mod model;
mod param_guard;
pub mod poisson;
pub mod prelude;
pub mod traits;
pub mod uoi;

pub use error::{Result, UoiError};
pub use float::Float;
pub use model::{FitState, GlmCoefficients};
pub use param_guard::ParamGuard;
pub use traits::{Fit, PredictMean};

pub use poisson::{
    adjusted_response, poisson_loss_and_grad, soft_threshold, Poisson, PoissonParams,
    PoissonValidParams, Solver, MU_FLOOR,
};
pub use uoi::{
    intersection, log_likelihood_glm, score_predictions, stability_selection_to_threshold,
    Metric, SelectionValue, StabilitySelection, UoiPoisson, UoiPoissonParams,
    UoiPoissonValidParams,
};
