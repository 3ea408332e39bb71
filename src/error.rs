//! Error types in linfa-uoi
//!

use thiserror::Error;

pub type Result<T> = std::result::Result<T, UoiError>;

#[derive(Error, Debug)]
pub enum UoiError {
    #[error("penalty should be a non-negative, finite number, got {0}")]
    InvalidPenalty(f32),
    #[error("l1 ratio should be in range [0, 1], got {0}")]
    InvalidL1Ratio(f32),
    #[error("tolerance should be a positive, finite number, got {0}")]
    InvalidTolerance(f32),
    #[error("maximum number of iterations should be at least one")]
    InvalidMaxIterations,
    #[error("{0}")]
    InvalidStabilitySelection(String),
    #[error("{0} is not a valid estimation score, expected one of `log`, `AIC`, `AICc`, `BIC`")]
    UnknownMetric(String),
    #[error("subsample fraction should be in range (0, 1], got {0}")]
    InvalidFraction(f32),
    #[error("number of bootstraps should be at least {expected}, got {found}")]
    InvalidBootstraps { expected: usize, found: usize },
    #[error("regularization grid needs at least one value and `eps` in range (0, 1), got eps {0}")]
    InvalidLambdaGrid(f32),
    #[error("Expected `x` and `y` to have same number of rows, got {0} != {1}")]
    MismatchedShapes(usize, usize),
    #[error("Expected {1} features to match the fitted coefficients, got {0}")]
    MismatchedFeatures(usize, usize),
    #[error("The dataset contains no samples")]
    EmptyDataset,
    #[error("Values must be finite and not `Inf`, `-Inf` or `NaN`")]
    InvalidValues,
    #[error("Poisson counts must be non-negative")]
    NegativeTargets,
    #[error("Size of initial parameter guess must be the same as the number of columns in the feature matrix `x`")]
    InvalidInitialParametersGuessSize,
    #[error("support of length {0} does not match the {1} columns of the feature matrix")]
    InvalidSupportSize(usize, usize),
    #[error("the response has no association with any feature, the regularization path is empty")]
    DegenerateResponse,
    #[error("model is not fitted yet, call `fit` before using it")]
    NotFitted,
    #[error(transparent)]
    Argmin(#[from] argmin::core::Error),
}
