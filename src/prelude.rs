//! linfa-uoi prelude.
//!
//! This module contains the most used types, type aliases, traits and
//! functions that you can import easily as a group.
//!

#[doc(no_inline)]
pub use crate::error::{Result, UoiError};

#[doc(no_inline)]
pub use crate::traits::*;

#[doc(no_inline)]
pub use crate::param_guard::ParamGuard;

#[doc(no_inline)]
pub use crate::Float;

#[doc(no_inline)]
pub use crate::poisson::{Poisson, PoissonParams, Solver};

#[doc(no_inline)]
pub use crate::uoi::{Metric, StabilitySelection, UoiPoisson, UoiPoissonParams};
