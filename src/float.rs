use ndarray::NdFloat;
use num_traits::{FromPrimitive, NumCast};
use std::iter::Sum;

/// Floating point numbers
///
/// This trait bound multiplexes to the most common assumption of floating point number and
/// implement them for 32bit and 64bit floating points. Design matrices, counts and coefficients
/// all share the same float type.
pub trait Float: NdFloat + FromPrimitive + Default + Sum + approx::AbsDiffEq<Epsilon = Self> {
    fn cast<T: NumCast>(x: T) -> Self {
        NumCast::from(x).unwrap()
    }
}

impl Float for f32 {}

impl Float for f64 {}
