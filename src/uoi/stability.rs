//! Stability selection criteria and their vote thresholds
//!
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{Result, UoiError};

const OUT_OF_BOUNDS: &str = "Stability selection thresholds must be within the correct bounds.";
const MIXED_KINDS: &str = "Stability selection list must consist of floats or ints.";
const EMPTY: &str = "Stability selection list must not be empty.";
const UNPARSABLE: &str = "Stability selection must be a valid float, int or array.";

/// How many bootstraps have to agree before a feature enters a support
///
/// Fractions are relative to the number of selection bootstraps and are truncated towards zero,
/// counts are used as they are. The list forms produce one threshold per entry.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub enum StabilitySelection {
    Fraction(f64),
    Count(usize),
    Fractions(Vec<f64>),
    Counts(Vec<usize>),
}

impl Default for StabilitySelection {
    fn default() -> Self {
        StabilitySelection::Fraction(1.0)
    }
}

/// A single, loosely typed stability selection entry
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SelectionValue {
    Fraction(f64),
    Count(usize),
}

impl StabilitySelection {
    /// Classify a list of entries, which must all be fractions or all be counts
    pub fn from_values(values: &[SelectionValue]) -> Result<Self> {
        if values.is_empty() {
            return Err(UoiError::InvalidStabilitySelection(EMPTY.to_string()));
        }

        let fractions: Option<Vec<f64>> = values
            .iter()
            .map(|v| match v {
                SelectionValue::Fraction(f) => Some(*f),
                SelectionValue::Count(_) => None,
            })
            .collect();
        if let Some(fractions) = fractions {
            return Ok(StabilitySelection::Fractions(fractions));
        }

        let counts: Option<Vec<usize>> = values
            .iter()
            .map(|v| match v {
                SelectionValue::Count(c) => Some(*c),
                SelectionValue::Fraction(_) => None,
            })
            .collect();
        counts
            .map(StabilitySelection::Counts)
            .ok_or_else(|| UoiError::InvalidStabilitySelection(MIXED_KINDS.to_string()))
    }

    /// Resolve into vote thresholds for `n_boots` selection bootstraps
    pub fn thresholds(&self, n_boots: usize) -> Result<Vec<usize>> {
        stability_selection_to_threshold(self, n_boots)
    }
}

impl From<f64> for StabilitySelection {
    fn from(fraction: f64) -> Self {
        StabilitySelection::Fraction(fraction)
    }
}

impl From<usize> for StabilitySelection {
    fn from(count: usize) -> Self {
        StabilitySelection::Count(count)
    }
}

impl From<Vec<f64>> for StabilitySelection {
    fn from(fractions: Vec<f64>) -> Self {
        StabilitySelection::Fractions(fractions)
    }
}

impl From<Vec<usize>> for StabilitySelection {
    fn from(counts: Vec<usize>) -> Self {
        StabilitySelection::Counts(counts)
    }
}

impl FromStr for SelectionValue {
    type Err = UoiError;

    /// Integers are counts, everything else that parses as a float is a fraction
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let unparsable = || UoiError::InvalidStabilitySelection(UNPARSABLE.to_string());

        if s.bytes().all(|b| b.is_ascii_digit() || b == b'-' || b == b'+') {
            return match s.parse::<i64>().map_err(|_| unparsable())? {
                count if count < 0 => Err(UoiError::InvalidStabilitySelection(
                    OUT_OF_BOUNDS.to_string(),
                )),
                count => Ok(SelectionValue::Count(count as usize)),
            };
        }

        s.parse::<f64>()
            .map(SelectionValue::Fraction)
            .map_err(|_| unparsable())
    }
}

impl FromStr for StabilitySelection {
    type Err = UoiError;

    /// Parse `"0.9"`, `"5"` or a comma separated list such as `"0.5,0.9"`
    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(str::parse)
            .collect::<Result<Vec<SelectionValue>>>()?;

        match values.as_slice() {
            [SelectionValue::Fraction(f)] => Ok(StabilitySelection::Fraction(*f)),
            [SelectionValue::Count(c)] => Ok(StabilitySelection::Count(*c)),
            values => StabilitySelection::from_values(values),
        }
    }
}

impl fmt::Display for StabilitySelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StabilitySelection::Fraction(v) => write!(f, "{:?}", v),
            StabilitySelection::Count(v) => write!(f, "{}", v),
            StabilitySelection::Fractions(v) => {
                let items: Vec<String> = v.iter().map(|v| format!("{:?}", v)).collect();
                write!(f, "{}", items.join(","))
            }
            StabilitySelection::Counts(v) => {
                let items: Vec<String> = v.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", items.join(","))
            }
        }
    }
}

/// Convert a stability selection criterion into vote thresholds
///
/// A threshold is the number of selection bootstraps in which a feature must be nonzero to be
/// part of a support. Every threshold has to lie in `(1, n_boots]`.
///
/// # Errors
///
/// Returns [`InvalidStabilitySelection`](UoiError::InvalidStabilitySelection) for an empty list
/// or any threshold outside of the bounds.
pub fn stability_selection_to_threshold(
    selection: &StabilitySelection,
    n_boots: usize,
) -> Result<Vec<usize>> {
    let scale = |fraction: f64| (fraction * n_boots as f64) as i64;

    let thresholds: Vec<i64> = match selection {
        StabilitySelection::Fraction(f) => vec![scale(*f)],
        StabilitySelection::Count(c) => vec![*c as i64],
        StabilitySelection::Fractions(fs) => fs.iter().map(|f| scale(*f)).collect(),
        StabilitySelection::Counts(cs) => cs.iter().map(|c| *c as i64).collect(),
    };

    if thresholds.is_empty() {
        return Err(UoiError::InvalidStabilitySelection(EMPTY.to_string()));
    }
    if thresholds
        .iter()
        .any(|&t| t <= 1 || t > n_boots as i64)
    {
        return Err(UoiError::InvalidStabilitySelection(
            OUT_OF_BOUNDS.to_string(),
        ));
    }

    Ok(thresholds.into_iter().map(|t| t as usize).collect())
}
