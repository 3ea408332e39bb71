use ndarray::{s, Array2, ArrayBase, Axis, Data, Ix3};

use crate::Float;

/// Intersect the supports of the selection bootstraps
///
/// `coefs` has shape `(n_bootstraps, n_lambdas, n_features)`. For every threshold `t` and every
/// regularization strength `l` the returned row `t * n_lambdas + l` marks the features which are
/// nonzero in at least `thresholds[t]` bootstraps. Identical supports are kept, so the result
/// always has `thresholds.len() * n_lambdas` rows.
pub fn intersection<F: Float, D: Data<Elem = F>>(
    coefs: &ArrayBase<D, Ix3>,
    thresholds: &[usize],
) -> Array2<bool> {
    let (_, n_lambdas, n_features) = coefs.dim();

    // votes[l, j] = number of bootstraps with a nonzero coefficient j at lambda l
    let votes = coefs.map_axis(Axis(0), |bootstraps| {
        bootstraps.iter().filter(|c| **c != F::zero()).count()
    });

    let mut supports = Array2::from_elem((thresholds.len() * n_lambdas, n_features), false);
    for (t, &threshold) in thresholds.iter().enumerate() {
        let mut block = supports.slice_mut(s![t * n_lambdas..(t + 1) * n_lambdas, ..]);
        block.zip_mut_with(&votes, |selected, &count| *selected = count >= threshold);
    }

    supports
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn single_lambda_and_threshold() {
        let mut coefs = Array3::<f64>::zeros((5, 1, 3));
        coefs.slice_mut(s![.., 0, 0]).fill(1.5);
        coefs[[0, 0, 1]] = -0.3;
        coefs[[3, 0, 1]] = 0.2;

        let supports = intersection(&coefs, &[3]);
        assert_eq!(supports, array![[true, false, false]]);
    }

    #[test]
    fn rows_are_threshold_major() {
        // two lambdas, three bootstraps
        let coefs = array![
            [[1., 0.], [1., 1.]],
            [[1., 0.], [0., 1.]],
            [[0., 1.], [0., 1.]]
        ];

        let supports = intersection(&coefs, &[2, 3]);
        assert_eq!(
            supports,
            array![
                [true, false],
                [false, true],
                [false, false],
                [false, true]
            ]
        );
    }

    #[test]
    fn duplicates_are_retained() {
        let coefs = Array3::<f64>::ones((4, 3, 2));
        let supports = intersection(&coefs, &[2, 4]);

        assert_eq!(supports.nrows(), 6);
        assert!(supports.iter().all(|&s| s));
    }
}
