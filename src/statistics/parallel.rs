//! Parallel computation implementations for weighted reductions
//!
//! This module contains the actual parallel computation logic for weighted means.

use crate::errors::{RegridError, Result};
use ndarray::{ArrayD, IxDyn};
use rayon::prelude::*;

/// Weighted mean over the trailing dimensions of `data` that `weights` spans.
///
/// `weights.shape()` must equal the trailing part of `data.shape()`; the result has
/// the remaining leading shape (0-d when nothing remains). Elements that are masked,
/// non-finite, or carry a non-finite weight are skipped together with their weight.
/// Slices with no positive total weight yield NaN.
///
/// # Errors
///
/// Returns `DimensionMismatch` if the weights do not match the trailing shape.
pub fn parallel_weighted_mean(
    data: &ArrayD<f64>,
    mask: Option<&ArrayD<bool>>,
    weights: &ArrayD<f64>,
) -> Result<ArrayD<f64>> {
    let shape = data.shape();
    let w_shape = weights.shape();
    if w_shape.len() > shape.len() || shape[shape.len() - w_shape.len()..] != *w_shape {
        return Err(RegridError::DimensionMismatch {
            field: format!("weights {w_shape:?} for data {shape:?}"),
            expected: weights.len(),
            actual: data.len(),
        });
    }

    let leading = shape[..shape.len() - w_shape.len()].to_vec();
    let n_inner = weights.len();
    let n_outer: usize = leading.iter().product();

    // Logical (row-major) order regardless of memory layout
    let values: Vec<f64> = data.iter().copied().collect();
    let missing: Option<Vec<bool>> = mask.map(|m| m.iter().copied().collect());
    let w: Vec<f64> = weights.iter().copied().collect();

    log::debug!(
        "Weighted mean of {n_outer} slice(s) x {n_inner} cells across {} threads",
        rayon::current_num_threads()
    );

    let result: Vec<f64> = (0..n_outer)
        .into_par_iter()
        .map(|outer| {
            let start = outer * n_inner;
            let mut sum = 0.0_f64;
            let mut total = 0.0_f64;
            for (inner, &weight) in w.iter().enumerate() {
                let idx = start + inner;
                let v = values[idx];
                let is_missing = missing.as_ref().is_some_and(|m| m[idx]);
                if !is_missing && v.is_finite() && weight.is_finite() {
                    sum += weight * v;
                    total += weight;
                }
            }
            if total > 0.0 {
                sum / total
            } else {
                f64::NAN
            }
        })
        .collect();

    Ok(ArrayD::from_shape_vec(IxDyn(&leading), result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, Array};

    #[test]
    fn test_weighted_mean_over_trailing() {
        let data = Array::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0])
            .unwrap()
            .into_dyn();
        let weights = arr1(&[1.0, 1.0, 2.0]).into_dyn();
        let mean = parallel_weighted_mean(&data, None, &weights).unwrap();
        assert_eq!(mean.shape(), &[2]);
        assert_relative_eq!(mean[[0]], 9.0 / 4.0);
        assert_relative_eq!(mean[[1]], 90.0 / 4.0);
    }

    #[test]
    fn test_masked_elements_drop_their_weight() {
        let data = arr1(&[1.0, 1.0e20, 3.0]).into_dyn();
        let mask = arr1(&[false, true, false]).into_dyn();
        let weights = arr1(&[1.0, 5.0, 1.0]).into_dyn();
        let mean = parallel_weighted_mean(&data, Some(&mask), &weights).unwrap();
        assert_eq!(mean.ndim(), 0);
        assert_relative_eq!(mean.iter().next().copied().unwrap(), 2.0);
    }

    #[test]
    fn test_all_missing_is_nan() {
        let data = arr1(&[f64::NAN, f64::NAN]).into_dyn();
        let weights = arr1(&[1.0, 1.0]).into_dyn();
        let mean = parallel_weighted_mean(&data, None, &weights).unwrap();
        assert!(mean.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_weight_shape_checked() {
        let data = Array::<f64, _>::zeros((2, 3)).into_dyn();
        let weights = arr1(&[1.0, 1.0]).into_dyn();
        assert!(parallel_weighted_mean(&data, None, &weights).is_err());
    }
}
