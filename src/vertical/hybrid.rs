//! Air mass from hybrid-sigma coefficients
//!
//! Interface pressures are `hyai[k] * P0 + hybi[k] * PS`, ordered from the model
//! top to the surface. Layer `k` lies between interfaces `k` and `k + 1`.

use super::GRAVITY;
use crate::errors::{RegridError, Result};
use ndarray::{s, Array2, Array3, ArrayD, ArrayView2, Axis, Ix2};

/// Column air mass per layer, `rhodz[level, lat, lon]` in kg/m².
///
/// `ps` is a single time slice of surface pressure in Pa; `p0` is the reference
/// pressure. The result has `hyai.len() - 1` layers.
///
/// # Errors
///
/// `InvalidVerticalData` if `hyai` and `hybi` differ in length or define fewer
/// than two interfaces.
pub fn rhodz_from_hybrid(
    ps: ArrayView2<f64>,
    p0: f64,
    hyai: &[f64],
    hybi: &[f64],
) -> Result<Array3<f64>> {
    if hyai.len() != hybi.len() {
        return Err(RegridError::invalid_vertical(format!(
            "hyai has {} interfaces but hybi has {}",
            hyai.len(),
            hybi.len()
        )));
    }
    if hyai.len() < 2 {
        return Err(RegridError::invalid_vertical(
            "hybrid coefficients need at least two interfaces",
        ));
    }

    let (n_lat, n_lon) = ps.dim();
    let pint = Array3::from_shape_fn((hyai.len(), n_lat, n_lon), |(k, j, i)| {
        hyai[k] * p0 + hybi[k] * ps[[j, i]]
    });

    let dp = &pint.slice(s![1.., .., ..]) - &pint.slice(s![..-1, .., ..]);
    Ok(dp / GRAVITY)
}

/// Reduce surface pressure to a `(lat, lon)` slice.
///
/// A `(time, lat, lon)` array yields its first time step.
pub fn surface_pressure_slice(ps: &ArrayD<f64>) -> Result<Array2<f64>> {
    match ps.ndim() {
        2 => Ok(ps.clone().into_dimensionality::<Ix2>()?),
        3 => {
            if ps.shape()[0] > 1 {
                log::debug!(
                    "Surface pressure has {} time steps, using the first",
                    ps.shape()[0]
                );
            }
            Ok(ps.index_axis(Axis(0), 0).to_owned().into_dimensionality::<Ix2>()?)
        }
        n => Err(RegridError::invalid_vertical(format!(
            "expected surface pressure shaped (lat, lon) or (time, lat, lon), got {n} dimensions"
        ))),
    }
}
