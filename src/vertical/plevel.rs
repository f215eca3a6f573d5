//! Air mass from a pressure-level axis
//!
//! Levels are ordered from the ground up, so pressure decreases with the level
//! index and layer `k` has thickness `lev[k] - lev[k + 1]`.

use super::GRAVITY;
use crate::errors::{RegridError, Result};
use crate::grid::Axis;
use ndarray::{s, Array2, Array3, ArrayView2};

/// Result of [`rhodz_from_plevel`]
#[derive(Debug, Clone)]
pub struct PressureLevelMass {
    /// `rhodz[level, lat, lon]` in kg/m²
    pub rhodz: Array3<f64>,
    /// Columns whose surface pressure does not exceed the first level, i.e. where
    /// the lowest levels are underground. `None` without surface pressure.
    pub below_surface: Option<Array2<bool>>,
}

/// Pa per unit of a pressure-level axis
pub fn pascals_per_unit(units: Option<&str>) -> Result<f64> {
    match units.map(str::trim) {
        None | Some("millibars" | "millibar" | "mbar" | "mb" | "hPa") => Ok(100.0),
        Some("Pa") => Ok(1.0),
        Some(other) => Err(RegridError::UnsupportedVerticalCoordinate {
            units: other.to_string(),
        }),
    }
}

/// Interface values interlacing `level`: `out[0] < lev[0] < out[1] < ... < out[N]`
/// (or the reverse for decreasing axes).
///
/// Uses the axis bounds when present, otherwise halfway points with the outer
/// bounds extrapolated symmetrically.
pub fn interp_extrap_to_one_more_level(level: &Axis) -> Result<Vec<f64>> {
    if level.bounds.is_none() && level.len() < 2 {
        return Err(RegridError::invalid_vertical(format!(
            "cannot derive interfaces for level axis '{}' with {} value(s) and no bounds",
            level.id,
            level.len()
        )));
    }

    let bounds = level.bounds_or_generic();
    let mut interfaces: Vec<f64> = bounds.iter().map(|b| b[0]).collect();
    if let Some(last) = bounds.last() {
        interfaces.push(last[1]);
    }
    Ok(interfaces)
}

/// Column air mass per layer from a pressure-level axis.
///
/// `n_levels_wanted` of 0 or `level.len()` uses the axis values as interfaces;
/// `level.len() + 1` synthesizes one extra interface with
/// [`interp_extrap_to_one_more_level`]. With `surface_pressure` (Pa, shaped
/// `(n_lat, n_lon)`), the ground interface of each column is replaced by the surface
/// pressure where that exceeds the first level; other columns keep the extrapolated
/// interface and are reported in [`PressureLevelMass::below_surface`].
///
/// # Errors
///
/// `IncompatibleLevels` for any other requested count.
pub fn rhodz_from_plevel(
    level: &Axis,
    n_levels_wanted: usize,
    n_lat: usize,
    n_lon: usize,
    surface_pressure: Option<ArrayView2<f64>>,
) -> Result<PressureLevelMass> {
    let to_pa = pascals_per_unit(level.units.as_deref())?;

    let interfaces = if n_levels_wanted == 0 || n_levels_wanted == level.len() {
        level.values.clone()
    } else if n_levels_wanted == level.len() + 1 {
        interp_extrap_to_one_more_level(level)?
    } else {
        return Err(RegridError::IncompatibleLevels {
            data_levels: level.len(),
            wanted_levels: n_levels_wanted,
        });
    };
    if interfaces.len() < 2 {
        return Err(RegridError::invalid_vertical(
            "pressure-level mass needs at least two interfaces",
        ));
    }

    let mut lev3d = Array3::from_shape_fn((interfaces.len(), n_lat, n_lon), |(k, _, _)| {
        interfaces[k] * to_pa
    });

    let below_surface = match surface_pressure {
        Some(ps) => {
            if ps.dim() != (n_lat, n_lon) {
                return Err(RegridError::DimensionMismatch {
                    field: "PS".to_string(),
                    expected: n_lat * n_lon,
                    actual: ps.len(),
                });
            }
            let first_level = level.values[0] * to_pa;
            let mut below = Array2::from_elem((n_lat, n_lon), false);
            for ((j, i), &p) in ps.indexed_iter() {
                if p > first_level {
                    lev3d[[0, j, i]] = p;
                } else {
                    below[[j, i]] = true;
                }
            }
            let n_below = below.iter().filter(|&&b| b).count();
            if n_below > 0 {
                log::warn!(
                    "{n_below} of {} columns have surface pressure at or below level '{}' ({} Pa); their lowest layers are underground",
                    n_lat * n_lon,
                    level.id,
                    first_level
                );
            }
            Some(below)
        }
        None => None,
    };

    let dp = &lev3d.slice(s![..-1, .., ..]) - &lev3d.slice(s![1.., .., ..]);
    Ok(PressureLevelMass {
        rhodz: dp / GRAVITY,
        below_surface,
    })
}
