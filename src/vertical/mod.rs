//! Atmospheric air-mass weights
//!
//! Mass weighting multiplies the horizontal cell area by `rhodz`, the air mass per
//! unit area in each layer (kg/m²). `rhodz` comes from hybrid-sigma coefficients
//! (`PS`, `P0`, `hyai`, `hybi`) when the field's level axis is in model levels, or
//! from the level axis itself when it is in pressure units.
//!
//! # Organization
//!
//! - [`hybrid`]: interface pressures from hybrid coefficients
//! - [`plevel`]: interface pressures from a pressure-level axis

pub mod hybrid;
pub mod plevel;

pub use hybrid::{rhodz_from_hybrid, surface_pressure_slice};
pub use plevel::{interp_extrap_to_one_more_level, rhodz_from_plevel, PressureLevelMass};

use crate::data_source::VariableSource;
use crate::errors::{RegridError, Result};
use crate::field::Field;
use crate::grid::{Axis, AxisKind};
use ndarray::{Array2, Array3};

/// Standard gravitational acceleration, m/s²
pub const GRAVITY: f64 = 9.80665;

/// How a level axis encodes the vertical coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalCoordinate {
    /// Model levels defined by hybrid coefficients in the data source
    Hybrid,
    /// Pressure levels in mbar/hPa
    Pressure,
}

impl VerticalCoordinate {
    /// Classify level-axis units.
    ///
    /// # Errors
    ///
    /// `UnsupportedVerticalCoordinate` for anything but `level` or mbar/hPa spellings.
    pub fn from_units(units: &str) -> Result<Self> {
        match units.trim() {
            "level" => Ok(Self::Hybrid),
            "millibars" | "mbar" | "hPa" => Ok(Self::Pressure),
            other => Err(RegridError::UnsupportedVerticalCoordinate {
                units: other.to_string(),
            }),
        }
    }
}

/// Check that `coefficient_levels` holds one interface more than `data_levels` has levels.
///
/// Returns 0 when compatible, otherwise the interface count mass weighting would
/// need (`data_levels.len() + 1`). Mismatches are logged, not raised.
pub fn check_compatible_levels(data_levels: &Axis, coefficient_levels: &Axis) -> usize {
    if coefficient_levels.len() == data_levels.len() + 1 {
        return 0;
    }
    log::warn!(
        "Poor levels for mass weighting: '{}' has {} levels, '{}' has {}",
        data_levels.id,
        data_levels.len(),
        coefficient_levels.id,
        coefficient_levels.len()
    );
    data_levels.len() + 1
}

/// `rhodz[level, lat, lon]` for a field, dispatching on its level-axis units.
///
/// Companion variables (`PS`, `P0`, `hyai`, `hybi`) are read from `source`, which
/// must be the data source the field came from. On pressure levels `PS` is optional
/// and only refines the ground interface.
pub fn rhodz_from_field(field: &Field, source: &dyn VariableSource) -> Result<Array3<f64>> {
    let level = field.require_axis(AxisKind::Level)?;
    let units = level.units.as_deref().unwrap_or("");

    match VerticalCoordinate::from_units(units)? {
        VerticalCoordinate::Hybrid => {
            let hybi = source.read_vec("hybi")?;
            let interfaces = Axis::new("hybi", hybi.clone(), AxisKind::Level);
            check_compatible_levels(level, &interfaces);

            let ps = surface_pressure_slice(&source.read_array("PS")?)?;
            let p0 = source.read_scalar("P0")?;
            let hyai = source.read_vec("hyai")?;
            rhodz_from_hybrid(ps.view(), p0, &hyai, &hybi)
        }
        VerticalCoordinate::Pressure => {
            let n_lat = field.require_axis(AxisKind::Latitude)?.len();
            let n_lon = field.require_axis(AxisKind::Longitude)?.len();
            let n_levels_wanted = check_compatible_levels(level, level);

            let ps = if source.has_variable("PS") {
                let scale = surface_pressure_to_pa(source.variable_units("PS").as_deref());
                Some(surface_pressure_slice(&source.read_array("PS")?)? * scale)
            } else {
                None
            };

            let mass = rhodz_from_plevel(
                level,
                n_levels_wanted,
                n_lat,
                n_lon,
                ps.as_ref().map(Array2::view),
            )?;
            Ok(mass.rhodz)
        }
    }
}

fn surface_pressure_to_pa(units: Option<&str>) -> f64 {
    match units.map(str::trim) {
        Some("millibars" | "millibar" | "mbar" | "mb" | "hPa") => 100.0,
        _ => 1.0,
    }
}

/// Multiply `rhodz` by horizontal cell areas from the field's lat/lon axes.
///
/// Latitude cells weigh `sin(upper) - sin(lower)`, longitude cells their width;
/// generic bounds are used where the axes carry none.
pub fn area_times_rhodz(field: &Field, rhodz: &Array3<f64>) -> Result<Array3<f64>> {
    let area = horizontal_area_weights(field)?;
    let (_, n_lat, n_lon) = rhodz.dim();
    if area.dim() != (n_lat, n_lon) {
        return Err(RegridError::DimensionMismatch {
            field: field.id.clone(),
            expected: area.len(),
            actual: n_lat * n_lon,
        });
    }

    let mut weights = rhodz.clone();
    for mut layer in weights.outer_iter_mut() {
        layer *= &area;
    }

    if weights.iter().all(|&w| w <= 0.0) {
        log::error!(
            "Mass weights for '{}' are all non-positive; check units of PS, P0 and the level axis",
            field.id
        );
    }
    Ok(weights)
}

/// Outer product of the field's latitude and longitude cell weights
pub fn horizontal_area_weights(field: &Field) -> Result<Array2<f64>> {
    let lat = field.require_axis(AxisKind::Latitude)?.cell_weights();
    let lon = field.require_axis(AxisKind::Longitude)?.cell_weights();
    Ok(Array2::from_shape_fn((lat.len(), lon.len()), |(j, i)| lat[j] * lon[i]))
}

/// Mass weights `[level, lat, lon]` for averaging `field`
pub fn mass_weights(field: &Field, source: &dyn VariableSource) -> Result<Array3<f64>> {
    let rhodz = rhodz_from_field(field, source)?;
    area_times_rhodz(field, &rhodz)
}
