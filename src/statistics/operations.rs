//! Area- and mass-weighted spatial means of fields

use super::parallel::parallel_weighted_mean;
use crate::data_source::VariableSource;
use crate::errors::{RegridError, Result};
use crate::field::Field;
use crate::grid::AxisKind;
use crate::vertical::{horizontal_area_weights, mass_weights};
use crate::weighting::{weighting_for, Weighting};
use ndarray::{Array2, ArrayD};

/// Result of a weighted spatial mean
#[derive(Debug)]
pub struct SpatialMean {
    /// Mean per remaining leading index (e.g. per time step)
    pub data: ArrayD<f64>,
    /// Ids of the axes left after the reduction
    pub remaining_axes: Vec<String>,
    pub weighting: Weighting,
    pub variable_name: String,
}

/// Horizontal area weights for a field with latitude and longitude axes
pub fn area_weights(field: &Field) -> Result<Array2<f64>> {
    horizontal_area_weights(field)
}

/// Weighted mean of `field` over the trailing dimensions spanned by `weights`,
/// honouring the field's missing mask
pub fn weighted_mean(field: &Field, weights: &ArrayD<f64>) -> Result<ArrayD<f64>> {
    parallel_weighted_mean(&field.data, field.mask.as_ref(), weights)
}

/// Weighted mean over the field's spatial axes.
///
/// Area weighting reduces the trailing `(lat, lon)` axes; mass weighting reduces
/// the trailing `(level, lat, lon)` axes with weights from
/// [`crate::vertical::mass_weights`], reading companion variables from `source`.
pub fn spatial_mean(
    field: &Field,
    weighting: Weighting,
    source: &dyn VariableSource,
) -> Result<SpatialMean> {
    let n = field.ndim();
    let (weights, expected_trailing) = match weighting {
        Weighting::Area => (
            area_weights(field)?.into_dyn(),
            [AxisKind::Latitude, AxisKind::Longitude].as_slice(),
        ),
        Weighting::Mass => (
            mass_weights(field, source)?.into_dyn(),
            [AxisKind::Level, AxisKind::Latitude, AxisKind::Longitude].as_slice(),
        ),
    };

    let k = expected_trailing.len();
    let trailing_ok = n >= k
        && field.axes[n - k..]
            .iter()
            .zip(expected_trailing)
            .all(|(axis, kind)| axis.kind == *kind);
    if !trailing_ok {
        return Err(RegridError::MissingAxis {
            field: field.id.clone(),
            axis: format!("trailing {expected_trailing:?}"),
        });
    }

    log::debug!(
        "Computing {}-weighted mean of '{}' over its last {k} axes",
        weighting.as_str(),
        field.id
    );

    let data = weighted_mean(field, &weights)?;
    Ok(SpatialMean {
        data,
        remaining_axes: field.axes[..n - k].iter().map(|a| a.id.clone()).collect(),
        weighting,
        variable_name: format!("{}_{}_weighted_mean", field.id, weighting.as_str()),
    })
}

/// [`spatial_mean`] with the weighting chosen from the field's units and axes
pub fn auto_spatial_mean(field: &Field, source: &dyn VariableSource) -> Result<SpatialMean> {
    spatial_mean(field, weighting_for(field), source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::MemorySource;
    use crate::grid::Axis;
    use approx::assert_relative_eq;
    use ndarray::Array;

    fn time_lat_lon(values: Vec<f64>) -> Field {
        let axes = vec![
            Axis::new("time", vec![0.0, 1.0], AxisKind::Time),
            Axis::latitude(vec![-60.0, 0.0, 60.0]),
            Axis::longitude(vec![0.0, 180.0]),
        ];
        Field::new(
            "TS",
            Array::from_shape_vec((2, 3, 2), values).unwrap().into_dyn(),
            axes,
        )
        .unwrap()
        .with_units("K")
    }

    #[test]
    fn test_area_mean_of_constant() {
        let field = time_lat_lon(vec![5.0; 12]);
        let mean = spatial_mean(&field, Weighting::Area, &MemorySource::new()).unwrap();
        assert_eq!(mean.remaining_axes, vec!["time".to_string()]);
        assert_relative_eq!(mean.data[[0]], 5.0, epsilon = 1e-12);
        assert_relative_eq!(mean.data[[1]], 5.0, epsilon = 1e-12);
        assert_eq!(mean.variable_name, "TS_area_weighted_mean");
    }

    #[test]
    fn test_area_mean_favours_equator() {
        // Equatorial band is larger than the polar caps
        let field = time_lat_lon(vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        let mean = spatial_mean(&field, Weighting::Area, &MemorySource::new()).unwrap();
        assert!(mean.data[[0]] > 1.0 / 3.0);
    }

    #[test]
    fn test_weighted_mean_skips_masked() {
        let field = time_lat_lon(vec![1.0, 3.0, 1.0, 3.0, 1.0, 3.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0]);
        let mask = field.data.mapv(|v| v == 3.0);
        let field = field.with_mask(mask).unwrap();
        let weights = area_weights(&field).unwrap().into_dyn();
        let mean = weighted_mean(&field, &weights).unwrap();
        assert_relative_eq!(mean[[0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(mean[[1]], 9.0, epsilon = 1e-12);
    }

    #[test]
    fn test_auto_mean_uses_area_for_surface_field() {
        let field = time_lat_lon(vec![1.0; 12]);
        let mean = auto_spatial_mean(&field, &MemorySource::new()).unwrap();
        assert_eq!(mean.weighting, Weighting::Area);
    }

    #[test]
    fn test_mass_mean_requires_level_axis_last_three() {
        let field = time_lat_lon(vec![1.0; 12]);
        let err = spatial_mean(&field, Weighting::Mass, &MemorySource::new());
        assert!(matches!(err, Err(RegridError::MissingAxis { .. })));
    }
}
