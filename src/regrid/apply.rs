//! Application of a weight table to fields
//!
//! Every leading ("batch") index of a field, e.g. time or level, is regridded
//! independently with the same operator. Batches are fanned out over Rayon; each
//! batch owns its output row, so the products need no synchronization.

use crate::errors::{RegridError, Result};
use crate::field::Field;
use crate::grid::Axis;
use crate::parallel::ParallelConfig;
use crate::regrid::weights::{DestinationGrid, DestinationMask, WeightTable};
use ndarray::{Array2, ArrayD, ArrayView1, ArrayViewMut1, IxDyn, Zip};

/// Applies [`WeightTable`]s to fields
#[derive(Debug, Clone, Default)]
pub struct SparseRegridder {
    config: ParallelConfig,
}

impl SparseRegridder {
    pub fn new(config: ParallelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParallelConfig {
        &self.config
    }

    /// Regrid `field` with `table`.
    ///
    /// The trailing dimension of `field` must be the source grid. Missing inputs are
    /// excluded from the sums and destinations without any valid source become
    /// missing. Masked destination cells are always missing. On a regular destination
    /// the trailing dimension is reshaped into `(lat, lon)`; leading axes are kept.
    ///
    /// # Errors
    ///
    /// - `DimensionMismatch` if the trailing dimension is not `table.n_src()`
    /// - `ReshapeError` if the regular destination axes do not cover `n_dest` cells
    pub fn regrid(&self, field: &Field, table: &WeightTable) -> Result<Field> {
        let shape = field.shape();
        let n_src = table.n_src();
        let n_dest = table.n_dest();

        let spatial_len = shape.last().copied().unwrap_or(0);
        if shape.is_empty() || spatial_len != n_src {
            return Err(RegridError::DimensionMismatch {
                field: field.id.clone(),
                expected: n_src,
                actual: spatial_len,
            });
        }

        let leading = &shape[..shape.len() - 1];
        let n_batch: usize = leading.iter().product();

        let (dest_shape_tail, dest_axes_tail) = destination_layout(table)?;

        let masked = field.has_missing();
        let fill = field.missing_value();
        let input = Array2::from_shape_vec((n_batch, n_src), field.data.iter().copied().collect())?;

        let parallel = self.config.should_parallelize(n_batch);
        log::debug!(
            "Regridding '{}': {n_batch} batch slice(s), {n_src} -> {n_dest} cells, masked input: {masked}, parallel: {parallel}",
            field.id
        );

        let operator = table.operator();
        let mut output = Array2::<f64>::zeros((n_batch, n_dest));

        let mut missing = if masked {
            let valid = match &field.mask {
                Some(mask) => {
                    let flags: Vec<bool> = mask.iter().map(|&m| !m).collect();
                    Array2::from_shape_vec((n_batch, n_src), flags)?
                }
                None => Array2::from_elem((n_batch, n_src), true),
            };
            let mut contributed = Array2::from_elem((n_batch, n_dest), false);
            let kernel = |dst: ArrayViewMut1<f64>,
                          flags: ArrayViewMut1<bool>,
                          src: ArrayView1<f64>,
                          ok: ArrayView1<bool>| {
                operator.apply_masked(src, ok, dst, flags);
            };
            let zip = Zip::from(output.rows_mut())
                .and(contributed.rows_mut())
                .and(input.rows())
                .and(valid.rows());
            if parallel {
                zip.par_for_each(kernel);
            } else {
                zip.for_each(kernel);
            }
            Some(contributed.mapv(|c| !c))
        } else {
            let kernel = |dst: ArrayViewMut1<f64>, src: ArrayView1<f64>| operator.apply(src, dst);
            let zip = Zip::from(output.rows_mut()).and(input.rows());
            if parallel {
                zip.par_for_each(kernel);
            } else {
                zip.for_each(kernel);
            }
            None
        };

        if let DestinationMask::CellMask(bits) = table.mask() {
            let mask = missing.get_or_insert_with(|| Array2::from_elem((n_batch, n_dest), false));
            for mut row in mask.rows_mut() {
                for (m, &b) in row.iter_mut().zip(bits) {
                    *m |= b;
                }
            }
        }

        let mut out_shape = leading.to_vec();
        out_shape.extend(dest_shape_tail);
        let mut out_axes: Vec<Axis> = field.axes[..leading.len()].to_vec();
        out_axes.extend(dest_axes_tail);

        let data: ArrayD<f64> = output.into_shape(IxDyn(&out_shape))?;
        let mask = match missing {
            Some(m) if m.iter().any(|&v| v) => Some(m.into_shape(IxDyn(&out_shape))?),
            _ => None,
        };
        let fill_value = if masked || mask.is_some() {
            Some(fill)
        } else {
            field.fill_value
        };

        Ok(Field {
            id: field.id.clone(),
            data,
            mask,
            fill_value,
            axes: out_axes,
            units: field.units.clone(),
            attributes: field.attributes.clone(),
        })
    }

    /// Regrid several fields with one table
    pub fn regrid_all(&self, fields: &[Field], table: &WeightTable) -> Result<Vec<Field>> {
        fields.iter().map(|f| self.regrid(f, table)).collect()
    }
}

/// Trailing output shape and axes for a table's destination grid
fn destination_layout(table: &WeightTable) -> Result<(Vec<usize>, Vec<Axis>)> {
    let n_dest = table.n_dest();
    match table.grid() {
        DestinationGrid::Regular { lat, lon } => {
            if lat.len() * lon.len() != n_dest {
                return Err(RegridError::ReshapeError {
                    n_dest,
                    n_lat: lat.len(),
                    n_lon: lon.len(),
                });
            }
            Ok((vec![lat.len(), lon.len()], vec![lat.clone(), lon.clone()]))
        }
        DestinationGrid::Unstructured { .. } => {
            Ok((vec![n_dest], vec![Axis::index("ncol", n_dest)]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::AxisKind;
    use crate::regrid::weights::SparseOperator;
    use approx::assert_relative_eq;
    use ndarray::{Array, Array3};

    fn regular_table(mask_b: &[f64]) -> WeightTable {
        // 3 source cells onto a 2 x 2 lat/lon grid
        let op = SparseOperator::new(
            vec![0, 0, 1, 2, 2, 3],
            vec![0, 1, 1, 1, 2, 2],
            vec![0.5, 0.5, 1.0, 0.25, 0.75, 1.0],
            4,
            3,
        )
        .unwrap();
        WeightTable::new(
            op,
            mask_b,
            DestinationGrid::regular_from_centers(&[-45.0, -45.0, 45.0, 45.0], &[0.0, 180.0, 0.0, 180.0]),
        )
        .unwrap()
    }

    fn time_ncol_field(data: Vec<f64>, n_time: usize) -> Field {
        let n_col = data.len() / n_time;
        let time = Axis::new("time", (0..n_time).map(|t| t as f64).collect(), AxisKind::Time);
        Field::new(
            "T",
            Array::from_shape_vec((n_time, n_col), data).unwrap().into_dyn(),
            vec![time, Axis::index("ncol", n_col)],
        )
        .unwrap()
        .with_units("K")
    }

    #[test]
    fn test_regrid_ones_equals_row_sums() {
        let table = regular_table(&[1.0; 4]);
        let field = time_ncol_field(vec![1.0; 3], 1);
        let out = SparseRegridder::default().regrid(&field, &table).unwrap();

        assert_eq!(out.shape(), &[1, 2, 2]);
        let sums = table.destination_coverage();
        for (v, s) in out.data.iter().zip(sums.iter()) {
            assert_relative_eq!(*v, *s);
        }
        assert!(out.mask.is_none());
        assert_eq!(out.units.as_deref(), Some("K"));
    }

    #[test]
    fn test_regrid_is_linear() {
        let table = regular_table(&[1.0; 4]);
        let regridder = SparseRegridder::default();
        let x = time_ncol_field(vec![1.0, 2.0, 3.0, -4.0, 5.5, 0.0], 2);
        let y = time_ncol_field(vec![0.5, -1.0, 7.0, 2.0, 2.0, 2.0], 2);
        let (a, b) = (3.0, -0.5);

        let mut combo = x.clone();
        combo.data = &x.data * a + &y.data * b;

        let lhs = regridder.regrid(&combo, &table).unwrap();
        let rx = regridder.regrid(&x, &table).unwrap();
        let ry = regridder.regrid(&y, &table).unwrap();
        let rhs = &rx.data * a + &ry.data * b;
        for (l, r) in lhs.data.iter().zip(rhs.iter()) {
            assert_relative_eq!(*l, *r, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_masked_destination_always_missing() {
        let table = regular_table(&[1.0, 0.0, 1.0, 1.0]);
        let field = time_ncol_field(vec![10.0, 20.0, 30.0, 1.0, 2.0, 3.0], 2);
        let out = SparseRegridder::default().regrid(&field, &table).unwrap();

        let mask = out.mask.as_ref().unwrap();
        for t in 0..2 {
            assert!(mask[[t, 0, 1]]);
            assert!(!mask[[t, 0, 0]]);
            assert!(!mask[[t, 1, 0]]);
        }
        assert_eq!(out.fill_value, Some(crate::field::DEFAULT_FILL_VALUE));
    }

    #[test]
    fn test_missing_input_propagates() {
        let table = regular_table(&[1.0; 4]);
        let field = time_ncol_field(vec![1.0, 2.0, -999.0], 1);
        let field = Field::from_filled("T", field.data, field.axes, -999.0).unwrap();
        let out = SparseRegridder::default().regrid(&field, &table).unwrap();

        let mask = out.mask.as_ref().unwrap();
        // Cell 3 only sees source 2, which is missing
        assert!(mask[[0, 1, 1]]);
        assert!(!mask[[0, 1, 0]]);
        assert_relative_eq!(out.data[[0, 0, 0]], 1.5);
        assert_relative_eq!(out.data[[0, 1, 0]], 0.5);
        assert_eq!(out.fill_value, Some(-999.0));
        assert_eq!(out.filled()[[0, 1, 1]], -999.0);
    }

    #[test]
    fn test_nan_fill_value_drops_out() {
        let op = SparseOperator::new(vec![0, 0], vec![0, 1], vec![0.5, 0.5], 1, 2).unwrap();
        let grid = DestinationGrid::Unstructured {
            lat: Vec::new(),
            lon: Vec::new(),
        };
        let table = WeightTable::new(op, &[1.0], grid).unwrap();
        let field = time_ncol_field(vec![4.0, f64::NAN], 1);
        let field = Field::from_filled("T", field.data, field.axes, f64::NAN).unwrap();
        assert!(field.has_missing());

        let out = SparseRegridder::default().regrid(&field, &table).unwrap();
        assert_relative_eq!(out.data[[0, 0]], 2.0);
        assert!(out.mask.is_none());
    }

    #[test]
    fn test_leading_axes_preserved() {
        let table = regular_table(&[1.0; 4]);
        let data = Array3::from_shape_fn((2, 3, 3), |(t, k, c)| (t * 9 + k * 3 + c) as f64);
        let axes = vec![
            Axis::new("time", vec![0.0, 1.0], AxisKind::Time),
            Axis::new("lev", vec![1000.0, 850.0, 500.0], AxisKind::Level),
            Axis::index("ncol", 3),
        ];
        let field = Field::new("Q", data.into_dyn(), axes).unwrap();
        let out = SparseRegridder::new(ParallelConfig::with_threads(2))
            .regrid(&field, &table)
            .unwrap();

        assert_eq!(out.shape(), &[2, 3, 2, 2]);
        assert_eq!(out.axes[0].id, "time");
        assert_eq!(out.axes[1].id, "lev");
        assert_eq!(out.axes[2].kind, AxisKind::Latitude);
        assert_eq!(out.axes[3].kind, AxisKind::Longitude);
        // t=1, k=2: sources 15, 16, 17; cell 2 = 0.25 * 16 + 0.75 * 17
        assert_relative_eq!(out.data[[1, 2, 1, 0]], 16.75);
    }

    #[test]
    fn test_serial_matches_parallel() {
        let table = regular_table(&[1.0; 4]);
        let data: Vec<f64> = (0..24).map(|i| (i as f64).sin()).collect();
        let field = time_ncol_field(data, 8);
        let serial = SparseRegridder::new(ParallelConfig::serial())
            .regrid(&field, &table)
            .unwrap();
        let parallel = SparseRegridder::default().regrid(&field, &table).unwrap();
        assert_eq!(serial.data, parallel.data);
    }

    #[test]
    fn test_dimension_mismatch() {
        let table = regular_table(&[1.0; 4]);
        let field = time_ncol_field(vec![1.0; 4], 1);
        let err = SparseRegridder::default().regrid(&field, &table);
        assert!(matches!(
            err,
            Err(RegridError::DimensionMismatch {
                expected: 3,
                actual: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_reshape_error_on_incomplete_product() {
        let op = SparseOperator::new(vec![0, 1, 2], vec![0, 0, 0], vec![1.0; 3], 3, 1).unwrap();
        let table = WeightTable::new(
            op,
            &[1.0; 3],
            DestinationGrid::regular_from_centers(&[0.0, 0.0, 10.0], &[0.0, 10.0, 0.0]),
        )
        .unwrap();
        let field = time_ncol_field(vec![1.0], 1);
        let err = SparseRegridder::default().regrid(&field, &table);
        assert!(matches!(
            err,
            Err(RegridError::ReshapeError {
                n_dest: 3,
                n_lat: 2,
                n_lon: 2
            })
        ));
    }

    #[test]
    fn test_unstructured_destination_stays_flat() {
        let op = SparseOperator::new(vec![0, 1], vec![0, 1], vec![2.0, 3.0], 2, 2).unwrap();
        let table = WeightTable::new(
            op,
            &[1.0, 1.0],
            DestinationGrid::Unstructured {
                lat: vec![0.0, 1.0],
                lon: vec![0.0, 1.0],
            },
        )
        .unwrap();
        let field = time_ncol_field(vec![1.0, 1.0], 1);
        let out = SparseRegridder::default().regrid(&field, &table).unwrap();
        assert_eq!(out.shape(), &[1, 2]);
        assert_eq!(out.data.iter().copied().collect::<Vec<_>>(), vec![2.0, 3.0]);
        assert_eq!(out.axes[1].id, "ncol");
    }
}
