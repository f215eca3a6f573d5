//! Public-API tests for regridding, mass weighting and the weighting policy

use approx::assert_relative_eq;
use ndarray::{arr2, Array, Array2, ArrayD, IxDyn};
use ne_regrid::prelude::*;
use ne_regrid::regrid::{DestinationGrid, DestinationMask, SparseOperator};
use ne_regrid::statistics::spatial_mean;
use ne_regrid::vertical::{self, GRAVITY};
use ne_regrid::{check_compatible_levels, rhodz_from_hybrid, rhodz_from_plevel};

/// Weight-file variables for 4 source cells onto a 2 x 2 lat/lon grid
fn weight_source(mask_b: Vec<f64>) -> MemorySource {
    MemorySource::new()
        .with_vec("S", vec![1.0, 0.5, 0.5, 1.0, 0.6, 0.4])
        .with_vec("row", vec![1.0, 2.0, 2.0, 3.0, 4.0, 4.0])
        .with_vec("col", vec![1.0, 2.0, 3.0, 3.0, 4.0, 1.0])
        .with_vec("mask_b", mask_b)
        .with_vec("yc_b", vec![-45.0, -45.0, 45.0, 45.0])
        .with_vec("xc_b", vec![90.0, 270.0, 90.0, 270.0])
        .with_dimension("n_a", 4)
        .with_attribute("map_method", "Conservative remapping")
}

fn ncol_field(id: &str, data: Vec<f64>, n_time: usize) -> Field {
    let n_col = data.len() / n_time;
    let axes = vec![
        Axis::new("time", (0..n_time).map(|t| t as f64).collect(), AxisKind::Time),
        Axis::index("ncol", n_col),
    ];
    Field::new(
        id,
        Array::from_shape_vec((n_time, n_col), data).unwrap().into_dyn(),
        axes,
    )
    .unwrap()
    .with_units("K")
}

#[test]
fn test_weight_table_from_memory_source() {
    let table = WeightTable::from_source(&weight_source(vec![1.0; 4]), true).unwrap();
    assert_eq!(table.n_src(), 4);
    assert_eq!(table.n_dest(), 4);
    assert_eq!(table.operator().nnz(), 6);
    assert_eq!(table.mask(), &DestinationMask::NoMask);
    assert_eq!(table.method(), Some("Conservative remapping"));
    assert!(table.grid().is_regular());
}

#[test]
fn test_regrid_of_ones_matches_coverage() {
    let table = WeightTable::from_source(&weight_source(vec![1.0; 4]), true).unwrap();
    let regridder = SparseRegridder::new(ParallelConfig::serial());
    let out = regridder.regrid(&ncol_field("ONE", vec![1.0; 4], 1), &table).unwrap();

    assert_eq!(out.shape(), &[1, 2, 2]);
    let coverage = table.destination_coverage();
    for (value, expected) in out.data.iter().zip(coverage.iter()) {
        assert_relative_eq!(*value, *expected, epsilon = 1e-12);
    }
}

#[test]
fn test_regrid_linearity() {
    let table = WeightTable::from_source(&weight_source(vec![1.0; 4]), true).unwrap();
    let regridder = SparseRegridder::default();

    let x = vec![1.0, 2.0, 3.0, 4.0];
    let y = vec![-2.0, 0.5, 7.0, 1.0];
    let combined: Vec<f64> = x.iter().zip(&y).map(|(a, b)| 3.0 * a - 0.5 * b).collect();

    let rx = regridder.regrid(&ncol_field("X", x, 1), &table).unwrap();
    let ry = regridder.regrid(&ncol_field("Y", y, 1), &table).unwrap();
    let rc = regridder.regrid(&ncol_field("C", combined, 1), &table).unwrap();

    for ((c, a), b) in rc.data.iter().zip(rx.data.iter()).zip(ry.data.iter()) {
        assert_relative_eq!(*c, 3.0 * a - 0.5 * b, epsilon = 1e-12);
    }
}

#[test]
fn test_destination_mask_matches_mask_b() {
    let mask_b = vec![1.0, 0.0, 1.0, 0.0];
    let table = WeightTable::from_source(&weight_source(mask_b.clone()), true).unwrap();
    let regridder = SparseRegridder::default();
    let out = regridder.regrid(&ncol_field("ONE", vec![1.0; 8], 2), &table).unwrap();

    let mask = out.mask.as_ref().expect("masked destination cells");
    for t in 0..2 {
        let flat: Vec<bool> = mask
            .index_axis(ndarray::Axis(0), t)
            .iter()
            .copied()
            .collect();
        let expected: Vec<bool> = mask_b.iter().map(|&m| m == 0.0).collect();
        assert_eq!(flat, expected);
    }
}

#[test]
fn test_unstructured_table_keeps_flat_output() {
    let table = WeightTable::from_source(&weight_source(vec![1.0; 4]), false).unwrap();
    let out = SparseRegridder::default()
        .regrid(&ncol_field("T", vec![1.0, 2.0, 3.0, 4.0], 1), &table)
        .unwrap();
    assert_eq!(out.shape(), &[1, 4]);
    assert_eq!(out.axes[1].id, "ncol");
    assert_relative_eq!(out.data[[0, 1]], 2.5, epsilon = 1e-12);
}

#[test]
fn test_manual_table_with_reshape_error() {
    let op = SparseOperator::new(vec![0, 1, 2], vec![0, 1, 2], vec![1.0; 3], 3, 3).unwrap();
    let grid = DestinationGrid::Regular {
        lat: Axis::latitude(vec![-45.0, 45.0]),
        lon: Axis::longitude(vec![0.0, 180.0]),
    };
    let table = WeightTable::new(op, &[1.0; 3], grid).unwrap();
    let err = SparseRegridder::default().regrid(&ncol_field("T", vec![1.0; 3], 1), &table);
    assert!(matches!(err, Err(RegridError::ReshapeError { n_dest: 3, .. })));
}

#[test]
fn test_hybrid_single_layer_mass() {
    let ps = arr2(&[[100000.0]]);
    let rhodz = rhodz_from_hybrid(ps.view(), 100000.0, &[0.0, 0.0], &[0.0, 1.0]).unwrap();
    assert_eq!(rhodz.dim(), (1, 1, 1));
    assert_relative_eq!(rhodz[[0, 0, 0]], 10197.16, epsilon = 0.01);
}

#[test]
fn test_level_compatibility() {
    let data = Axis::new("lev", vec![0.2, 0.5, 0.9], AxisKind::Level);
    let good = Axis::new("hybi", vec![0.0, 0.3, 0.7, 1.0], AxisKind::Level);
    let bad = Axis::new("hybi", vec![0.0, 1.0], AxisKind::Level);
    assert_eq!(check_compatible_levels(&data, &good), 0);
    assert_eq!(check_compatible_levels(&data, &bad), 4);
}

#[test]
fn test_plevel_with_surface_pressure_flags_underground_columns() {
    let level =
        Axis::new("plev", vec![1000.0, 850.0, 500.0], AxisKind::Level).with_units("millibars");
    let ps: Array2<f64> = arr2(&[[101000.0, 95000.0]]);
    let mass = rhodz_from_plevel(&level, 4, 1, 2, Some(ps.view())).unwrap();

    assert_eq!(mass.rhodz.dim(), (3, 1, 2));
    // Column 0: ground interface replaced by PS; lower interface at 925 hPa
    assert_relative_eq!(mass.rhodz[[0, 0, 0]], (101000.0 - 92500.0) / GRAVITY, epsilon = 1e-9);
    let below = mass.below_surface.expect("surface flags");
    assert!(!below[[0, 0]]);
    assert!(below[[0, 1]]);
}

#[test]
fn test_weighting_policy_examples() {
    let lev_lat_lon = vec![
        Axis::new("lev", vec![1000.0, 500.0], AxisKind::Level).with_units("millibars"),
        Axis::latitude(vec![-45.0, 45.0]),
        Axis::longitude(vec![90.0, 270.0]),
    ];
    let data = ArrayD::from_elem(IxDyn(&[2, 2, 2]), 250.0);

    let mut temperature = Field::new("T", data.clone(), lev_lat_lon.clone())
        .unwrap()
        .with_units("K");
    assert_eq!(choose_weighting(&mut temperature), Weighting::Mass);

    let mut column = Field::new("TMQ", data, lev_lat_lon).unwrap().with_units("kg/m2");
    assert_eq!(choose_weighting(&mut column), Weighting::Area);

    let mut surface = Field::new(
        "TS",
        ArrayD::zeros(IxDyn(&[2, 2])),
        vec![Axis::latitude(vec![-45.0, 45.0]), Axis::longitude(vec![90.0, 270.0])],
    )
    .unwrap()
    .with_units("K");
    assert_eq!(choose_weighting(&mut surface), Weighting::Area);
}

#[test]
fn test_mass_weighted_mean_on_pressure_levels() {
    // Thicker lower layer should pull the mean towards its value
    let axes = vec![
        Axis::new("plev", vec![1000.0, 800.0, 700.0], AxisKind::Level).with_units("mbar"),
        Axis::latitude(vec![-45.0, 45.0]),
        Axis::longitude(vec![90.0, 270.0]),
    ];
    let mut values = vec![300.0; 4];
    values.extend(vec![250.0; 4]);
    values.extend(vec![200.0; 4]);
    let field = Field::new(
        "T",
        Array::from_shape_vec((3, 2, 2), values).unwrap().into_dyn(),
        axes,
    )
    .unwrap()
    .with_units("K");

    let weights = vertical::mass_weights(&field, &MemorySource::new()).unwrap();
    assert_eq!(weights.dim(), (3, 2, 2));

    let mean = spatial_mean(&field, Weighting::Mass, &MemorySource::new()).unwrap();
    let value = mean.data.iter().next().copied().unwrap();
    // Layer thicknesses 200, 150, 100 hPa
    let expected = (300.0 * 200.0 + 250.0 * 150.0 + 200.0 * 100.0) / 450.0;
    assert_relative_eq!(value, expected, epsilon = 1e-9);
}
