//! Sparse remapping operators and weight tables
//!
//! Weight files in the SCRIP/ESMF convention store the operator as triplets
//! (`row`, `col`, `S`) with 1-based indices, a destination mask `mask_b` and the
//! destination cell centers `yc_b`/`xc_b`.

use crate::data_source::VariableSource;
use crate::errors::{RegridError, Result};
use crate::grid::{unique_sorted, Axis};
use ndarray::{Array1, ArrayView1, ArrayViewMut1};
use rsparse::data::{Sprs, Trpl};
use std::borrow::Cow;
use std::fmt;

/// Sparse n_dest x n_src matrix built from (row, col, coeff) triplets.
///
/// The triplets are kept for inspection; products go through the compressed
/// column form. Duplicate (row, col) pairs sum.
pub struct SparseOperator {
    rows: Vec<usize>,
    cols: Vec<usize>,
    coeffs: Vec<f64>,
    n_dest: usize,
    n_src: usize,
    matrix: Sprs<f64>,
    /// Same sparsity pattern with unit coefficients
    pattern: Sprs<f64>,
}

impl SparseOperator {
    /// Build an operator from 0-based triplets.
    ///
    /// # Errors
    ///
    /// `InvalidWeightData` if the arrays differ in length, an index is out of
    /// range, or a coefficient is not finite.
    pub fn new(
        rows: Vec<usize>,
        cols: Vec<usize>,
        coeffs: Vec<f64>,
        n_dest: usize,
        n_src: usize,
    ) -> Result<Self> {
        if rows.len() != coeffs.len() || cols.len() != coeffs.len() {
            return Err(RegridError::invalid_weights(format!(
                "S, row and col lengths differ ({}, {}, {})",
                coeffs.len(),
                rows.len(),
                cols.len()
            )));
        }
        if let Some(i) = rows.iter().position(|&r| r >= n_dest) {
            return Err(RegridError::invalid_weights(format!(
                "row[{i}] = {} outside [0, {n_dest})",
                rows[i]
            )));
        }
        if let Some(i) = cols.iter().position(|&c| c >= n_src) {
            return Err(RegridError::invalid_weights(format!(
                "col[{i}] = {} outside [0, {n_src})",
                cols[i]
            )));
        }
        if let Some(i) = coeffs.iter().position(|c| !c.is_finite()) {
            return Err(RegridError::invalid_weights(format!(
                "S[{i}] = {} is not finite",
                coeffs[i]
            )));
        }

        let matrix = compress(&rows, &cols, coeffs.clone(), n_dest, n_src);
        let pattern = compress(&rows, &cols, vec![1.0; coeffs.len()], n_dest, n_src);
        Ok(Self {
            rows,
            cols,
            coeffs,
            n_dest,
            n_src,
            matrix,
            pattern,
        })
    }

    /// Build an operator from the 1-based indices stored in weight files
    pub fn from_one_based(
        rows: &[f64],
        cols: &[f64],
        coeffs: Vec<f64>,
        n_dest: usize,
        n_src: usize,
    ) -> Result<Self> {
        let rows = to_zero_based("row", rows)?;
        let cols = to_zero_based("col", cols)?;
        Self::new(rows, cols, coeffs, n_dest, n_src)
    }

    pub fn nnz(&self) -> usize {
        self.coeffs.len()
    }

    pub fn n_dest(&self) -> usize {
        self.n_dest
    }

    pub fn n_src(&self) -> usize {
        self.n_src
    }

    /// Iterate over `(row, col, coeff)`
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.rows
            .iter()
            .zip(&self.cols)
            .zip(&self.coeffs)
            .map(|((&r, &c), &s)| (r, c, s))
    }

    /// `dst = A · src`
    pub fn apply(&self, src: ArrayView1<f64>, mut dst: ArrayViewMut1<f64>) {
        let product = mat_vec(&self.matrix, src, self.n_dest);
        for (d, v) in dst.iter_mut().zip(product) {
            *d = v;
        }
    }

    /// Like [`SparseOperator::apply`], leaving out sources where `valid` is false.
    ///
    /// `contributed[d]` is set when destination `d` has at least one valid source
    /// in its sparsity pattern.
    pub fn apply_masked(
        &self,
        src: ArrayView1<f64>,
        valid: ArrayView1<bool>,
        mut dst: ArrayViewMut1<f64>,
        mut contributed: ArrayViewMut1<bool>,
    ) {
        let cleaned: Vec<f64> = src
            .iter()
            .zip(valid.iter())
            .map(|(&v, &ok)| if ok { v } else { 0.0 })
            .collect();
        let indicator: Vec<f64> = valid.iter().map(|&ok| if ok { 1.0 } else { 0.0 }).collect();

        let zeros = vec![0.0; self.n_dest];
        let sums = rsparse::gaxpy(&self.matrix, &cleaned, &zeros);
        let hits = rsparse::gaxpy(&self.pattern, &indicator, &zeros);
        for (d, v) in dst.iter_mut().zip(sums) {
            *d = v;
        }
        for (c, h) in contributed.iter_mut().zip(hits) {
            *c = h > 0.0;
        }
    }

    /// Sum of coefficients per destination cell, i.e. the operator applied to ones
    pub fn row_sums(&self) -> Array1<f64> {
        let ones = vec![1.0; self.n_src];
        Array1::from(rsparse::gaxpy(&self.matrix, &ones, &vec![0.0; self.n_dest]))
    }
}

impl Clone for SparseOperator {
    fn clone(&self) -> Self {
        let (rows, cols) = (&self.rows, &self.cols);
        let (m, n) = (self.n_dest, self.n_src);
        Self {
            rows: rows.clone(),
            cols: cols.clone(),
            coeffs: self.coeffs.clone(),
            n_dest: m,
            n_src: n,
            matrix: compress(rows, cols, self.coeffs.clone(), m, n),
            pattern: compress(rows, cols, vec![1.0; self.nnz()], m, n),
        }
    }
}

impl PartialEq for SparseOperator {
    fn eq(&self, other: &Self) -> bool {
        self.n_dest == other.n_dest
            && self.n_src == other.n_src
            && self.rows == other.rows
            && self.cols == other.cols
            && self.coeffs == other.coeffs
    }
}

impl fmt::Debug for SparseOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseOperator")
            .field("n_dest", &self.n_dest)
            .field("n_src", &self.n_src)
            .field("nnz", &self.nnz())
            .finish()
    }
}

/// Compressed-column matrix from validated triplets
fn compress(
    rows: &[usize],
    cols: &[usize],
    values: Vec<f64>,
    n_dest: usize,
    n_src: usize,
) -> Sprs<f64> {
    let triplets = Trpl {
        m: n_dest,
        n: n_src,
        p: cols.iter().map(|&c| c as isize).collect(),
        i: rows.to_vec(),
        x: values,
    };
    let mut matrix = Sprs::new();
    matrix.from_trpl(&triplets);
    matrix
}

fn mat_vec(matrix: &Sprs<f64>, x: ArrayView1<f64>, n_rows: usize) -> Vec<f64> {
    let x: Cow<[f64]> = match x.as_slice() {
        Some(slice) => Cow::Borrowed(slice),
        None => Cow::Owned(x.to_vec()),
    };
    rsparse::gaxpy(matrix, &x, &vec![0.0; n_rows])
}

fn to_zero_based(name: &str, values: &[f64]) -> Result<Vec<usize>> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if v.is_finite() && v.fract() == 0.0 && v >= 1.0 {
                Ok(v as usize - 1)
            } else {
                Err(RegridError::invalid_weights(format!(
                    "{name}[{i}] = {v} is not a valid 1-based index"
                )))
            }
        })
        .collect()
}

/// Which destination cells are always invalid
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationMask {
    /// Every destination cell is valid
    NoMask,
    /// `true` = masked out in every output
    CellMask(Vec<bool>),
}

impl DestinationMask {
    /// Normalize a raw `mask_b` (1 = valid, 0 = invalid).
    ///
    /// All ones means no masking is needed at all.
    pub fn from_raw(mask_b: &[f64]) -> Self {
        if mask_b.iter().all(|&m| m == 1.0) {
            Self::NoMask
        } else {
            Self::CellMask(mask_b.iter().map(|&m| m == 0.0).collect())
        }
    }

    pub fn is_masked(&self, cell: usize) -> bool {
        match self {
            Self::NoMask => false,
            Self::CellMask(bits) => bits.get(cell).copied().unwrap_or(false),
        }
    }

    pub fn masked_count(&self) -> usize {
        match self {
            Self::NoMask => 0,
            Self::CellMask(bits) => bits.iter().filter(|&&b| b).count(),
        }
    }
}

/// Coordinates attached to regridded output
#[derive(Debug, Clone, PartialEq)]
pub enum DestinationGrid {
    /// Rectangular lat/lon product; output is reshaped to `(lat, lon)`
    Regular { lat: Axis, lon: Axis },
    /// Cell centers kept as-is; output stays flat
    Unstructured { lat: Vec<f64>, lon: Vec<f64> },
}

impl DestinationGrid {
    /// Derive regular axes from destination cell centers.
    ///
    /// Assumes the centers form a complete lat x lon product; this is not checked here.
    pub fn regular_from_centers(yc_b: &[f64], xc_b: &[f64]) -> Self {
        Self::Regular {
            lat: Axis::latitude(unique_sorted(yc_b)),
            lon: Axis::longitude(unique_sorted(xc_b)),
        }
    }

    pub fn is_regular(&self) -> bool {
        matches!(self, Self::Regular { .. })
    }
}

/// A sparse remapping operator plus everything needed to shape its output.
///
/// Immutable once built; share it by reference across fields and threads.
#[derive(Debug, Clone)]
pub struct WeightTable {
    operator: SparseOperator,
    mask: DestinationMask,
    grid: DestinationGrid,
    method: Option<String>,
}

impl WeightTable {
    /// Assemble a table from an operator and a raw `mask_b`.
    ///
    /// # Errors
    ///
    /// `InvalidWeightData` if `mask_b` does not have one entry per destination cell.
    pub fn new(operator: SparseOperator, mask_b: &[f64], grid: DestinationGrid) -> Result<Self> {
        if mask_b.len() != operator.n_dest() {
            return Err(RegridError::invalid_weights(format!(
                "mask_b has {} entries for {} destination cells",
                mask_b.len(),
                operator.n_dest()
            )));
        }

        let mask = DestinationMask::from_raw(mask_b);
        match &mask {
            DestinationMask::NoMask => {
                log::debug!("Destination mask is all ones, no masking needed")
            }
            DestinationMask::CellMask(_) => log::debug!(
                "Destination mask excludes {} of {} cells",
                mask.masked_count(),
                operator.n_dest()
            ),
        }

        Ok(Self {
            operator,
            mask,
            grid,
            method: None,
        })
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Read a weight table from a weight-file source.
    ///
    /// Reads `S`, `row`, `col`, `mask_b`, `yc_b`, `xc_b` and the global `map_method`.
    /// With `to_regular_grid`, destination axes are derived from the sorted unique
    /// cell centers, and a missing `yc_b`/`xc_b` is `VariableNotFound`.
    pub fn from_source(source: &dyn VariableSource, to_regular_grid: bool) -> Result<Self> {
        let coeffs = source.read_vec("S")?;
        let rows = source.read_vec("row")?;
        let cols = source.read_vec("col")?;
        let mask_b = source.read_vec("mask_b")?;
        let n_dest = mask_b.len();
        let n_src = source_cell_count(source, &cols)?;

        let operator = SparseOperator::from_one_based(&rows, &cols, coeffs, n_dest, n_src)?;

        let grid = if to_regular_grid {
            let yc_b = source.read_vec("yc_b")?;
            let xc_b = source.read_vec("xc_b")?;
            DestinationGrid::regular_from_centers(&yc_b, &xc_b)
        } else {
            DestinationGrid::Unstructured {
                lat: read_optional(source, "yc_b")?,
                lon: read_optional(source, "xc_b")?,
            }
        };

        let mut table = Self::new(operator, &mask_b, grid)?;
        table.method = source.global_attribute("map_method");

        log::info!(
            "Loaded weight table: {} nonzeros, {} source cells -> {} destination cells (method: {})",
            table.operator.nnz(),
            n_src,
            n_dest,
            table.method.as_deref().unwrap_or("unknown")
        );

        Ok(table)
    }

    pub fn operator(&self) -> &SparseOperator {
        &self.operator
    }

    pub fn mask(&self) -> &DestinationMask {
        &self.mask
    }

    pub fn grid(&self) -> &DestinationGrid {
        &self.grid
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn n_src(&self) -> usize {
        self.operator.n_src()
    }

    pub fn n_dest(&self) -> usize {
        self.operator.n_dest()
    }

    /// The operator applied to an all-ones field: coefficient sums per destination
    /// cell. Conservative weights give 1 on covered cells.
    pub fn destination_coverage(&self) -> Array1<f64> {
        self.operator.row_sums()
    }
}

fn read_optional(source: &dyn VariableSource, name: &str) -> Result<Vec<f64>> {
    if source.has_variable(name) {
        source.read_vec(name)
    } else {
        Ok(Vec::new())
    }
}

/// Source grid size: `n_a`, else the length of `mask_a`/`xc_a`, else the largest column
fn source_cell_count(source: &dyn VariableSource, cols: &[f64]) -> Result<usize> {
    if let Some(n) = source.dimension_len("n_a") {
        return Ok(n);
    }
    for name in ["mask_a", "xc_a"] {
        if source.has_variable(name) {
            return Ok(source.read_array(name)?.len());
        }
    }
    Ok(cols
        .iter()
        .filter(|c| c.is_finite() && **c >= 1.0)
        .fold(0.0_f64, |acc, &c| acc.max(c)) as usize)
}
