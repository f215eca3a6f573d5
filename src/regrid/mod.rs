//! Sparse-weight regridding
//!
//! A [`WeightTable`] holds a precomputed remapping operator between two grids,
//! read once per grid pair; [`SparseRegridder`] applies it to any number of fields.
//!
//! # Organization
//!
//! - [`weights`]: sparse operator, destination mask and destination grid
//! - [`apply`]: the regridder itself (masking, batching, reshaping)

pub mod apply;
pub mod weights;

pub use apply::SparseRegridder;
pub use weights::{DestinationGrid, DestinationMask, SparseOperator, WeightTable};
