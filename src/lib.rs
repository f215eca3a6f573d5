//! ne_regrid: sparse-weight regridding and mass-weighted averaging of climate fields
//!
//! A Rust library for mapping fields from an unstructured (spectral-element) source
//! grid onto a destination grid with precomputed sparse weights, and for computing the
//! area or air-mass weights used to average the results.
//!
//! ## Key Features
//!
//! - **Sparse Regridding**: Apply SCRIP/ESMF-style `S`, `row`, `col` weight triplets
//!   to fields of any leading shape, in parallel over batch slices
//! - **Missing Values**: Masked inputs drop out of the sums; masked destination cells
//!   are always missing
//! - **Mass Weighting**: Air mass per layer from hybrid coefficients or pressure levels
//! - **Weighting Policy**: Area vs mass weighting chosen from units and axes
//! - **NetCDF Support**: Read weight files and fields, write regridded output
//!
//! ## Module Organization
//!
//! - [`regrid`]: weight tables and the sparse regridder
//! - [`vertical`]: `rhodz` and mass weights
//! - [`weighting`]: area vs mass weighting policy
//! - [`statistics`]: weighted spatial means
//! - [`netcdf_io`]: NetCDF reading and writing
//! - [`grid`] and [`field`]: labeled axes and fields
//! - [`data_source`]: the variable source abstraction
//! - [`parallel`]: parallel processing configuration
//! - [`errors`]: centralized error handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use ne_regrid::prelude::*;
//! use std::path::Path;
//!
//! let weights = NetcdfSource::open("map_ne30np4_to_fv129x256_aave.nc").unwrap();
//! let table = WeightTable::from_source(&weights, true).unwrap();
//!
//! let regridder = SparseRegridder::new(ParallelConfig::default());
//! let written = ne_regrid::netcdf_io::regrid_file(
//!     Path::new("input_ne30.nc"),
//!     &table,
//!     &regridder,
//!     Path::new("output_fv.nc"),
//!     None,
//! )
//! .unwrap();
//! println!("Regridded {written:?}");
//! ```

pub mod data_source;
pub mod errors;
pub mod field;
pub mod grid;
pub mod netcdf_io;
pub mod parallel;
pub mod regrid;
pub mod statistics;
pub mod vertical;
pub mod weighting;

pub use data_source::{MemorySource, VariableSource};
pub use errors::{RegridError, Result};
pub use field::Field;
pub use grid::{Axis, AxisKind};
pub use parallel::{get_parallel_info, ParallelConfig, ParallelInfo};
pub use regrid::{DestinationGrid, DestinationMask, SparseOperator, SparseRegridder, WeightTable};
pub use vertical::{check_compatible_levels, mass_weights, rhodz_from_hybrid, rhodz_from_plevel};
pub use weighting::{choose_weighting, Weighting};

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::data_source::{MemorySource, VariableSource};
    pub use crate::errors::{RegridError, Result};
    pub use crate::field::Field;
    pub use crate::grid::{Axis, AxisKind};
    pub use crate::netcdf_io::{NetCDFWriter, NetcdfSource};
    pub use crate::parallel::ParallelConfig;
    pub use crate::regrid::{SparseRegridder, WeightTable};
    pub use crate::weighting::{choose_weighting, Weighting};
}
