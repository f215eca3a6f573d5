//! Centralized error handling for ne_regrid
//!
//! Every fallible operation in the crate returns [`Result`], whose error type is
//! [`RegridError`]. Construction errors on a `WeightTable` are fatal to that table;
//! per-field errors from regridding or mass weighting leave shared state untouched.

use thiserror::Error;

/// Main error type for regridding and mass-weighting operations
#[derive(Debug, Error)]
pub enum RegridError {
    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCDFError(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    ArrayError(#[from] ndarray::ShapeError),

    /// Malformed sparse operator or destination mask
    #[error("Invalid weight data: {message}")]
    InvalidWeightData { message: String },

    /// Field size disagrees with the operator
    #[error("Dimension mismatch: field '{field}' has spatial length {actual}, operator expects {expected}")]
    DimensionMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    /// Flat destination cannot be reshaped onto the derived lat/lon axes
    #[error("Cannot reshape {n_dest} destination cells onto a {n_lat} x {n_lon} grid")]
    ReshapeError {
        n_dest: usize,
        n_lat: usize,
        n_lon: usize,
    },

    /// Vertical axis cannot be reconciled with the requested level count
    #[error("Incompatible levels: axis has {data_levels} levels, {wanted_levels} requested")]
    IncompatibleLevels {
        data_levels: usize,
        wanted_levels: usize,
    },

    /// Level axis units are neither hybrid nor pressure
    #[error("Unsupported vertical coordinate units '{units}'")]
    UnsupportedVerticalCoordinate { units: String },

    /// Hybrid coefficients or surface pressure are malformed
    #[error("Invalid vertical data: {message}")]
    InvalidVerticalData { message: String },

    /// A field lacks an axis the operation needs
    #[error("Field '{field}' has no {axis} axis")]
    MissingAxis { field: String, axis: String },

    /// Variable not found in a data source
    #[error("Variable '{var}' not found in data source")]
    VariableNotFound { var: String },

    /// Attribute not found on a variable or file
    #[error("Attribute '{attr}' not found")]
    AttributeNotFound { attr: String },

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),
}

impl RegridError {
    pub(crate) fn invalid_weights(message: impl Into<String>) -> Self {
        Self::InvalidWeightData {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_vertical(message: impl Into<String>) -> Self {
        Self::InvalidVerticalData {
            message: message.into(),
        }
    }
}

/// Result type alias for ne_regrid operations
pub type Result<T> = std::result::Result<T, RegridError>;
