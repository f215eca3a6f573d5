//! Data source abstraction for weight files and companion variables
//!
//! Weight tables and the vertical mass model read named arrays (`S`, `row`, `PS`,
//! `hyai`, ...) from whatever store the caller opened. [`VariableSource`] is that
//! seam; [`crate::netcdf_io::NetcdfSource`] implements it over a NetCDF file and
//! [`MemorySource`] over in-memory arrays.

use crate::errors::{RegridError, Result};
use ndarray::{Array1, ArrayD};
use std::collections::HashMap;

/// Named array reads from a single originating data source
pub trait VariableSource {
    /// Read a whole variable as `f64`
    fn read_array(&self, name: &str) -> Result<ArrayD<f64>>;

    fn has_variable(&self, name: &str) -> bool;

    /// Length of a named dimension, if the source defines it
    fn dimension_len(&self, name: &str) -> Option<usize>;

    /// Global string attribute, if present
    fn global_attribute(&self, name: &str) -> Option<String>;

    /// `units` attribute of a variable, if present
    fn variable_units(&self, name: &str) -> Option<String>;

    /// Global string attribute that must be present
    fn require_global_attribute(&self, name: &str) -> Result<String> {
        self.global_attribute(name)
            .ok_or_else(|| RegridError::AttributeNotFound {
                attr: name.to_string(),
            })
    }

    /// Read a variable flattened to a vector
    fn read_vec(&self, name: &str) -> Result<Vec<f64>> {
        Ok(self.read_array(name)?.iter().copied().collect())
    }

    /// Read a variable that must hold a single value
    fn read_scalar(&self, name: &str) -> Result<f64> {
        let values = self.read_vec(name)?;
        match values.as_slice() {
            [v] => Ok(*v),
            _ => Err(RegridError::DimensionMismatch {
                field: name.to_string(),
                expected: 1,
                actual: values.len(),
            }),
        }
    }
}

/// In-memory [`VariableSource`]
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    variables: HashMap<String, (ArrayD<f64>, Option<String>)>,
    dimensions: HashMap<String, usize>,
    attributes: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_array(mut self, name: impl Into<String>, data: ArrayD<f64>) -> Self {
        self.variables.insert(name.into(), (data, None));
        self
    }

    #[must_use]
    pub fn with_vec(self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.with_array(name, Array1::from(values).into_dyn())
    }

    #[must_use]
    pub fn with_scalar(self, name: impl Into<String>, value: f64) -> Self {
        self.with_vec(name, vec![value])
    }

    #[must_use]
    pub fn with_units(mut self, name: &str, units: impl Into<String>) -> Self {
        if let Some(entry) = self.variables.get_mut(name) {
            entry.1 = Some(units.into());
        }
        self
    }

    #[must_use]
    pub fn with_dimension(mut self, name: impl Into<String>, len: usize) -> Self {
        self.dimensions.insert(name.into(), len);
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

impl VariableSource for MemorySource {
    fn read_array(&self, name: &str) -> Result<ArrayD<f64>> {
        self.variables
            .get(name)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| RegridError::VariableNotFound {
                var: name.to_string(),
            })
    }

    fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    fn dimension_len(&self, name: &str) -> Option<usize> {
        self.dimensions.get(name).copied()
    }

    fn global_attribute(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }

    fn variable_units(&self, name: &str) -> Option<String> {
        self.variables.get(name).and_then(|(_, units)| units.clone())
    }
}
