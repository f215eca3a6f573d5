//! Labeled multi-dimensional fields with missing-value masks
//!
//! A [`Field`] is the unit of data passed through the regridder and the mass
//! weighting engine: a dense `f64` array, one [`Axis`] per dimension, an optional
//! element mask (true = missing) and the fill value used when exporting masked data.

use crate::errors::{RegridError, Result};
use crate::grid::{Axis, AxisKind};
use ndarray::{ArrayD, Zip};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Fill value used when a masked field declares none
pub const DEFAULT_FILL_VALUE: f64 = 1.0e20;

#[derive(Debug, Clone)]
pub struct Field {
    pub id: String,
    pub data: ArrayD<f64>,
    pub mask: Option<ArrayD<bool>>,
    pub fill_value: Option<f64>,
    pub axes: Vec<Axis>,
    pub units: Option<String>,
    pub attributes: HashMap<String, JsonValue>,
}

impl Field {
    /// Create an unmasked field.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the axes do not match the data shape.
    pub fn new(id: impl Into<String>, data: ArrayD<f64>, axes: Vec<Axis>) -> Result<Self> {
        let id = id.into();
        check_axes(&id, data.shape(), &axes)?;
        Ok(Self {
            id,
            data,
            mask: None,
            fill_value: None,
            axes,
            units: None,
            attributes: HashMap::new(),
        })
    }

    /// Build a field from storage where missing elements carry `fill_value`.
    ///
    /// Elements equal to the fill value (or NaN) are masked.
    pub fn from_filled(
        id: impl Into<String>,
        data: ArrayD<f64>,
        axes: Vec<Axis>,
        fill_value: f64,
    ) -> Result<Self> {
        let mask = data.mapv(|v| v == fill_value || v.is_nan());
        let mut field = Self::new(id, data, axes)?;
        field.fill_value = Some(fill_value);
        if mask.iter().any(|&m| m) {
            field.mask = Some(mask);
        }
        Ok(field)
    }

    #[must_use]
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Attach a missing mask; `mask` must have the data's shape.
    pub fn with_mask(mut self, mask: ArrayD<bool>) -> Result<Self> {
        if mask.shape() != self.data.shape() {
            return Err(RegridError::DimensionMismatch {
                field: self.id,
                expected: self.data.len(),
                actual: mask.len(),
            });
        }
        self.mask = Some(mask);
        Ok(self)
    }

    #[must_use]
    pub fn with_fill_value(mut self, fill_value: f64) -> Self {
        self.fill_value = Some(fill_value);
        self
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// True when at least one element is missing
    pub fn has_missing(&self) -> bool {
        self.mask.as_ref().is_some_and(|m| m.iter().any(|&v| v))
    }

    /// Declared fill value, or [`DEFAULT_FILL_VALUE`]
    pub fn missing_value(&self) -> f64 {
        self.fill_value.unwrap_or(DEFAULT_FILL_VALUE)
    }

    /// Data with missing elements replaced by the fill value
    pub fn filled(&self) -> ArrayD<f64> {
        let fill = self.missing_value();
        match &self.mask {
            Some(mask) => {
                let mut out = self.data.clone();
                Zip::from(&mut out).and(mask).for_each(|v, &m| {
                    if m {
                        *v = fill;
                    }
                });
                out
            }
            None => self.data.clone(),
        }
    }

    /// First axis with the given designation, with its dimension index
    pub fn axis_of_kind(&self, kind: AxisKind) -> Option<(usize, &Axis)> {
        self.axes.iter().enumerate().find(|(_, a)| a.kind == kind)
    }

    pub fn level_axis(&self) -> Option<&Axis> {
        self.axis_of_kind(AxisKind::Level).map(|(_, a)| a)
    }

    pub fn latitude(&self) -> Option<&Axis> {
        self.axis_of_kind(AxisKind::Latitude).map(|(_, a)| a)
    }

    pub fn longitude(&self) -> Option<&Axis> {
        self.axis_of_kind(AxisKind::Longitude).map(|(_, a)| a)
    }

    /// Like [`Field::axis_of_kind`] but fails with `MissingAxis`.
    pub fn require_axis(&self, kind: AxisKind) -> Result<&Axis> {
        self.axis_of_kind(kind)
            .map(|(_, a)| a)
            .ok_or_else(|| RegridError::MissingAxis {
                field: self.id.clone(),
                axis: format!("{kind:?}").to_lowercase(),
            })
    }

    /// String attribute, if present
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(JsonValue::as_str)
    }
}

fn check_axes(id: &str, shape: &[usize], axes: &[Axis]) -> Result<()> {
    if axes.len() != shape.len() {
        return Err(RegridError::DimensionMismatch {
            field: id.to_string(),
            expected: shape.len(),
            actual: axes.len(),
        });
    }
    for (axis, &len) in axes.iter().zip(shape) {
        if axis.len() != len {
            return Err(RegridError::DimensionMismatch {
                field: format!("{id}:{}", axis.id),
                expected: len,
                actual: axis.len(),
            });
        }
    }
    Ok(())
}
