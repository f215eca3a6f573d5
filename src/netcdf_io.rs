//! NetCDF I/O for weight files, input fields and regridded output
//!
//! [`NetcdfSource`] exposes an open file through [`VariableSource`] so weight tables
//! and mass weights can read from it. [`read_field`] turns a variable into a
//! [`Field`] with its coordinate axes, and [`NetCDFWriter`] writes fields back with
//! their coordinates, fill values and attributes. [`regrid_file`] ties these together
//! and carries everything it does not regrid through to the output unchanged.

use crate::data_source::VariableSource;
use crate::errors::{RegridError, Result};
use crate::field::Field;
use crate::grid::{Axis, AxisKind};
use crate::regrid::{DestinationGrid, SparseRegridder, WeightTable};
use chrono::Utc;
use ndarray::{Array2, ArrayD, IxDyn};
use netcdf::{AttributeValue, File, FileMut, Variable, VariableMut};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the unstructured source dimension
pub const NCOL_DIM: &str = "ncol";

/// Variables in an unstructured input that are coordinates, not data
const SKIPPED_VARIABLES: &[&str] = &["lat", "lon", "area"];

/// Variables `regrid_file` writes itself for the destination grid
const DESTINATION_VARIABLES: &[&str] = &["lat", "lon", "area", "wgt"];

/// Attributes handled separately from the generic copy
const RESERVED_ATTRIBUTES: &[&str] = &["_FillValue", "missing_value", "units"];

/// On-disk element type of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    F64,
    F32,
    I32,
    I16,
    I8,
}

impl Storage {
    /// Storage of `var`, or `None` for character, string and user-defined types
    pub fn of(var: &Variable) -> Option<Self> {
        let vartype = format!("{:?}", var.vartype()).to_lowercase();
        if vartype.contains("f64") {
            Some(Self::F64)
        } else if vartype.contains("f32") {
            Some(Self::F32)
        } else if vartype.contains("i32") {
            Some(Self::I32)
        } else if vartype.contains("i16") {
            Some(Self::I16)
        } else if vartype.contains("i8") {
            Some(Self::I8)
        } else {
            None
        }
    }

    /// Storage for regridded values: single precision stays single, the rest is `f64`
    pub fn regridded(self) -> Self {
        match self {
            Self::F32 => Self::F32,
            _ => Self::F64,
        }
    }
}

/// An open NetCDF file read through [`VariableSource`]
pub struct NetcdfSource {
    file: File,
    path: PathBuf,
}

impl NetcdfSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = netcdf::open(&path)?;
        log::debug!("Opened NetCDF source {}", path.display());
        Ok(Self { file, path })
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a variable as a [`Field`]; see [`read_field`]
    pub fn read_field(&self, name: &str) -> Result<Field> {
        read_field(&self.file, name)
    }

    /// Names of variables that have `dim` among their dimensions
    pub fn variables_with_dimension(&self, dim: &str) -> Vec<String> {
        self.file
            .variables()
            .filter(|var| var.dimensions().iter().any(|d| d.name() == dim))
            .map(|var| var.name())
            .collect()
    }
}

impl VariableSource for NetcdfSource {
    fn read_array(&self, name: &str) -> Result<ArrayD<f64>> {
        let var = require_variable(&self.file, name)?;
        read_values(&var)
    }

    fn has_variable(&self, name: &str) -> bool {
        self.file.variable(name).is_some()
    }

    fn dimension_len(&self, name: &str) -> Option<usize> {
        self.file.dimension(name).map(|d| d.len())
    }

    fn global_attribute(&self, name: &str) -> Option<String> {
        match self.file.attribute(name)?.value().ok()? {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        }
    }

    fn variable_units(&self, name: &str) -> Option<String> {
        self.file
            .variable(name)
            .and_then(|var| string_attribute(&var, "units"))
    }
}

fn require_variable<'f>(file: &'f File, name: &str) -> Result<Variable<'f>> {
    file.variable(name)
        .ok_or_else(|| RegridError::VariableNotFound {
            var: name.to_string(),
        })
}

/// Whole variable as `f64`, shaped by its dimensions
fn read_values(var: &Variable) -> Result<ArrayD<f64>> {
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    let values = var.get_values::<f64, _>(..)?;
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), values)?)
}

fn string_attribute(var: &Variable, name: &str) -> Option<String> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

fn numeric_attribute(var: &Variable, name: &str) -> Option<f64> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(f64::from(v)),
        AttributeValue::Int(v) => Some(f64::from(v)),
        AttributeValue::Short(v) => Some(f64::from(v)),
        AttributeValue::Doubles(v) => v.first().copied(),
        AttributeValue::Floats(v) => v.first().map(|&x| f64::from(x)),
        _ => None,
    }
}

fn attribute_to_json(value: AttributeValue) -> Option<JsonValue> {
    let json = match value {
        AttributeValue::Str(s) => JsonValue::from(s),
        AttributeValue::Strs(ss) => JsonValue::from(ss),
        AttributeValue::Double(v) => JsonValue::from(v),
        AttributeValue::Doubles(vs) => JsonValue::from(vs),
        AttributeValue::Float(v) => JsonValue::from(f64::from(v)),
        AttributeValue::Floats(vs) => {
            JsonValue::from(vs.into_iter().map(f64::from).collect::<Vec<_>>())
        }
        AttributeValue::Int(v) => JsonValue::from(v),
        AttributeValue::Ints(vs) => JsonValue::from(vs),
        AttributeValue::Short(v) => JsonValue::from(v),
        AttributeValue::Shorts(vs) => JsonValue::from(vs),
        _ => return None,
    };
    Some(json)
}

/// Axis for dimension `dim`, from its coordinate variable when the file has one
fn read_axis(file: &File, dim: &str, len: usize) -> Result<Axis> {
    let coord = match file.variable(dim) {
        Some(var) if var.dimensions().len() == 1 && var.dimensions()[0].name() == dim => var,
        _ => return Ok(Axis::index(dim, len)),
    };

    let values = coord.get_values::<f64, _>(..)?;
    let units = string_attribute(&coord, "units");
    let designation = string_attribute(&coord, "axis");
    let kind = AxisKind::infer(dim, units.as_deref(), designation.as_deref());

    let mut axis = Axis::new(dim, values, kind);
    if let Some(units) = units {
        axis = axis.with_units(units);
    }

    if let Some(bounds_name) = string_attribute(&coord, "bounds") {
        match file.variable(&bounds_name) {
            Some(bvar) => {
                let raw = bvar.get_values::<f64, _>(..)?;
                if raw.len() == 2 * len {
                    axis = axis.with_bounds(raw.chunks_exact(2).map(|c| [c[0], c[1]]).collect());
                } else {
                    log::warn!(
                        "Ignoring bounds '{bounds_name}' of axis '{dim}': {} values for {len} cells",
                        raw.len()
                    );
                }
            }
            None => log::warn!("Bounds variable '{bounds_name}' of axis '{dim}' not found"),
        }
    }
    Ok(axis)
}

/// Read variable `name` as a [`Field`].
///
/// Each dimension becomes an [`Axis`]: from the coordinate variable of the same name
/// when present (values, `units`, `axis` designation, `bounds`), otherwise an index
/// axis. Elements equal to `_FillValue` (or `missing_value`) are masked.
pub fn read_field(file: &File, name: &str) -> Result<Field> {
    let var = require_variable(file, name)?;

    let axes = var
        .dimensions()
        .iter()
        .map(|d| read_axis(file, &d.name(), d.len()))
        .collect::<Result<Vec<_>>>()?;
    let data = read_values(&var)?;

    let fill_value =
        numeric_attribute(&var, "_FillValue").or_else(|| numeric_attribute(&var, "missing_value"));
    let mut field = match fill_value {
        Some(fill) => Field::from_filled(name, data, axes, fill)?,
        None => Field::new(name, data, axes)?,
    };

    if let Some(units) = string_attribute(&var, "units") {
        field = field.with_units(units);
    }
    for attr in var.attributes() {
        let attr_name = attr.name().to_string();
        if RESERVED_ATTRIBUTES.contains(&attr_name.as_str()) {
            continue;
        }
        match attr.value().ok().and_then(attribute_to_json) {
            Some(value) => {
                field.attributes.insert(attr_name, value);
            }
            None => log::debug!("Skipped unsupported attribute type for '{name}:{attr_name}'"),
        }
    }

    log::debug!(
        "Read '{name}' with shape {:?}, missing values: {}",
        field.shape(),
        field.has_missing()
    );
    Ok(field)
}

/// Writer for regridded fields and auxiliary arrays.
///
/// Dimensions and coordinate variables are created the first time an axis is seen;
/// later fields sharing the axis reuse them.
pub struct NetCDFWriter {
    file: FileMut,
    path: PathBuf,
    previous_history: Option<String>,
}

impl NetCDFWriter {
    /// Create `path`, replacing any existing file
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            fs::remove_file(&path)?;
        }
        let file = netcdf::create(&path)?;
        Ok(Self {
            file,
            path,
            previous_history: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy the global attributes of `source`.
    ///
    /// Its `history` is kept aside and prepended to the entry written by
    /// [`NetCDFWriter::finish`].
    pub fn copy_global_attributes(&mut self, source: &File) -> Result<()> {
        for attr in source.attributes() {
            let name = attr.name();
            match attr.value()? {
                AttributeValue::Str(history) if name == "history" => {
                    self.previous_history = Some(history);
                }
                value => {
                    self.file.add_attribute(name, value)?;
                }
            }
        }
        Ok(())
    }

    /// Copy `var` as is: dimensions, storage type, attributes and values.
    ///
    /// Returns `false` when the variable was skipped, either because its type has no
    /// [`Storage`] or because one of its dimensions already exists with another length.
    pub fn copy_variable(&mut self, var: &Variable) -> Result<bool> {
        let name = var.name();
        let Some(storage) = Storage::of(var) else {
            log::warn!("Not copying '{name}': unsupported type {:?}", var.vartype());
            return Ok(false);
        };

        let dims: Vec<(String, usize)> =
            var.dimensions().iter().map(|d| (d.name(), d.len())).collect();
        for (dim, len) in &dims {
            match self.file.dimension(dim).map(|d| d.len()) {
                Some(existing) if existing != *len => {
                    log::warn!(
                        "Not copying '{name}': dimension '{dim}' has length {len}, output has {existing}"
                    );
                    return Ok(false);
                }
                Some(_) => {}
                None => {
                    self.file.add_dimension(dim, *len)?;
                }
            }
        }
        let dim_names: Vec<&str> = dims.iter().map(|(d, _)| d.as_str()).collect();

        let mut out = match storage {
            Storage::F64 => self.file.add_variable::<f64>(&name, &dim_names)?,
            Storage::F32 => self.file.add_variable::<f32>(&name, &dim_names)?,
            Storage::I32 => self.file.add_variable::<i32>(&name, &dim_names)?,
            Storage::I16 => self.file.add_variable::<i16>(&name, &dim_names)?,
            Storage::I8 => self.file.add_variable::<i8>(&name, &dim_names)?,
        };
        for attr in var.attributes() {
            out.put_attribute(attr.name(), attr.value()?)?;
        }
        match storage {
            Storage::F64 => out.put_values(&var.get_values::<f64, _>(..)?, ..)?,
            Storage::F32 => out.put_values(&var.get_values::<f32, _>(..)?, ..)?,
            Storage::I32 => out.put_values(&var.get_values::<i32, _>(..)?, ..)?,
            Storage::I16 => out.put_values(&var.get_values::<i16, _>(..)?, ..)?,
            Storage::I8 => out.put_values(&var.get_values::<i8, _>(..)?, ..)?,
        }
        log::debug!("Copied '{name}' ({storage:?}) unchanged");
        Ok(true)
    }

    /// Add the dimension for `axis`, plus its coordinate (and bounds) variable
    /// unless it is a bare index axis.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if the dimension exists with another length.
    pub fn write_axis(&mut self, axis: &Axis) -> Result<()> {
        if let Some(existing) = self.file.dimension(&axis.id).map(|d| d.len()) {
            if existing != axis.len() {
                return Err(RegridError::DimensionMismatch {
                    field: axis.id.clone(),
                    expected: existing,
                    actual: axis.len(),
                });
            }
            return Ok(());
        }

        self.file.add_dimension(&axis.id, axis.len())?;
        if axis.kind == AxisKind::Generic && axis.units.is_none() {
            return Ok(());
        }

        let bounds_name = axis.bounds.as_ref().map(|_| format!("{}_bnds", axis.id));
        {
            let mut var = self.file.add_variable::<f64>(&axis.id, &[axis.id.as_str()])?;
            if let Some(units) = &axis.units {
                var.put_attribute("units", units.as_str())?;
            }
            if let Some(designation) = designation(axis.kind) {
                var.put_attribute("axis", designation)?;
            }
            if let Some(name) = &bounds_name {
                var.put_attribute("bounds", name.as_str())?;
            }
            var.put_values(&axis.values, ..)?;
        }

        if let (Some(name), Some(bounds)) = (bounds_name, &axis.bounds) {
            if self.file.dimension("bnds").is_none() {
                self.file.add_dimension("bnds", 2)?;
            }
            let flat: Vec<f64> = bounds.iter().flatten().copied().collect();
            let mut var = self.file.add_variable::<f64>(&name, &[axis.id.as_str(), "bnds"])?;
            var.put_values(&flat, ..)?;
        }
        Ok(())
    }

    /// Write a field with its axes, units and attributes as `f64`.
    ///
    /// Missing elements are written as the field's fill value, which is also stored
    /// as `_FillValue`.
    pub fn write_field(&mut self, field: &Field) -> Result<()> {
        self.write_field_as(field, Storage::F64)
    }

    /// [`NetCDFWriter::write_field`] with an explicit storage type.
    ///
    /// [`Storage::F32`] writes single precision values and fill value; every other
    /// storage is written as `f64`.
    pub fn write_field_as(&mut self, field: &Field, storage: Storage) -> Result<()> {
        for axis in &field.axes {
            self.write_axis(axis)?;
        }

        let dims: Vec<&str> = field.axes.iter().map(|a| a.id.as_str()).collect();
        let has_fill = field.mask.is_some() || field.fill_value.is_some();
        let filled = field.filled();

        if storage == Storage::F32 {
            let mut var = self.file.add_variable::<f32>(&field.id, &dims)?;
            if has_fill {
                var.put_attribute("_FillValue", field.missing_value() as f32)?;
            }
            put_field_attributes(&mut var, field)?;
            let values: Vec<f32> = filled.iter().map(|&v| v as f32).collect();
            var.put_values(&values, ..)?;
        } else {
            let mut var = self.file.add_variable::<f64>(&field.id, &dims)?;
            if has_fill {
                var.put_attribute("_FillValue", field.missing_value())?;
            }
            put_field_attributes(&mut var, field)?;
            let values: Vec<f64> = filled.iter().copied().collect();
            var.put_values(&values, ..)?;
        }
        Ok(())
    }

    /// Write an auxiliary array over existing or new index dimensions
    pub fn write_array(
        &mut self,
        name: &str,
        dims: &[&str],
        data: &ArrayD<f64>,
        units: Option<&str>,
    ) -> Result<()> {
        if dims.len() != data.ndim() {
            return Err(RegridError::DimensionMismatch {
                field: name.to_string(),
                expected: data.ndim(),
                actual: dims.len(),
            });
        }
        for (&dim, &len) in dims.iter().zip(data.shape()) {
            self.write_axis(&Axis::index(dim, len))?;
        }

        let mut var = self.file.add_variable::<f64>(name, dims)?;
        if let Some(units) = units {
            var.put_attribute("units", units)?;
        }
        let values: Vec<f64> = data.iter().copied().collect();
        var.put_values(&values, ..)?;
        Ok(())
    }

    /// Stamp the `history` attribute and close the file.
    ///
    /// The entry is appended on a new line to any history taken over with
    /// [`NetCDFWriter::copy_global_attributes`].
    pub fn finish(mut self, description: &str) -> Result<PathBuf> {
        let entry = format!("{description} by ne_regrid on {}", Utc::now().to_rfc3339());
        let history = match self.previous_history.take() {
            Some(previous) if !previous.trim().is_empty() => format!("{previous}\n{entry}"),
            _ => entry,
        };
        self.file.add_attribute("history", history)?;
        Ok(self.path)
    }
}

/// Units and free-form attributes of `field` onto `var`
fn put_field_attributes(var: &mut VariableMut, field: &Field) -> Result<()> {
    if let Some(units) = &field.units {
        var.put_attribute("units", units.as_str())?;
    }
    for (name, value) in &field.attributes {
        if RESERVED_ATTRIBUTES.contains(&name.as_str()) {
            continue;
        }
        match value {
            JsonValue::String(s) => {
                var.put_attribute(name, s.as_str())?;
            }
            JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) if i32::try_from(i).is_ok() => {
                    var.put_attribute(name, i as i32)?;
                }
                (_, Some(f)) => {
                    var.put_attribute(name, f)?;
                }
                _ => {}
            },
            JsonValue::Array(items) => {
                let numbers: Option<Vec<f64>> = items.iter().map(JsonValue::as_f64).collect();
                match numbers {
                    Some(numbers) if !numbers.is_empty() => {
                        var.put_attribute(name, numbers)?;
                    }
                    _ => log::debug!("Skipped non-numeric array attribute '{}:{name}'", field.id),
                }
            }
            _ => log::debug!("Skipped unsupported attribute '{}:{name}'", field.id),
        }
    }
    Ok(())
}

fn designation(kind: AxisKind) -> Option<&'static str> {
    match kind {
        AxisKind::Longitude => Some("X"),
        AxisKind::Latitude => Some("Y"),
        AxisKind::Level => Some("Z"),
        AxisKind::Time => Some("T"),
        AxisKind::Generic => None,
    }
}

/// Latitude weights `sin(upper) - sin(lower)` and normalized `(lat, lon)` cell areas
pub fn regular_grid_weights(lat: &Axis, lon: &Axis) -> (Vec<f64>, Array2<f64>) {
    let wgt = lat.cell_weights();
    let lon_w = lon.cell_weights();
    let mut area = Array2::from_shape_fn((wgt.len(), lon_w.len()), |(j, i)| wgt[j] * lon_w[i]);
    let total = area.sum();
    if total > 0.0 {
        area /= total;
    }
    (wgt, area)
}

/// Regrid the unstructured variables of `input` into a new file at `output`.
///
/// With `variables` set, those are regridded; otherwise every variable with an
/// `ncol` dimension. `lat`, `lon` and `area` are never regridded, and requested names
/// that are absent or have no `ncol` dimension are skipped with a warning.
///
/// Every variable without an `ncol` dimension (`P0`, `hyai`, `hybi`, `time_bnds`, ...)
/// is copied unchanged, as are the global attributes; the input `history` is extended.
/// Regridded variables keep single precision when stored that way. On a regular
/// destination the latitude weights `wgt` and normalized cell areas `area` are
/// written as well. Returns the names of the regridded variables.
pub fn regrid_file(
    input: &Path,
    table: &WeightTable,
    regridder: &SparseRegridder,
    output: &Path,
    variables: Option<&[&str]>,
) -> Result<Vec<String>> {
    let source = NetcdfSource::open(input)?;
    let unstructured = source.variables_with_dimension(NCOL_DIM);
    let names: Vec<String> = match variables {
        Some(requested) => requested
            .iter()
            .filter(|name| {
                if SKIPPED_VARIABLES.contains(*name) {
                    log::warn!("Not regridding coordinate variable '{name}'");
                    false
                } else if !source.has_variable(name) {
                    log::warn!("Requested variable '{name}' not found in {}", input.display());
                    false
                } else if !unstructured.iter().any(|u| u.as_str() == **name) {
                    log::warn!("'{name}' has no '{NCOL_DIM}' dimension, copying it unchanged");
                    false
                } else {
                    true
                }
            })
            .map(|name| name.to_string())
            .collect(),
        None => unstructured
            .iter()
            .filter(|name| !SKIPPED_VARIABLES.contains(&name.as_str()))
            .cloned()
            .collect(),
    };

    log::info!(
        "Regridding {} variable(s) from {} to {}",
        names.len(),
        input.display(),
        output.display()
    );

    let destination_dims: Vec<&str> = match table.grid() {
        DestinationGrid::Regular { lat, lon } => vec![lat.id.as_str(), lon.id.as_str()],
        DestinationGrid::Unstructured { .. } => vec![NCOL_DIM],
    };

    let mut writer = NetCDFWriter::create(output)?;
    writer.copy_global_attributes(source.file())?;

    let mut copied = 0;
    for var in source.file().variables() {
        let name = var.name();
        if unstructured.contains(&name) || DESTINATION_VARIABLES.contains(&name.as_str()) {
            continue;
        }
        if var
            .dimensions()
            .iter()
            .any(|d| destination_dims.contains(&d.name().as_str()))
        {
            log::warn!("Not copying '{name}': it uses a destination grid dimension");
            continue;
        }
        if writer.copy_variable(&var)? {
            copied += 1;
        }
    }
    log::debug!("Copied {copied} variable(s) without an '{NCOL_DIM}' dimension");

    let mut written = Vec::with_capacity(names.len());
    for name in names {
        let var = require_variable(source.file(), &name)?;
        let storage = Storage::of(&var).map_or(Storage::F64, Storage::regridded);
        let field = source.read_field(&name)?;
        let regridded = regridder.regrid(&field, table)?;
        writer.write_field_as(&regridded, storage)?;
        written.push(name);
    }

    match table.grid() {
        DestinationGrid::Regular { lat, lon } => {
            writer.write_axis(lat)?;
            writer.write_axis(lon)?;
            let (wgt, area) = regular_grid_weights(lat, lon);
            let wgt = ArrayD::from_shape_vec(IxDyn(&[wgt.len()]), wgt)?;
            writer.write_array("wgt", &[lat.id.as_str()], &wgt, None)?;
            writer.write_array(
                "area",
                &[lat.id.as_str(), lon.id.as_str()],
                &area.into_dyn(),
                None,
            )?;
        }
        DestinationGrid::Unstructured { lat, lon }
            if lat.len() == table.n_dest() && lon.len() == table.n_dest() =>
        {
            let n = table.n_dest();
            let lat = ArrayD::from_shape_vec(IxDyn(&[n]), lat.clone())?;
            let lon = ArrayD::from_shape_vec(IxDyn(&[n]), lon.clone())?;
            writer.write_array("lat", &[NCOL_DIM], &lat, Some("degrees_north"))?;
            writer.write_array("lon", &[NCOL_DIM], &lon, Some("degrees_east"))?;
        }
        DestinationGrid::Unstructured { .. } => {}
    }

    let description = format!(
        "Regridded from {} with {}",
        input.display(),
        table.method().unwrap_or("sparse weights")
    );
    writer.finish(&description)?;
    Ok(written)
}
