//! Coordinate axes and horizontal cell weights
//!
//! An [`Axis`] is a named, monotonic coordinate with an optional set of cell
//! bounds and a designation ([`AxisKind`]). Fields carry one axis per dimension;
//! the latitude and longitude axes together form the field's horizontal grid.

/// Designation of a coordinate axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    Longitude,
    Latitude,
    Level,
    Time,
    Generic,
}

impl AxisKind {
    /// Infers a designation from CF-style metadata.
    ///
    /// The explicit `axis` attribute wins, then units, then the axis id.
    #[must_use]
    pub fn infer(id: &str, units: Option<&str>, axis_attr: Option<&str>) -> Self {
        match axis_attr.map(str::trim) {
            Some("X") => return Self::Longitude,
            Some("Y") => return Self::Latitude,
            Some("Z") => return Self::Level,
            Some("T") => return Self::Time,
            _ => {}
        }

        if let Some(units) = units {
            let units = units.trim();
            if matches!(units, "degrees_north" | "degree_north" | "degrees_N" | "degreesN") {
                return Self::Latitude;
            }
            if matches!(units, "degrees_east" | "degree_east" | "degrees_E" | "degreesE") {
                return Self::Longitude;
            }
            if units.contains(" since ") {
                return Self::Time;
            }
        }

        match id.to_ascii_lowercase().as_str() {
            "lat" | "latitude" | "y" => Self::Latitude,
            "lon" | "longitude" | "x" => Self::Longitude,
            "lev" | "ilev" | "plev" | "level" | "levels" | "z" => Self::Level,
            "time" | "t" => Self::Time,
            _ => Self::Generic,
        }
    }
}

/// A named coordinate axis
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    pub id: String,
    pub values: Vec<f64>,
    pub bounds: Option<Vec<[f64; 2]>>,
    pub units: Option<String>,
    pub kind: AxisKind,
}

impl Axis {
    /// Create an axis without bounds or units
    pub fn new(id: impl Into<String>, values: Vec<f64>, kind: AxisKind) -> Self {
        Self {
            id: id.into(),
            values,
            bounds: None,
            units: None,
            kind,
        }
    }

    /// Latitude axis in `degrees_north`
    pub fn latitude(values: Vec<f64>) -> Self {
        Self::new("lat", values, AxisKind::Latitude).with_units("degrees_north")
    }

    /// Longitude axis in `degrees_east`
    pub fn longitude(values: Vec<f64>) -> Self {
        Self::new("lon", values, AxisKind::Longitude).with_units("degrees_east")
    }

    /// Index axis `0..len` with no physical meaning, e.g. `ncol`
    pub fn index(id: impl Into<String>, len: usize) -> Self {
        Self::new(id, (0..len).map(|i| i as f64).collect(), AxisKind::Generic)
    }

    #[must_use]
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: Vec<[f64; 2]>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_level(&self) -> bool {
        self.kind == AxisKind::Level
    }

    pub fn is_time(&self) -> bool {
        self.kind == AxisKind::Time
    }

    /// Explicit bounds when present, generic bounds otherwise
    pub fn bounds_or_generic(&self) -> Vec<[f64; 2]> {
        match &self.bounds {
            Some(bounds) if bounds.len() == self.values.len() => bounds.clone(),
            _ => generic_bounds(&self.values, self.kind),
        }
    }

    /// Relative cell sizes along this axis.
    ///
    /// Latitude cells weigh `sin(upper) - sin(lower)`, longitude cells
    /// `(upper - lower) / 360`; any other axis uses bound widths directly.
    pub fn cell_weights(&self) -> Vec<f64> {
        self.bounds_or_generic()
            .iter()
            .map(|&[lo, hi]| match self.kind {
                AxisKind::Latitude => (hi.to_radians().sin() - lo.to_radians().sin()).abs(),
                AxisKind::Longitude => (hi - lo).abs() / 360.0,
                _ => (hi - lo).abs(),
            })
            .collect()
    }
}

/// Bounds at the halfway points between neighbouring values.
///
/// The first and last bounds are extrapolated outward so that each value sits at the
/// midpoint of its cell. Latitude bounds are clamped to `[-90, 90]`.
pub fn generic_bounds(values: &[f64], kind: AxisKind) -> Vec<[f64; 2]> {
    let n = values.len();
    let mut bounds = match n {
        0 => return Vec::new(),
        1 => {
            let v = values[0];
            match kind {
                AxisKind::Latitude => vec![[-90.0, 90.0]],
                AxisKind::Longitude => vec![[v - 180.0, v + 180.0]],
                _ => vec![[v, v]],
            }
        }
        _ => {
            let mut edges = Vec::with_capacity(n + 1);
            edges.push(values[0] - 0.5 * (values[1] - values[0]));
            edges.extend(values.windows(2).map(|w| 0.5 * (w[0] + w[1])));
            edges.push(values[n - 1] + 0.5 * (values[n - 1] - values[n - 2]));
            edges.windows(2).map(|e| [e[0], e[1]]).collect()
        }
    };

    if kind == AxisKind::Latitude {
        for cell in &mut bounds {
            cell[0] = cell[0].clamp(-90.0, 90.0);
            cell[1] = cell[1].clamp(-90.0, 90.0);
        }
    }
    bounds
}

/// Sorted, deduplicated copy of `values`. NaNs are dropped.
pub fn unique_sorted(values: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    out.sort_by(f64::total_cmp);
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_generic_bounds_are_centered() {
        let bounds = generic_bounds(&[1000.0, 850.0, 500.0], AxisKind::Level);
        assert_eq!(bounds, vec![[1075.0, 925.0], [925.0, 675.0], [675.0, 325.0]]);
    }

    #[test]
    fn test_latitude_bounds_clamped() {
        let bounds = generic_bounds(&[-80.0, 0.0, 80.0], AxisKind::Latitude);
        assert_eq!(bounds[0], [-90.0, -40.0]);
        assert_eq!(bounds[2], [40.0, 90.0]);
    }

    #[test]
    fn test_latitude_weights_sum_to_two() {
        let lat = Axis::latitude(vec![-67.5, -22.5, 22.5, 67.5]);
        let total: f64 = lat.cell_weights().iter().sum();
        assert_relative_eq!(total, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_infer_kind() {
        assert_eq!(AxisKind::infer("lev", Some("level"), None), AxisKind::Level);
        assert_eq!(AxisKind::infer("foo", Some("degrees_north"), None), AxisKind::Latitude);
        assert_eq!(AxisKind::infer("t", Some("days since 1850-01-01"), None), AxisKind::Time);
        assert_eq!(AxisKind::infer("ncol", None, None), AxisKind::Generic);
        assert_eq!(AxisKind::infer("ncol", None, Some("Z")), AxisKind::Level);
    }

    #[test]
    fn test_unique_sorted() {
        assert_eq!(unique_sorted(&[3.0, 1.0, 3.0, 2.0, 1.0]), vec![1.0, 2.0, 3.0]);
    }
}
