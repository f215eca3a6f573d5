//! Choice between area and mass weighting
//!
//! Averages of 3-D atmospheric quantities that are intensive per unit mass
//! (temperatures, mass or mole ratios) should be mass weighted; everything else is
//! area weighted. The decision is made from the field's units and axes.

use crate::field::Field;
use serde_json::Value as JsonValue;

/// Temperature unit spellings
const TEMPERATURE_UNITS: &[&str] = &[
    "K",
    "deg K",
    "deg C",
    "deg F",
    "degC",
    "degF",
    "degK",
    "deg_C",
    "deg_F",
    "deg_K",
    "deg_c",
    "deg_f",
    "deg_k",
    "degreeC",
    "degreeF",
    "degreeK",
    "degree_C",
    "degree_Celsius",
    "degree_F",
    "degree_Fahrenheit",
    "degree_K",
    "degree_Kelvin",
    "degree_c",
    "degree_centigrade",
    "degree_f",
    "degree_k",
];

/// Units allowed on both sides of a `X/X` ratio
const RATIO_UNITS: &[&str] = &["kg", "g", "Pa", "hPa", "mbar", "mol", "mole"];

const PARTS_PER_UNITS: &[&str] = &["ppt", "ppm", "pptv", "ppbv", "ppmv"];

/// Attribute recording the chosen weighting on a field
pub const WEIGHTING_ATTRIBUTE: &str = "weighting";

/// Physical category of a units string, classified once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitCategory {
    Temperature,
    /// `X/X` for a mass, pressure or amount unit `X`
    SameUnitRatio,
    /// ppt, ppm, pptv, ppbv, ppmv
    PartsPer,
    /// Not in any of the tables above
    Unrecognized(String),
}

impl UnitCategory {
    pub fn classify(units: &str) -> Self {
        if TEMPERATURE_UNITS.contains(&units) {
            return Self::Temperature;
        }
        if PARTS_PER_UNITS.contains(&units) {
            return Self::PartsPer;
        }
        if let Some((num, den)) = units.split_once('/') {
            if !num.is_empty() && num == den && RATIO_UNITS.contains(&num) {
                return Self::SameUnitRatio;
            }
        }
        Self::Unrecognized(units.to_string())
    }

    /// Whether fields in this category are mass weighted when 3-D
    pub fn is_mass_weighted(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

/// Averaging method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weighting {
    Area,
    Mass,
}

impl Weighting {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Area => "area",
            Self::Mass => "mass",
        }
    }
}

/// Weighting for `field` without touching it.
///
/// Mass weighting requires more than one non-time axis, at least one of them a
/// level axis, and units in a recognized category. Anything else is area weighted.
pub fn weighting_for(field: &Field) -> Weighting {
    let spatial: Vec<_> = field.axes.iter().filter(|a| !a.is_time()).collect();
    // hyam, hybm and the like carry a level axis only
    if spatial.len() <= 1 || !spatial.iter().any(|a| a.is_level()) {
        return Weighting::Area;
    }

    match UnitCategory::classify(field.units.as_deref().unwrap_or("")) {
        UnitCategory::Unrecognized(units) => {
            log::debug!(
                "Units '{units}' of 3-D field '{}' are not in the mass-weighting tables, using area weighting",
                field.id
            );
            Weighting::Area
        }
        _ => Weighting::Mass,
    }
}

/// Choose the weighting for `field` and record it in its `weighting` attribute
pub fn choose_weighting(field: &mut Field) -> Weighting {
    let choice = weighting_for(field);
    field.attributes.insert(
        WEIGHTING_ATTRIBUTE.to_string(),
        JsonValue::String(choice.as_str().to_string()),
    );
    choice
}
