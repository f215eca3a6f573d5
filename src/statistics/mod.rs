//! Weighted spatial reductions
//!
//! This module averages fields over their horizontal (and, for mass weighting,
//! vertical) axes using the weights produced by [`crate::vertical`].
//!
//! # Organization
//!
//! - [`operations`]: area/mass-weighted spatial means of fields
//! - [`parallel`]: the parallel weighted-mean kernel

pub mod operations;
pub mod parallel;

pub use operations::{area_weights, auto_spatial_mean, spatial_mean, weighted_mean, SpatialMean};
pub use parallel::parallel_weighted_mean;
