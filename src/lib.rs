//! Linear interpolation of stellar isochrone grids.
//!
//! A grid is a table of isochrone tracks sampled at irregular (age, metallicity)
//! coordinates. [`interpolator::QuickInterpolator`] estimates any tabulated quantity
//! at an arbitrary (age, metallicity) along a continuous evolution coordinate.
pub mod algorithms;
pub mod errors;
pub mod evolution;
pub mod grid;
pub mod interpolator;
pub mod serialization;
pub mod table;

pub use errors::IsoError;
pub use interpolator::{InterpolatorOptions, QuickInterpolator};
pub use table::{ColumnSchema, Table};
