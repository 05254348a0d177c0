pub mod interpolation;
pub(crate) mod linalg;
pub mod triangulation;
