pub mod index;
pub mod neighbors;
pub mod store;
