//! Data processing and serialization.

pub mod yaml;

pub use yaml::*;
