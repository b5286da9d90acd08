//! Version bump suggestions.

pub mod bump;

pub use bump::{BumpType, next_version};
