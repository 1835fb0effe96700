//! High-level operations.
//!
//! This module contains the implementation of mixdown runs.

pub mod mixdown_build;
pub mod mixdown_clean;

pub use mixdown_build::{build, build_order};
pub use mixdown_clean::{clean_after, clean_before};
