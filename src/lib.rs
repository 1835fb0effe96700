//! MixDown - builds a stack of third-party source packages in dependency
//! order.
//!
//! Each target is fetched from a local path, a version-control repository
//! or a URL, unpacked, inspected for its build system and the sub-packages
//! it needs, then configured, built and installed into a shared prefix.

pub mod builder;
pub mod core;
pub mod ops;
pub mod sources;
pub mod util;

/// Test utilities for mixdown unit tests.
///
/// This module is only available when compiling with `--cfg test`.
#[cfg(test)]
pub mod test_support;

pub use crate::builder::pipeline::{Pipeline, RunReport};
pub use crate::core::{project::Project, target::Target};
pub use crate::util::context::GlobalContext;
pub use crate::util::errors::MixDownError;
