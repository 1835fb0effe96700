//! Target sources.
//!
//! Sources are responsible for turning a target's origin (a local path, a
//! version-control repository or a URL) into a local copy.

pub mod acquire;
pub mod download;
pub mod locator;
pub mod vcs;

pub use acquire::{Acquirer, PipelineContext};
pub use locator::{Locator, SourceKind};
pub use vcs::VcsKind;
