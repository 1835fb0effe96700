//! Core data structures.
//!
//! - Targets, their pipeline state and the steps that move them along
//! - Projects, the ordered set of targets read from a project file

pub mod project;
pub mod target;

pub use project::Project;
pub use target::{ProjectType, Step, Target, TargetState};
