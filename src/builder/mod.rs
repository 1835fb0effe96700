//! Target pipeline.
//!
//! Unpacking, inspection, dependency ordering and the external
//! configure/build/install steps.

pub mod graph;
pub mod inspect;
pub mod pipeline;
pub mod steps;
pub mod unpack;

pub use graph::DependencyGraph;
pub use inspect::{inspect, Inspection};
pub use pipeline::{Pipeline, RunReport, TargetOutcome};
pub use steps::{CommandRunner, StepRunner};
pub use unpack::{ArchiveFormat, Unpacker};
