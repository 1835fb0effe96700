//! Shared utilities

pub mod config;
pub mod context;
pub mod diagnostic;
pub mod errors;
pub mod fs;
pub mod hash;
pub mod process;
pub mod runlog;

pub use config::Config;
pub use context::GlobalContext;
pub use diagnostic::Diagnostic;
pub use errors::MixDownError;
pub use runlog::{LogSink, RunLog};
