//! Error types for the target pipeline.
//!
//! Every failure the pipeline can produce falls into one of four severity
//! classes (see [`ErrorKind`]). Configuration errors are always fatal and are
//! raised before any configure/build step runs; the others are tied to the
//! target whose stage produced them.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::target::{ProjectType, Step, TargetState};
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Severity class of a [`MixDownError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid project: duplicate names, cycles, unknown dependencies.
    Configuration,
    /// A source could not be located, checked out or downloaded.
    Acquisition,
    /// A source file could not be extracted.
    Unpack,
    /// An external configure/build/install step failed.
    Build,
}

/// Errors produced by the pipeline.
#[derive(Debug, Error)]
pub enum MixDownError {
    #[error("duplicate target name `{name}` (target names are case-insensitive)")]
    DuplicateTarget { name: String },

    #[error("dependency cycle detected: {}", cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("target `{target}` depends on `{dependency}`, which is not a target in this project")]
    UnresolvedDependency { target: String, dependency: String },

    #[error("given target '{origin}' does not exist")]
    TargetNotFound { origin: String },

    #[error("given {vcs} repo '{origin}' was unable to be checked out: {message}")]
    CheckoutFailed {
        vcs: &'static str,
        origin: String,
        message: String,
    },

    #[error("failed to download '{url}': {message}")]
    DownloadFailed { url: String, message: String },

    #[error("output directory '{}' already exists and is not empty", path.display())]
    OutputNotEmpty { path: PathBuf },

    #[error("output directory '{}' is inside the source tree '{}' it would be copied from", output.display(), origin.display())]
    OutputInsideOrigin { output: PathBuf, origin: PathBuf },

    #[error("given tar file '{}' not understood by the {format} reader and possibly corrupt", path.display())]
    CorruptArchive { path: PathBuf, format: &'static str },

    #[error(
        "given target '{}' not understood (directories, URLs, version-control repositories, and tar files are acceptable)",
        path.display()
    )]
    NotUnderstood { path: PathBuf },

    #[error("archive '{}' contains entry '{entry}' that escapes the output directory", path.display())]
    UnsafeArchiveEntry { path: PathBuf, entry: String },

    #[error("given path '{}' is neither a file nor a directory and cannot be unpacked", path.display())]
    NotUnpackable { path: PathBuf },

    #[error("{target}: {} failed with error code {}", step.label(), exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    StepFailed {
        target: String,
        step: Step,
        exit_code: Option<i32>,
    },

    #[error("{target}: no {step} command known for {project_type} projects; declare one in the project file")]
    CannotBuild {
        target: String,
        step: Step,
        project_type: ProjectType,
    },

    #[error("target `{target}` cannot move from {from} to {to}")]
    InvalidTransition {
        target: String,
        from: TargetState,
        to: TargetState,
    },

    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl MixDownError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MixDownError::Io {
            path: path.into(),
            source,
        }
    }

    /// The severity class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MixDownError::DuplicateTarget { .. }
            | MixDownError::DependencyCycle { .. }
            | MixDownError::UnresolvedDependency { .. }
            | MixDownError::InvalidTransition { .. } => ErrorKind::Configuration,
            MixDownError::TargetNotFound { .. }
            | MixDownError::CheckoutFailed { .. }
            | MixDownError::DownloadFailed { .. }
            | MixDownError::OutputNotEmpty { .. }
            | MixDownError::OutputInsideOrigin { .. }
            | MixDownError::Io { .. } => ErrorKind::Acquisition,
            MixDownError::CorruptArchive { .. }
            | MixDownError::NotUnderstood { .. }
            | MixDownError::UnsafeArchiveEntry { .. }
            | MixDownError::NotUnpackable { .. } => ErrorKind::Unpack,
            MixDownError::StepFailed { .. } | MixDownError::CannotBuild { .. } => {
                ErrorKind::Build
            }
        }
    }

    /// Exit code of the failed external process, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            MixDownError::StepFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string());

        match self {
            MixDownError::DuplicateTarget { name } => diag
                .with_context(format!("`{}` is declared more than once", name))
                .with_suggestion("Give each [[target]] a distinct `name`"),
            MixDownError::DependencyCycle { cycle } => diag
                .with_context(format!("cycle: {}", cycle.join(" -> ")))
                .with_suggestion("Break the cycle by removing or restructuring dependencies"),
            MixDownError::UnresolvedDependency { dependency, .. } => diag
                .with_suggestion(format!("Add a [[target]] named `{}`", dependency))
                .with_suggestion("Check the spelling of `depends_on` entries"),
            MixDownError::TargetNotFound { .. } => {
                diag.with_suggestion("Check that the origin path or URL is spelled correctly")
            }
            MixDownError::CheckoutFailed { .. } | MixDownError::DownloadFailed { .. } => {
                diag.with_suggestion(suggestions::FETCH_FAILED)
            }
            MixDownError::OutputNotEmpty { .. } => diag
                .with_suggestion("Choose an empty `output` directory")
                .with_suggestion(suggestions::CLEAN_BEFORE),
            MixDownError::OutputInsideOrigin { .. } => {
                diag.with_suggestion("Choose an `output` directory outside the target's origin")
            }
            MixDownError::CorruptArchive { .. } => diag
                .with_suggestion("Re-download the archive")
                .with_suggestion(suggestions::CLEAN_BEFORE),
            MixDownError::StepFailed { .. } => diag.with_suggestion(suggestions::READ_STEP_LOG),
            _ => diag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let cycle = MixDownError::DependencyCycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(cycle.kind(), ErrorKind::Configuration);

        let corrupt = MixDownError::CorruptArchive {
            path: PathBuf::from("foo.tar.gz"),
            format: "gzip-compressed tar",
        };
        assert_eq!(corrupt.kind(), ErrorKind::Unpack);

        let failed = MixDownError::StepFailed {
            target: "zlib".into(),
            step: Step::Build,
            exit_code: Some(2),
        };
        assert_eq!(failed.kind(), ErrorKind::Build);
        assert_eq!(failed.exit_code(), Some(2));
    }

    #[test]
    fn test_cycle_message_names_targets() {
        let err = MixDownError::DependencyCycle {
            cycle: vec!["a".into(), "b".into(), "c".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> c -> a");
    }

    #[test]
    fn test_step_failed_message() {
        let err = MixDownError::StepFailed {
            target: "zlib".into(),
            step: Step::Configure,
            exit_code: Some(1),
        };
        assert_eq!(err.to_string(), "zlib: Configure failed with error code 1");
    }

    #[test]
    fn test_diagnostic_has_suggestions() {
        let err = MixDownError::UnresolvedDependency {
            target: "app".into(),
            dependency: "libfoo".into(),
        };
        let output = err.to_diagnostic().format(false);
        assert!(output.contains("error: target `app` depends on `libfoo`"));
        assert!(output.contains("Add a [[target]] named `libfoo`"));
    }
}
