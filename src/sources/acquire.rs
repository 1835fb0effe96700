//! Source acquisition.
//!
//! Each target carries a [`PipelineContext`] through fetch and unpack. A
//! stage takes the context by value and hands back the updated one, so a
//! failed stage leaves nothing half-written behind for the next.

use std::path::{Path, PathBuf};

use crate::core::target::Target;
use crate::sources::download::download;
use crate::sources::locator::{Locator, SourceKind};
use crate::util::context::GlobalContext;
use crate::util::errors::MixDownError;
use crate::util::fs::{copy_dir_all, is_non_empty_dir};

/// Where a target's sources are while they are being acquired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineContext {
    /// Target name
    pub target: String,
    /// The origin as declared
    pub origin: String,
    /// Where the sources are right now
    pub current: PathBuf,
    /// Output directory: the override, or `<build dir>/<name>`
    pub output: PathBuf,
    /// Whether `output` came from the project file
    pub output_specified: bool,
}

impl PipelineContext {
    pub fn for_target(target: &Target, ctx: &GlobalContext) -> Self {
        let (output, output_specified) = match target.output_override() {
            Some(path) => (path.to_path_buf(), true),
            None => (ctx.build_dir().join(target.name()), false),
        };
        PipelineContext {
            target: target.name().to_string(),
            origin: target.origin().to_string(),
            current: PathBuf::from(target.origin()),
            output,
            output_specified,
        }
    }
}

/// Fetches classified origins into local paths.
#[derive(Debug, Clone)]
pub struct Acquirer {
    locator: Locator,
    download_dir: PathBuf,
}

impl Acquirer {
    pub fn new(locator: Locator, download_dir: impl Into<PathBuf>) -> Self {
        Acquirer {
            locator,
            download_dir: download_dir.into(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Fetch the context's origin, returning the context with `current`
    /// pointing at the local copy.
    pub fn fetch(&self, mut cx: PipelineContext) -> Result<PipelineContext, MixDownError> {
        let kind = self.locator.classify(&cx.origin)?;
        tracing::debug!("{}: fetching {} ({})", cx.target, cx.origin, kind);

        match kind {
            SourceKind::LocalDirectory => {
                if cx.output_specified && cx.output != cx.current {
                    copy_tree(&cx.current, &cx.output)?;
                    cx.current = cx.output.clone();
                }
            }
            SourceKind::LocalFile => {}
            SourceKind::Repository(vcs) => {
                vcs.checkout(&cx.origin, &cx.output)?;
                cx.current = cx.output.clone();
            }
            SourceKind::RemoteUrl => {
                cx.current = download(&cx.origin, &self.download_dir)?;
            }
        }
        Ok(cx)
    }
}

/// Copy a local tree into an override directory, which must be absent or
/// empty and must not lie inside the tree being copied.
fn copy_tree(src: &Path, dest: &Path) -> Result<(), MixDownError> {
    if resolve(dest).starts_with(resolve(src)) {
        return Err(MixDownError::OutputInsideOrigin {
            output: dest.to_path_buf(),
            origin: src.to_path_buf(),
        });
    }
    if is_non_empty_dir(dest) {
        return Err(MixDownError::OutputNotEmpty {
            path: dest.to_path_buf(),
        });
    }
    copy_dir_all(src, dest)
        .map_err(|e| MixDownError::io(dest, std::io::Error::other(format!("{:#}", e))))
}

/// `path` with its longest existing prefix canonicalized, so a directory
/// that does not exist yet still compares correctly against real paths.
fn resolve(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return rest.iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name);
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}
