//! Global context for a run.
//!
//! Holds the resolved working directories and run policy. Every directory is
//! made absolute against the working directory once, so later stages never
//! depend on the process cwd.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::util::config::{Config, FailurePolicy};
use crate::util::fs::ensure_dir;

/// Resolved directories and settings shared by every target.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    build_dir: PathBuf,
    download_dir: PathBuf,
    install_dir: PathBuf,
    log_dir: PathBuf,

    policy: FailurePolicy,
    clean_before: bool,
    clean_after: bool,
    verbose: bool,
}

impl GlobalContext {
    /// Create a context from `config`, relative to the process working directory.
    pub fn new(config: &Config) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::with_cwd(cwd, config))
    }

    /// Create a context with a specific working directory.
    pub fn with_cwd(cwd: PathBuf, config: &Config) -> Self {
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                cwd.join(p)
            }
        };

        GlobalContext {
            build_dir: resolve(&config.dirs.build),
            download_dir: resolve(&config.dirs.download),
            install_dir: resolve(&config.dirs.install),
            log_dir: resolve(&config.dirs.log),
            policy: config.run.policy,
            clean_before: config.run.clean_before,
            clean_after: config.run.clean_after,
            verbose: config.run.verbose,
        }
    }

    /// Where archives are unpacked and repositories checked out.
    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// The shared install prefix.
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn clean_before(&self) -> bool {
        self.clean_before
    }

    pub fn clean_after(&self) -> bool {
        self.clean_after
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Every working directory, in the order they are created.
    pub fn all_dirs(&self) -> [&Path; 4] {
        [
            &self.build_dir,
            &self.download_dir,
            &self.install_dir,
            &self.log_dir,
        ]
    }

    /// Create every working directory that does not exist yet.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in self.all_dirs() {
            ensure_dir(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_dirs_resolve_against_cwd() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf(), &Config::default());

        assert_eq!(ctx.build_dir(), tmp.path().join("mdBuild"));
        assert_eq!(ctx.install_dir(), tmp.path().join("mdInstall"));
        assert!(ctx.log_dir().is_absolute());
    }

    #[test]
    fn test_absolute_dirs_kept() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.dirs.install = tmp.path().join("prefix");

        let ctx = GlobalContext::with_cwd(PathBuf::from("/somewhere"), &config);
        assert_eq!(ctx.install_dir(), tmp.path().join("prefix"));
    }

    #[test]
    fn test_ensure_dirs() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf(), &Config::default());
        ctx.ensure_dirs().unwrap();

        for dir in ctx.all_dirs() {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
    }
}
