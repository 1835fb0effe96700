//! Working directory cleanup.

use std::path::Path;

use anyhow::Result;

use crate::util::context::GlobalContext;
use crate::util::fs::remove_dir_all_if_exists;

/// Wipe every working directory before a run.
pub fn clean_before(ctx: &GlobalContext) -> Result<()> {
    remove_all(&ctx.all_dirs())
}

/// Wipe the build and download directories after a successful run. The
/// install and log directories are kept.
pub fn clean_after(ctx: &GlobalContext) -> Result<()> {
    remove_all(&[ctx.build_dir(), ctx.download_dir()])
}

fn remove_all(dirs: &[&Path]) -> Result<()> {
    for dir in dirs {
        if dir.exists() {
            remove_dir_all_if_exists(dir)?;
            tracing::info!("Removed {}", dir.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::config::Config;
    use tempfile::TempDir;

    #[test]
    fn test_clean_before_removes_everything() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf(), &Config::default());
        ctx.ensure_dirs().unwrap();

        clean_before(&ctx).unwrap();
        assert!(ctx.all_dirs().iter().all(|d| !d.exists()));
    }

    #[test]
    fn test_clean_after_keeps_install_and_logs() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf(), &Config::default());
        ctx.ensure_dirs().unwrap();

        clean_after(&ctx).unwrap();
        assert!(!ctx.build_dir().exists());
        assert!(!ctx.download_dir().exists());
        assert!(ctx.install_dir().is_dir());
        assert!(ctx.log_dir().is_dir());
    }

    #[test]
    fn test_clean_missing_dirs_is_ok() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf(), &Config::default());
        clean_before(&ctx).unwrap();
    }
}
