//! Version-control backends.
//!
//! The set of supported systems is closed, so backends are variants of
//! [`VcsKind`] rather than trait objects. Each knows how to tell whether an
//! origin belongs to it and how to check it out.

use std::fmt;
use std::path::Path;

use git2::{Direction, Remote, Repository};

use crate::builder::unpack::is_archive_name;
use crate::sources::locator::looks_like_url;
use crate::util::errors::MixDownError;
use crate::util::fs::is_non_empty_dir;
use crate::util::process::{find_executable, ProcessBuilder};

/// A version-control system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcsKind {
    Git,
    Mercurial,
    Subversion,
}

impl VcsKind {
    /// Probe order.
    pub const ALL: [VcsKind; 3] = [VcsKind::Git, VcsKind::Mercurial, VcsKind::Subversion];

    pub fn name(self) -> &'static str {
        match self {
            VcsKind::Git => "git",
            VcsKind::Mercurial => "mercurial",
            VcsKind::Subversion => "subversion",
        }
    }

    fn tool(self) -> Option<&'static str> {
        match self {
            VcsKind::Git => None,
            VcsKind::Mercurial => Some("hg"),
            VcsKind::Subversion => Some("svn"),
        }
    }

    /// Whether this backend can be used on this machine.
    pub fn is_installed(self) -> bool {
        match self.tool() {
            None => true,
            Some(tool) => find_executable(tool).is_some(),
        }
    }

    /// True if `origin` is a repository of this kind.
    ///
    /// Origins that name an archive or an existing regular file are never
    /// repositories, whatever the remote end would answer.
    pub fn detect(self, origin: &str) -> bool {
        if is_archive_origin(origin) || Path::new(origin).is_file() {
            return false;
        }

        let detected = match self {
            VcsKind::Git => detect_git(origin),
            VcsKind::Mercurial => self.probe_with_tool(&["identify", origin]),
            VcsKind::Subversion => {
                self.probe_with_tool(&["info", "--non-interactive", origin])
            }
        };
        if detected {
            tracing::debug!("{} is a {} repository", origin, self.name());
        }
        detected
    }

    /// Check `origin` out into `dest`, which must be absent or empty.
    pub fn checkout(self, origin: &str, dest: &Path) -> Result<(), MixDownError> {
        if is_non_empty_dir(dest) {
            return Err(MixDownError::OutputNotEmpty {
                path: dest.to_path_buf(),
            });
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MixDownError::io(parent, e))?;
        }

        tracing::info!("Checking out {} repository {}", self.name(), origin);
        let failed = |message: String| MixDownError::CheckoutFailed {
            vcs: self.name(),
            origin: origin.to_string(),
            message,
        };

        match self {
            VcsKind::Git => Repository::clone(origin, dest)
                .map(|_| ())
                .map_err(|e| failed(e.message().to_string())),
            VcsKind::Mercurial => ProcessBuilder::new("hg")
                .args(["clone", origin])
                .arg(dest)
                .exec_and_check()
                .map(|_| ())
                .map_err(|e| failed(format!("{:#}", e))),
            VcsKind::Subversion => ProcessBuilder::new("svn")
                .args(["checkout", "--non-interactive", origin])
                .arg(dest)
                .exec_and_check()
                .map(|_| ())
                .map_err(|e| failed(format!("{:#}", e))),
        }
    }

    fn probe_with_tool(self, args: &[&str]) -> bool {
        let Some(tool) = self.tool().and_then(find_executable) else {
            return false;
        };
        ProcessBuilder::new(tool)
            .args(args)
            .exec()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An origin whose path (ignoring any query string) ends in an archive suffix.
fn is_archive_origin(origin: &str) -> bool {
    let path = origin.split(['?', '#']).next().unwrap_or(origin);
    is_archive_name(path.trim_end_matches('/'))
}

fn detect_git(origin: &str) -> bool {
    if Path::new(origin).is_dir() {
        return Repository::open(origin).is_ok();
    }
    if !looks_like_url(origin) {
        return false;
    }

    // Asking the remote for its refs is the only reliable test for
    // http(s) URLs, which serve archives and repositories alike.
    let probe = || -> Result<bool, git2::Error> {
        let mut remote = Remote::create_detached(origin)?;
        remote.connect(Direction::Fetch)?;
        let listed = remote.list().is_ok();
        remote.disconnect()?;
        Ok(listed)
    };
    probe().unwrap_or(false)
}
