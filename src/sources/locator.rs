//! Origin classification.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::sources::vcs::VcsKind;
use crate::util::errors::MixDownError;

/// URL schemes accepted as remote origins.
const URL_SCHEMES: &[&str] = &["http", "https", "ftp", "file", "git", "ssh", "svn", "hg"];

/// `user@host:path`, the scp-like form git and hg accept.
static SCP_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]+@[A-Za-z0-9.-]+:[^/\\].*$").expect("valid scp-like pattern")
});

/// What an origin turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    LocalDirectory,
    LocalFile,
    Repository(VcsKind),
    RemoteUrl,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::LocalDirectory => write!(f, "local directory"),
            SourceKind::LocalFile => write!(f, "local file"),
            SourceKind::Repository(vcs) => write!(f, "{} repository", vcs),
            SourceKind::RemoteUrl => write!(f, "URL"),
        }
    }
}

/// True if `origin` is written as a URL this tool can fetch from.
pub fn looks_like_url(origin: &str) -> bool {
    match Url::parse(origin) {
        Ok(url) => {
            URL_SCHEMES.contains(&url.scheme())
                && (url.scheme() == "file" || url.host_str().is_some())
        }
        Err(_) => SCP_LIKE.is_match(origin),
    }
}

/// Classifies origins by probing, first match wins: local directory, each
/// VCS backend in order, URL syntax, local file.
#[derive(Debug, Clone)]
pub struct Locator {
    backends: Vec<VcsKind>,
}

impl Default for Locator {
    fn default() -> Self {
        Self::new()
    }
}

impl Locator {
    /// A locator probing every known backend.
    pub fn new() -> Self {
        Locator {
            backends: VcsKind::ALL.to_vec(),
        }
    }

    /// A locator probing only `backends`, in the given order.
    pub fn with_backends(backends: impl IntoIterator<Item = VcsKind>) -> Self {
        Locator {
            backends: backends.into_iter().collect(),
        }
    }

    pub fn classify(&self, origin: &str) -> Result<SourceKind, MixDownError> {
        let path = Path::new(origin);

        let kind = if path.is_dir() {
            SourceKind::LocalDirectory
        } else if let Some(vcs) = self.backends.iter().copied().find(|vcs| vcs.detect(origin)) {
            SourceKind::Repository(vcs)
        } else if looks_like_url(origin) {
            SourceKind::RemoteUrl
        } else if path.is_file() {
            SourceKind::LocalFile
        } else {
            return Err(MixDownError::TargetNotFound {
                origin: origin.to_string(),
            });
        };

        tracing::debug!("{} classified as {}", origin, kind);
        Ok(kind)
    }
}
