//! Configuration file support.
//!
//! An optional `mixdown.toml` next to the project file can override the
//! working directories and the run policy:
//!
//! ```toml
//! [dirs]
//! build = "mdBuild"
//! download = "mdDownload"
//! install = "/opt/stack"
//! log = "mdLogFiles"
//!
//! [run]
//! policy = "keep-going"
//! clean_after = true
//! ```
//!
//! Command-line flags take precedence over the file.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Name of the optional config file looked up next to the project file.
pub const CONFIG_FILE_NAME: &str = "mixdown.toml";

/// Run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Working directories
    pub dirs: DirConfig,

    /// Run behaviour
    pub run: RunConfig,
}

/// Working directories shared by every target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirConfig {
    /// Unpacked and checked-out sources
    pub build: PathBuf,

    /// Downloaded files
    pub download: PathBuf,

    /// Shared install prefix
    pub install: PathBuf,

    /// Per-target step logs
    pub log: PathBuf,
}

impl Default for DirConfig {
    fn default() -> Self {
        DirConfig {
            build: PathBuf::from("mdBuild"),
            download: PathBuf::from("mdDownload"),
            install: PathBuf::from("mdInstall"),
            log: PathBuf::from("mdLogFiles"),
        }
    }
}

/// What to do with the rest of the run once a target fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop at the first failed target.
    #[default]
    FailFast,
    /// Keep building targets that do not depend on the failure.
    KeepGoing,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::FailFast => write!(f, "fail-fast"),
            FailurePolicy::KeepGoing => write!(f, "keep-going"),
        }
    }
}

/// Run behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub policy: FailurePolicy,

    /// Wipe build, download, install and log directories before running
    pub clean_before: bool,

    /// Wipe build and download directories after a fully successful run
    pub clean_after: bool,

    pub verbose: bool,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }
}

/// Path of the config file that belongs to `project_file`.
pub fn config_path_for(project_file: &Path) -> PathBuf {
    project_file
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(CONFIG_FILE_NAME)
}

/// Load the config that sits next to `project_file`, or defaults.
pub fn load_config(project_file: &Path) -> Config {
    Config::load_or_default(&config_path_for(project_file))
}
