//! Project declarations.
//!
//! A project file lists the targets to build, one `[[target]]` table each:
//!
//! ```toml
//! [[target]]
//! origin = "downloads/zlib-1.3.1.tar.gz"
//!
//! [[target]]
//! name = "libpng"
//! origin = "https://example.org/libpng-1.6.43.tar.gz"
//! depends_on = ["zlib-1.3.1"]
//! configure = "./configure --prefix=/opt/png --with-zlib-prefix=/opt/zlib"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::builder::unpack::archive_stem;
use crate::core::target::{CommandOverrides, Target};
use crate::sources::locator::looks_like_url;
use crate::util::errors::MixDownError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectFile {
    #[serde(default, rename = "target")]
    targets: Vec<TargetDecl>,
}

/// One `[[target]]` table as written in the project file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetDecl {
    /// Defaults to the origin's base name without archive suffix
    pub name: Option<String>,

    /// Directory, archive, URL, or repository
    pub origin: String,

    /// Explicit output directory
    pub output: Option<PathBuf>,

    pub configure: Option<String>,
    pub build: Option<String>,
    pub install: Option<String>,

    /// Targets that must be built first, in addition to discovered ones
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl TargetDecl {
    /// Turn the declaration into a pending target. Relative local paths
    /// are resolved against `base_dir`.
    pub fn into_target(self, base_dir: &Path) -> Target {
        let origin = if looks_like_url(&self.origin) || Path::new(&self.origin).is_absolute() {
            self.origin
        } else {
            base_dir.join(&self.origin).display().to_string()
        };
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_name(&origin));

        let mut target = Target::new(name, origin)
            .with_commands(CommandOverrides {
                configure: self.configure,
                build: self.build,
                install: self.install,
            })
            .with_dependencies(&self.depends_on);

        if let Some(output) = self.output {
            target = target.with_output(if output.is_absolute() {
                output
            } else {
                base_dir.join(output)
            });
        }
        target
    }
}

/// Name derived from an origin: its last path segment, without archive or
/// `.git` suffix.
pub fn default_name(origin: &str) -> String {
    let trimmed = origin.trim_end_matches(['/', '\\']);
    let base = trimmed
        .rsplit(['/', '\\', ':'])
        .next()
        .unwrap_or(trimmed);
    let base = base.split(['?', '#']).next().unwrap_or(base);
    let base = archive_stem(base);
    let base = base.strip_suffix(".git").unwrap_or(base);
    if base.is_empty() {
        origin.to_string()
    } else {
        base.to_string()
    }
}

/// An ordered set of targets with unique (case-insensitive) names.
#[derive(Debug, Clone)]
pub struct Project {
    path: Option<PathBuf>,
    targets: Vec<Target>,
}

impl Project {
    /// Load and validate a project file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read project file: {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut project = Self::parse(&contents, base_dir)
            .with_context(|| format!("invalid project file: {}", path.display()))?;
        project.path = Some(path.to_path_buf());
        Ok(project)
    }

    /// Parse project TOML, resolving relative paths against `base_dir`.
    pub fn parse(contents: &str, base_dir: &Path) -> Result<Self> {
        let file: ProjectFile = toml::from_str(contents)?;
        let targets = file
            .targets
            .into_iter()
            .map(|decl| decl.into_target(base_dir))
            .collect();
        Ok(Self::from_targets(targets)?)
    }

    /// Build a project from targets in declaration order.
    pub fn from_targets(targets: Vec<Target>) -> Result<Self, MixDownError> {
        for (i, target) in targets.iter().enumerate() {
            if targets[..i].iter().any(|t| t.matches_name(target.name())) {
                return Err(MixDownError::DuplicateTarget {
                    name: target.name().to_string(),
                });
            }
        }
        Ok(Project {
            path: None,
            targets,
        })
    }

    /// The file this project was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut [Target] {
        &mut self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Declaration index of the target called `name`, ignoring case.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.targets.iter().position(|t| t.matches_name(name))
    }

    pub fn get(&self, name: &str) -> Option<&Target> {
        self.index_of(name).map(|i| &self.targets[i])
    }
}
