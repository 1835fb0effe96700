//! Source tree inspection.
//!
//! Works out which build system a tree uses and which other targets an
//! autotools tree declares as nested sub-packages.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::target::{DiscoveredDependencies, ProjectType};

/// Files whose presence at the tree root marks an autotools project.
pub const AUTOTOOLS_MARKERS: [&str; 3] = ["configure", "configure.in", "configure.ac"];

static CONFIG_SUBDIRS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"AC_CONFIG_SUBDIRS\(\s*\[?([^\])]*)\]?\s*\)").expect("valid AC_CONFIG_SUBDIRS pattern")
});

static GENERATED_SUBDIRS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ac_subdirs_all='([^']*)'").expect("valid ac_subdirs_all pattern")
});

/// What inspection found out about a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    pub project_type: ProjectType,
    pub dependencies: DiscoveredDependencies,
}

/// Check if a directory is an autotools project.
pub fn is_autotools_project(dir: &Path) -> bool {
    AUTOTOOLS_MARKERS.iter().any(|m| dir.join(m).is_file())
}

/// Check if a directory is a CMake project.
pub fn is_cmake_project(dir: &Path) -> bool {
    dir.join("CMakeLists.txt").is_file()
}

pub fn detect_project_type(dir: &Path) -> ProjectType {
    if is_autotools_project(dir) {
        ProjectType::Autotools
    } else if is_cmake_project(dir) {
        ProjectType::CMake
    } else {
        ProjectType::Unknown
    }
}

/// Sub-packages an autotools tree configures, lower-cased, in order of
/// first mention.
///
/// `configure.ac` and `configure.in` are read first; the generated
/// `configure` script is only consulted when neither mentions any.
pub fn dependencies(dir: &Path) -> DiscoveredDependencies {
    if !is_autotools_project(dir) {
        return DiscoveredDependencies::NotApplicable;
    }

    let mut names = Vec::new();
    for source in ["configure.ac", "configure.in"] {
        if let Some(text) = read_lossy(&dir.join(source)) {
            for caps in CONFIG_SUBDIRS.captures_iter(&text) {
                push_subdirs(&mut names, &caps[1]);
            }
        }
    }

    if names.is_empty() {
        if let Some(text) = read_lossy(&dir.join("configure")) {
            for caps in GENERATED_SUBDIRS.captures_iter(&text) {
                push_subdirs(&mut names, &caps[1]);
            }
        }
    }

    DiscoveredDependencies::Declared(names)
}

fn read_lossy(path: &Path) -> Option<String> {
    std::fs::read(path)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn push_subdirs(names: &mut Vec<String>, list: &str) {
    for token in list.split_whitespace() {
        // Shell variables and m4 quoting are not directory names.
        if token.contains(['$', '`']) {
            continue;
        }
        let token = token.trim_matches(['[', ']', '"', '\'']);
        let Some(name) = Path::new(token).file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let name = name.to_lowercase();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
}

/// The `--prefix=` value of a configure invocation.
///
/// The command is split into words the way `sh` would, so quoted prefixes
/// survive intact. Only a literal `--prefix=` word appearing after a
/// `configure` command counts; the first one wins and may be empty.
pub fn find_prefix(command: &str) -> Option<String> {
    let words = shell_words::split(command).unwrap_or_else(|e| {
        tracing::debug!("cannot split `{}` like a shell ({}), splitting on whitespace", command, e);
        command.split_whitespace().map(str::to_string).collect()
    });

    let mut words = words.into_iter();
    words.find(|word| is_configure(word))?;
    words.find_map(|word| word.strip_prefix("--prefix=").map(str::to_string))
}

fn is_configure(word: &str) -> bool {
    Path::new(word).file_name().and_then(|n| n.to_str()) == Some("configure")
}

/// Install directory named by a configure command, or `""` when it names
/// none.
pub fn install_dir(command: &str) -> String {
    find_prefix(command).unwrap_or_default()
}

/// Inspect a tree.
pub fn inspect(dir: &Path) -> Inspection {
    let inspection = Inspection {
        project_type: detect_project_type(dir),
        dependencies: dependencies(dir),
    };
    tracing::debug!(
        "{}: {} project, dependencies {:?}",
        dir.display(),
        inspection.project_type,
        inspection.dependencies
    );
    inspection
}
