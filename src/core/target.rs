//! Target definitions - what gets built.
//!
//! A Target is one buildable source unit declared in a project. It carries
//! its origin, where its sources currently live, what the inspector found
//! out about it, and where it is in the pipeline.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::util::errors::MixDownError;

/// The build system a source tree uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectType {
    /// `configure`, `configure.in` or `configure.ac` at the tree root
    Autotools,
    /// `CMakeLists.txt` at the tree root
    CMake,
    /// Anything else
    Unknown,
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectType::Autotools => write!(f, "autotools"),
            ProjectType::CMake => write!(f, "cmake"),
            ProjectType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Dependencies discovered by inspecting a source tree.
///
/// `NotApplicable` means the inspector could not tell (the tree is not of a
/// kind it understands); `Declared(vec![])` means it could tell and found none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveredDependencies {
    NotApplicable,
    Declared(Vec<String>),
}

impl DiscoveredDependencies {
    /// The discovered names, empty when not applicable.
    pub fn names(&self) -> &[String] {
        match self {
            DiscoveredDependencies::NotApplicable => &[],
            DiscoveredDependencies::Declared(names) => names,
        }
    }

    pub fn is_applicable(&self) -> bool {
        matches!(self, DiscoveredDependencies::Declared(_))
    }
}

/// Pipeline state of a target.
///
/// Active states advance strictly in declaration order; `Failed` and
/// `Skipped` are reachable from any active state and absorb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetState {
    Pending,
    Fetched,
    Unpacked,
    Inspected,
    Configured,
    Built,
    Done,
    Failed,
    Skipped,
}

impl TargetState {
    /// The next state on success, if any.
    pub fn next(self) -> Option<TargetState> {
        match self {
            TargetState::Pending => Some(TargetState::Fetched),
            TargetState::Fetched => Some(TargetState::Unpacked),
            TargetState::Unpacked => Some(TargetState::Inspected),
            TargetState::Inspected => Some(TargetState::Configured),
            TargetState::Configured => Some(TargetState::Built),
            TargetState::Built => Some(TargetState::Done),
            TargetState::Done | TargetState::Failed | TargetState::Skipped => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TargetState::Done | TargetState::Failed | TargetState::Skipped
        )
    }

    /// True for `Failed` and `Skipped`.
    pub fn is_failure(self) -> bool {
        matches!(self, TargetState::Failed | TargetState::Skipped)
    }

    pub fn can_transition_to(self, to: TargetState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to.is_failure() || self.next() == Some(to)
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetState::Pending => "pending",
            TargetState::Fetched => "fetched",
            TargetState::Unpacked => "unpacked",
            TargetState::Inspected => "inspected",
            TargetState::Configured => "configured",
            TargetState::Built => "built",
            TargetState::Done => "done",
            TargetState::Failed => "failed",
            TargetState::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// A pipeline step. Log entries are keyed by (target, step).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Step {
    Fetch,
    Unpack,
    Inspect,
    Configure,
    Build,
    Install,
}

impl Step {
    /// Steps run by the external build collaborators, in order.
    pub const BUILD_STEPS: [Step; 3] = [Step::Configure, Step::Build, Step::Install];

    /// Lower-case name, used in log file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Fetch => "fetch",
            Step::Unpack => "unpack",
            Step::Inspect => "inspect",
            Step::Configure => "configure",
            Step::Build => "build",
            Step::Install => "install",
        }
    }

    /// Capitalized name, used in status lines.
    pub fn label(self) -> &'static str {
        match self {
            Step::Fetch => "Fetch",
            Step::Unpack => "Unpack",
            Step::Inspect => "Inspect",
            Step::Configure => "Configure",
            Step::Build => "Build",
            Step::Install => "Install",
        }
    }

    /// The state a target reaches when this step succeeds.
    pub fn completes(self) -> TargetState {
        match self {
            Step::Fetch => TargetState::Fetched,
            Step::Unpack => TargetState::Unpacked,
            Step::Inspect => TargetState::Inspected,
            Step::Configure => TargetState::Configured,
            Step::Build => TargetState::Built,
            Step::Install => TargetState::Done,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Explicit command overrides from the project declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOverrides {
    pub configure: Option<String>,
    pub build: Option<String>,
    pub install: Option<String>,
}

impl CommandOverrides {
    pub fn for_step(&self, step: Step) -> Option<&str> {
        match step {
            Step::Configure => self.configure.as_deref(),
            Step::Build => self.build.as_deref(),
            Step::Install => self.install.as_deref(),
            _ => None,
        }
    }
}

/// A buildable source unit.
#[derive(Debug, Clone)]
pub struct Target {
    name: String,
    origin: String,
    working_path: PathBuf,
    output_override: Option<PathBuf>,
    commands: CommandOverrides,
    declared_dependencies: Vec<String>,
    project_type: Option<ProjectType>,
    discovered: Option<DiscoveredDependencies>,
    install_prefix: Option<PathBuf>,
    state: TargetState,
}

impl Target {
    /// Create a pending target.
    pub fn new(name: impl Into<String>, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        Target {
            name: name.into(),
            working_path: PathBuf::from(&origin),
            origin,
            output_override: None,
            commands: CommandOverrides::default(),
            declared_dependencies: Vec::new(),
            project_type: None,
            discovered: None,
            install_prefix: None,
            state: TargetState::Pending,
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output_override = Some(output.into());
        self
    }

    pub fn with_commands(mut self, commands: CommandOverrides) -> Self {
        self.commands = commands;
        self
    }

    /// Add dependencies declared in the project file.
    pub fn with_dependencies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            push_unique_lowercase(&mut self.declared_dependencies, name.as_ref());
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-folded name used for lookups.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn working_path(&self) -> &Path {
        &self.working_path
    }

    pub fn output_override(&self) -> Option<&Path> {
        self.output_override.as_deref()
    }

    pub fn commands(&self) -> &CommandOverrides {
        &self.commands
    }

    pub fn project_type(&self) -> ProjectType {
        self.project_type.unwrap_or(ProjectType::Unknown)
    }

    pub fn discovered_dependencies(&self) -> Option<&DiscoveredDependencies> {
        self.discovered.as_ref()
    }

    pub fn declared_dependencies(&self) -> &[String] {
        &self.declared_dependencies
    }

    /// Declared and discovered dependency names, lower-cased, declared first.
    pub fn dependency_names(&self) -> Vec<String> {
        let mut names = self.declared_dependencies.clone();
        if let Some(discovered) = &self.discovered {
            for name in discovered.names() {
                push_unique_lowercase(&mut names, name);
            }
        }
        names
    }

    pub fn install_prefix(&self) -> Option<&Path> {
        self.install_prefix.as_deref()
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    /// Move to `to`, rejecting transitions the state machine does not allow.
    pub fn advance(&mut self, to: TargetState) -> Result<(), MixDownError> {
        if !self.state.can_transition_to(to) {
            return Err(MixDownError::InvalidTransition {
                target: self.name.clone(),
                from: self.state,
                to,
            });
        }
        tracing::debug!("{}: {} -> {}", self.name, self.state, to);
        self.state = to;
        Ok(())
    }

    /// Record where the sources now live after fetch/unpack.
    pub fn set_working_path(&mut self, path: impl Into<PathBuf>) {
        self.working_path = path.into();
    }

    /// Record the inspector's findings. Written once; later calls are ignored.
    pub fn set_inspection(
        &mut self,
        project_type: ProjectType,
        discovered: DiscoveredDependencies,
    ) {
        if self.project_type.is_some() {
            tracing::warn!("{}: inspection already recorded", self.name);
            return;
        }
        self.project_type = Some(project_type);
        self.discovered = Some(discovered);
    }

    pub fn set_install_prefix(&mut self, prefix: impl Into<PathBuf>) {
        self.install_prefix = Some(prefix.into());
    }
}

fn push_unique_lowercase(names: &mut Vec<String>, name: &str) {
    let name = name.trim().to_lowercase();
    if !name.is_empty() && !names.contains(&name) {
        names.push(name);
    }
}
