//! Configure, build and install steps.
//!
//! The pipeline only knows the [`StepRunner`] seam. [`CommandRunner`] is the
//! default implementation: it runs a shell command per step in the target's
//! working directory with output going to the step's log file.

use std::path::{Path, PathBuf};

use crate::core::target::{ProjectType, Step, Target};
use crate::util::errors::MixDownError;
use crate::util::process::{shell_quote, ProcessBuilder};
use crate::util::runlog::LogSink;

/// Runs one external step for a target.
pub trait StepRunner {
    fn run(&mut self, target: &Target, step: Step, log: &mut dyn LogSink)
        -> Result<(), MixDownError>;
}

/// Runs override or default shell commands.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    install_dir: PathBuf,
}

impl CommandRunner {
    /// `install_dir` is used when a target has no install prefix of its own.
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        CommandRunner {
            install_dir: install_dir.into(),
        }
    }

    fn prefix_for<'a>(&'a self, target: &'a Target) -> &'a Path {
        target.install_prefix().unwrap_or(&self.install_dir)
    }

    /// The shell command for `step`: the target's override if it has one,
    /// else the default for its project type.
    pub fn command_for(&self, target: &Target, step: Step) -> Result<String, MixDownError> {
        if let Some(command) = target.commands().for_step(step) {
            return Ok(command.to_string());
        }

        let prefix = shell_quote(&self.prefix_for(target).display().to_string());
        let command = match (target.project_type(), step) {
            (ProjectType::Autotools, Step::Configure) => {
                let configure = format!("./configure --prefix={}", prefix);
                if target.working_path().join("configure").is_file() {
                    configure
                } else {
                    format!("autoreconf -i && {}", configure)
                }
            }
            (ProjectType::CMake, Step::Configure) => {
                format!("cmake -DCMAKE_INSTALL_PREFIX={} .", prefix)
            }
            (ProjectType::Autotools | ProjectType::CMake, Step::Build) => "make".to_string(),
            (ProjectType::Autotools | ProjectType::CMake, Step::Install) => {
                "make install".to_string()
            }
            (project_type, step) => {
                return Err(MixDownError::CannotBuild {
                    target: target.name().to_string(),
                    step,
                    project_type,
                })
            }
        };
        Ok(command)
    }
}

impl StepRunner for CommandRunner {
    fn run(
        &mut self,
        target: &Target,
        step: Step,
        log: &mut dyn LogSink,
    ) -> Result<(), MixDownError> {
        let command = self.command_for(target, step)?;
        let scope = Some((target.name(), step));
        log.write_message(scope, &format!("Running: {}", command));
        tracing::debug!("{}: {}: `{}` in {}", target.name(), step.label(), command, target.working_path().display());

        let failed = |exit_code| MixDownError::StepFailed {
            target: target.name().to_string(),
            step,
            exit_code,
        };

        let status = ProcessBuilder::shell(&command)
            .cwd(target.working_path())
            .status_logged(log.step_output(target.name(), step))
            .map_err(|e| {
                log.write_message(scope, &format!("{:#}", e));
                failed(None)
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(failed(status.code()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::{CommandOverrides, DiscoveredDependencies};
    use crate::test_support::MemoryLog;
    use tempfile::TempDir;

    fn inspected(dir: &Path, project_type: ProjectType) -> Target {
        let mut target = Target::new("pkg", dir.display().to_string());
        target.set_inspection(project_type, DiscoveredDependencies::NotApplicable);
        target
    }

    #[test]
    fn test_autotools_defaults() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("configure"), "").unwrap();
        let target = inspected(tmp.path(), ProjectType::Autotools);
        let runner = CommandRunner::new("/opt/md");

        assert_eq!(
            runner.command_for(&target, Step::Configure).unwrap(),
            "./configure --prefix=/opt/md"
        );
        assert_eq!(runner.command_for(&target, Step::Build).unwrap(), "make");
        assert_eq!(
            runner.command_for(&target, Step::Install).unwrap(),
            "make install"
        );
    }

    #[test]
    fn test_autotools_without_configure_runs_autoreconf() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("configure.ac"), "").unwrap();
        let target = inspected(tmp.path(), ProjectType::Autotools);

        let command = CommandRunner::new("/opt/md")
            .command_for(&target, Step::Configure)
            .unwrap();
        assert_eq!(command, "autoreconf -i && ./configure --prefix=/opt/md");
    }

    #[test]
    fn test_cmake_and_install_prefix() {
        let tmp = TempDir::new().unwrap();
        let mut target = inspected(tmp.path(), ProjectType::CMake);
        target.set_install_prefix("/opt/my prefix");

        let command = CommandRunner::new("/opt/md")
            .command_for(&target, Step::Configure)
            .unwrap();
        assert_eq!(command, "cmake -DCMAKE_INSTALL_PREFIX='/opt/my prefix' .");
    }

    #[test]
    fn test_unknown_without_override_cannot_build() {
        let tmp = TempDir::new().unwrap();
        let target = inspected(tmp.path(), ProjectType::Unknown);

        let err = CommandRunner::new("/opt/md")
            .command_for(&target, Step::Build)
            .unwrap_err();
        assert!(matches!(err, MixDownError::CannotBuild { step: Step::Build, .. }));
    }

    #[test]
    fn test_override_runs_in_working_dir() {
        let tmp = TempDir::new().unwrap();
        let target = Target::new("pkg", tmp.path().display().to_string()).with_commands(
            CommandOverrides {
                build: Some("echo built > out.txt".to_string()),
                ..Default::default()
            },
        );

        let mut log = MemoryLog::default();
        CommandRunner::new("/opt/md")
            .run(&target, Step::Build, &mut log)
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(tmp.path().join("out.txt")).unwrap().trim(),
            "built"
        );
        assert!(log.messages.iter().any(|m| m.contains("Running: echo built")));
    }

    #[test]
    fn test_failing_command_reports_exit_code() {
        let tmp = TempDir::new().unwrap();
        let target = Target::new("pkg", tmp.path().display().to_string()).with_commands(
            CommandOverrides {
                configure: Some("exit 7".to_string()),
                ..Default::default()
            },
        );

        let err = CommandRunner::new("/opt/md")
            .run(&target, Step::Configure, &mut MemoryLog::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(7));
    }
}
