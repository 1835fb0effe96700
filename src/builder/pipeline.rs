//! Target pipeline and scheduler.
//!
//! A run has two phases. First every target is fetched, unpacked and
//! inspected in declaration order. Then the graph of declared and discovered
//! dependencies is checked and targets are configured, built and installed
//! in build order. A target whose dependency did not finish is skipped, and
//! the skip propagates to everything downstream of it.
//!
//! Declared dependencies are checked before anything is fetched, discovered
//! ones before anything is configured, so a configuration error never
//! leaves a half-built install directory behind.

use std::path::PathBuf;
use std::time::Instant;

use crate::builder::graph::DependencyGraph;
use crate::builder::inspect::{inspect, install_dir};
use crate::builder::steps::StepRunner;
use crate::builder::unpack::Unpacker;
use crate::core::project::Project;
use crate::core::target::{Step, TargetState};
use crate::sources::acquire::{Acquirer, PipelineContext};
use crate::sources::locator::Locator;
use crate::util::config::FailurePolicy;
use crate::util::context::GlobalContext;
use crate::util::errors::MixDownError;
use crate::util::runlog::LogSink;

/// Final state of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub name: String,
    pub state: TargetState,
    /// Why the target failed or was skipped
    pub reason: Option<String>,
}

/// What a run did.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Outcomes in declaration order
    pub outcomes: Vec<TargetOutcome>,
    /// Target names in the order they were (or would have been) built
    pub build_order: Vec<String>,
    /// True if fail-fast stopped the run early
    pub halted: bool,
}

impl RunReport {
    /// Every target reached `Done`.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.state == TargetState::Done)
    }

    pub fn state_of(&self, name: &str) -> Option<TargetState> {
        self.outcomes
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(name))
            .map(|o| o.state)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.state == TargetState::Failed)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.state == TargetState::Skipped)
    }
}

/// Drives a project's targets through every stage.
pub struct Pipeline<'a> {
    ctx: &'a GlobalContext,
    acquirer: Acquirer,
    unpacker: Unpacker,
    runner: &'a mut dyn StepRunner,
    log: &'a mut dyn LogSink,
    reasons: Vec<Option<String>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        ctx: &'a GlobalContext,
        runner: &'a mut dyn StepRunner,
        log: &'a mut dyn LogSink,
    ) -> Self {
        Pipeline {
            ctx,
            acquirer: Acquirer::new(Locator::new(), ctx.download_dir()),
            unpacker: Unpacker::new(ctx.build_dir()),
            runner,
            log,
            reasons: Vec::new(),
        }
    }

    /// Use `locator` to classify origins.
    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.acquirer = Acquirer::new(locator, self.ctx.download_dir());
        self
    }

    /// Run every target. Configuration errors are returned as `Err`; target
    /// failures are recorded in the report.
    pub fn run(&mut self, project: &mut Project) -> Result<RunReport, MixDownError> {
        self.reasons = vec![None; project.len()];

        let declared = self.check(DependencyGraph::declared(project))?;
        let declared_order = self.check(declared.build_order())?;

        let mut report = RunReport::default();

        for index in 0..project.len() {
            if project.targets()[index].state().is_terminal() {
                continue;
            }
            if !self.acquire(project, index)? {
                self.skip_dependents(project, &declared, index)?;
                if self.ctx.policy() == FailurePolicy::FailFast {
                    report.halted = true;
                    report.build_order = names(project, &declared_order);
                    return Ok(self.finish(project, report));
                }
            }
        }

        let graph = self.check(DependencyGraph::discovered(project))?;
        let order = self.check(graph.build_order())?;
        report.build_order = names(project, &order);
        tracing::info!("Build order: {}", report.build_order.join(", "));

        for index in order {
            if project.targets()[index].state().is_terminal() {
                continue;
            }
            if let Some(dep) = graph
                .dependencies(index)
                .into_iter()
                .find(|&d| project.targets()[d].state() != TargetState::Done)
            {
                let reason = format!("Dependency '{}' did not build", project.targets()[dep].name());
                self.skip(project, index, Step::Configure, &reason)?;
                continue;
            }
            if !self.build(project, index)? {
                self.skip_dependents(project, &graph, index)?;
                if self.ctx.policy() == FailurePolicy::FailFast {
                    report.halted = true;
                    break;
                }
            }
        }

        Ok(self.finish(project, report))
    }

    /// Log a configuration error on the global channel before returning it.
    fn check<T>(&mut self, result: Result<T, MixDownError>) -> Result<T, MixDownError> {
        if let Err(e) = &result {
            self.log.write_error(None, &e.to_string());
        }
        result
    }

    /// Fetch, unpack and inspect one target. `Ok(false)` if it failed.
    fn acquire(&mut self, project: &mut Project, index: usize) -> Result<bool, MixDownError> {
        let cx = PipelineContext::for_target(&project.targets()[index], self.ctx);

        let started = Instant::now();
        self.log.report_start(&cx.target, Step::Fetch);
        let cx = match self.acquirer.fetch(cx) {
            Ok(cx) => cx,
            Err(e) => return self.fail(project, index, Step::Fetch, started, e).map(|_| false),
        };
        self.log
            .report_success(&cx.target, Step::Fetch, Some(started.elapsed()));
        project.targets_mut()[index].set_working_path(&cx.current);
        project.targets_mut()[index].advance(TargetState::Fetched)?;

        let started = Instant::now();
        self.log.report_start(&cx.target, Step::Unpack);
        let cx = match self.unpacker.unpack(cx) {
            Ok(cx) => cx,
            Err(e) => return self.fail(project, index, Step::Unpack, started, e).map(|_| false),
        };
        self.log
            .report_success(&cx.target, Step::Unpack, Some(started.elapsed()));
        project.targets_mut()[index].set_working_path(&cx.current);
        project.targets_mut()[index].advance(TargetState::Unpacked)?;

        let started = Instant::now();
        self.log.report_start(&cx.target, Step::Inspect);
        let found = inspect(&cx.current);
        let prefix = self.install_prefix(project, index);

        let target = &mut project.targets_mut()[index];
        self.log.write_message(
            Some((&cx.target, Step::Inspect)),
            &format!(
                "Project type: {}; install prefix: {}",
                found.project_type,
                prefix.display()
            ),
        );
        if !found.dependencies.names().is_empty() {
            self.log.write_message(
                Some((&cx.target, Step::Inspect)),
                &format!("Discovered dependencies: {}", found.dependencies.names().join(", ")),
            );
        }
        target.set_inspection(found.project_type, found.dependencies);
        target.set_install_prefix(prefix);
        target.advance(TargetState::Inspected)?;
        self.log
            .report_success(&cx.target, Step::Inspect, Some(started.elapsed()));

        Ok(true)
    }

    /// A configure override naming a prefix wins over the shared install dir.
    fn install_prefix(&self, project: &Project, index: usize) -> PathBuf {
        let target = &project.targets()[index];
        match target.commands().configure.as_deref().map(install_dir) {
            Some(prefix) if !prefix.is_empty() => PathBuf::from(prefix),
            _ => self.ctx.install_dir().to_path_buf(),
        }
    }

    /// Configure, build and install one target. `Ok(false)` if it failed.
    fn build(&mut self, project: &mut Project, index: usize) -> Result<bool, MixDownError> {
        for step in Step::BUILD_STEPS {
            let name = project.targets()[index].name().to_string();
            let started = Instant::now();
            self.log.report_start(&name, step);

            let result = self
                .runner
                .run(&project.targets()[index], step, &mut *self.log);
            if let Err(e) = result {
                self.fail(project, index, step, started, e)?;
                return Ok(false);
            }

            self.log.report_success(&name, step, Some(started.elapsed()));
            project.targets_mut()[index].advance(step.completes())?;
        }
        Ok(true)
    }

    fn fail(
        &mut self,
        project: &mut Project,
        index: usize,
        step: Step,
        started: Instant,
        error: MixDownError,
    ) -> Result<(), MixDownError> {
        let target = &mut project.targets_mut()[index];
        self.log
            .write_error(Some((target.name(), step)), &error.to_string());
        self.log
            .report_failure(target.name(), step, Some(started.elapsed()), error.exit_code());
        target.advance(TargetState::Failed)?;
        self.reasons[index] = Some(error.to_string());
        Ok(())
    }

    fn skip(
        &mut self,
        project: &mut Project,
        index: usize,
        step: Step,
        reason: &str,
    ) -> Result<(), MixDownError> {
        let target = &mut project.targets_mut()[index];
        self.log.report_skipped(target.name(), step, reason);
        target.advance(TargetState::Skipped)?;
        self.reasons[index] = Some(reason.to_string());
        Ok(())
    }

    /// Mark everything downstream of a failed target as skipped.
    fn skip_dependents(
        &mut self,
        project: &mut Project,
        graph: &DependencyGraph,
        failed: usize,
    ) -> Result<(), MixDownError> {
        let reason = format!("Dependency '{}' failed", project.targets()[failed].name());
        for dependent in graph.transitive_dependents(failed) {
            if !project.targets()[dependent].state().is_terminal() {
                self.skip(project, dependent, Step::Configure, &reason)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self, project: &Project, mut report: RunReport) -> RunReport {
        report.outcomes = project
            .targets()
            .iter()
            .zip(self.reasons.drain(..))
            .map(|(t, reason)| TargetOutcome {
                name: t.name().to_string(),
                state: t.state(),
                reason,
            })
            .collect();
        report
    }
}

fn names(project: &Project, order: &[usize]) -> Vec<String> {
    order
        .iter()
        .map(|&i| project.targets()[i].name().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::{CommandOverrides, Target};
    use crate::test_support::{autotools_tree, gzip_tarball, MemoryLog, RecordingRunner};
    use crate::util::config::Config;
    use std::path::Path;
    use tempfile::TempDir;

    fn context(tmp: &TempDir, policy: FailurePolicy) -> GlobalContext {
        let mut config = Config::default();
        config.run.policy = policy;
        GlobalContext::with_cwd(tmp.path().to_path_buf(), &config)
    }

    fn dir_target(root: &Path, name: &str, deps: &[&str]) -> Target {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        Target::new(name, dir.display().to_string()).with_dependencies(deps)
    }

    fn run(
        ctx: &GlobalContext,
        project: &mut Project,
        runner: &mut RecordingRunner,
        log: &mut MemoryLog,
    ) -> Result<RunReport, MixDownError> {
        Pipeline::new(ctx, runner, log)
            .with_locator(Locator::with_backends([]))
            .run(project)
    }

    #[test]
    fn test_builds_in_dependency_order() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, FailurePolicy::FailFast);
        let mut project = Project::from_targets(vec![
            dir_target(tmp.path(), "A", &["B"]),
            dir_target(tmp.path(), "B", &["C"]),
            dir_target(tmp.path(), "C", &[]),
        ])
        .unwrap();

        let mut runner = RecordingRunner::default();
        let mut log = MemoryLog::default();
        let report = run(&ctx, &mut project, &mut runner, &mut log).unwrap();

        assert!(report.is_success());
        assert_eq!(report.build_order, vec!["C", "B", "A"]);
        assert_eq!(
            runner.targets_for(Step::Configure),
            vec!["C", "B", "A"]
        );
        assert_eq!(runner.calls.len(), 9);
    }

    #[test]
    fn test_local_directory_built_in_place() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, FailurePolicy::FailFast);
        let target = dir_target(tmp.path(), "solo", &[]);
        let origin = target.origin().to_string();
        let mut project = Project::from_targets(vec![target]).unwrap();

        run(
            &ctx,
            &mut project,
            &mut RecordingRunner::default(),
            &mut MemoryLog::default(),
        )
        .unwrap();

        assert_eq!(
            project.targets()[0].working_path().display().to_string(),
            origin
        );
    }

    #[test]
    fn test_failed_dependency_skips_dependents() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, FailurePolicy::KeepGoing);
        let mut project = Project::from_targets(vec![
            dir_target(tmp.path(), "A", &["B"]),
            dir_target(tmp.path(), "B", &[]),
            dir_target(tmp.path(), "Top", &["A"]),
            dir_target(tmp.path(), "Other", &[]),
        ])
        .unwrap();

        let mut runner = RecordingRunner::default().failing("B", Step::Build, 2);
        let mut log = MemoryLog::default();
        let report = run(&ctx, &mut project, &mut runner, &mut log).unwrap();

        assert_eq!(report.state_of("B"), Some(TargetState::Failed));
        assert_eq!(report.state_of("A"), Some(TargetState::Skipped));
        assert_eq!(report.state_of("Top"), Some(TargetState::Skipped));
        assert_eq!(report.state_of("Other"), Some(TargetState::Done));
        assert!(!report.halted);

        assert!(runner.calls.iter().all(|(name, _)| name != "A" && name != "Top"));
        assert!(log.failures.contains(&("B".to_string(), Step::Build, Some(2))));
        assert!(log
            .skipped
            .iter()
            .any(|(name, reason)| name == "A" && reason.contains("'B' failed")));
    }

    #[test]
    fn test_fail_fast_halts_run() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, FailurePolicy::FailFast);
        let mut project = Project::from_targets(vec![
            dir_target(tmp.path(), "B", &[]),
            dir_target(tmp.path(), "A", &["B"]),
            dir_target(tmp.path(), "Other", &[]),
        ])
        .unwrap();

        let mut runner = RecordingRunner::default().failing("B", Step::Configure, 1);
        let report = run(&ctx, &mut project, &mut runner, &mut MemoryLog::default()).unwrap();

        assert!(report.halted);
        assert!(!report.is_success());
        assert_eq!(report.state_of("B"), Some(TargetState::Failed));
        assert_eq!(report.state_of("A"), Some(TargetState::Skipped));
        assert_eq!(report.state_of("Other"), Some(TargetState::Inspected));
        assert_eq!(runner.calls, vec![("B".to_string(), Step::Configure)]);
    }

    #[test]
    fn test_declared_cycle_detected_before_fetch() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, FailurePolicy::FailFast);
        let mut project = Project::from_targets(vec![
            Target::new("A", tmp.path().join("missing-a").display().to_string())
                .with_dependencies(["B"]),
            Target::new("B", tmp.path().join("missing-b").display().to_string())
                .with_dependencies(["C"]),
            Target::new("C", tmp.path().join("missing-c").display().to_string())
                .with_dependencies(["A"]),
        ])
        .unwrap();

        let mut log = MemoryLog::default();
        let err = run(&ctx, &mut project, &mut RecordingRunner::default(), &mut log).unwrap_err();

        assert!(matches!(err, MixDownError::DependencyCycle { .. }));
        assert_eq!(err.to_string(), "dependency cycle detected: A -> B -> C -> A");
        assert!(log.started.is_empty());
        assert_eq!(log.errors.len(), 1);
        assert!(project
            .targets()
            .iter()
            .all(|t| t.state() == TargetState::Pending));
    }

    #[test]
    fn test_discovered_dependencies_order_build() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, FailurePolicy::FailFast);
        let app = autotools_tree(tmp.path(), "App", &["LibZ"]);
        let libz = autotools_tree(tmp.path(), "LibZ", &[]);
        let mut project = Project::from_targets(vec![
            Target::new("App", app.display().to_string()),
            Target::new("LibZ", libz.display().to_string()),
        ])
        .unwrap();

        let mut runner = RecordingRunner::default();
        let report = run(&ctx, &mut project, &mut runner, &mut MemoryLog::default()).unwrap();

        assert_eq!(report.build_order, vec!["LibZ", "App"]);
        assert_eq!(runner.targets_for(Step::Install), vec!["LibZ", "App"]);
        assert_eq!(project.targets()[0].dependency_names(), vec!["libz"]);
    }

    #[test]
    fn test_discovered_cycle_detected_before_configure() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, FailurePolicy::KeepGoing);
        let left = autotools_tree(tmp.path(), "Left", &["Right"]);
        let right = autotools_tree(tmp.path(), "Right", &["Left"]);
        let mut project = Project::from_targets(vec![
            Target::new("Left", left.display().to_string()),
            Target::new("Right", right.display().to_string()),
        ])
        .unwrap();

        let mut runner = RecordingRunner::default();
        let mut log = MemoryLog::default();
        let err = run(&ctx, &mut project, &mut runner, &mut log).unwrap_err();

        match &err {
            MixDownError::DependencyCycle { cycle } => {
                assert_eq!(cycle, &vec!["Left", "Right", "Left"]);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(runner.calls.is_empty());
        assert!(log
            .started
            .iter()
            .all(|(_, step)| !Step::BUILD_STEPS.contains(step)));
        assert!(project
            .targets()
            .iter()
            .all(|t| t.state() == TargetState::Inspected));
    }

    #[test]
    fn test_discovered_unresolved_dependency_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, FailurePolicy::KeepGoing);
        let app = autotools_tree(tmp.path(), "App", &["nowhere"]);
        let mut project =
            Project::from_targets(vec![Target::new("App", app.display().to_string())]).unwrap();

        let mut runner = RecordingRunner::default();
        let err = run(&ctx, &mut project, &mut runner, &mut MemoryLog::default()).unwrap_err();

        assert!(matches!(err, MixDownError::UnresolvedDependency { .. }));
        assert!(runner.calls.is_empty());
    }

    #[test]
    fn test_missing_origin_fails_target() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, FailurePolicy::KeepGoing);
        let mut project = Project::from_targets(vec![
            Target::new("gone", tmp.path().join("gone").display().to_string()),
            Target::new("user", tmp.path().join("gone").display().to_string())
                .with_dependencies(["gone"]),
            dir_target(tmp.path(), "fine", &[]),
        ])
        .unwrap();

        let mut log = MemoryLog::default();
        let report = run(&ctx, &mut project, &mut RecordingRunner::default(), &mut log).unwrap();

        assert_eq!(report.state_of("gone"), Some(TargetState::Failed));
        assert_eq!(report.state_of("user"), Some(TargetState::Skipped));
        assert_eq!(report.state_of("fine"), Some(TargetState::Done));
        assert!(log.errors.iter().any(|e| e.contains("does not exist")));
        let reason = report.failed().next().unwrap().reason.clone().unwrap();
        assert!(reason.contains("does not exist"));
    }

    #[test]
    fn test_archive_target_unpacked_under_build_dir() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, FailurePolicy::FailFast);
        let archive = tmp.path().join("hello-1.0.tar.gz");
        std::fs::write(
            &archive,
            gzip_tarball(&[("hello-1.0/CMakeLists.txt", "project(hello)\n")]),
        )
        .unwrap();

        let mut project = Project::from_targets(vec![Target::new(
            "hello",
            archive.display().to_string(),
        )])
        .unwrap();
        run(
            &ctx,
            &mut project,
            &mut RecordingRunner::default(),
            &mut MemoryLog::default(),
        )
        .unwrap();

        let target = &project.targets()[0];
        assert_eq!(
            target.working_path(),
            ctx.build_dir().join("hello-1.0").join("hello-1.0")
        );
        assert_eq!(target.project_type(), crate::core::target::ProjectType::CMake);
    }

    #[test]
    fn test_configure_override_sets_install_prefix() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, FailurePolicy::FailFast);
        let custom = dir_target(tmp.path(), "custom", &[]).with_commands(CommandOverrides {
            configure: Some("./configure --prefix=/opt/custom".to_string()),
            ..Default::default()
        });
        let plain = dir_target(tmp.path(), "plain", &[]).with_commands(CommandOverrides {
            configure: Some("./configure --prefix=".to_string()),
            ..Default::default()
        });
        let mut project = Project::from_targets(vec![custom, plain]).unwrap();

        run(
            &ctx,
            &mut project,
            &mut RecordingRunner::default(),
            &mut MemoryLog::default(),
        )
        .unwrap();

        assert_eq!(
            project.targets()[0].install_prefix(),
            Some(Path::new("/opt/custom"))
        );
        assert_eq!(project.targets()[1].install_prefix(), Some(ctx.install_dir()));
    }
}
