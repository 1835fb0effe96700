//! Implementation of a `mixdown` run.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::builder::graph::DependencyGraph;
use crate::builder::pipeline::{Pipeline, RunReport};
use crate::builder::steps::CommandRunner;
use crate::core::project::Project;
use crate::ops::mixdown_clean::{clean_after, clean_before};
use crate::util::context::GlobalContext;
use crate::util::runlog::RunLog;

/// Build every target in the project at `project_path`.
///
/// Returns the report when every target reached `Done`. Configuration errors
/// come back as [`MixDownError`](crate::util::errors::MixDownError) inside
/// the `anyhow::Error`; target failures come back as a summary.
pub fn build(project_path: &Path, ctx: &GlobalContext) -> Result<RunReport> {
    if ctx.clean_before() {
        clean_before(ctx)?;
    }
    ctx.ensure_dirs()?;

    let mut project = Project::load(project_path)?;
    tracing::info!(
        "Building {} target(s) from {}",
        project.len(),
        project_path.display()
    );

    let mut log = RunLog::new(ctx.log_dir());
    let mut runner = CommandRunner::new(ctx.install_dir());
    let report = Pipeline::new(ctx, &mut runner, &mut log).run(&mut project)?;

    let summary = log.summary();
    log.close();
    tracing::info!(
        "Steps: {} succeeded, {} failed, {} skipped",
        summary.succeeded,
        summary.failed,
        summary.skipped
    );
    if ctx.is_verbose() {
        for outcome in &report.outcomes {
            tracing::info!("{}: {}", outcome.name, outcome.state);
        }
    }

    if !report.is_success() {
        let failed: Vec<&str> = report.failed().map(|o| o.name.as_str()).collect();
        let skipped = report.skipped().count();
        bail!(
            "{} target(s) failed ({}), {} skipped; see {} for details",
            failed.len(),
            failed.join(", "),
            skipped,
            ctx.log_dir().display()
        );
    }

    if ctx.clean_after() {
        clean_after(ctx)?;
    }
    tracing::info!("All targets installed into {}", ctx.install_dir().display());
    Ok(report)
}

/// Build order from the project file's declared dependencies alone.
///
/// Nothing is fetched, so dependencies that inspection would discover are
/// not taken into account.
pub fn build_order(project_path: &Path) -> Result<Vec<String>> {
    let project = Project::load(project_path)?;
    let graph = DependencyGraph::declared(&project)
        .with_context(|| format!("invalid project file: {}", project_path.display()))?;
    Ok(graph.build_order_names()?)
}
