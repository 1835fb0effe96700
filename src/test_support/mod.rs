//! Test utilities for mixdown unit tests.
//!
//! Builders for archives, repositories and autotools trees on disk, plus an
//! in-memory [`LogSink`] and a [`StepRunner`] that records calls instead of
//! spawning processes.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::builder::steps::StepRunner;
use crate::core::target::{Step, Target};
use crate::util::errors::MixDownError;
use crate::util::runlog::LogSink;

/// An uncompressed tar holding `files` (path, contents).
pub fn plain_tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap()
}

/// A gzip-compressed tar holding `files`.
pub fn gzip_tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&plain_tarball(files)).unwrap();
    encoder.finish().unwrap()
}

/// A bzip2-compressed tar holding `files`.
pub fn bzip2_tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut encoder =
        bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(&plain_tarball(files)).unwrap();
    encoder.finish().unwrap()
}

/// Create a git repository at `dir` with `files` committed on the default
/// branch.
pub fn init_git_repo(dir: &Path, files: &[(&str, &str)]) -> git2::Repository {
    let repo = git2::Repository::init(dir).unwrap();
    {
        let mut index = repo.index().unwrap();
        for (path, contents) in files {
            let full = dir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&full, contents).unwrap();
            index.add_path(Path::new(path)).unwrap();
        }
        index.write().unwrap();

        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap();
    }
    repo
}

/// Create `<base>/<name>/configure.ac`, listing `subdirs` in
/// `AC_CONFIG_SUBDIRS` when there are any.
pub fn autotools_tree(base: &Path, name: &str, subdirs: &[&str]) -> PathBuf {
    let dir = base.join(name);
    std::fs::create_dir_all(&dir).unwrap();

    let mut configure_ac = format!("AC_INIT([{}], [1.0])\n", name);
    if !subdirs.is_empty() {
        configure_ac.push_str(&format!("AC_CONFIG_SUBDIRS([{}])\n", subdirs.join(" ")));
    }
    configure_ac.push_str("AC_OUTPUT\n");
    std::fs::write(dir.join("configure.ac"), configure_ac).unwrap();
    dir
}

/// [`LogSink`] that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    pub started: Vec<(String, Step)>,
    pub succeeded: Vec<(String, Step)>,
    pub failures: Vec<(String, Step, Option<i32>)>,
    /// (target, reason)
    pub skipped: Vec<(String, String)>,
    pub errors: Vec<String>,
    pub messages: Vec<String>,
}

impl LogSink for MemoryLog {
    fn report_start(&mut self, target: &str, step: Step) {
        self.started.push((target.to_string(), step));
    }

    fn report_success(&mut self, target: &str, step: Step, _elapsed: Option<Duration>) {
        self.succeeded.push((target.to_string(), step));
    }

    fn report_failure(
        &mut self,
        target: &str,
        step: Step,
        _elapsed: Option<Duration>,
        exit_code: Option<i32>,
    ) {
        self.failures.push((target.to_string(), step, exit_code));
    }

    fn report_skipped(&mut self, target: &str, _step: Step, reason: &str) {
        self.skipped.push((target.to_string(), reason.to_string()));
    }

    fn write_error(&mut self, _target: Option<(&str, Step)>, message: &str) {
        self.errors.push(message.to_string());
    }

    fn write_message(&mut self, _target: Option<(&str, Step)>, message: &str) {
        self.messages.push(message.to_string());
    }

    fn step_output(&mut self, _target: &str, _step: Step) -> Option<File> {
        None
    }
}

/// [`StepRunner`] that records each call and fails where told to.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    pub calls: Vec<(String, Step)>,
    failures: HashMap<(String, Step), i32>,
}

impl RecordingRunner {
    /// Make `step` of `target` exit with `code`.
    pub fn failing(mut self, target: &str, step: Step, code: i32) -> Self {
        self.failures.insert((target.to_lowercase(), step), code);
        self
    }

    /// Targets `step` ran for, in call order.
    pub fn targets_for(&self, step: Step) -> Vec<String> {
        self.calls
            .iter()
            .filter(|(_, s)| *s == step)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl StepRunner for RecordingRunner {
    fn run(
        &mut self,
        target: &Target,
        step: Step,
        _log: &mut dyn LogSink,
    ) -> Result<(), MixDownError> {
        self.calls.push((target.name().to_string(), step));
        match self.failures.get(&(target.key(), step)) {
            Some(&code) => Err(MixDownError::StepFailed {
                target: target.name().to_string(),
                step,
                exit_code: Some(code),
            }),
            None => Ok(()),
        }
    }
}
