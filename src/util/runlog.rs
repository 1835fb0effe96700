//! Per-target, per-step run log.
//!
//! The pipeline reports progress through the [`LogSink`] trait. The
//! file-backed [`RunLog`] keeps one entry per `(target, step)` pair, opens
//! `<log_dir>/<target>_<step>.log` the first time that pair is written to,
//! and mirrors every status line to `tracing` so the console shows progress
//! while the files keep the full record, subprocess output included.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::target::Step;

/// Where progress and errors are reported.
///
/// `target` is `None` for process-level messages that belong to no target.
pub trait LogSink {
    fn report_start(&mut self, target: &str, step: Step);

    fn report_success(&mut self, target: &str, step: Step, elapsed: Option<Duration>);

    fn report_failure(
        &mut self,
        target: &str,
        step: Step,
        elapsed: Option<Duration>,
        exit_code: Option<i32>,
    );

    fn report_skipped(&mut self, target: &str, step: Step, reason: &str);

    /// Record an error. Deciding whether the run stops is the caller's job.
    fn write_error(&mut self, target: Option<(&str, Step)>, message: &str);

    fn write_message(&mut self, target: Option<(&str, Step)>, message: &str);

    /// A handle subprocess stdout/stderr can be redirected to, if this sink
    /// keeps per-step files.
    fn step_output(&mut self, target: &str, step: Step) -> Option<File>;
}

/// How a logged step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed,
    Skipped,
}

/// Everything recorded for one `(target, step)` pair.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub target: String,
    pub step: Step,
    pub text: String,
    pub outcome: Option<StepOutcome>,
    pub elapsed: Option<Duration>,
    pub exit_code: Option<i32>,
}

impl LogEntry {
    fn new(target: &str, step: Step) -> Self {
        LogEntry {
            target: target.to_string(),
            step,
            text: String::new(),
            outcome: None,
            elapsed: None,
            exit_code: None,
        }
    }
}

/// Aggregate outcome counts over all entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

type EntryKey = (String, Step);

fn entry_key(target: &str, step: Step) -> EntryKey {
    (target.to_lowercase(), step)
}

/// File-backed [`LogSink`].
#[derive(Debug)]
pub struct RunLog {
    log_dir: PathBuf,
    entries: Vec<LogEntry>,
    index: HashMap<EntryKey, usize>,
    files: HashMap<EntryKey, File>,
    errors: Vec<String>,
}

impl RunLog {
    /// Create a log writing under `log_dir`. Nothing touches the disk until
    /// the first per-step write.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        RunLog {
            log_dir: log_dir.into(),
            entries: Vec::new(),
            index: HashMap::new(),
            files: HashMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Path of the file for `(target, step)`.
    pub fn file_path(&self, target: &str, step: Step) -> PathBuf {
        self.log_dir
            .join(format!("{}_{}.log", target, step.as_str()))
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn entry(&self, target: &str, step: Step) -> Option<&LogEntry> {
        self.index
            .get(&entry_key(target, step))
            .map(|&i| &self.entries[i])
    }

    /// Errors reported on any channel, in order.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn summary(&self) -> LogSummary {
        let mut summary = LogSummary::default();
        for entry in &self.entries {
            match entry.outcome {
                Some(StepOutcome::Succeeded) => summary.succeeded += 1,
                Some(StepOutcome::Failed) => summary.failed += 1,
                Some(StepOutcome::Skipped) => summary.skipped += 1,
                None => {}
            }
        }
        summary
    }

    /// Flush and close every open file.
    pub fn close(&mut self) {
        for (_, mut file) in self.files.drain() {
            if let Err(e) = file.flush() {
                tracing::warn!("failed to flush log file: {}", e);
            }
        }
    }

    fn entry_mut(&mut self, target: &str, step: Step) -> &mut LogEntry {
        let key = entry_key(target, step);
        let i = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                self.entries.push(LogEntry::new(target, step));
                let i = self.entries.len() - 1;
                self.index.insert(key, i);
                i
            }
        };
        &mut self.entries[i]
    }

    fn file(&mut self, target: &str, step: Step) -> Option<&mut File> {
        let key = entry_key(target, step);
        if !self.files.contains_key(&key) {
            let path = self.file_path(target, step);
            let opened = fs::create_dir_all(&self.log_dir).and_then(|_| File::create(&path));
            match opened {
                Ok(file) => {
                    self.files.insert(key.clone(), file);
                }
                Err(e) => {
                    tracing::warn!("cannot open log file {}: {}", path.display(), e);
                    return None;
                }
            }
        }
        self.files.get_mut(&key)
    }

    /// Append `text` to the entry and its file.
    fn record(&mut self, target: &str, step: Step, text: &str) {
        self.entry_mut(target, step).text.push_str(text);
        if let Some(file) = self.file(target, step) {
            if let Err(e) = file.write_all(text.as_bytes()) {
                tracing::warn!("failed to write log for {} {}: {}", target, step, e);
            }
        }
    }

    fn finish(
        &mut self,
        target: &str,
        step: Step,
        outcome: StepOutcome,
        elapsed: Option<Duration>,
        exit_code: Option<i32>,
    ) {
        let entry = self.entry_mut(target, step);
        entry.outcome = Some(outcome);
        entry.elapsed = elapsed;
        entry.exit_code = exit_code;
    }
}

impl LogSink for RunLog {
    fn report_start(&mut self, target: &str, step: Step) {
        let message = format!("{}Starting...", message_prefix(target, step));
        tracing::info!("{}", message);
        self.record(target, step, &format!("{}\n", message));
    }

    fn report_success(&mut self, target: &str, step: Step, elapsed: Option<Duration>) {
        let prefix = message_prefix(target, step);
        let mut message = format!("{}Succeeded.\n", prefix);
        if let Some(elapsed) = elapsed {
            message.push_str(&format!("{}Time {}\n", prefix, format_elapsed(elapsed)));
        }
        for line in message.lines() {
            tracing::info!("{}", line);
        }
        self.record(target, step, &message);
        self.finish(target, step, StepOutcome::Succeeded, elapsed, None);
    }

    fn report_failure(
        &mut self,
        target: &str,
        step: Step,
        elapsed: Option<Duration>,
        exit_code: Option<i32>,
    ) {
        let prefix = message_prefix(target, step);
        let mut message = String::new();
        if let Some(elapsed) = elapsed {
            message.push_str(&format!("{}Time {}\n", prefix, format_elapsed(elapsed)));
        }
        let code = exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string());
        message.push_str(&format_error(
            &format!("{}Failed with error code {}.", prefix, code),
            None,
            None,
        ));
        message.push('\n');
        message.push_str(&format!(
            "Look at following log file for failure reason:\n  {}\n",
            self.file_path(target, step).display()
        ));
        for line in message.lines().filter(|l| !l.is_empty()) {
            tracing::error!("{}", line);
        }
        self.record(target, step, &message);
        self.finish(target, step, StepOutcome::Failed, elapsed, exit_code);
    }

    fn report_skipped(&mut self, target: &str, step: Step, reason: &str) {
        let message = format!("{}{}: Skipped.", message_prefix(target, step), reason);
        tracing::warn!("{}", message);
        self.record(target, step, &format!("{}\n", message));
        self.finish(target, step, StepOutcome::Skipped, None, None);
    }

    fn write_error(&mut self, target: Option<(&str, Step)>, message: &str) {
        let formatted = format_error(message, None, None);
        tracing::error!("{}", formatted);
        if let Some((target, step)) = target {
            self.record(target, step, &format!("{}\n", formatted));
        }
        self.errors.push(message.to_string());
    }

    fn write_message(&mut self, target: Option<(&str, Step)>, message: &str) {
        match target {
            Some((target, step)) => self.record(target, step, &format!("{}\n", message)),
            None => tracing::info!("{}", message),
        }
    }

    fn step_output(&mut self, target: &str, step: Step) -> Option<File> {
        let file = self.file(target, step)?;
        match file.try_clone() {
            Ok(clone) => Some(clone),
            Err(e) => {
                tracing::warn!("cannot share log file for {} {}: {}", target, step, e);
                None
            }
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        self.close();
    }
}

/// `"<target>: <Step>: "`, the prefix of every status line.
fn message_prefix(target: &str, step: Step) -> String {
    format!("{}: {}: ", target, step.label())
}

/// Render an elapsed time as `"<h>h <m>m <s>s"`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!("{}h {}m {}s", total / 3600, (total % 3600) / 60, total % 60)
}

/// Render an error line, optionally tied to a file and line.
pub fn format_error(message: &str, file: Option<&Path>, line: Option<u32>) -> String {
    match (file, line) {
        (Some(file), Some(line)) => {
            format!("Error: {} (line {}): {}", file.display(), line, message)
        }
        (Some(file), None) => format!("Error: {}: {}", file.display(), message),
        (None, _) => format!("Error: {}", message),
    }
}
