//! CLI definitions using clap.

use std::path::PathBuf;

use clap::Parser;

use mixdown::util::config::{Config, FailurePolicy};

/// MixDown - builds a stack of source packages in dependency order
#[derive(Parser)]
#[command(name = "mixdown")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project file listing the targets to build
    pub project: PathBuf,

    /// Directory sources are checked out and unpacked into
    #[arg(short = 'b', long, value_name = "DIR", env = "MIXDOWN_BUILD_DIR")]
    pub build_dir: Option<PathBuf>,

    /// Directory downloads are saved to
    #[arg(short = 'd', long, value_name = "DIR", env = "MIXDOWN_DOWNLOAD_DIR")]
    pub download_dir: Option<PathBuf>,

    /// Prefix targets are installed into
    #[arg(short = 'i', long, value_name = "DIR", env = "MIXDOWN_INSTALL_DIR")]
    pub install_dir: Option<PathBuf>,

    /// Directory per-step log files are written to
    #[arg(short = 'l', long, value_name = "DIR", env = "MIXDOWN_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Remove all working directories before building
    #[arg(long)]
    pub clean_before: bool,

    /// Remove the build and download directories after a successful run
    #[arg(long)]
    pub clean_after: bool,

    /// Keep building targets that do not depend on a failed one
    #[arg(short = 'k', long)]
    pub keep_going: bool,

    /// Print the build order and exit without building
    #[arg(long)]
    pub order: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Cli {
    /// Layer the command line over `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.build_dir {
            config.dirs.build = dir.clone();
        }
        if let Some(dir) = &self.download_dir {
            config.dirs.download = dir.clone();
        }
        if let Some(dir) = &self.install_dir {
            config.dirs.install = dir.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.dirs.log = dir.clone();
        }
        if self.keep_going {
            config.run.policy = FailurePolicy::KeepGoing;
        }
        config.run.clean_before |= self.clean_before;
        config.run.clean_after |= self.clean_after;
        config.run.verbose |= self.verbose;
    }
}
