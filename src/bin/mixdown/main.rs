//! MixDown CLI - builds a stack of source packages in dependency order

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Cli;
use mixdown::ops::{build, build_order};
use mixdown::util::config::load_config;
use mixdown::util::diagnostic::emit;
use mixdown::util::{GlobalContext, MixDownError};

fn main() {
    let cli = Cli::parse();
    let color = !cli.no_color && std::io::stderr().is_terminal();

    if let Err(e) = run(cli) {
        match e.downcast_ref::<MixDownError>() {
            Some(err) => emit(&err.to_diagnostic(), color),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("mixdown=debug")
    } else {
        EnvFilter::new("mixdown=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    if cli.order {
        for name in build_order(&cli.project)? {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut config = load_config(&cli.project);
    cli.apply(&mut config);
    let ctx = GlobalContext::new(&config)?;

    build(&cli.project, &ctx)?;
    Ok(())
}
