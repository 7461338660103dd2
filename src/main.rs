mod boundary;
mod cli;
mod commands;
mod paths;
mod progress;
mod schema;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use commands::Environment;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    if let Command::Completions { shell } = cli.command {
        generate(shell, &mut Cli::command(), "terrace", &mut io::stdout());
        return Ok(());
    }

    let env = Environment::load(cli.config.as_deref())?;
    log::debug!("Profile roots: {:?}", env.settings.profile_roots()?);

    match cli.command {
        Command::Apply(args) => commands::profile::apply(&ctx, &env, &args),
        Command::Destroy(args) => commands::profile::destroy(&ctx, &env, &args),
        Command::Show {
            profile,
            ignore_missing,
            format,
        } => commands::profile::show(&env, &profile, ignore_missing, format),
        Command::Export { snapshot, format } => commands::export::run(&snapshot, format),
        Command::Profiles => commands::profiles::run(&ctx, &env),
        Command::Components => commands::components::run(&ctx),
        Command::Completions { .. } => Ok(()),
    }
}
