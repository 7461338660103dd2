use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "terrace")]
#[command(author = "Terrace Contributors")]
#[command(version)]
#[command(about = "Apply layered declarative profiles", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (defaults to <config dir>/config.toml)
    #[arg(long, global = true, env = "TERRACE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Provision every unit declared by a profile
    Apply(ApplyArgs),

    /// Tear down every unit declared by a profile
    Destroy(DestroyArgs),

    /// Print the effective document of a profile (parents merged)
    Show {
        /// Profile name
        profile: String,

        /// Skip missing parent profiles
        #[arg(long)]
        ignore_missing: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "yaml")]
        format: OutputFormat,
    },

    /// Rebuild a profile document from a live-state snapshot
    Export {
        /// Snapshot file mapping unit types to live instances
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "yaml")]
        format: OutputFormat,
    },

    /// List available profiles
    Profiles,

    /// List registered unit types
    Components,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Clone)]
pub struct ApplyArgs {
    /// Profile name
    pub profile: String,

    /// Resolve and print every command without executing it
    #[arg(short = 'n', long)]
    pub display_only: bool,

    /// Skip unknown units, missing parents and unresolved references
    #[arg(long)]
    pub ignore_missing: bool,

    /// Worker threads per unit type
    #[arg(short, long, env = "TERRACE_JOBS")]
    pub jobs: Option<usize>,

    /// Only run these unit types
    #[arg(short = 'c', long = "component", value_name = "UNIT")]
    pub components: Vec<String>,

    /// Leave out these unit types
    #[arg(short = 'x', long = "exclude", value_name = "UNIT")]
    pub exclude: Vec<String>,

    /// Seed a runtime variable (value parsed as YAML)
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub set: Vec<(String, String)>,

    /// Print runtime variables after the run
    #[arg(long)]
    pub dump_vars: bool,

    /// Seconds to wait for named locks
    #[arg(long, value_name = "SECS")]
    pub lock_timeout: Option<u64>,
}

#[derive(Args, Clone)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub apply: ApplyArgs,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}
