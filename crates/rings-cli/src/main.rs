//! Rings command-line host
//!
//! Runs scripts in a host context with the `rings` library installed:
//! `rings run <file> [args...]` and `rings eval <code>`.

mod commands;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use rings_core::RingsOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Configuration file picked up from the working directory
const DEFAULT_CONFIG: &str = "rings.toml";

#[derive(Parser)]
#[command(name = "rings")]
#[command(about = "Run scripts in isolated rings", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./rings.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script file
    Run {
        /// Script file
        file: PathBuf,
        /// Arguments exposed to the script as the `arg` table
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Evaluate inline code and print what it returns
    Eval {
        /// Source text
        code: String,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = load_options(cli.config.as_deref())?;
    match cli.command {
        Commands::Run { file, args } => commands::run::execute(options, &file, &args),
        Commands::Eval { code } => commands::eval::execute(options, &code),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

fn load_options(path: Option<&Path>) -> anyhow::Result<RingsOptions> {
    if let Some(path) = path {
        return RingsOptions::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()));
    }

    let default = Path::new(DEFAULT_CONFIG);
    if default.exists() {
        return RingsOptions::from_file(default)
            .with_context(|| format!("Failed to load {}", DEFAULT_CONFIG));
    }
    Ok(RingsOptions::default())
}
