//! Kestrel CLI - launcher for the Kestrel microkernel.
//!
//! `kestrel run` boots one kernel in this process and exits with its
//! disposition code. `kestrel supervise` runs `kestrel run` as a child and
//! relaunches it on restart requests.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

mod commands;
mod config_bridge;
mod theme;

use commands::{clean, path, run, supervise};
use theme::Theme;

/// Kestrel - in-process microkernel
#[derive(Parser)]
#[command(name = "kestrel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot a kernel and run until it terminates
    Run(RunArgs),

    /// Run `kestrel run` under a restarting supervisor
    Supervise(RunArgs),

    /// Print the repository paths of a coordinate
    Path {
        /// Coordinate as group:artifact[:version]
        coordinate: String,
    },

    /// Delete the local artifact cache
    Clean {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Arguments shared by `run` and `supervise`.
#[derive(Args, Debug, Clone)]
pub(crate) struct RunArgs {
    /// Path to configuration file
    #[arg(short, long)]
    pub(crate) config: Option<PathBuf>,

    /// Repository searched before the configured ones
    #[arg(long)]
    pub(crate) artifact_location: Option<String>,

    /// Artifact to load at boot, as group:artifact:version[@none|full]
    #[arg(short, long = "load", value_name = "COORDINATE")]
    pub(crate) load: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Run(args) => run::run(&args, cli.verbose).await?,
        Commands::Supervise(args) => supervise::run(&args, cli.verbose).await?,
        Commands::Path { coordinate } => {
            path::run(&coordinate)?;
            0
        },
        Commands::Clean { config } => {
            clean::run(config.as_deref())?;
            0
        },
    };

    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

/// Print an error in the CLI theme and return the failure code.
pub(crate) fn report_failure(message: &str) -> i32 {
    eprintln!("{}", Theme::error(message));
    kestrel_kernel::ExitDisposition::Failure.code()
}
