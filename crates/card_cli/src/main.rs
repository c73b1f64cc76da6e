//! `cards`: command-line front end of the card compiler.
//!
//! Provides `cards init` for project scaffolding, `cards source` to print a
//! raw card bundle, `cards compile` to compile a card into the module cache,
//! and `cards clean` to drop the cache.

#![warn(missing_docs)]

mod clean;
mod compile;
mod init;
mod project;
mod source;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Card compiler command-line interface.
#[derive(Parser, Debug)]
#[command(name = "cards", version, about = "Card compiler")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project directory holding `cards.toml`.
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub project: PathBuf,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new card project.
    Init {
        /// Project name (creates a subdirectory). If omitted, initializes the
        /// project directory itself.
        name: Option<String>,

        /// Base URL served by the project's card realm.
        #[arg(long, default_value = init::DEFAULT_REALM_URL)]
        realm_url: String,
    },
    /// Print the raw source bundle of a card as JSON.
    Source {
        /// Card URL.
        url: String,
    },
    /// Compile a card and print a summary.
    Compile(CompileArgs),
    /// Remove the cache directory.
    Clean,
}

/// Arguments for the `cards compile` subcommand.
#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// Card URL.
    pub url: String,

    /// Undefine every emitted module before exiting.
    #[arg(long)]
    pub cleanup: bool,
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match cli.command {
        Command::Init {
            ref name,
            ref realm_url,
        } => init::run(&cli.project, name.as_deref(), realm_url),
        Command::Source { ref url } => source::run(&cli.project, url).await,
        Command::Compile(ref args) => compile::run(&cli.project, args).await,
        Command::Clean => clean::run(&cli.project),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}
