//! story-harness CLI - Main Entry Point
//!
//! Owns the workspace around a test command: builds the runtime and stories,
//! serves them, runs the tests with the run context in their environment and
//! tears everything down afterwards.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{resolve, run, serve};

/// Mount UI stories in a real browser page for integration tests
#[derive(Parser)]
#[command(name = "story-harness")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project root containing stories and node_modules
    #[arg(long, default_value = ".", global = true, env = "STORY_HARNESS_PROJECT_ROOT")]
    project_root: PathBuf,

    /// Configuration file (default: <project-root>/story-harness.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up a workspace, run a test command against it, tear it down
    Run(run::RunArgs),

    /// Show which story a test file mounts
    Resolve(resolve::ResolveArgs),

    /// Keep a workspace up until interrupted and print its environment
    Serve(serve::ServeArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is reserved for command output
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let project = commands::Project::load(&cli.project_root, cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            let code = run::execute(args, project).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Resolve(args) => resolve::execute(args, &project)?,
        Commands::Serve(args) => serve::execute(args, project).await?,
    }

    Ok(())
}
