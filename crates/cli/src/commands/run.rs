//! `story-harness run -- <command>`

use anyhow::Context;
use clap::Args;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use story_harness::RunContext;
use tracing::{error, info, warn};

use super::Project;

#[derive(Args)]
pub struct RunArgs {
    /// Skip bundling every discovered story before the command starts
    #[arg(long)]
    pub no_prebundle: bool,

    /// Directory searched for test files (default: project root)
    #[arg(long)]
    pub tests_dir: Option<PathBuf>,

    /// Test command and its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Run the command inside a fresh workspace; returns its exit code.
///
/// The workspace is torn down whether the command succeeds, fails or is
/// interrupted.
pub async fn execute(args: RunArgs, project: Project) -> anyhow::Result<i32> {
    let mut manager = project.workspace();
    let ctx = manager.begin().await.context("workspace setup failed")?;

    let outcome = run_in_workspace(&args, &project, &ctx).await;
    manager.end().await;

    let code = outcome?;
    if code != 0 {
        error!("Test command exited with code {}", code);
    }
    Ok(code)
}

async fn run_in_workspace(args: &RunArgs, project: &Project, ctx: &RunContext) -> anyhow::Result<i32> {
    if !args.no_prebundle {
        project.prebundle(ctx, args.tests_dir.as_deref()).await?;
    }

    let (program, rest) = args.command.split_first().context("no test command given")?;
    info!("Running {} with workspace {}", args.command.join(" "), ctx.workspace_dir.display());

    let mut child = Command::new(program)
        .args(rest)
        .envs(ctx.env_vars())
        .current_dir(&project.root)
        .stdin(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to start {}", program))?;

    tokio::select! {
        status = child.wait() => {
            let status = status.context("failed to wait for test command")?;
            Ok(status.code().unwrap_or(1))
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping test command");
            let _ = child.kill().await;
            Ok(130)
        }
    }
}
