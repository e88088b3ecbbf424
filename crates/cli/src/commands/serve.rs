//! `story-harness serve`

use anyhow::Context;
use clap::Args;
use std::path::PathBuf;
use story_harness::RunContext;
use tracing::info;

use super::Project;

#[derive(Args)]
pub struct ServeArgs {
    /// Bundle every discovered story up front
    #[arg(long)]
    pub prebundle: bool,

    /// Directory searched for test files (default: project root)
    #[arg(long)]
    pub tests_dir: Option<PathBuf>,
}

/// Start a workspace, print `export` lines for its run context and wait for Ctrl-C
pub async fn execute(args: ServeArgs, project: Project) -> anyhow::Result<()> {
    let mut manager = project.workspace();
    let ctx = manager.begin().await.context("workspace setup failed")?;

    let served = serve_until_interrupted(&args, &project, &ctx).await;
    manager.end().await;
    served
}

async fn serve_until_interrupted(args: &ServeArgs, project: &Project, ctx: &RunContext) -> anyhow::Result<()> {
    if args.prebundle {
        project.prebundle(ctx, args.tests_dir.as_deref()).await?;
    }
    for (key, value) in ctx.env_vars() {
        println!("export {}={}", key, shell_quote(&value));
    }
    info!("Serving {} at {} (Ctrl-C to stop)", ctx.workspace_dir.display(), ctx.base_url());
    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_survives_single_quotes() {
        assert_eq!(shell_quote("/tmp/ws"), "'/tmp/ws'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
