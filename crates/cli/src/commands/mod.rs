//! CLI Commands

pub mod resolve;
pub mod run;
pub mod serve;

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use story_harness::config::HarnessConfig;
use story_harness::{
    prebundle, Bundler, EsbuildBundler, RunContext, StoryResolver, Suite, WorkspaceManager,
};
use tracing::info;

/// Project root plus the configuration and bundler derived from it
pub struct Project {
    pub root: PathBuf,
    pub config: HarnessConfig,
    pub bundler: Arc<dyn Bundler>,
}

impl Project {
    pub fn load(root: &Path, config_path: Option<&Path>) -> anyhow::Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("project root {} does not exist", root.display()))?;

        let config = match config_path {
            Some(path) => HarnessConfig::load(path),
            None => HarnessConfig::load_from_root(&root),
        }
        .context("failed to load configuration")?;

        let bundler = EsbuildBundler::locate(&root, config.bundler.esbuild.as_deref());
        info!("Using esbuild at {}", bundler.binary().display());

        Ok(Self {
            root,
            config,
            bundler: Arc::new(bundler),
        })
    }

    pub fn resolver(&self) -> anyhow::Result<StoryResolver> {
        Ok(StoryResolver::new(&self.root, self.config.resolver.story_suffix.clone())?)
    }

    pub fn workspace(&self) -> WorkspaceManager {
        WorkspaceManager::new(&self.root, self.config.clone(), Arc::clone(&self.bundler))
    }

    /// Discover tests below `tests_dir` and bundle every story they mount
    pub async fn prebundle(&self, ctx: &RunContext, tests_dir: Option<&Path>) -> anyhow::Result<()> {
        let resolver = self.resolver()?;
        let dir = match tests_dir {
            Some(dir) if dir.is_absolute() => dir.to_path_buf(),
            Some(dir) => self.root.join(dir),
            None => self.root.clone(),
        };

        let suite = Suite::discover(&dir, &resolver)
            .with_context(|| format!("failed to discover tests in {}", dir.display()))?;
        let report = prebundle(ctx, &suite, &self.config, self.bundler.as_ref())
            .await
            .context("pre-run bundling failed")?;

        info!(
            "{} stories ready, {} tests without a story",
            report.stories.len(),
            report.skipped
        );
        Ok(())
    }
}
