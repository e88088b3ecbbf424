//! Pre-run bundler pass
//!
//! Compiles every story the suite can mount, together with the framework
//! runtime and mount shim, in one bundler call before any test starts. The
//! stories it covered are recorded in a manifest inside the workspace so the
//! per-test driver can skip rebuilding them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::bundler::{BundleReport, Bundler, EntryPoint, Format};
use crate::config::HarnessConfig;
use crate::context::RunContext;
use crate::error::{HarnessError, HarnessResult};
use crate::resolver::{StoryRef, StoryResolver};
use crate::suite::Suite;
use crate::wait::wait_for_file;
use crate::workspace::runtime_request;

/// Workspace path of the manifest
pub const MANIFEST_PATH: &str = "__story_harness/prebundled.json";

/// Stories compiled by the pre-run pass, by project-relative path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrebundleManifest {
    pub stories: BTreeSet<String>,
}

impl PrebundleManifest {
    /// Read the run's manifest; an absent manifest is empty
    pub async fn load(ctx: &RunContext) -> HarnessResult<Self> {
        match tokio::fs::read(ctx.workspace_path(MANIFEST_PATH)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(HarnessError::Io(e)),
        }
    }

    pub async fn write(&self, ctx: &RunContext) -> HarnessResult<()> {
        let path = ctx.workspace_path(MANIFEST_PATH);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_json::to_vec_pretty(self)?).await?;
        Ok(())
    }

    pub fn contains(&self, story: &StoryRef) -> bool {
        self.stories.contains(&story.relative)
    }
}

/// Outcome of the pre-run pass
#[derive(Debug, Clone)]
pub struct PrebundleReport {
    /// Stories compiled, project-relative
    pub stories: Vec<String>,

    /// Tests without a story on disk
    pub skipped: usize,

    pub bundle: BundleReport,
}

/// Stories the naming convention finds for the suite's tests, deduplicated.
///
/// Tests whose story does not exist (or would sit outside the project root)
/// are skipped and counted.
pub fn collect_stories(suite: &Suite, resolver: &StoryResolver) -> HarnessResult<(Vec<StoryRef>, usize)> {
    let mut seen = BTreeSet::new();
    let mut stories = Vec::new();
    let mut skipped = 0;

    for test in suite.all_tests() {
        match resolver.resolve(&test.file, None) {
            Ok(story) => {
                if seen.insert(story.relative.clone()) {
                    stories.push(story);
                }
            }
            Err(HarnessError::StoryNotFound(path)) => {
                debug!("No story for {} ({} missing)", test.file.display(), path.display());
                skipped += 1;
            }
            Err(HarnessError::PathEscape { path, .. }) => {
                debug!("Story {} for {} is outside the project", path.display(), test.file.display());
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok((stories, skipped))
}

/// Bundle framework packages, mount shim and every mountable story into the workspace.
///
/// A failure here should abort the whole run.
pub async fn prebundle(
    ctx: &RunContext,
    suite: &Suite,
    config: &HarnessConfig,
    bundler: &dyn Bundler,
) -> HarnessResult<PrebundleReport> {
    let resolver = StoryResolver::new(&ctx.project_root, config.resolver.story_suffix.clone())?;
    let (stories, skipped) = collect_stories(suite, &resolver)?;

    let mut request = runtime_request(config, &ctx.workspace_dir, &ctx.project_root)
        .await?
        .entries(stories.iter().map(|s| EntryPoint::file(s.story_file.clone())));
    // Shared chunks give the shim and every story one copy of the framework
    if request.options.format == Format::Esm {
        request.options.splitting = true;
    }
    let bundle = bundler.bundle(&request).await?;

    let policy = config.wait.policy();
    for story in &stories {
        wait_for_file(&ctx.workspace_path(story.module_path()), policy).await?;
    }

    let manifest = PrebundleManifest {
        stories: stories.iter().map(|s| s.relative.clone()).collect(),
    };
    manifest.write(ctx).await?;

    info!(
        "Pre-bundled {} stor{} ({} test(s) without a story)",
        stories.len(),
        if stories.len() == 1 { "y" } else { "ies" },
        skipped
    );

    Ok(PrebundleReport {
        stories: stories.into_iter().map(|s| s.relative).collect(),
        skipped,
        bundle,
    })
}
