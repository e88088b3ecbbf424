//! Per-test mount driver
//!
//! Resolves a test's story, makes sure its bundle is in the workspace, loads
//! the bootstrap document into the page and injects the module scripts that
//! call the mount runtime. Page control itself goes through [`StoryPage`].

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::bundler::{BundleRequest, Bundler, EntryPoint, Loader};
use crate::config::HarnessConfig;
use crate::context::RunContext;
use crate::error::{HarnessError, HarnessResult};
use crate::prebundle::PrebundleManifest;
use crate::resolver::{StoryRef, StoryResolver};
use crate::runtime::{render_script, update_script, BOOTSTRAP_PATH};
use crate::wait::wait_for_file;

/// Page-control primitives the driver needs from a browser automation layer
#[async_trait]
pub trait StoryPage: Send + Sync {
    /// Navigate and wait for the document to load
    async fn goto(&self, url: &str) -> HarnessResult<()>;

    /// Append an inline `<script type="module">` and resolve once it has run.
    ///
    /// Errors thrown by the script, or imports that fail to load, are returned
    /// as [`HarnessError::Page`].
    async fn add_module_script(&self, content: &str) -> HarnessResult<()>;

    /// Append a `<link rel="stylesheet">` and resolve once it has loaded
    async fn add_style_link(&self, url: &str) -> HarnessResult<()>;
}

#[async_trait]
impl<P: StoryPage + ?Sized> StoryPage for Arc<P> {
    async fn goto(&self, url: &str) -> HarnessResult<()> {
        (**self).goto(url).await
    }

    async fn add_module_script(&self, content: &str) -> HarnessResult<()> {
        (**self).add_module_script(content).await
    }

    async fn add_style_link(&self, url: &str) -> HarnessResult<()> {
        (**self).add_style_link(url).await
    }
}

/// Options for [`MountDriver::mount_story`]
#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    /// Story file relative to the test file's directory, instead of the naming convention
    pub story_file: Option<PathBuf>,
}

impl MountOptions {
    pub fn story_file(path: impl Into<PathBuf>) -> Self {
        Self {
            story_file: Some(path.into()),
        }
    }
}

#[derive(Debug, Clone)]
enum MountState {
    Unmounted,
    Mounted(StoryRef),
}

/// Mounts stories into one page and pushes prop updates to them
pub struct MountDriver<P: StoryPage> {
    ctx: RunContext,
    config: HarnessConfig,
    bundler: Arc<dyn Bundler>,
    resolver: StoryResolver,
    page: P,
    state: MountState,
    bundled: HashSet<String>,
}

impl<P: StoryPage> MountDriver<P> {
    pub fn new(ctx: RunContext, config: HarnessConfig, bundler: Arc<dyn Bundler>, page: P) -> HarnessResult<Self> {
        let resolver = StoryResolver::new(&ctx.project_root, config.resolver.story_suffix.clone())?;
        Ok(Self {
            ctx,
            config,
            bundler,
            resolver,
            page,
            state: MountState::Unmounted,
            bundled: HashSet::new(),
        })
    }

    /// Driver for a run context published in this process' environment
    pub fn from_env(config: HarnessConfig, bundler: Arc<dyn Bundler>, page: P) -> HarnessResult<Self> {
        Self::new(RunContext::from_env()?, config, bundler, page)
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    /// Story currently mounted in the page
    pub fn mounted_story(&self) -> Option<&StoryRef> {
        match &self.state {
            MountState::Mounted(story) => Some(story),
            MountState::Unmounted => None,
        }
    }

    /// Mount the story for `test_file` with `props`.
    ///
    /// Props are snapshotted as JSON; later changes to the Rust value are not
    /// seen by the page until [`MountDriver::update_story`].
    pub async fn mount_story<T>(&mut self, test_file: &Path, props: &T, options: MountOptions) -> HarnessResult<StoryRef>
    where
        T: Serialize + ?Sized,
    {
        if !self.ctx.workspace_dir.is_dir() {
            return Err(HarnessError::SetupNotCalled(format!(
                "workspace {} does not exist",
                self.ctx.workspace_dir.display()
            )));
        }

        let props_json = serde_json::to_string(props)?;
        let story = self.resolver.resolve(test_file, options.story_file.as_deref())?;

        self.ensure_bundled(&story).await?;

        self.state = MountState::Unmounted;
        self.page.goto(&self.ctx.url(BOOTSTRAP_PATH)).await?;
        self.page
            .add_module_script(&render_script(&story.module_path(), &props_json))
            .await?;
        // The tree is live from here on, even if styling it fails
        self.state = MountState::Mounted(story.clone());

        let stylesheet = story.stylesheet_path();
        if self.ctx.workspace_path(&stylesheet).is_file() {
            self.page.add_style_link(&self.ctx.url(&stylesheet)).await?;
        }

        info!("Mounted {} for {}", story.relative, story.test_file.display());
        Ok(story)
    }

    /// Replace the mounted story's props without remounting it
    pub async fn update_story<T>(&mut self, props: &T) -> HarnessResult<()>
    where
        T: Serialize + ?Sized,
    {
        let MountState::Mounted(story) = &self.state else {
            return Err(HarnessError::UpdateBeforeMount);
        };
        let props_json = serde_json::to_string(props)?;

        debug!("Updating {} with {}", story.relative, props_json);
        self.page.add_module_script(&update_script(&props_json)).await
    }

    async fn ensure_bundled(&mut self, story: &StoryRef) -> HarnessResult<()> {
        if self.bundled.contains(&story.relative) {
            return Ok(());
        }

        let manifest = PrebundleManifest::load(&self.ctx).await?;
        if manifest.contains(story) {
            debug!("{} was pre-bundled", story.relative);
        } else {
            let mut options = self.config.bundler.options.clone();
            options.loaders.entry(".css".to_string()).or_insert(Loader::Css);

            let request = BundleRequest::new(&self.ctx.workspace_dir, self.resolver.project_root(), options)
                .entry(EntryPoint::file(story.story_file.clone()));
            self.bundler.bundle(&request).await?;
        }

        wait_for_file(&self.ctx.workspace_path(story.module_path()), self.config.wait.policy()).await?;
        self.bundled.insert(story.relative.clone());
        Ok(())
    }
}
