//! Workspace lifecycle: temporary directory, runtime build, static server

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bundler::{BundleRequest, Bundler, EntryPoint};
use crate::config::HarnessConfig;
use crate::context::RunContext;
use crate::error::{HarnessError, HarnessResult};
use crate::resolver::normalize;
use crate::runtime::{self, BOOTSTRAP_HTML, BOOTSTRAP_PATH, HARNESS_DIR, MOUNT_MODULE_PATH};
use crate::server::ServerHandle;
use crate::wait::wait_for_file;

const WORKSPACE_PREFIX: &str = "story-harness-";

struct ActiveRun {
    context: RunContext,
    server: ServerHandle,
}

/// Owns the workspace directory and the static server of one run
pub struct WorkspaceManager {
    project_root: PathBuf,
    config: HarnessConfig,
    bundler: Arc<dyn Bundler>,
    temp_root: PathBuf,
    active: Option<ActiveRun>,
}

impl WorkspaceManager {
    pub fn new(project_root: impl Into<PathBuf>, config: HarnessConfig, bundler: Arc<dyn Bundler>) -> Self {
        Self {
            project_root: project_root.into(),
            config,
            bundler,
            temp_root: std::env::temp_dir(),
            active: None,
        }
    }

    /// Create workspaces below `dir` instead of the system temp directory
    pub fn with_temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_root = dir.into();
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn bundler(&self) -> Arc<dyn Bundler> {
        Arc::clone(&self.bundler)
    }

    /// Context of the active run, if `begin` succeeded and `end` has not run
    pub fn context(&self) -> Option<&RunContext> {
        self.active.as_ref().map(|run| &run.context)
    }

    /// Create the workspace, build the runtime into it and start serving it.
    ///
    /// Calling `begin` on an active manager returns the existing context.
    pub async fn begin(&mut self) -> HarnessResult<RunContext> {
        if let Some(run) = &self.active {
            return Ok(run.context.clone());
        }

        let project_root = if self.project_root.is_absolute() {
            normalize(&self.project_root)
        } else {
            normalize(&std::env::current_dir()?.join(&self.project_root))
        };

        let workspace_dir = create_unique_dir(&self.temp_root).await?;
        info!("Created workspace {}", workspace_dir.display());

        match self.prepare(&workspace_dir, &project_root).await {
            Ok(server) => {
                let context = RunContext {
                    workspace_dir,
                    server_port: server.port(),
                    server_host: self.config.server.host.clone(),
                    mode: self.config.runtime.kind(),
                    project_root,
                };
                self.active = Some(ActiveRun {
                    context: context.clone(),
                    server,
                });
                Ok(context)
            }
            Err(e) => {
                remove_workspace(&workspace_dir).await;
                Err(e)
            }
        }
    }

    async fn prepare(&self, workspace_dir: &Path, project_root: &Path) -> HarnessResult<ServerHandle> {
        tokio::fs::create_dir_all(workspace_dir.join(HARNESS_DIR)).await?;
        tokio::fs::write(workspace_dir.join(BOOTSTRAP_PATH), BOOTSTRAP_HTML).await?;

        let request = runtime_request(&self.config, workspace_dir, project_root).await?;
        self.bundler.bundle(&request).await?;
        wait_for_file(&workspace_dir.join(MOUNT_MODULE_PATH), self.config.wait.policy()).await?;

        ServerHandle::start(workspace_dir, &self.config.server.host).await
    }

    /// Stop the server and delete the workspace.
    ///
    /// Both steps always run; failures are logged, never returned. Safe to
    /// call when `begin` never ran or `end` already did.
    pub async fn end(&mut self) {
        let Some(mut run) = self.active.take() else {
            debug!("No active workspace to tear down");
            return;
        };

        if !run.server.close().await {
            warn!("Static server on port {} did not close cleanly", run.context.server_port);
        }
        remove_workspace(&run.context.workspace_dir).await;
    }
}

/// Framework packages plus the mount shim, the build every run starts with
pub(crate) async fn runtime_request(
    config: &HarnessConfig,
    workspace_dir: &Path,
    project_root: &Path,
) -> HarnessResult<BundleRequest> {
    let shim = runtime::shim_entry(&config.runtime, project_root).await?;
    Ok(BundleRequest::new(workspace_dir, project_root, config.bundler.options.clone())
        .entries(config.bundler.framework_packages.iter().map(EntryPoint::package))
        .entry(shim))
}

async fn create_unique_dir(parent: &Path) -> HarnessResult<PathBuf> {
    tokio::fs::create_dir_all(parent).await?;
    loop {
        let candidate = parent.join(format!("{}{}", WORKSPACE_PREFIX, Uuid::new_v4().simple()));
        match tokio::fs::create_dir(&candidate).await {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(HarnessError::Io(e)),
        }
    }
}

async fn remove_workspace(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => info!("Removed workspace {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Workspace {} was already removed", dir.display());
        }
        Err(e) => warn!("Failed to remove workspace {}: {}", dir.display(), e),
    }
}
