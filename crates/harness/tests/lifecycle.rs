//! Workspace lifecycle tests
//!
//! Drive `WorkspaceManager::begin`/`end` against a fake bundler that writes
//! the files esbuild would, and check what the static server hands out.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use story_harness::bundler::{BundleReport, BundleRequest, Bundler, EntrySource};
use story_harness::runtime::{BOOTSTRAP_PATH, MOUNT_MODULE_PATH};
use story_harness::{HarnessConfig, HarnessError, HarnessResult, WorkspaceManager};
use tempfile::TempDir;

/// Writes a placeholder module for every named or file entry
#[derive(Default)]
struct FakeBundler {
    requests: Mutex<Vec<BundleRequest>>,
    write_outputs: bool,
}

impl FakeBundler {
    fn writing() -> Self {
        Self {
            write_outputs: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Bundler for FakeBundler {
    async fn bundle(&self, request: &BundleRequest) -> HarnessResult<BundleReport> {
        if self.write_outputs {
            for entry in &request.entry_points {
                let out = match (&entry.out_name, &entry.source) {
                    (Some(name), _) => request.out_dir.join(format!("{name}.js")),
                    (None, EntrySource::File(path)) => {
                        let rel = path.strip_prefix(&request.out_base).unwrap();
                        request.out_dir.join(rel).with_extension("js")
                    }
                    (None, EntrySource::Package(_)) => continue,
                };
                fs::create_dir_all(out.parent().unwrap()).unwrap();
                fs::write(out, "export default {};\n").unwrap();
            }
        }
        self.requests.lock().unwrap().push(request.clone());
        Ok(BundleReport {
            entries: request.entry_points.len(),
            duration: Duration::ZERO,
            warnings: String::new(),
        })
    }
}

struct FailingBundler;

#[async_trait]
impl Bundler for FailingBundler {
    async fn bundle(&self, request: &BundleRequest) -> HarnessResult<BundleReport> {
        Err(HarnessError::BuildFailure {
            entries: format!("{} entries", request.entry_points.len()),
            diagnostics: "Could not resolve \"react\"".to_string(),
        })
    }
}

fn quick_config() -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.wait.poll_interval_ms = 10;
    config.wait.timeout_ms = 300;
    config
}

fn manager(bundler: Arc<dyn Bundler>) -> (TempDir, TempDir, WorkspaceManager) {
    let project = TempDir::new().unwrap();
    let temp_root = TempDir::new().unwrap();
    let manager = WorkspaceManager::new(project.path(), quick_config(), bundler).with_temp_root(temp_root.path());
    (project, temp_root, manager)
}

fn workspaces_under(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("story-harness-"))
        })
        .collect()
}

#[tokio::test]
async fn begin_builds_runtime_and_serves_workspace() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let bundler = Arc::new(FakeBundler::writing());
    let (project, temp_root, mut manager) = manager(bundler.clone());

    let ctx = manager.begin().await.unwrap();
    assert!(ctx.workspace_dir.starts_with(temp_root.path()));
    assert!(ctx.workspace_dir.is_dir());
    assert_eq!(ctx.project_root, project.path());
    assert_ne!(ctx.server_port, 0);

    {
        let requests = bundler.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let inputs: Vec<String> = requests[0].entry_points.iter().map(|e| e.to_string()).collect();
        assert_eq!(inputs[0], "react");
        assert_eq!(inputs[1], "react-dom/client");
        assert!(inputs[2].starts_with("__story_harness/mount="));
        assert_eq!(requests[0].out_dir, ctx.workspace_dir);
    }

    let client = reqwest::Client::new();

    let resp = client.get(ctx.url(BOOTSTRAP_PATH)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/html");
    assert!(resp.text().await.unwrap().contains(r#"<div id="root"></div>"#));

    let resp = client.get(ctx.url(MOUNT_MODULE_PATH)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/javascript");

    let resp = client.get(ctx.url("nope/missing.js")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.text().await.unwrap(), "Not found");

    manager.end().await;
    assert!(!ctx.workspace_dir.exists());
    assert!(reqwest::get(ctx.url(BOOTSTRAP_PATH)).await.is_err());
}

#[tokio::test]
async fn begin_twice_reuses_the_run() {
    let (_project, temp_root, mut manager) = manager(Arc::new(FakeBundler::writing()));

    let first = manager.begin().await.unwrap();
    let second = manager.begin().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(workspaces_under(temp_root.path()).len(), 1);
    assert_eq!(manager.context(), Some(&first));

    manager.end().await;
    assert!(manager.context().is_none());
}

#[tokio::test]
async fn separate_runs_get_separate_workspaces() {
    let bundler: Arc<dyn Bundler> = Arc::new(FakeBundler::writing());
    let (_project, _temp_root, mut a) = manager(Arc::clone(&bundler));
    let (_project_b, _temp_root_b, mut b) = manager(bundler);

    let ctx_a = a.begin().await.unwrap();
    let ctx_b = b.begin().await.unwrap();
    assert_ne!(ctx_a.workspace_dir, ctx_b.workspace_dir);
    assert_ne!(ctx_a.server_port, ctx_b.server_port);

    a.end().await;
    b.end().await;
}

#[tokio::test]
async fn end_is_safe_without_begin_and_when_repeated() {
    let (_project, _temp_root, mut manager) = manager(Arc::new(FakeBundler::writing()));
    manager.end().await;

    let ctx = manager.begin().await.unwrap();
    manager.end().await;
    manager.end().await;
    assert!(!ctx.workspace_dir.exists());
}

#[tokio::test]
async fn end_tolerates_workspace_removed_by_someone_else() {
    let (_project, _temp_root, mut manager) = manager(Arc::new(FakeBundler::writing()));
    let ctx = manager.begin().await.unwrap();

    fs::remove_dir_all(&ctx.workspace_dir).unwrap();
    manager.end().await;
    assert!(manager.context().is_none());
}

#[tokio::test]
async fn build_failure_leaves_no_workspace_behind() {
    let (_project, temp_root, mut manager) = manager(Arc::new(FailingBundler));

    let err = manager.begin().await.unwrap_err();
    match err {
        HarnessError::BuildFailure { diagnostics, .. } => assert!(diagnostics.contains("react")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(workspaces_under(temp_root.path()).is_empty());
    assert!(manager.context().is_none());
}

#[tokio::test]
async fn missing_shim_output_times_out() {
    let (_project, temp_root, mut manager) = manager(Arc::new(FakeBundler::default()));

    let err = manager.begin().await.unwrap_err();
    match err {
        HarnessError::TimeoutWaitingForArtifact { path, timeout } => {
            assert!(path.ends_with(MOUNT_MODULE_PATH));
            assert_eq!(timeout, Duration::from_millis(300));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(workspaces_under(temp_root.path()).is_empty());
}

#[tokio::test]
async fn embedded_shim_is_materialized_in_the_project() {
    let (project, _temp_root, mut manager) = manager(Arc::new(FakeBundler::writing()));
    manager.begin().await.unwrap();

    let shim = project.path().join("node_modules/.story-harness/mount.mjs");
    assert_eq!(
        fs::read_to_string(shim).unwrap(),
        story_harness::runtime::MOUNT_SHIM_SOURCE
    );
    manager.end().await;
}
