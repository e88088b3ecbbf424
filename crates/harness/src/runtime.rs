//! Browser-side mount runtime and the page protocol around it
//!
//! The shim itself is JavaScript (`assets/mount.mjs`): `render(container,
//! props, story)` mounts a story once, `update(props)` swaps the props held in
//! its single-slot store and re-renders the same tree. This module decides
//! where the shim is compiled from and generates the module scripts injected
//! into the page to drive it.

use std::path::Path;
use tracing::debug;

use crate::bundler::EntryPoint;
use crate::context::RuntimeMode;
use crate::error::HarnessResult;
use crate::server::url_path;

/// Embedded mount shim source
pub const MOUNT_SHIM_SOURCE: &str = include_str!("../assets/mount.mjs");

/// Bootstrap document the page navigates to before any script is injected
pub const BOOTSTRAP_HTML: &str = include_str!("../assets/mount.html");

/// Workspace path of the bootstrap document
pub const BOOTSTRAP_PATH: &str = "mount.html";

/// Id of the mount point element in the bootstrap document
pub const MOUNT_ELEMENT_ID: &str = "root";

/// Workspace directory reserved for harness files
pub const HARNESS_DIR: &str = "__story_harness";

/// Output name of the compiled shim (relative to the workspace, no extension)
pub const MOUNT_OUT_NAME: &str = "__story_harness/mount";

/// Workspace path of the compiled shim
pub const MOUNT_MODULE_PATH: &str = "__story_harness/mount.js";

/// Where the embedded shim is materialized inside the project, so that the
/// framework packages resolve from the project's `node_modules`
const EMBEDDED_SHIM_PATH: &str = "node_modules/.story-harness/mount.mjs";

/// Entry point compiling the mount shim for `mode` to [`MOUNT_MODULE_PATH`]
pub async fn shim_entry(mode: &RuntimeMode, project_root: &Path) -> HarnessResult<EntryPoint> {
    let entry = match mode {
        RuntimeMode::Packaged { specifier } => EntryPoint::package(specifier.clone()),
        RuntimeMode::Development { source } => {
            let source = if source.is_absolute() {
                source.clone()
            } else {
                project_root.join(source)
            };
            EntryPoint::file(source)
        }
        RuntimeMode::Embedded => EntryPoint::file(materialize_embedded_shim(project_root).await?),
    };
    Ok(entry.named(MOUNT_OUT_NAME))
}

async fn materialize_embedded_shim(project_root: &Path) -> HarnessResult<std::path::PathBuf> {
    let path = project_root.join(EMBEDDED_SHIM_PATH);

    let current = tokio::fs::read_to_string(&path).await.ok();
    if current.as_deref() != Some(MOUNT_SHIM_SOURCE) {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, MOUNT_SHIM_SOURCE).await?;
        debug!("Wrote embedded mount shim to {}", path.display());
    }

    Ok(path)
}

/// Module script mounting the story at `story_module` with `props_json`
pub fn render_script(story_module: &str, props_json: &str) -> String {
    format!(
        "import mount from {shim};\nimport story from {story};\nmount.render(document.getElementById({root}), {props}, story);\n",
        shim = js_string(&format!("/{}", MOUNT_MODULE_PATH)),
        story = js_string(&format!("/{}", url_path(story_module.trim_start_matches('/')))),
        root = js_string(MOUNT_ELEMENT_ID),
        props = props_json,
    )
}

/// Module script pushing `props_json` into the mounted story
pub fn update_script(props_json: &str) -> String {
    format!(
        "import mount from {shim};\nmount.update({props});\n",
        shim = js_string(&format!("/{}", MOUNT_MODULE_PATH)),
        props = props_json,
    )
}

/// Quote `value` as a JavaScript string literal
pub(crate) fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
