//! Bundler adapter
//!
//! Compiles entry modules (framework packages, the mount shim, story files)
//! into browser-loadable ES modules inside the run workspace. The compiler
//! itself is external: [`EsbuildBundler`] drives the `esbuild` executable,
//! and anything implementing [`Bundler`] can stand in for it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};

/// Output module format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Esm,
    Iife,
    Cjs,
}

impl Format {
    fn as_str(&self) -> &'static str {
        match self {
            Format::Esm => "esm",
            Format::Iife => "iife",
            Format::Cjs => "cjs",
        }
    }
}

/// JSX transform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsxMode {
    /// `react-jsx` style automatic runtime
    #[default]
    Automatic,
    /// Classic `React.createElement` calls
    Transform,
    Preserve,
}

impl JsxMode {
    fn as_str(&self) -> &'static str {
        match self {
            JsxMode::Automatic => "automatic",
            JsxMode::Transform => "transform",
            JsxMode::Preserve => "preserve",
        }
    }
}

/// How files with a given extension are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Loader {
    Js,
    Jsx,
    Ts,
    Tsx,
    /// Bundled into a stylesheet emitted next to the importing entry
    Css,
    Json,
    Text,
    Base64,
    Dataurl,
    /// Emitted as a separate asset named by `asset_names`
    File,
    /// Copied to the output unchanged
    Copy,
    Empty,
}

impl Loader {
    fn as_str(&self) -> &'static str {
        match self {
            Loader::Js => "js",
            Loader::Jsx => "jsx",
            Loader::Ts => "ts",
            Loader::Tsx => "tsx",
            Loader::Css => "css",
            Loader::Json => "json",
            Loader::Text => "text",
            Loader::Base64 => "base64",
            Loader::Dataurl => "dataurl",
            Loader::File => "file",
            Loader::Copy => "copy",
            Loader::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Browser,
    Node,
    Neutral,
}

impl Platform {
    fn as_str(&self) -> &'static str {
        match self {
            Platform::Browser => "browser",
            Platform::Node => "node",
            Platform::Neutral => "neutral",
        }
    }
}

/// Compiler options recognized by the harness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildOptions {
    pub format: Format,
    pub jsx: JsxMode,

    /// Extension (with leading dot) to loader
    pub loaders: BTreeMap<String, Loader>,

    /// Naming template for `file` loader assets
    pub asset_names: Option<String>,

    /// Share common chunks between entries (esm only)
    pub splitting: bool,
    pub minify: bool,
    pub sourcemap: bool,

    /// Language target such as `es2020`
    pub target: Option<String>,
    pub platform: Platform,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            format: Format::Esm,
            jsx: JsxMode::Automatic,
            loaders: BTreeMap::from([(".css".to_string(), Loader::Css)]),
            asset_names: Some("[dir]/[name]".to_string()),
            splitting: false,
            minify: false,
            sourcemap: false,
            target: None,
            platform: Platform::Browser,
        }
    }
}

impl BuildOptions {
    pub fn with_loader(mut self, extension: impl Into<String>, loader: Loader) -> Self {
        self.loaders.insert(extension.into(), loader);
        self
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.splitting && self.format != Format::Esm {
            return Err(HarnessError::Config(
                "bundler.options.splitting requires format = \"esm\"".to_string(),
            ));
        }
        if let Some(ext) = self.loaders.keys().find(|ext| !ext.starts_with('.') || ext.len() < 2) {
            return Err(HarnessError::Config(format!(
                "loader extension '{}' must look like '.ext'",
                ext
            )));
        }
        Ok(())
    }
}

/// What an entry point refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySource {
    /// Bare module specifier resolved from `node_modules`, e.g. `react-dom/client`
    Package(String),
    /// Source file on disk
    File(PathBuf),
}

/// One bundle entry, optionally with a fixed output name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub source: EntrySource,

    /// Output path relative to the output directory, without extension
    pub out_name: Option<String>,
}

impl EntryPoint {
    pub fn package(specifier: impl Into<String>) -> Self {
        Self {
            source: EntrySource::Package(specifier.into()),
            out_name: None,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: EntrySource::File(path.into()),
            out_name: None,
        }
    }

    /// Pin the output location instead of mirroring the input path
    pub fn named(mut self, out_name: impl Into<String>) -> Self {
        self.out_name = Some(out_name.into());
        self
    }

    fn input(&self) -> String {
        match &self.source {
            EntrySource::Package(specifier) => specifier.clone(),
            EntrySource::File(path) => path.to_string_lossy().into_owned(),
        }
    }

    fn to_arg(&self) -> String {
        match &self.out_name {
            Some(out) => format!("{}={}", out, self.input()),
            None => self.input(),
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_arg())
    }
}

/// A single bundling call
#[derive(Debug, Clone, PartialEq)]
pub struct BundleRequest {
    /// Entries in build order
    pub entry_points: Vec<EntryPoint>,

    /// Directory outputs are written to (the run workspace)
    pub out_dir: PathBuf,

    /// Input directory the output tree mirrors (the project root)
    pub out_base: PathBuf,

    pub options: BuildOptions,
}

impl BundleRequest {
    pub fn new(out_dir: impl Into<PathBuf>, out_base: impl Into<PathBuf>, options: BuildOptions) -> Self {
        Self {
            entry_points: Vec::new(),
            out_dir: out_dir.into(),
            out_base: out_base.into(),
            options,
        }
    }

    pub fn entry(mut self, entry: EntryPoint) -> Self {
        self.entry_points.push(entry);
        self
    }

    pub fn entries(mut self, entries: impl IntoIterator<Item = EntryPoint>) -> Self {
        self.entry_points.extend(entries);
        self
    }

    fn describe(&self) -> String {
        self.entry_points
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Outcome of a successful bundling call
#[derive(Debug, Clone, PartialEq)]
pub struct BundleReport {
    pub entries: usize,
    pub duration: Duration,

    /// Non-fatal compiler diagnostics
    pub warnings: String,
}

/// Compiles entry points into the workspace
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Resolves once every output is written; any compile error is a `BuildFailure`.
    async fn bundle(&self, request: &BundleRequest) -> HarnessResult<BundleReport>;
}

/// [`Bundler`] backed by the esbuild command line
#[derive(Debug, Clone)]
pub struct EsbuildBundler {
    binary: PathBuf,
    working_dir: PathBuf,
}

impl EsbuildBundler {
    pub fn new(binary: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            working_dir: working_dir.into(),
        }
    }

    /// Pick the configured binary, else the project's `node_modules/.bin/esbuild`, else `esbuild` from `PATH`
    pub fn locate(project_root: &Path, configured: Option<&Path>) -> Self {
        let binary = match configured {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => project_root.join(path),
            None => {
                let local = project_root.join("node_modules").join(".bin").join("esbuild");
                if local.exists() {
                    local
                } else {
                    PathBuf::from("esbuild")
                }
            }
        };
        Self::new(binary, project_root)
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Command line for a request
    pub fn args(request: &BundleRequest) -> Vec<String> {
        let options = &request.options;
        let mut args: Vec<String> = request.entry_points.iter().map(EntryPoint::to_arg).collect();

        args.push("--bundle".to_string());
        args.push(format!("--format={}", options.format.as_str()));
        args.push(format!("--platform={}", options.platform.as_str()));
        args.push(format!("--jsx={}", options.jsx.as_str()));
        args.push(format!("--outdir={}", request.out_dir.display()));
        args.push(format!("--outbase={}", request.out_base.display()));

        for (ext, loader) in &options.loaders {
            args.push(format!("--loader:{}={}", ext, loader.as_str()));
        }
        if let Some(asset_names) = &options.asset_names {
            args.push(format!("--asset-names={}", asset_names));
        }
        if options.splitting {
            args.push("--splitting".to_string());
        }
        if options.minify {
            args.push("--minify".to_string());
        }
        if options.sourcemap {
            args.push("--sourcemap".to_string());
        }
        if let Some(target) = &options.target {
            args.push(format!("--target={}", target));
        }
        args.push("--log-level=warning".to_string());

        args
    }
}

#[async_trait]
impl Bundler for EsbuildBundler {
    async fn bundle(&self, request: &BundleRequest) -> HarnessResult<BundleReport> {
        if request.entry_points.is_empty() {
            return Ok(BundleReport {
                entries: 0,
                duration: Duration::ZERO,
                warnings: String::new(),
            });
        }
        request.options.validate()?;

        let start = Instant::now();
        let args = Self::args(request);
        debug!("Running {} {}", self.binary.display(), args.join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| HarnessError::BuildFailure {
                entries: request.describe(),
                diagnostics: format!("failed to start {}: {}", self.binary.display(), e),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            let diagnostics = if stderr.is_empty() {
                format!(
                    "{} exited with {}: {}",
                    self.binary.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stdout).trim()
                )
            } else {
                stderr
            };
            return Err(HarnessError::BuildFailure {
                entries: request.describe(),
                diagnostics,
            });
        }

        if !stderr.is_empty() {
            warn!("esbuild reported warnings:\n{}", stderr);
        }

        let duration = start.elapsed();
        info!(
            "Bundled {} entr{} into {} in {} ms",
            request.entry_points.len(),
            if request.entry_points.len() == 1 { "y" } else { "ies" },
            request.out_dir.display(),
            duration.as_millis()
        );

        Ok(BundleReport {
            entries: request.entry_points.len(),
            duration,
            warnings: stderr,
        })
    }
}
