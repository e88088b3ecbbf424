//! Run context shared by every harness component
//!
//! The [`RunContext`] is produced once by the workspace lifecycle manager and
//! handed to the bundler pass and mount driver by reference. When the test
//! processes are separate from the process that owns the workspace, the
//! context crosses the boundary as environment variables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{HarnessError, HarnessResult};
use crate::server::url_path;

pub const ENV_WORKSPACE: &str = "STORY_HARNESS_WORKSPACE";
pub const ENV_PORT: &str = "STORY_HARNESS_PORT";
pub const ENV_HOST: &str = "STORY_HARNESS_HOST";
pub const ENV_MODE: &str = "STORY_HARNESS_MODE";
pub const ENV_PROJECT_ROOT: &str = "STORY_HARNESS_PROJECT_ROOT";

/// Source of the browser-side mount shim
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case", try_from = "RawRuntimeMode")]
pub enum RuntimeMode {
    /// The shim shipped with this crate
    #[default]
    Embedded,
    /// A pre-built package resolved by the bundler from `node_modules`
    Packaged { specifier: String },
    /// A live local source file, rebuilt on every run
    Development { source: PathBuf },
}

/// `[runtime]` table as written; every mode shares one closed key set
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRuntimeMode {
    mode: RuntimeKind,
    specifier: Option<String>,
    source: Option<PathBuf>,
}

impl TryFrom<RawRuntimeMode> for RuntimeMode {
    type Error = String;

    fn try_from(raw: RawRuntimeMode) -> Result<Self, Self::Error> {
        match (raw.mode, raw.specifier, raw.source) {
            (RuntimeKind::Embedded, None, None) => Ok(RuntimeMode::Embedded),
            (RuntimeKind::Packaged, Some(specifier), None) => Ok(RuntimeMode::Packaged { specifier }),
            (RuntimeKind::Development, None, Some(source)) => Ok(RuntimeMode::Development { source }),
            (RuntimeKind::Packaged, None, _) => Err("runtime mode 'packaged' requires `specifier`".to_string()),
            (RuntimeKind::Development, _, None) => Err("runtime mode 'development' requires `source`".to_string()),
            (kind, specifier, _) => {
                let key = match kind {
                    RuntimeKind::Packaged => "source",
                    RuntimeKind::Development => "specifier",
                    RuntimeKind::Embedded if specifier.is_some() => "specifier",
                    RuntimeKind::Embedded => "source",
                };
                Err(format!("`{}` is not valid for runtime mode '{}'", key, kind))
            }
        }
    }
}

impl RuntimeMode {
    pub fn kind(&self) -> RuntimeKind {
        match self {
            RuntimeMode::Embedded => RuntimeKind::Embedded,
            RuntimeMode::Packaged { .. } => RuntimeKind::Packaged,
            RuntimeMode::Development { .. } => RuntimeKind::Development,
        }
    }
}

/// Discriminant of [`RuntimeMode`], the part of it published with the run context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    Embedded,
    Packaged,
    Development,
}

impl RuntimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Embedded => "embedded",
            RuntimeKind::Packaged => "packaged",
            RuntimeKind::Development => "development",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "embedded" => Ok(RuntimeKind::Embedded),
            "packaged" => Ok(RuntimeKind::Packaged),
            "development" => Ok(RuntimeKind::Development),
            other => Err(HarnessError::Config(format!("unknown runtime mode '{}'", other))),
        }
    }
}

/// Read-only record of one test run's workspace and server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    /// Temporary directory holding compiled bundles
    pub workspace_dir: PathBuf,

    /// Port the static asset server listens on
    pub server_port: u16,

    /// Interface the static asset server is bound to
    pub server_host: String,

    /// Where the mount shim was built from
    pub mode: RuntimeKind,

    /// Containment root for story files and `outbase` for bundles
    pub project_root: PathBuf,
}

impl RunContext {
    pub fn dev_mode(&self) -> bool {
        self.mode == RuntimeKind::Development
    }

    /// Base URL pages navigate to
    pub fn base_url(&self) -> String {
        let host = match self.server_host.parse::<IpAddr>() {
            Ok(ip) if ip.is_unspecified() => "127.0.0.1".to_string(),
            Ok(IpAddr::V6(ip)) => format!("[{}]", ip),
            _ => self.server_host.clone(),
        };
        format!("http://{}:{}", host, self.server_port)
    }

    /// Absolute URL of a workspace-relative path
    pub fn url(&self, relative: &str) -> String {
        format!("{}/{}", self.base_url(), url_path(relative.trim_start_matches('/')))
    }

    /// Location of a workspace-relative path on disk
    pub fn workspace_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.workspace_dir.join(relative)
    }

    /// Environment variables publishing this context to child processes
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_WORKSPACE, self.workspace_dir.to_string_lossy().into_owned()),
            (ENV_PORT, self.server_port.to_string()),
            (ENV_HOST, self.server_host.clone()),
            (ENV_MODE, self.mode.as_str().to_string()),
            (ENV_PROJECT_ROOT, self.project_root.to_string_lossy().into_owned()),
        ]
    }

    /// Read the context published by [`RunContext::env_vars`] from this process' environment
    pub fn from_env() -> HarnessResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the context through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| HarnessError::SetupNotCalled(format!("{} is not set", key)))
        };

        let workspace_dir = PathBuf::from(required(ENV_WORKSPACE)?);
        let port = required(ENV_PORT)?;
        let server_port = port.trim().parse::<u16>().map_err(|_| {
            HarnessError::SetupNotCalled(format!("{} is not a port number: '{}'", ENV_PORT, port))
        })?;
        let server_host = lookup(ENV_HOST)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let mode = match lookup(ENV_MODE) {
            Some(value) if !value.trim().is_empty() => value.trim().parse()?,
            _ => RuntimeKind::Embedded,
        };
        let project_root = match lookup(ENV_PROJECT_ROOT) {
            Some(value) if !value.trim().is_empty() => PathBuf::from(value),
            _ => std::env::current_dir()?,
        };

        Ok(Self {
            workspace_dir,
            server_port,
            server_host,
            mode,
            project_root,
        })
    }
}
