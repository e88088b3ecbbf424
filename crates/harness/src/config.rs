//! Harness configuration
//!
//! Loaded from `story-harness.toml` at the project root when present. Every
//! section has defaults, so an absent file behaves like an empty one. Unknown
//! keys are rejected when the file is parsed.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bundler::BuildOptions;
use crate::context::RuntimeMode;
use crate::error::{HarnessError, HarnessResult};
use crate::wait::WaitPolicy;

/// Default configuration file name, looked up in the project root
pub const CONFIG_FILE_NAME: &str = "story-harness.toml";

/// Top-level harness configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Bundler invocation
    pub bundler: BundlerConfig,

    /// Where the mount shim comes from
    pub runtime: RuntimeMode,

    /// Static asset server
    pub server: ServerConfig,

    /// Artifact wait policy
    pub wait: WaitConfig,

    /// Test-file to story-file convention
    pub resolver: ResolverConfig,
}

/// Bundler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundlerConfig {
    /// Path to the esbuild executable (None = `node_modules/.bin/esbuild`, then `PATH`)
    pub esbuild: Option<PathBuf>,

    /// Framework runtime packages bundled ahead of any story
    pub framework_packages: Vec<String>,

    /// Compiler options shared by every bundling call
    pub options: BuildOptions,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            esbuild: None,
            framework_packages: vec!["react".to_string(), "react-dom/client".to_string()],
            options: BuildOptions::default(),
        }
    }
}

/// Static asset server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to bind; the port is always assigned by the OS
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
        }
    }
}

/// Bounded artifact wait configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaitConfig {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            timeout_ms: 5_000,
        }
    }
}

impl WaitConfig {
    pub fn policy(&self) -> WaitPolicy {
        WaitPolicy {
            interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// Story inference convention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Suffix appended to the test file stem to name its story
    pub story_suffix: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            story_suffix: ".story.tsx".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Load `story-harness.toml` from a project root
    pub fn load_from_root(project_root: &Path) -> HarnessResult<Self> {
        Self::load(&project_root.join(CONFIG_FILE_NAME))
    }

    /// Parse configuration text
    pub fn from_toml(content: &str) -> HarnessResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> HarnessResult<()> {
        if !self.resolver.story_suffix.starts_with('.') {
            return Err(HarnessError::Config(format!(
                "resolver.story_suffix must start with '.', got '{}'",
                self.resolver.story_suffix
            )));
        }
        if self.wait.timeout_ms == 0 {
            return Err(HarnessError::Config(
                "wait.timeout_ms must be greater than zero".to_string(),
            ));
        }
        self.bundler.options.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{Format, Loader};

    #[test]
    fn empty_file_yields_defaults() {
        let config = HarnessConfig::from_toml("").unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.bundler.framework_packages, vec!["react", "react-dom/client"]);
        assert_eq!(config.runtime, RuntimeMode::Embedded);
    }

    #[test]
    fn parses_sections() {
        let config = HarnessConfig::from_toml(
            r#"
[bundler]
esbuild = "tools/esbuild"
framework_packages = ["preact"]

[bundler.options]
format = "esm"
minify = true

[bundler.options.loaders]
".svg" = "dataurl"

[runtime]
mode = "development"
source = "src/mount.tsx"

[server]
host = "0.0.0.0"

[wait]
poll_interval_ms = 10
timeout_ms = 250
"#,
        )
        .unwrap();

        assert_eq!(config.bundler.esbuild, Some(PathBuf::from("tools/esbuild")));
        assert_eq!(config.bundler.options.format, Format::Esm);
        assert!(config.bundler.options.minify);
        assert_eq!(config.bundler.options.loaders.get(".svg"), Some(&Loader::Dataurl));
        assert_eq!(
            config.runtime,
            RuntimeMode::Development {
                source: PathBuf::from("src/mount.tsx")
            }
        );
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.wait.policy().timeout, Duration::from_millis(250));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = HarnessConfig::from_toml("[bundler]\nsplit_chunks = true\n").unwrap_err();
        assert!(matches!(err, HarnessError::Toml(_)), "{err}");

        let err = HarnessConfig::from_toml("[bundler.options]\nexternal = [\"react\"]\n").unwrap_err();
        assert!(matches!(err, HarnessError::Toml(_)), "{err}");
    }

    #[test]
    fn runtime_keys_are_checked_per_mode() {
        let err = HarnessConfig::from_toml("[runtime]\nmode = \"embedded\"\nsoruce = \"src/mount.tsx\"\n").unwrap_err();
        assert!(matches!(err, HarnessError::Toml(_)), "{err}");

        let err = HarnessConfig::from_toml("[runtime]\nmode = \"embedded\"\nsource = \"src/mount.tsx\"\n").unwrap_err();
        assert!(err.to_string().contains("not valid for runtime mode 'embedded'"), "{err}");

        let err = HarnessConfig::from_toml("[runtime]\nmode = \"packaged\"\n").unwrap_err();
        assert!(err.to_string().contains("requires `specifier`"), "{err}");

        let config = HarnessConfig::from_toml("[runtime]\nmode = \"packaged\"\nspecifier = \"story-harness-mount\"\n").unwrap();
        assert_eq!(
            config.runtime,
            RuntimeMode::Packaged {
                specifier: "story-harness-mount".to_string()
            }
        );
    }

    #[test]
    fn story_suffix_must_be_an_extension() {
        let err = HarnessConfig::from_toml("[resolver]\nstory_suffix = \"story.tsx\"\n").unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load_from_root(dir.path()).unwrap();
        assert_eq!(config, HarnessConfig::default());
    }
}
