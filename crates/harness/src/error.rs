//! Error types for the story harness

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(
        "Run context is not available: {0}. Begin a workspace (or run the tests through `story-harness run`) before mounting stories"
    )]
    SetupNotCalled(String),

    #[error("Missing story file {}", .0.display())]
    StoryNotFound(PathBuf),

    #[error("Story file {} resolves outside of the project root {}", .path.display(), .root.display())]
    PathEscape { path: PathBuf, root: PathBuf },

    #[error("Build failed for [{entries}]: {diagnostics}")]
    BuildFailure { entries: String, diagnostics: String },

    #[error("Timed out after {timeout:?} waiting for {}", .path.display())]
    TimeoutWaitingForArtifact { path: PathBuf, timeout: Duration },

    #[error("update called before a story was mounted")]
    UpdateBeforeMount,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Page error: {0}")]
    Page(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
