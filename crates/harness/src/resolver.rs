//! Story resolution: from a test file to the story module it mounts

use regex::Regex;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

/// Matches the optional `.test`/`.spec` marker plus the source extension of a test file name
const TEST_FILE_PATTERN: &str = r"(\.(test|spec))?\.(tsx?|jsx?|mts|mjs|rs)$";

/// A resolved, validated story module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryRef {
    /// Absolute path of the test the story was resolved for
    pub test_file: PathBuf,

    /// Absolute path of the story module
    pub story_file: PathBuf,

    /// Story path relative to the project root, `/`-separated
    pub relative: String,

    /// Whether the story came from an explicit override rather than the naming convention
    pub explicit: bool,
}

impl StoryRef {
    /// Output path of the story bundle relative to the workspace, without extension
    pub fn bundle_stem(&self) -> String {
        match self.relative.rfind('.') {
            Some(dot) if dot > self.relative.rfind('/').map_or(0, |slash| slash + 1) => {
                self.relative[..dot].to_string()
            }
            _ => self.relative.clone(),
        }
    }

    /// Workspace-relative path of the compiled story module
    pub fn module_path(&self) -> String {
        format!("{}.js", self.bundle_stem())
    }

    /// Workspace-relative path of the stylesheet emitted next to the story module
    pub fn stylesheet_path(&self) -> String {
        format!("{}.css", self.bundle_stem())
    }
}

/// Maps test files to story files under one project root
#[derive(Debug, Clone)]
pub struct StoryResolver {
    project_root: PathBuf,
    story_suffix: String,
    pattern: Regex,
}

impl StoryResolver {
    pub fn new(project_root: impl Into<PathBuf>, story_suffix: impl Into<String>) -> HarnessResult<Self> {
        let project_root = absolutize(&project_root.into())?;
        let pattern = Regex::new(TEST_FILE_PATTERN)
            .map_err(|e| HarnessError::Config(format!("invalid test file pattern: {}", e)))?;

        Ok(Self {
            project_root: normalize(&project_root),
            story_suffix: story_suffix.into(),
            pattern,
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Whether `path` is named like a test file
    pub fn is_test_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| self.pattern.captures(name))
            .map(|caps| caps.get(1).is_some())
            .unwrap_or(false)
    }

    /// Story path the naming convention assigns to `test_file`, without touching the disk.
    ///
    /// `tests/Foo.test.ts`, `tests/Foo.spec.ts` and `tests/Foo.ts` all map to
    /// `tests/Foo.story.tsx`. Returns `None` when the file name carries no
    /// recognized source extension.
    pub fn infer(&self, test_file: &Path) -> Option<PathBuf> {
        let name = test_file.file_name()?.to_str()?;
        let m = self.pattern.find(name)?;
        let story_name = format!("{}{}", &name[..m.start()], self.story_suffix);
        Some(test_file.with_file_name(story_name))
    }

    /// Resolve and validate the story for `test_file`.
    ///
    /// An override is taken relative to the test file's directory. The result
    /// must stay inside the project root and exist on disk.
    pub fn resolve(&self, test_file: &Path, story_override: Option<&Path>) -> HarnessResult<StoryRef> {
        let test_file = normalize(&self.project_root.join(test_file));

        let (candidate, explicit) = match story_override {
            Some(story) => {
                let dir = test_file.parent().unwrap_or(&self.project_root);
                (dir.join(story), true)
            }
            None => {
                let inferred = self
                    .infer(&test_file)
                    .ok_or_else(|| HarnessError::StoryNotFound(test_file.clone()))?;
                (inferred, false)
            }
        };

        let story_file = normalize(&candidate);
        if !story_file.starts_with(&self.project_root) {
            return Err(HarnessError::PathEscape {
                path: candidate,
                root: self.project_root.clone(),
            });
        }
        if !story_file.is_file() {
            return Err(HarnessError::StoryNotFound(story_file));
        }

        let relative = to_slash(story_file.strip_prefix(&self.project_root).unwrap_or(&story_file));
        debug!(
            "Resolved story {} for {} (explicit: {})",
            relative,
            test_file.display(),
            explicit
        );

        Ok(StoryRef {
            test_file,
            story_file,
            relative,
            explicit,
        })
    }
}

fn absolutize(path: &Path) -> HarnessResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Lexical normalization: drops `.` and folds `..` without consulting the filesystem
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}

pub(crate) fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
