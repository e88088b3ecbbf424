//! Test suite tree handed to the pre-run bundler pass

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::HarnessResult;
use crate::resolver::{to_slash, StoryResolver};

/// A group of tests, possibly nested
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    pub title: String,

    #[serde(default)]
    pub suites: Vec<Suite>,

    #[serde(default)]
    pub tests: Vec<TestCase>,
}

/// A leaf test and the file it was declared in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub title: String,
    pub file: PathBuf,
}

impl TestCase {
    pub fn new(title: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            title: title.into(),
            file: file.into(),
        }
    }
}

impl Suite {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_suite(mut self, suite: Suite) -> Self {
        self.suites.push(suite);
        self
    }

    pub fn with_test(mut self, test: TestCase) -> Self {
        self.tests.push(test);
        self
    }

    /// Every leaf test, depth first
    pub fn all_tests(&self) -> Vec<&TestCase> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a TestCase>) {
        for child in &self.suites {
            child.collect(out);
        }
        out.extend(self.tests.iter());
    }

    /// Build a suite from the test files below `dir`, one child suite per directory.
    ///
    /// Hidden directories, `node_modules` and `target` are skipped.
    pub fn discover(dir: &Path, resolver: &StoryResolver) -> HarnessResult<Suite> {
        let mut by_dir: BTreeMap<String, Vec<TestCase>> = BTreeMap::new();

        for entry in WalkDir::new(dir).sort_by_file_name().into_iter().filter_entry(|e| !is_ignored(e)) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() || !resolver.is_test_file(entry.path()) {
                continue;
            }

            let path = entry.path().to_path_buf();
            let group = path
                .parent()
                .and_then(|p| p.strip_prefix(dir).ok())
                .map(to_slash)
                .unwrap_or_default();
            let title = to_slash(path.strip_prefix(dir).unwrap_or(&path));
            by_dir.entry(group).or_default().push(TestCase::new(title, path));
        }

        let mut root = Suite::new(dir.display().to_string());
        for (group, tests) in by_dir {
            debug!("Discovered {} test file(s) in '{}'", tests.len(), group);
            root.suites.push(Suite {
                title: group,
                suites: Vec::new(),
                tests,
            });
        }
        Ok(root)
    }
}

fn is_ignored(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "node_modules" || name == "target"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn all_tests_walks_nested_groups() {
        let suite = Suite::new("root")
            .with_test(TestCase::new("top", "a.test.ts"))
            .with_suite(
                Suite::new("group")
                    .with_test(TestCase::new("inner", "b.test.ts"))
                    .with_suite(Suite::new("deeper").with_test(TestCase::new("deepest", "c.test.ts"))),
            );

        let titles: Vec<&str> = suite.all_tests().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["deepest", "inner", "top"]);
    }

    #[test]
    fn discover_groups_test_files_by_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("tests/widgets")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("tests/App.test.ts"), "").unwrap();
        fs::write(root.join("tests/App.story.tsx"), "").unwrap();
        fs::write(root.join("tests/widgets/Button.spec.ts"), "").unwrap();
        fs::write(root.join("node_modules/pkg/x.test.ts"), "").unwrap();

        let resolver = StoryResolver::new(root, ".story.tsx").unwrap();
        let suite = Suite::discover(root, &resolver).unwrap();

        let titles: Vec<&str> = suite.suites.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["tests", "tests/widgets"]);

        let files: Vec<String> = suite.all_tests().iter().map(|t| t.title.clone()).collect();
        assert_eq!(files, vec!["tests/App.test.ts", "tests/widgets/Button.spec.ts"]);
    }
}
