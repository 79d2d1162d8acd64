use crate::error::{DoctorError, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Supplies the files a command should act on.
#[async_trait::async_trait]
pub trait FileSelectionProvider: Send + Sync + 'static {
    async fn selected_paths(&self) -> Result<Vec<PathBuf>>;
}

/// Does the file name end in one of `patterns`, ignoring case?
pub fn is_target_config(path: &Path, patterns: &[String]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_lowercase();
    patterns
        .iter()
        .any(|pattern| name.ends_with(&pattern.to_lowercase()))
}

/// A fixed list of paths, e.g. from the command line.
#[derive(Debug, Clone, Default)]
pub struct ExplicitSelection {
    paths: Vec<PathBuf>,
}

impl ExplicitSelection {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

#[async_trait::async_trait]
impl FileSelectionProvider for ExplicitSelection {
    async fn selected_paths(&self) -> Result<Vec<PathBuf>> {
        Ok(self.paths.clone())
    }
}

/// Directories never worth descending into.
const SKIPPED_DIRS: &[&str] = &["bin", "obj", "node_modules", "packages"];

/// Walks a directory tree and selects every matching config file.
#[derive(Debug, Clone)]
pub struct ConfigScan {
    root: PathBuf,
    patterns: Vec<String>,
    max_depth: usize,
}

impl ConfigScan {
    pub const DEFAULT_MAX_DEPTH: usize = 8;

    pub fn new(root: impl Into<PathBuf>, patterns: Vec<String>) -> Self {
        Self {
            root: root.into(),
            patterns,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

#[async_trait::async_trait]
impl FileSelectionProvider for ConfigScan {
    async fn selected_paths(&self) -> Result<Vec<PathBuf>> {
        // BTreeSet keeps the selection stable between runs
        let mut found = BTreeSet::new();
        let mut pending = vec![(self.root.clone(), 0usize)];

        while let Some((dir, depth)) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| DoctorError::fs(&dir, e))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| DoctorError::fs(&dir, e))?
            {
                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                        continue;
                    }
                };

                if file_type.is_dir() {
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    if depth < self.max_depth
                        && !name.starts_with('.')
                        && !SKIPPED_DIRS.iter().any(|s| name.eq_ignore_ascii_case(s))
                    {
                        pending.push((path, depth + 1));
                    }
                } else if file_type.is_file() && is_target_config(&path, &self.patterns) {
                    found.insert(path);
                }
            }
        }

        tracing::debug!(root = %self.root.display(), count = found.len(), "Scan complete");
        Ok(found.into_iter().collect())
    }
}

/// Union of several providers, duplicates removed, first occurrence kept.
#[derive(Default)]
pub struct CombinedSelection {
    providers: Vec<Box<dyn FileSelectionProvider>>,
}

impl CombinedSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl FileSelectionProvider) -> Self {
        self.providers.push(Box::new(provider));
        self
    }
}

#[async_trait::async_trait]
impl FileSelectionProvider for CombinedSelection {
    async fn selected_paths(&self) -> Result<Vec<PathBuf>> {
        let mut seen = BTreeSet::new();
        let mut paths = Vec::new();
        for provider in &self.providers {
            for path in provider.selected_paths().await? {
                if seen.insert(path.clone()) {
                    paths.push(path);
                }
            }
        }
        Ok(paths)
    }
}
