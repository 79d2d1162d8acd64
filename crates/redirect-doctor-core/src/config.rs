use crate::error::{DoctorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub files: FileSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub revision_control: RevisionControlSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSettings {
    /// File name suffixes, matched case-insensitively.
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
    #[serde(default = "default_backup_extension")]
    pub backup_extension: String,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
            backup_extension: default_backup_extension(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Files processed at once. 0 means one per available CPU.
    #[serde(default)]
    pub parallelism: usize,
}

impl BatchSettings {
    pub fn effective_parallelism(&self) -> usize {
        if self.parallelism > 0 {
            return self.parallelism;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionControlProvider {
    #[default]
    None,
    Git,
    Command,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevisionControlSettings {
    #[serde(default)]
    pub provider: RevisionControlProvider,
    /// Exits 0 when the path is tracked. `{path}` is substituted.
    #[serde(default)]
    pub status_command: Vec<String>,
    /// Checks the path out for editing. `{path}` is substituted.
    #[serde(default)]
    pub checkout_command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Relative paths are resolved against the data directory.
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            filter: default_log_filter(),
        }
    }
}

fn default_patterns() -> Vec<String> {
    vec!["web.config".into(), "app.config".into()]
}
fn default_backup_extension() -> String {
    "bak".into()
}
fn default_log_directory() -> String {
    "logs".into()
}
fn default_log_filter() -> String {
    "info".into()
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DoctorError::fs(path, e))?;
        serde_json::from_str(&content).map_err(|e| DoctorError::Config {
            detail: format!("{}: {e}", path.display()),
        })
    }

    /// Load settings, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DoctorError::fs(parent, e))?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| DoctorError::Config {
            detail: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| DoctorError::fs(path, e))?;
        Ok(())
    }
}
