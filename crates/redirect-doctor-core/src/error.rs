use std::io;
use std::path::{Path, PathBuf};

/// Errors raised while fixing binding redirects.
#[derive(Debug, thiserror::Error)]
pub enum DoctorError {
    #[error("Please select a web.config or app.config file to fix")]
    NoFilesSelected,

    #[error("Malformed config: {detail}")]
    MalformedConfig { detail: String },

    #[error("I/O error on {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'{value}' is not a four-part version")]
    VersionParse { value: String },

    #[error("Revision control failed for {}: {detail}", path.display())]
    RevisionControl { path: PathBuf, detail: String },

    #[error("Command '{command}' is already running")]
    AlreadyRunning { command: String },

    #[error("Configuration error: {detail}")]
    Config { detail: String },

    #[error("Background task failed: {detail}")]
    TaskFailed { detail: String },
}

impl DoctorError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        DoctorError::MalformedConfig {
            detail: detail.into(),
        }
    }

    pub fn fs(path: &Path, source: io::Error) -> Self {
        DoctorError::FileSystem {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Short machine-readable name of the error kind, used in JSON reports.
    pub fn kind(&self) -> &'static str {
        match self {
            DoctorError::NoFilesSelected => "no_files_selected",
            DoctorError::MalformedConfig { .. } => "malformed_config",
            DoctorError::FileSystem { .. } => "file_system",
            DoctorError::VersionParse { .. } => "version_parse",
            DoctorError::RevisionControl { .. } => "revision_control",
            DoctorError::AlreadyRunning { .. } => "already_running",
            DoctorError::Config { .. } => "config",
            DoctorError::TaskFailed { .. } => "task_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, DoctorError>;
