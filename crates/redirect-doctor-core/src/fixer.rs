use crate::config::Settings;
use crate::document::ConfigDocument;
use crate::error::{DoctorError, Result};
use crate::merge::{merge, MergeReport};
use crate::progress::{batch_message, ProgressReporter};
use crate::selection::is_target_config;
use crate::vcs::{ensure_checked_out, RevisionControl};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Semaphore;

pub const FINISHED_MESSAGE: &str = "Operation finished. Please see log for details.";
pub const FAILED_MESSAGE: &str = "Operation failed. Please see log for details.";

#[derive(Debug, Clone, Copy, Default)]
pub struct FixOptions {
    /// Merge in memory and report, without backing up or saving.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub backup: Option<PathBuf>,
    pub merge: MergeReport,
    pub checked_out: bool,
    /// `false` for dry runs and for files that were already clean.
    pub written: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub kind: String,
    pub message: String,
}

impl FileFailure {
    fn new(path: PathBuf, error: &DoctorError) -> Self {
        Self {
            path,
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub files: Vec<FileReport>,
    pub failures: Vec<FileFailure>,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// `web.config` -> `web.config.bak`
pub fn backup_path(path: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// Backs up, merges and saves a batch of config files, one task per file.
pub struct RedirectFixer {
    patterns: Vec<String>,
    parallelism: usize,
    job: Arc<FileJob>,
    progress: Arc<dyn ProgressReporter>,
}

/// The per-file pipeline, shared by every spawned task.
struct FileJob {
    backup_extension: String,
    vcs: Arc<dyn RevisionControl>,
}

impl RedirectFixer {
    pub fn new(
        settings: &Settings,
        vcs: Arc<dyn RevisionControl>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            patterns: settings.files.patterns.clone(),
            parallelism: settings.batch.effective_parallelism(),
            job: Arc::new(FileJob {
                backup_extension: settings.files.backup_extension.clone(),
                vcs,
            }),
            progress,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn progress(&self) -> &Arc<dyn ProgressReporter> {
        &self.progress
    }

    /// Process every matching path. Individual file failures are collected
    /// in the report; only an empty selection fails the whole call.
    pub async fn run(&self, paths: Vec<PathBuf>, options: FixOptions) -> Result<BatchReport> {
        let started_at = Utc::now();
        // Two tasks on one file would share its backup and temp file.
        let mut seen = BTreeSet::new();
        let targets: Vec<PathBuf> = paths
            .into_iter()
            .filter(|p| {
                if !is_target_config(p, &self.patterns) {
                    tracing::debug!(path = %p.display(), "Not a target config, skipping");
                    return false;
                }
                if !seen.insert(p.clone()) {
                    tracing::debug!(path = %p.display(), "Selected twice, skipping duplicate");
                    return false;
                }
                true
            })
            .collect();

        if targets.is_empty() {
            let err = DoctorError::NoFilesSelected;
            self.progress.finish(&err.to_string());
            return Err(err);
        }

        self.progress.begin(&batch_message(targets.len()), targets.len());
        tracing::info!(
            count = targets.len(),
            parallelism = self.parallelism,
            dry_run = options.dry_run,
            "Starting batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.parallelism.max(1)));
        let mut handles = Vec::with_capacity(targets.len());

        for path in targets {
            let job = self.job.clone();
            let progress = self.progress.clone();
            let semaphore = semaphore.clone();
            let task_path = path.clone();
            let handle = tokio::spawn(async move {
                // Held until the file is done; the semaphore is never closed.
                let _permit = semaphore.acquire_owned().await;
                let result = job.process(&task_path, options).await;
                progress.advance(&task_path);
                result
            });
            handles.push((path, handle));
        }

        let mut files = Vec::new();
        let mut failures = Vec::new();

        for (path, handle) in handles {
            match handle.await {
                Ok(Ok(report)) => files.push(report),
                Ok(Err(e)) => {
                    tracing::error!(path = %path.display(), error = %e, "Update failed");
                    failures.push(FileFailure::new(path, &e));
                }
                Err(join_err) => {
                    tracing::error!(path = %path.display(), error = %join_err, "File task aborted");
                    let e = DoctorError::TaskFailed {
                        detail: join_err.to_string(),
                    };
                    failures.push(FileFailure::new(path, &e));
                }
            }
        }

        if failures.is_empty() {
            self.progress.finish(FINISHED_MESSAGE);
        } else {
            tracing::error!(failed = failures.len(), "Update failed. Exceptions:");
            for failure in &failures {
                tracing::error!("Message: {} ({})", failure.message, failure.path.display());
            }
            self.progress.finish(FAILED_MESSAGE);
        }

        Ok(BatchReport {
            started_at,
            finished_at: Utc::now(),
            dry_run: options.dry_run,
            files,
            failures,
        })
    }
}

impl FileJob {
    async fn process(&self, path: &Path, options: FixOptions) -> Result<FileReport> {
        let backup = if options.dry_run {
            None
        } else {
            let backup = backup_path(path, &self.backup_extension);
            // A backup taken from a locked file is itself read-only.
            match fs::remove_file(&backup).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    return Err(DoctorError::fs(&backup, e));
                }
                _ => {}
            }
            fs::copy(path, &backup)
                .await
                .map_err(|e| DoctorError::fs(path, e))?;
            tracing::info!(path = %path.display(), "Backup created");
            Some(backup)
        };

        let original = fs::read_to_string(path)
            .await
            .map_err(|e| DoctorError::fs(path, e))?;
        let mut document = ConfigDocument::parse(original)?;
        let merge = merge(&mut document)?;
        let contents = document.to_text();

        let mut report = FileReport {
            path: path.to_path_buf(),
            backup,
            merge,
            checked_out: false,
            written: false,
        };

        if options.dry_run {
            tracing::info!(
                path = %path.display(),
                before = report.merge.before,
                after = report.merge.after,
                "Dry run, file left untouched"
            );
            return Ok(report);
        }

        if !report.merge.changed {
            tracing::info!(
                path = %path.display(),
                bindings = report.merge.after,
                "Already clean. Nothing to save."
            );
            return Ok(report);
        }

        report.checked_out = ensure_checked_out(self.vcs.as_ref(), path).await?;
        save_atomic(path, &contents).await?;
        report.written = true;

        tracing::info!(
            path = %path.display(),
            "Update complete. Result: {} bindings before, {} after.",
            report.merge.before,
            report.merge.after
        );
        Ok(report)
    }
}

/// Write via a temp file in the same directory, then rename over the
/// original. Refuses files that are still read-only.
async fn save_atomic(path: &Path, contents: &str) -> Result<()> {
    let meta = fs::metadata(path)
        .await
        .map_err(|e| DoctorError::fs(path, e))?;
    if meta.permissions().readonly() {
        return Err(DoctorError::fs(
            path,
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "file is read-only"),
        ));
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&tmp, contents)
        .await
        .map_err(|e| DoctorError::fs(&tmp, e))?;
    if let Err(e) = fs::set_permissions(&tmp, meta.permissions()).await {
        tracing::warn!(path = %tmp.display(), error = %e, "Could not copy permissions");
    }
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(DoctorError::fs(path, e));
    }
    Ok(())
}
