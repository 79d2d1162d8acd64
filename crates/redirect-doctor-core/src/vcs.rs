use crate::config::{RevisionControlProvider, RevisionControlSettings};
use crate::error::{DoctorError, Result};
use std::path::Path;
use std::process::Output;
use std::sync::Arc;
use tokio::process::Command;

/// The slice of a revision-control system needed before saving a file.
#[async_trait::async_trait]
pub trait RevisionControl: Send + Sync + 'static {
    /// Human-readable provider name (e.g., "git")
    fn name(&self) -> &str;

    async fn is_tracked(&self, path: &Path) -> Result<bool>;

    async fn is_checked_out(&self, path: &Path) -> Result<bool>;

    async fn checkout(&self, path: &Path) -> Result<()>;
}

/// Request a checkout when `path` is tracked but not yet checked out.
/// Returns whether a checkout was issued.
pub async fn ensure_checked_out(vcs: &dyn RevisionControl, path: &Path) -> Result<bool> {
    if !vcs.is_tracked(path).await? || vcs.is_checked_out(path).await? {
        return Ok(false);
    }

    tracing::info!(path = %path.display(), provider = vcs.name(), "Checking out file");
    vcs.checkout(path).await?;
    Ok(true)
}

pub fn from_settings(settings: &RevisionControlSettings) -> Arc<dyn RevisionControl> {
    match settings.provider {
        RevisionControlProvider::None => Arc::new(NoRevisionControl),
        RevisionControlProvider::Git => Arc::new(GitRevisionControl),
        RevisionControlProvider::Command => Arc::new(CommandRevisionControl::new(
            settings.status_command.clone(),
            settings.checkout_command.clone(),
        )),
    }
}

/// Nothing is under revision control.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRevisionControl;

#[async_trait::async_trait]
impl RevisionControl for NoRevisionControl {
    fn name(&self) -> &str {
        "none"
    }

    async fn is_tracked(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }

    async fn is_checked_out(&self, _path: &Path) -> Result<bool> {
        Ok(true)
    }

    async fn checkout(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Git keeps every tracked file editable, so there is never anything to
/// check out. Tracking is still reported for the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitRevisionControl;

#[async_trait::async_trait]
impl RevisionControl for GitRevisionControl {
    fn name(&self) -> &str {
        "git"
    }

    async fn is_tracked(&self, path: &Path) -> Result<bool> {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let file = path.file_name().unwrap_or(path.as_os_str());

        let mut cmd = Command::new("git");
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        cmd.args(["ls-files", "--error-unmatch", "--"]).arg(file);

        let output = run(path, &mut cmd).await?;
        Ok(output.status.success())
    }

    async fn is_checked_out(&self, _path: &Path) -> Result<bool> {
        Ok(true)
    }

    async fn checkout(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Lock-based systems (TFVC, Perforce) driven through their command-line
/// clients. A tracked file counts as checked out once it is writable.
#[derive(Debug, Clone)]
pub struct CommandRevisionControl {
    status_command: Vec<String>,
    checkout_command: Vec<String>,
}

impl CommandRevisionControl {
    pub fn new(status_command: Vec<String>, checkout_command: Vec<String>) -> Self {
        Self {
            status_command,
            checkout_command,
        }
    }
}

#[async_trait::async_trait]
impl RevisionControl for CommandRevisionControl {
    fn name(&self) -> &str {
        self.checkout_command
            .first()
            .map(String::as_str)
            .unwrap_or("command")
    }

    async fn is_tracked(&self, path: &Path) -> Result<bool> {
        // Without a status command every file is assumed to be tracked.
        let Some(mut cmd) = build_command(&self.status_command, path) else {
            return Ok(true);
        };
        let output = run(path, &mut cmd).await?;
        Ok(output.status.success())
    }

    async fn is_checked_out(&self, path: &Path) -> Result<bool> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| DoctorError::fs(path, e))?;
        Ok(!meta.permissions().readonly())
    }

    async fn checkout(&self, path: &Path) -> Result<()> {
        let mut cmd =
            build_command(&self.checkout_command, path).ok_or_else(|| {
                DoctorError::RevisionControl {
                    path: path.to_path_buf(),
                    detail: "no checkout command configured".into(),
                }
            })?;

        let output = run(path, &mut cmd).await?;
        if !output.status.success() {
            return Err(DoctorError::RevisionControl {
                path: path.to_path_buf(),
                detail: format!(
                    "checkout exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

/// Build a command from a template, replacing `{path}` in every argument.
fn build_command(template: &[String], path: &Path) -> Option<Command> {
    let (program, args) = template.split_first()?;
    let path = path.to_string_lossy();
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(|a| a.replace("{path}", &path)));
    Some(cmd)
}

async fn run(path: &Path, cmd: &mut Command) -> Result<Output> {
    cmd.stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| DoctorError::RevisionControl {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
}
