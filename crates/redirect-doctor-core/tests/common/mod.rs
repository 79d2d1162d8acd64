#![allow(dead_code)]

use redirect_doctor_core::error::Result;
use redirect_doctor_core::{ProgressReporter, RevisionControl};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn entry(name: &str, version: &str) -> String {
    format!(
        r#"<dependentAssembly>
        <assemblyIdentity name="{name}" publicKeyToken="31bf3856ad364e35" culture="neutral" />
        <bindingRedirect oldVersion="0.0.0.0-{version}" newVersion="{version}" />
      </dependentAssembly>"#
    )
}

pub fn config_with(entries: &[(&str, &str)]) -> String {
    let mut body = String::new();
    for (name, version) in entries {
        body.push_str("\n      ");
        body.push_str(&entry(name, version));
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<configuration>\n  <appSettings>\n    <add key=\"webpages:Version\" value=\"3.0.0.0\" />\n  </appSettings>\n  <runtime>\n    <assemblyBinding xmlns=\"urn:schemas-microsoft-com:asm.v1\">{body}\n    </assemblyBinding>\n  </runtime>\n</configuration>\n"
    )
}

pub fn write(dir: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

#[derive(Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn begin(&self, message: &str, total: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("begin {total}: {message}"));
    }

    fn advance(&self, path: &Path) {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        self.events.lock().unwrap().push(format!("advance {name}"));
    }

    fn finish(&self, message: &str) {
        self.events.lock().unwrap().push(format!("finish: {message}"));
    }
}

/// Everything is tracked and nothing is checked out until asked.
#[derive(Default)]
pub struct LockingVcs {
    pub checkouts: AtomicUsize,
}

impl LockingVcs {
    pub fn checkouts(&self) -> usize {
        self.checkouts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RevisionControl for LockingVcs {
    fn name(&self) -> &str {
        "locking"
    }

    async fn is_tracked(&self, _path: &Path) -> Result<bool> {
        Ok(true)
    }

    async fn is_checked_out(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }

    async fn checkout(&self, _path: &Path) -> Result<()> {
        self.checkouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
