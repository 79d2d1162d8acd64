use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Receives human-readable status for a batch.
pub trait ProgressReporter: Send + Sync + 'static {
    fn begin(&self, message: &str, total: usize);

    /// One file finished, successfully or not.
    fn advance(&self, path: &Path);

    fn finish(&self, message: &str);
}

/// Status lines on stderr.
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    total: AtomicUsize,
    done: AtomicUsize,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressReporter for ConsoleProgress {
    fn begin(&self, message: &str, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.done.store(0, Ordering::SeqCst);
        eprintln!("{}", message);
    }

    fn advance(&self, path: &Path) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.total.load(Ordering::SeqCst);
        eprintln!("[{}/{}] {}", done, total, path.display());
    }

    fn finish(&self, message: &str) {
        eprintln!("{}", message);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressReporter for NullProgress {
    fn begin(&self, _message: &str, _total: usize) {}
    fn advance(&self, _path: &Path) {}
    fn finish(&self, _message: &str) {}
}

/// Status line shown when a batch starts.
pub fn batch_message(count: usize) -> String {
    let noun = if count == 1 { "file" } else { "files" };
    format!("Fixing {} config {}...", count, noun)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_message_pluralizes() {
        assert_eq!(batch_message(1), "Fixing 1 config file...");
        assert_eq!(batch_message(3), "Fixing 3 config files...");
    }

    #[test]
    fn test_console_progress_counts() {
        let progress = ConsoleProgress::new();
        progress.begin("start", 2);
        progress.advance(Path::new("a/web.config"));
        progress.advance(Path::new("b/app.config"));
        assert_eq!(progress.done.load(Ordering::SeqCst), 2);
        progress.finish("done");
    }
}
