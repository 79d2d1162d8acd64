//! Non-blocking command triggers.
//!
//! A trigger hands the batch to a spawned task and returns at once with a
//! channel for the outcome. Each command runs at most once at a time: the
//! in-flight map is keyed by command name and holds the invocation id.

use crate::error::{DoctorError, Result};
use crate::fixer::{BatchReport, FixOptions, RedirectFixer};
use crate::selection::FileSelectionProvider;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

pub const FIX_REDIRECTS: &str = "fix-redirects";

/// A running command. Await `result` for the batch outcome.
#[derive(Debug)]
pub struct Invocation {
    pub id: Uuid,
    pub command: &'static str,
    pub result: oneshot::Receiver<Result<BatchReport>>,
}

impl Invocation {
    /// Wait for the command to finish. A task that died without reporting
    /// surfaces as an error rather than a hang.
    pub async fn wait(self) -> Result<BatchReport> {
        let id = self.id;
        self.result.await.unwrap_or_else(|_| {
            Err(DoctorError::TaskFailed {
                detail: format!("invocation {} ended without a result", id),
            })
        })
    }
}

pub struct CommandDispatcher {
    fixer: Arc<RedirectFixer>,
    selection: Arc<dyn FileSelectionProvider>,
    in_flight: Arc<DashMap<&'static str, Uuid>>,
}

/// Releases the command's slot when dropped, including on panic.
struct FlightGuard {
    in_flight: Arc<DashMap<&'static str, Uuid>>,
    command: &'static str,
    id: Uuid,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .remove_if(self.command, |_, running| *running == self.id);
    }
}

impl CommandDispatcher {
    pub fn new(fixer: Arc<RedirectFixer>, selection: Arc<dyn FileSelectionProvider>) -> Self {
        Self {
            fixer,
            selection,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn is_running(&self, command: &str) -> bool {
        self.in_flight.contains_key(command)
    }

    /// Start fixing the current selection. Must be called from within a
    /// tokio runtime.
    pub fn trigger(&self, options: FixOptions) -> Result<Invocation> {
        let guard = self.claim(FIX_REDIRECTS)?;
        let id = guard.id;
        let (tx, rx) = oneshot::channel();

        let fixer = self.fixer.clone();
        let selection = self.selection.clone();

        tokio::spawn(async move {
            tracing::info!(invocation = %id, command = FIX_REDIRECTS, "Command started");

            let outcome = match selection.selected_paths().await {
                Ok(paths) => fixer.run(paths, options).await,
                Err(e) => {
                    fixer.progress().finish(&e.to_string());
                    Err(e)
                }
            };

            match &outcome {
                Ok(report) => tracing::info!(
                    invocation = %id,
                    files = report.files.len(),
                    failures = report.failures.len(),
                    "Command finished"
                ),
                Err(e) => tracing::warn!(invocation = %id, error = %e, "Command did not run"),
            }

            // The slot must be free by the time `wait()` returns.
            drop(guard);
            // The caller may have stopped listening; that is not an error.
            let _ = tx.send(outcome);
        });

        Ok(Invocation {
            id,
            command: FIX_REDIRECTS,
            result: rx,
        })
    }

    fn claim(&self, command: &'static str) -> Result<FlightGuard> {
        match self.in_flight.entry(command) {
            Entry::Occupied(running) => {
                tracing::warn!(
                    command,
                    running = %running.get(),
                    "Command already in progress"
                );
                Err(DoctorError::AlreadyRunning {
                    command: command.to_string(),
                })
            }
            Entry::Vacant(slot) => {
                let id = Uuid::new_v4();
                slot.insert(id);
                Ok(FlightGuard {
                    in_flight: self.in_flight.clone(),
                    command,
                    id,
                })
            }
        }
    }
}
