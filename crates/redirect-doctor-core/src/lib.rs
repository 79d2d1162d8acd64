pub mod config;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod fixer;
pub mod logging;
pub mod merge;
pub mod progress;
pub mod selection;
pub mod vcs;
pub mod version;

pub use config::Settings;
pub use dispatch::{CommandDispatcher, Invocation};
pub use document::{ConfigDocument, DependentAssemblyEntry};
pub use error::{DoctorError, Result};
pub use fixer::{BatchReport, FixOptions, RedirectFixer};
pub use merge::{merge, MergeReport, MergedBindingTable};
pub use progress::ProgressReporter;
pub use selection::FileSelectionProvider;
pub use vcs::RevisionControl;
pub use version::AssemblyVersion;
