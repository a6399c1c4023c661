//! Reporter trait for dependency injection
//!
//! Lets the pipeline report progress and status without being coupled to a
//! specific terminal implementation.

use tap_schema::{PackageName, Version};

/// Receives progress and status events from the pipeline.
pub trait Reporter: Send + Sync {
    /// Indicates a new phase has started (e.g. "Fetching", "Installing").
    fn section(&self, title: &str);

    /// Updates the progress of a source download.
    fn downloading(&self, name: &PackageName, version: &Version, current: u64, total: Option<u64>);

    /// A build step is about to run.
    fn building(&self, name: &PackageName, version: &Version, step: usize, command: &str);

    /// A verification step is about to run.
    fn verifying(&self, name: &PackageName, version: &Version, step: usize, command: &str);

    /// Marks a package operation as successfully completed.
    fn done(&self, name: &PackageName, version: &Version, detail: &str);

    /// Marks a package operation as failed with a specific reason.
    fn failed(&self, name: &PackageName, version: &Version, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn downloading(&self, name: &PackageName, version: &Version, current: u64, total: Option<u64>) {
        (**self).downloading(name, version, current, total);
    }
    fn building(&self, name: &PackageName, version: &Version, step: usize, command: &str) {
        (**self).building(name, version, step, command);
    }
    fn verifying(&self, name: &PackageName, version: &Version, step: usize, command: &str) {
        (**self).verifying(name, version, step, command);
    }
    fn done(&self, name: &PackageName, version: &Version, detail: &str) {
        (**self).done(name, version, detail);
    }
    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        (**self).failed(name, version, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn downloading(&self, _: &PackageName, _: &Version, _: u64, _: Option<u64>) {}
    fn building(&self, _: &PackageName, _: &Version, _: usize, _: &str) {}
    fn verifying(&self, _: &PackageName, _: &Version, _: usize, _: &str) {}
    fn done(&self, _: &PackageName, _: &Version, _: &str) {}
    fn failed(&self, _: &PackageName, _: &Version, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
}
