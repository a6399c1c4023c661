//! Sequential fetch → install → verify.
//!
//! The first failing stage ends the run; its error is returned unchanged
//! inside [`PipelineError`] and later stages never start.

use std::fmt;

use tap_schema::PackageDescriptor;
use thiserror::Error;
use tracing::{error, info};

use crate::builder::{self, BuildError, InstalledSet};
use crate::io::download::{self, DownloadError, FetchedSource};
use crate::verify::{self, VerificationError};
use crate::Host;

/// Failure categories surfaced to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The artifact could not be retrieved.
    Network,
    /// The artifact's digest did not match.
    Integrity,
    /// The install procedure failed.
    Build,
    /// The verification procedure failed.
    Verification,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Network => "NetworkError",
            Self::Integrity => "IntegrityError",
            Self::Build => "BuildError",
            Self::Verification => "VerificationError",
        })
    }
}

/// The stage error that halted the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Fetch failed.
    #[error("fetch failed: {0}")]
    Fetch(#[from] DownloadError),

    /// Install failed.
    #[error("install failed: {0}")]
    Build(#[from] BuildError),

    /// Verify failed.
    #[error("test failed: {0}")]
    Verification(#[from] VerificationError),
}

impl PipelineError {
    /// Category of the failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fetch(DownloadError::HashMismatch { .. }) => ErrorKind::Integrity,
            Self::Fetch(_) => ErrorKind::Network,
            Self::Build(_) => ErrorKind::Build,
            Self::Verification(_) => ErrorKind::Verification,
        }
    }
}

/// Result of a full, successful run.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// The verified artifact.
    pub fetched: FetchedSource,
    /// What the install procedure produced.
    pub installed: InstalledSet,
}

/// Run every stage in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the failing stage's error wrapped in [`PipelineError`].
pub async fn run(host: &Host, descriptor: &PackageDescriptor) -> Result<Outcome, PipelineError> {
    let name = &descriptor.package.name;
    let version = &descriptor.package.version;

    let result = stages(host, descriptor).await;

    match &result {
        Ok(_) => info!(package = %name, %version, "pipeline complete"),
        Err(e) => error!(package = %name, %version, kind = %e.kind(), error = %e, "pipeline halted"),
    }
    result
}

async fn stages(host: &Host, descriptor: &PackageDescriptor) -> Result<Outcome, PipelineError> {
    host.reporter.section("Fetching");
    let fetched = download::fetch(host, descriptor).await?;
    let installed = builder::install(host, descriptor, &fetched)?;
    verify::verify(host, descriptor, &installed)?;
    Ok(Outcome { fetched, installed })
}
