//! Host-side logic for tap package descriptors.
//!
//! The pipeline is strictly sequential:
//!
//! ```text
//! PackageDescriptor --[fetch()]--> FetchedSource --[install()]--> InstalledSet --[verify()]--> ()
//! ```
//!
//! Each stage takes the previous stage's output by reference, so an install
//! cannot start without a verified artifact and a verification cannot start
//! without an install.

pub mod builder;
mod expand;
pub mod host;
pub mod io;
pub mod paths;
pub mod pipeline;
pub mod reporter;
pub mod verify;

pub use builder::{BuildError, InstalledSet, install};
pub use host::{Host, PathResolver, StaticResolver, ToolchainResolver};
pub use io::download::{DownloadError, FetchedSource, fetch};
pub use paths::Layout;
pub use pipeline::{ErrorKind, Outcome, PipelineError, run};
pub use reporter::{NullReporter, Reporter};
pub use verify::{VerificationError, verify};

/// User Agent string for source downloads
pub const USER_AGENT: &str = concat!("tap/", env!("CARGO_PKG_VERSION"));

/// Search path given to build and test processes, before any toolchain
/// directories are prepended.
pub const SYSTEM_PATH: &[&str] = &["/usr/bin", "/bin", "/usr/sbin", "/sbin"];
