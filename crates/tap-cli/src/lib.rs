//! tap - run package descriptors
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Loads a TOML package descriptor (a "formula"), fetches and checks its
//! source artifact, runs its install procedure into a prefix, and runs its
//! verification procedure against the installed executables.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.tap/
//! ├── formulae/   # Descriptors looked up by name
//! ├── cache/      # Verified source artifacts
//! ├── build/      # Scratch build and test directories
//! ├── logs/       # Build logs
//! └── prefix/     # Install prefixes by name/version
//! ```

pub mod cmd;
pub mod ui;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "tap")]
#[command(author, version, about = "tap - fetch, build and smoke-test packages from TOML descriptors")]
pub struct Cli {
    /// Root directory for cache, logs and prefixes
    #[arg(long, global = true, env = "TAP_HOME")]
    pub home: Option<PathBuf>,

    /// Install prefix (defaults to <home>/prefix/<name>/<version>)
    #[arg(long, global = true, env = "TAP_PREFIX")]
    pub prefix: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch and verify the source artifact only
    Fetch {
        /// Descriptor file, or a name under <home>/formulae
        formula: String,
    },
    /// Fetch and run the install procedure
    Install {
        /// Descriptor file, or a name under <home>/formulae
        formula: String,
        /// Stream build output instead of writing it to the log
        #[arg(short, long)]
        verbose: bool,
    },
    /// Run the verification procedure against an installed prefix
    Test {
        /// Descriptor file, or a name under <home>/formulae
        formula: String,
    },
    /// Fetch, install and test in one go
    Run {
        /// Descriptor file, or a name under <home>/formulae
        formula: String,
        /// Stream build output instead of writing it to the log
        #[arg(short, long)]
        verbose: bool,
    },
    /// Validate a descriptor
    Check {
        /// Descriptor file, or a name under <home>/formulae
        formula: String,
    },
    /// Print a descriptor in normalized TOML form
    Show {
        /// Descriptor file, or a name under <home>/formulae
        formula: String,
    },
    /// Compute SHA256 hash of a file (for descriptor authoring)
    Hash {
        /// Files to hash
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Create a new descriptor template
    New {
        /// Package name
        name: String,
        /// Directory to save the descriptor in
        #[arg(long, default_value = "formulae")]
        output_dir: PathBuf,
    },
}
