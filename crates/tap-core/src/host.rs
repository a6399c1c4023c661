//! Host runtime state passed explicitly into every pipeline stage.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::paths::Layout;
use crate::reporter::{NullReporter, Reporter};

/// Locates build-time tools named in a descriptor's build dependencies.
pub trait ToolchainResolver: Send + Sync {
    /// Absolute path to the executable providing `tool`, if available.
    fn resolve(&self, tool: &str) -> Option<PathBuf>;
}

/// Resolves tools through the invoking user's `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl ToolchainResolver for PathResolver {
    fn resolve(&self, tool: &str) -> Option<PathBuf> {
        which::which(tool).ok()
    }
}

/// Resolves tools from a fixed table.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    tools: HashMap<String, PathBuf>,
}

impl StaticResolver {
    /// Create an empty resolver; every lookup fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` as the provider of `tool`.
    pub fn with(mut self, tool: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.tools.insert(tool.into(), path.into());
        self
    }
}

impl ToolchainResolver for StaticResolver {
    fn resolve(&self, tool: &str) -> Option<PathBuf> {
        self.tools.get(tool).cloned()
    }
}

/// Everything the host supplies to fetch, install and verify.
#[derive(Clone)]
pub struct Host {
    /// Install prefix; executables land in `<prefix>/bin`.
    pub prefix: PathBuf,
    /// Directory holding verified source artifacts.
    pub cache_dir: PathBuf,
    /// Directory under which per-run build and test directories are created.
    pub build_root: PathBuf,
    /// Directory receiving build logs.
    pub log_dir: PathBuf,
    /// HTTP client used for source downloads.
    pub client: reqwest::Client,
    /// Progress sink.
    pub reporter: Arc<dyn Reporter>,
    /// Build dependency lookup.
    pub resolver: Arc<dyn ToolchainResolver>,
    /// Stream build output to the terminal instead of the log file.
    pub verbose: bool,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("prefix", &self.prefix)
            .field("cache_dir", &self.cache_dir)
            .field("build_root", &self.build_root)
            .field("log_dir", &self.log_dir)
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

impl Host {
    /// A host rooted at `layout`, installing into `prefix`, with the `PATH`
    /// resolver and a silent reporter.
    pub fn new(layout: &Layout, prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            cache_dir: layout.cache(),
            build_root: layout.build(),
            log_dir: layout.logs(),
            client: reqwest::Client::new(),
            reporter: Arc::new(NullReporter),
            resolver: Arc::new(PathResolver),
            verbose: false,
        }
    }

    /// Replace the reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replace the toolchain resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn ToolchainResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replace the HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Toggle streaming build output.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// `<prefix>/bin`
    pub fn bin_dir(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    pub(crate) fn scratch_dir(&self, prefix: &str) -> std::io::Result<tempfile::TempDir> {
        std::fs::create_dir_all(&self.build_root)?;
        tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.build_root)
    }
}

/// Join directories into a `PATH` value, toolchain dirs first.
pub(crate) fn search_path(extra: &[&Path]) -> String {
    let mut dirs: Vec<String> = Vec::new();
    for dir in extra {
        let dir = dir.to_string_lossy().to_string();
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    for dir in crate::SYSTEM_PATH {
        let dir = (*dir).to_string();
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs.join(":")
}
