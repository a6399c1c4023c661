//! Install locations under the tap home directory.

use std::path::{Path, PathBuf};

use tap_schema::{PackageName, Version};

/// On-disk layout rooted at the tap home directory (`~/.tap` by default).
///
/// ```text
/// ~/.tap/
/// ├── cache/                  # Verified source artifacts, keyed by digest
/// ├── build/                  # Per-run build and test directories
/// ├── logs/                   # Build logs
/// └── prefix/<name>/<version> # Install prefixes
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    home: PathBuf,
}

impl Layout {
    /// Use an explicit home directory.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Resolve the home from `TAP_HOME`, falling back to `~/.tap`.
    ///
    /// Returns `None` when neither is available.
    pub fn from_env() -> Option<Self> {
        if let Some(val) = std::env::var_os("TAP_HOME") {
            return Some(Self::new(val));
        }
        dirs::home_dir().map(|h| Self::new(h.join(".tap")))
    }

    /// The root directory.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Download cache: ~/.tap/cache
    pub fn cache(&self) -> PathBuf {
        self.home.join("cache")
    }

    /// Build scratch root: ~/.tap/build
    pub fn build(&self) -> PathBuf {
        self.home.join("build")
    }

    /// Logs directory: ~/.tap/logs
    pub fn logs(&self) -> PathBuf {
        self.home.join("logs")
    }

    /// Default install prefix: ~/.tap/prefix/<name>/<version>
    pub fn prefix_for(&self, name: &PackageName, version: &Version) -> PathBuf {
        self.home.join("prefix").join(name).join(version)
    }
}

/// Generate a build log path for a package
pub fn build_log_path(log_dir: &Path, package: &str, version: &str) -> PathBuf {
    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    log_dir.join(format!("build-{package}-{version}-{timestamp}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_nest_under_home() {
        let layout = Layout::new("/tmp/taphome");
        assert_eq!(layout.cache(), PathBuf::from("/tmp/taphome/cache"));
        assert_eq!(
            layout.prefix_for(&PackageName::from("Jackpot"), &Version::from("0.1")),
            PathBuf::from("/tmp/taphome/prefix/jackpot/0.1")
        );
    }

    #[test]
    fn build_log_name_carries_package_and_version() {
        let path = build_log_path(Path::new("/logs"), "jackpot", "0.1");
        let file = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(file.starts_with("build-jackpot-0.1-"));
        assert!(file.ends_with(".log"));
    }
}
