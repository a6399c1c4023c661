//! Command implementations and the shared descriptor/host plumbing.

pub mod check;
pub mod fetch;
pub mod hash;
pub mod install;
pub mod new;
pub mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tap_core::{Host, Layout};
use tap_schema::PackageDescriptor;

use crate::ui::Output;

/// Global flags shared by every command.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub home: Option<PathBuf>,
    pub prefix: Option<PathBuf>,
    pub quiet: bool,
}

impl Options {
    pub fn layout(&self) -> Result<Layout> {
        match &self.home {
            Some(home) => Ok(Layout::new(home)),
            None => Layout::from_env()
                .context("Could not determine home directory. Set TAP_HOME to override."),
        }
    }

    pub fn output(&self) -> Output {
        Output::new(self.quiet)
    }

    /// Locate and parse a descriptor given as a path or as a name under
    /// `<home>/formulae`.
    pub fn load(&self, formula: &str) -> Result<PackageDescriptor> {
        let path = self.resolve_formula(formula)?;
        let descriptor = PackageDescriptor::from_file(&path)
            .with_context(|| format!("Failed to load descriptor {}", path.display()))?;
        descriptor
            .validate()
            .with_context(|| format!("Invalid descriptor {}", path.display()))?;
        tracing::debug!(path = %path.display(), name = %descriptor.package.name, "descriptor loaded");
        Ok(descriptor)
    }

    fn resolve_formula(&self, formula: &str) -> Result<PathBuf> {
        let direct = Path::new(formula);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }
        let indexed = self
            .layout()?
            .home()
            .join("formulae")
            .join(format!("{formula}.toml"));
        if indexed.is_file() {
            return Ok(indexed);
        }
        anyhow::bail!(
            "No descriptor found at '{formula}' or {}",
            indexed.display()
        )
    }

    /// Host for `descriptor`, installing into `--prefix` or the layout default.
    pub fn host(&self, descriptor: &PackageDescriptor, verbose: bool) -> Result<Host> {
        let layout = self.layout()?;
        let prefix = self.prefix.clone().unwrap_or_else(|| {
            layout.prefix_for(&descriptor.package.name, &descriptor.package.version)
        });
        Ok(Host::new(&layout, prefix)
            .with_reporter(Arc::new(self.output()))
            .with_verbose(verbose))
    }
}
