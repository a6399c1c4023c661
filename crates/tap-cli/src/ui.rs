//! Terminal output.
//!
//! Progress and status go to stderr so that stdout carries only command
//! results (paths, digests, TOML).

use crossterm::style::Stylize;
use tap_core::{PipelineError, Reporter};
use tap_schema::{PackageName, Version};

/// Styled terminal reporter.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    quiet: bool,
}

impl Output {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn success(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{} {msg}", "✓".green());
        }
    }

    /// Print an error with its cause chain, tagged with the pipeline error
    /// kind when there is one.
    pub fn report_error(&self, err: &anyhow::Error) {
        let tag = err
            .chain()
            .find_map(|e| e.downcast_ref::<PipelineError>())
            .map_or_else(|| "error".to_string(), |p| format!("error[{}]", p.kind()));
        eprintln!("{}: {err}", tag.red().bold());
        for cause in err.chain().skip(1) {
            eprintln!("  {} {cause}", "caused by:".dark_grey());
        }
    }
}

impl Reporter for Output {
    fn section(&self, title: &str) {
        if !self.quiet {
            eprintln!("{}", format!("==> {title}").blue().bold());
        }
    }

    fn downloading(&self, name: &PackageName, version: &Version, current: u64, total: Option<u64>) {
        if current == 0 && !self.quiet {
            match total {
                Some(total) => eprintln!("    Downloading {name} {version} ({total} bytes)"),
                None => eprintln!("    Downloading {name} {version}"),
            }
        }
        tracing::trace!(%name, current, ?total, "download progress");
    }

    fn building(&self, name: &PackageName, _version: &Version, step: usize, command: &str) {
        if !self.quiet {
            eprintln!("    [{name}] step {step}: {}", command.bold());
        }
    }

    fn verifying(&self, name: &PackageName, _version: &Version, step: usize, command: &str) {
        if !self.quiet {
            eprintln!("    [{name}] test {step}: {}", command.bold());
        }
    }

    fn done(&self, name: &PackageName, version: &Version, detail: &str) {
        self.success(&format!("{name} {version}: {detail}"));
    }

    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        eprintln!("{} {name} {version}: {reason}", "✗".red());
    }

    fn info(&self, msg: &str) {
        if !self.quiet {
            eprintln!("    {msg}");
        }
    }

    fn warning(&self, msg: &str) {
        eprintln!("{} {msg}", "warning:".yellow().bold());
    }

    fn error(&self, msg: &str) {
        eprintln!("{} {msg}", "error:".red().bold());
    }
}
