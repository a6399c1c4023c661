//! Descriptor template command

use anyhow::{Context, Result};
use std::path::Path;

use tap_core::Reporter;
use tap_schema::{PackageDescriptor, is_path_segment};

use super::Options;

/// Write `<output_dir>/<name>.toml` with a placeholder install and test.
pub fn new(opts: &Options, name: &str, output_dir: &Path) -> Result<()> {
    if !is_path_segment(name) {
        anyhow::bail!("Invalid package name '{name}': must be a single path component");
    }
    let path = output_dir.join(format!("{name}.toml"));

    if path.exists() {
        anyhow::bail!("Descriptor already exists: {}", path.display());
    }

    let template = format!(
        r#"[package]
name = "{name}"
version = "0.1.0"
description = ""
homepage = ""
license = ""

[source]
url = "https://github.com/OWNER/{name}/archive/refs/tags/v0.1.0.tar.gz"
# Replace with the output of `tap hash <downloaded archive>`.
sha256 = "{placeholder}"

[dependencies]
build = ["go"]

[[install]]
command = "go"
args = ["build"]
std_go_args = {{ ldflags = "-s -w" }}

# Always fails until replaced by a real check, e.g.
# command = "{{bin}}/{name}"
# args = ["--version"]
[[test]]
command = "false"
"#,
        placeholder = "0".repeat(64)
    );

    PackageDescriptor::parse(&template)
        .and_then(|d| d.validate())
        .with_context(|| format!("'{name}' does not produce a valid descriptor"))?;

    std::fs::create_dir_all(output_dir)?;
    std::fs::write(&path, template)?;

    let output = opts.output();
    output.success(&format!("Created descriptor template: {}", path.display()));
    output.info(&format!(
        "Edit it and run 'tap check {}' to validate.",
        path.display()
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> Options {
        Options {
            quiet: true,
            ..Options::default()
        }
    }

    #[test]
    fn template_parses_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        new(&quiet(), "demo", dir.path()).unwrap();
        let d = PackageDescriptor::from_file(&dir.path().join("demo.toml")).unwrap();
        d.validate().unwrap();
        assert_eq!(d.package.name, "demo");
        assert_eq!(d.test[0].command, "false");
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        new(&quiet(), "demo", dir.path()).unwrap();
        assert!(new(&quiet(), "demo", dir.path()).is_err());
    }

    #[test]
    fn rejects_names_that_leave_the_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("formulae");
        for name in ["../escape", "..", "a/b", ""] {
            assert!(new(&quiet(), name, &out).is_err(), "{name:?} accepted");
        }
        assert!(!dir.path().join("escape.toml").exists());
        assert!(!out.exists());
    }

    #[test]
    fn rejects_names_that_break_the_template() {
        let dir = tempfile::tempdir().unwrap();
        assert!(new(&quiet(), "bad\"name", dir.path()).is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
