//! Descriptor inspection commands

use anyhow::Result;
use tap_core::Reporter;

use super::Options;

/// Validate a descriptor and print a summary.
pub fn check(opts: &Options, formula: &str) -> Result<()> {
    let d = opts.load(formula)?;
    let output = opts.output();

    output.success("Descriptor is valid");
    println!("  Name: {}", d.package.name);
    println!("  Version: {}", d.package.version);
    println!("  Source: {}", d.source.url);
    println!("  Format: {:?}", d.source.effective_format());
    println!("  SHA256: {}", d.source.sha256);
    if !d.dependencies.build.is_empty() {
        println!("  Build deps: {}", d.dependencies.build.join(", "));
    }
    println!("  Install steps: {}", d.install.len());
    println!("  Test steps: {}", d.test.len());

    if d.package.description.is_empty() {
        output.warning("No description");
    }
    if d.package.homepage.is_empty() {
        output.warning("No homepage");
    }
    if d.package.license.is_empty() {
        output.warning("No license");
    }
    if d.test.is_empty() {
        output.warning("No test steps; `tap test` will fail");
    }
    Ok(())
}

/// Print the descriptor in normalized TOML form.
pub fn show(opts: &Options, formula: &str) -> Result<()> {
    let d = opts.load(formula)?;
    print!("{}", d.to_toml()?);
    Ok(())
}
