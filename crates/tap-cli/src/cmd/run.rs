//! Run command

use std::time::Instant;

use anyhow::Result;

use super::Options;

/// Full fetch → install → test pipeline.
pub async fn run(opts: &Options, formula: &str, verbose: bool) -> Result<()> {
    let descriptor = opts.load(formula)?;
    let host = opts.host(&descriptor, verbose)?;

    let start = Instant::now();
    let outcome = tap_core::run(&host, &descriptor).await?;

    opts.output().success(&format!(
        "{} {} installed and tested in {:.1}s",
        descriptor.package.name,
        descriptor.package.version,
        start.elapsed().as_secs_f64()
    ));
    for exe in outcome.installed.executables() {
        println!("{}", exe.display());
    }
    Ok(())
}
