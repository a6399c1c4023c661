//! Install command

use anyhow::Result;
use tap_core::PipelineError;

use super::Options;

/// Fetch the artifact and run the install procedure.
pub async fn install(opts: &Options, formula: &str, verbose: bool) -> Result<()> {
    let descriptor = opts.load(formula)?;
    let host = opts.host(&descriptor, verbose)?;

    let fetched = tap_core::fetch(&host, &descriptor)
        .await
        .map_err(PipelineError::from)?;
    let installed =
        tap_core::install(&host, &descriptor, &fetched).map_err(PipelineError::from)?;

    for exe in installed.executables() {
        println!("{}", exe.display());
    }
    Ok(())
}
