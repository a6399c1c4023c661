//! Fetch command

use anyhow::Result;
use tap_core::PipelineError;

use super::Options;

/// Fetch and verify the source artifact, printing its cached path.
pub async fn fetch(opts: &Options, formula: &str) -> Result<()> {
    let descriptor = opts.load(formula)?;
    let host = opts.host(&descriptor, false)?;

    let fetched = tap_core::fetch(&host, &descriptor)
        .await
        .map_err(PipelineError::from)?;

    opts.output()
        .success(&format!("sha256 {} verified", fetched.digest()));
    println!("{}", fetched.path().display());
    Ok(())
}
