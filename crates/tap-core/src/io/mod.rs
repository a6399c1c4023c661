//! Artifact IO: verified downloads and source-tree staging.

pub mod download;
pub mod extract;
