//! Shared types and on-disk format for tap package descriptors.

pub mod descriptor;
pub mod hash;
pub mod types;

// Re-exports
pub use descriptor::{
    Dependencies, DescriptorError, InstallStep, PackageDescriptor, PackageInfo, Source,
    SourceFormat, StdGoArgs, VerifyStep,
};
pub use hash::*;
pub use types::*;
