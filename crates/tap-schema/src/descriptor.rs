//! TOML package descriptor parsing
//!
//! A descriptor is a static record: metadata, one source artifact with its
//! checksum, build-only dependencies, and two hooks (`install` and `test`)
//! expressed as ordered command lists.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::Sha256Digest;
use crate::types::{PackageName, Version, is_path_segment};

/// Errors that can occur when loading, parsing, or validating a descriptor.
#[derive(Error, Debug)]
pub enum DescriptorError {
    /// An I/O error occurred while reading a descriptor file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML content could not be deserialized into a valid descriptor.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The descriptor could not be rendered back to TOML.
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The descriptor parsed but violates a structural rule.
    #[error("Invalid descriptor: {0}")]
    Invalid(String),
}

/// Metadata describing a package's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Unique name that identifies this package in the host index.
    pub name: PackageName,
    /// Version string; informational only.
    pub version: Version,
    /// Short human-readable summary of the package.
    #[serde(default)]
    pub description: String,
    /// URL of the project's homepage.
    #[serde(default)]
    pub homepage: String,
    /// SPDX license identifier for the package.
    #[serde(default)]
    pub license: String,
}

/// How a fetched artifact is turned into a source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Gzip-compressed tar archive (`.tar.gz` / `.tgz`).
    #[serde(rename = "tar.gz")]
    TarGz,
    /// Uncompressed tar archive (`.tar`).
    Tar,
    /// Zip archive (`.zip`).
    Zip,
    /// A single file, copied into the source tree as-is.
    Raw,
}

impl SourceFormat {
    /// Infer the format from a URL's file extension, falling back to `Raw`.
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Self::TarGz
        } else if lower.ends_with(".tar") {
            Self::Tar
        } else if lower.ends_with(".zip") {
            Self::Zip
        } else {
            Self::Raw
        }
    }
}

/// Location and integrity information for the source artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Download URL (`https://`, `http://` or `file://`).
    pub url: String,
    /// Expected SHA-256 digest of the downloaded bytes.
    pub sha256: Sha256Digest,
    /// Explicit artifact format; inferred from the URL when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<SourceFormat>,
}

impl Source {
    /// Returns the declared format, or the one inferred from the URL.
    pub fn effective_format(&self) -> SourceFormat {
        self.format.unwrap_or_else(|| SourceFormat::from_url(&self.url))
    }

    /// Last path segment of the URL, used to name the cached artifact.
    pub fn filename(&self) -> &str {
        let path = self.url.split(['?', '#']).next().unwrap_or(&self.url);
        path.trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("source")
    }
}

/// Dependency lists grouped by when they are required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    /// Tools required only during the build phase (e.g. `go`).
    #[serde(default)]
    pub build: Vec<String>,
}

/// Arguments appended to a `go build` invocation.
///
/// Expands to `-trimpath -o=<bin>/<output> [-ldflags=<ldflags>]`, where
/// `output` defaults to the package name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdGoArgs {
    /// Name of the produced executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Linker flags passed through `-ldflags`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldflags: Option<String>,
}

/// One build-tool invocation of the install procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallStep {
    /// Program to execute. Resolved against the build `PATH`.
    pub command: String,
    /// Arguments, with placeholders such as `{prefix}` and `{bin}`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Standard Go build arguments appended after `args`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_go_args: Option<StdGoArgs>,
}

/// One post-install check of the verification procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyStep {
    /// Program to execute; installed executables are referenced as `{bin}/name`.
    pub command: String,
    /// Arguments, with the same placeholders as install steps.
    #[serde(default)]
    pub args: Vec<String>,
    /// Substring that must appear in the step's standard output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_output: Option<String>,
}

/// Complete package descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Core metadata for the package.
    pub package: PackageInfo,
    /// Source artifact location and integrity data.
    pub source: Source,
    /// Build-only dependencies.
    #[serde(default)]
    pub dependencies: Dependencies,
    /// Ordered install procedure.
    #[serde(default)]
    pub install: Vec<InstallStep>,
    /// Ordered verification procedure.
    #[serde(default)]
    pub test: Vec<VerifyStep>,
}

impl PackageDescriptor {
    /// Parse a descriptor from a TOML file on disk.
    ///
    /// # Errors
    ///
    /// Returns `DescriptorError::Io` if the file cannot be read, or
    /// `DescriptorError::Parse` if the TOML content is invalid.
    pub fn from_file(path: &Path) -> Result<Self, DescriptorError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a descriptor from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `DescriptorError::Parse` if the TOML content is invalid or does
    /// not match the expected schema.
    pub fn parse(content: &str) -> Result<Self, DescriptorError> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize this descriptor to a pretty-printed TOML string.
    ///
    /// # Errors
    ///
    /// Returns `DescriptorError::Serialize` if serialization fails.
    pub fn to_toml(&self) -> Result<String, DescriptorError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check the structural rules a parsed descriptor must satisfy before it
    /// is handed to the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `DescriptorError::Invalid` naming the first violated rule.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        for (field, value) in [
            ("package.name", self.package.name.as_str()),
            ("package.version", self.package.version.as_str()),
        ] {
            if value.is_empty() {
                return Err(DescriptorError::Invalid(format!("{field} is empty")));
            }
            if !is_path_segment(value) {
                return Err(DescriptorError::Invalid(format!(
                    "{field} '{value}' must not contain path separators or be '.' or '..'"
                )));
            }
        }
        let url = &self.source.url;
        if !(url.starts_with("https://") || url.starts_with("http://") || url.starts_with("file://"))
        {
            return Err(DescriptorError::Invalid(format!(
                "source.url must be http(s):// or file://, got '{url}'"
            )));
        }
        if self.install.is_empty() {
            return Err(DescriptorError::Invalid(
                "install procedure has no steps".into(),
            ));
        }
        if let Some(i) = self.install.iter().position(|s| s.command.trim().is_empty()) {
            return Err(DescriptorError::Invalid(format!(
                "install step {} has an empty command",
                i + 1
            )));
        }
        if let Some(i) = self.test.iter().position(|s| s.command.trim().is_empty()) {
            return Err(DescriptorError::Invalid(format!(
                "test step {} has an empty command",
                i + 1
            )));
        }
        if let Some(dep) = self.dependencies.build.iter().find(|d| d.trim().is_empty()) {
            return Err(DescriptorError::Invalid(format!(
                "build dependency '{dep}' is blank"
            )));
        }
        Ok(())
    }
}

impl std::str::FromStr for PackageDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
