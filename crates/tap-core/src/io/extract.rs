//! Staging a verified artifact into a source tree.
//!
//! Handles tar.gz, tar, zip, and raw single-file artifacts.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use tap_schema::SourceFormat;
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

use super::download::FetchedSource;

/// Errors raised while unpacking a source artifact.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Filesystem failure during extraction.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The archive is corrupt or unreadable.
    #[error("Archive error: {0}")]
    Archive(String),

    /// An entry would be written outside the destination directory.
    #[error("Invalid path in archive: {0}")]
    UnsafePath(String),
}

/// Unpack `source` into `dest` and return the root of the source tree.
///
/// When the artifact holds a single top-level directory (the usual layout of
/// release tarballs), that directory is returned instead of `dest`.
///
/// # Errors
///
/// Returns [`ExtractError::UnsafePath`] for entries that escape `dest`, and
/// [`ExtractError::Archive`] or [`ExtractError::Io`] for unreadable archives.
pub fn stage(source: &FetchedSource, dest: &Path) -> Result<PathBuf, ExtractError> {
    fs::create_dir_all(dest)?;
    match source.format() {
        SourceFormat::TarGz => {
            let reader = BufReader::new(File::open(source.path())?);
            extract_tar(flate2::read::GzDecoder::new(reader), dest)?;
        }
        SourceFormat::Tar => {
            extract_tar(BufReader::new(File::open(source.path())?), dest)?;
        }
        SourceFormat::Zip => extract_zip(source.path(), dest)?,
        SourceFormat::Raw => {
            fs::copy(source.path(), dest.join(source.filename()))?;
        }
    }

    let root = single_top_level_dir(dest)?.unwrap_or_else(|| dest.to_path_buf());
    debug!(root = %root.display(), format = ?source.format(), "source staged");
    Ok(root)
}

/// Reject absolute paths and `..` components.
fn sanitize(path: &Path) -> Result<PathBuf, ExtractError> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractError::UnsafePath(path.display().to_string()));
            }
        }
    }
    Ok(clean)
}

fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<(), ExtractError> {
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative = sanitize(&entry.path()?)?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            let link = entry.link_name()?.ok_or_else(|| {
                ExtractError::Archive(format!("{} has no link target", relative.display()))
            })?;
            // Hard link targets are archive-relative, symlink targets are
            // relative to the link's own directory.
            let base = if entry_type.is_symlink() {
                relative.parent().unwrap_or_else(|| Path::new(""))
            } else {
                Path::new("")
            };
            if link_escapes(base, &link) {
                return Err(ExtractError::UnsafePath(format!(
                    "{} -> {}",
                    relative.display(),
                    link.display()
                )));
            }
        }

        // `unpack_in` also refuses to write through a symlink that leaves `dest`.
        if !entry.unpack_in(dest)? {
            return Err(ExtractError::UnsafePath(relative.display().to_string()));
        }
    }

    Ok(())
}

/// Whether `target`, resolved lexically from `base`, leaves the archive root.
fn link_escapes(base: &Path, target: &Path) -> bool {
    let mut depth = base.components().count();
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return true,
            },
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| ExtractError::Archive(e.to_string()))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        let relative = match file.enclosed_name() {
            Some(path) => path,
            None => return Err(ExtractError::UnsafePath(file.name().to_string())),
        };
        let target = dest.join(&relative);

        if file.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut file, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
        }
    }

    Ok(())
}

fn single_top_level_dir(dest: &Path) -> io::Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(dest)?;
    let Some(first) = entries.next().transpose()? else {
        return Ok(None);
    };
    if entries.next().is_some() || !first.file_type()?.is_dir() {
        return Ok(None);
    }
    Ok(Some(first.path()))
}
