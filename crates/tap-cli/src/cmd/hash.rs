//! Hash command

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tap_schema::Sha256Digest;

/// Print `<sha256>  <path>` for each file, in `sha256sum` layout, so the
/// digest can be pasted into a descriptor's `source.sha256`.
pub fn hash(files: &[PathBuf]) -> Result<()> {
    for path in files {
        let digest =
            file_digest(path).with_context(|| format!("Failed to hash {}", path.display()))?;
        println!("{digest}  {}", path.display());
    }
    Ok(())
}

fn file_digest(path: &Path) -> io::Result<Sha256Digest> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(Sha256Digest::from_hasher(hasher))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_descriptor_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello world").unwrap();

        let digest = file_digest(&path).unwrap();
        let expected: Sha256Digest =
            "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9"
                .parse()
                .unwrap();
        assert_eq!(digest, expected);
        assert_eq!(digest, Sha256Digest::compute(b"hello world"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(hash(&[dir.path().join("nope")]).is_err());
    }
}
