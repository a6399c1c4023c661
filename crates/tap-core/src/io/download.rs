//! Source artifact download with streaming SHA256 verification.
//!
//! Artifacts are written to `<cache>/<sha256>--<filename>.part` while being
//! hashed and only renamed into place once the digest matches, so the cache
//! never holds unverified bytes under a final name.

use std::io::Read;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tap_schema::{PackageDescriptor, Sha256Digest, SourceFormat};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::Host;

/// Errors raised while fetching a source artifact.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Transport-level failure talking to the source host.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The source host answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// Local filesystem failure while reading or caching the artifact.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The fetched bytes do not match the declared digest.
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Digest declared by the descriptor.
        expected: Sha256Digest,
        /// Digest of the bytes actually received.
        actual: Sha256Digest,
    },
}

/// A source artifact whose digest has been checked against its descriptor.
///
/// Only [`fetch`] produces values of this type.
#[derive(Debug, Clone)]
pub struct FetchedSource {
    path: PathBuf,
    digest: Sha256Digest,
    format: SourceFormat,
    filename: String,
}

impl FetchedSource {
    /// Location of the verified artifact in the cache.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The verified digest.
    pub fn digest(&self) -> &Sha256Digest {
        &self.digest
    }

    /// How the artifact should be staged.
    pub fn format(&self) -> SourceFormat {
        self.format
    }

    /// File name taken from the source URL.
    pub fn filename(&self) -> &str {
        &self.filename
    }
}

/// Compare a computed digest against the expected one.
///
/// # Errors
///
/// Returns [`DownloadError::HashMismatch`] when they differ.
pub fn check_digest(expected: &Sha256Digest, actual: Sha256Digest) -> Result<(), DownloadError> {
    if &actual == expected {
        Ok(())
    } else {
        Err(DownloadError::HashMismatch {
            expected: expected.clone(),
            actual,
        })
    }
}

/// Verify an in-memory buffer against `expected`.
///
/// # Errors
///
/// Returns [`DownloadError::HashMismatch`] when the digest differs.
pub fn verify_bytes(bytes: &[u8], expected: &Sha256Digest) -> Result<(), DownloadError> {
    check_digest(expected, Sha256Digest::compute(bytes))
}

/// Hash everything `reader` yields and verify it against `expected`.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] if reading fails, or
/// [`DownloadError::HashMismatch`] when the digest differs.
pub fn verify_reader<R: Read>(
    mut reader: R,
    expected: &Sha256Digest,
) -> Result<Sha256Digest, DownloadError> {
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher)?;
    let actual = Sha256Digest::from_hasher(hasher);
    check_digest(expected, actual.clone())?;
    Ok(actual)
}

/// Cache file name for a descriptor's artifact.
pub fn cache_name(descriptor: &PackageDescriptor) -> String {
    format!(
        "{}--{}",
        descriptor.source.sha256,
        descriptor.source.filename()
    )
}

/// Fetch and verify the descriptor's source artifact.
///
/// A single attempt is made; retries are left to the caller. A cached copy is
/// reused only if it still hashes to the declared digest.
///
/// # Errors
///
/// Returns [`DownloadError::Http`] or [`DownloadError::Status`] on transport
/// failure, [`DownloadError::HashMismatch`] if the bytes do not match, and
/// [`DownloadError::Io`] if the cache cannot be written.
pub async fn fetch(
    host: &Host,
    descriptor: &PackageDescriptor,
) -> Result<FetchedSource, DownloadError> {
    let name = &descriptor.package.name;
    let version = &descriptor.package.version;
    let source = &descriptor.source;
    let expected = &source.sha256;

    tokio::fs::create_dir_all(&host.cache_dir).await?;
    let dest = host.cache_dir.join(cache_name(descriptor));

    let fetched = FetchedSource {
        path: dest.clone(),
        digest: expected.clone(),
        format: source.effective_format(),
        filename: source.filename().to_string(),
    };

    if tokio::fs::metadata(&dest).await.is_ok_and(|m| m.is_file()) {
        let cached = dest.clone();
        let want = expected.clone();
        let check = blocking(move || verify_reader(std::fs::File::open(&cached)?, &want)).await;
        match check {
            Ok(_) => {
                info!(path = %dest.display(), "using cached artifact");
                host.reporter.info(&format!("Using cached {}", dest.display()));
                return Ok(fetched);
            }
            Err(e) => {
                warn!(path = %dest.display(), error = %e, "discarding stale cache entry");
                host.reporter.warning(&format!("Cached artifact is stale, refetching: {e}"));
                tokio::fs::remove_file(&dest).await?;
            }
        }
    }

    let partial = host.cache_dir.join(format!("{}.part", cache_name(descriptor)));
    let result = if let Some(local) = source.url.strip_prefix("file://") {
        let (src, part, want) = (PathBuf::from(local), partial.clone(), expected.clone());
        blocking(move || copy_and_verify(&src, &part, &want)).await
    } else {
        download_and_verify(host, descriptor, &partial).await
    };

    if let Err(e) = result {
        if matches!(e, DownloadError::HashMismatch { .. }) {
            host.reporter.failed(name, version, "hash mismatch");
        }
        tokio::fs::remove_file(&partial).await.ok();
        return Err(e);
    }

    tokio::fs::rename(&partial, &dest).await?;
    debug!(path = %dest.display(), digest = %expected, "artifact verified");
    Ok(fetched)
}

/// Run synchronous hashing IO off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, DownloadError>
where
    F: FnOnce() -> Result<T, DownloadError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DownloadError::Io(std::io::Error::other(e)))?
}

async fn download_and_verify(
    host: &Host,
    descriptor: &PackageDescriptor,
    dest: &Path,
) -> Result<(), DownloadError> {
    let name = &descriptor.package.name;
    let version = &descriptor.package.version;
    let url = descriptor.source.url.as_str();

    info!(%url, "downloading source");
    let response = host
        .client
        .get(url)
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let total_size = response.content_length();
    host.reporter.downloading(name, version, 0, total_size);

    let mut file = File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
        host.reporter.downloading(name, version, downloaded, total_size);
    }

    file.flush().await?;
    check_digest(&descriptor.source.sha256, Sha256Digest::from_hasher(hasher))
}

fn copy_and_verify(src: &Path, dest: &Path, expected: &Sha256Digest) -> Result<(), DownloadError> {
    struct Tee<W> {
        inner: W,
        hasher: Sha256,
    }

    impl<W: std::io::Write> std::io::Write for Tee<W> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = self.inner.write(buf)?;
            self.hasher.update(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.inner.flush()
        }
    }

    let mut input = std::fs::File::open(src)?;
    let mut tee = Tee {
        inner: std::fs::File::create(dest)?,
        hasher: Sha256::new(),
    };
    std::io::copy(&mut input, &mut tee)?;
    std::io::Write::flush(&mut tee)?;
    check_digest(expected, Sha256Digest::from_hasher(tee.hasher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Layout;
    use tempfile::tempdir;

    // sha256("hello world")
    const HELLO: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn descriptor(url: &str, sha256: &str) -> PackageDescriptor {
        PackageDescriptor::parse(&format!(
            r#"
[package]
name = "hello"
version = "1.0"

[source]
url = "{url}"
sha256 = "{sha256}"

[[install]]
command = "true"
"#
        ))
        .unwrap()
    }

    fn host(home: &Path) -> Host {
        let layout = Layout::new(home);
        Host::new(&layout, home.join("prefix"))
    }

    #[test]
    fn verify_bytes_detects_mismatch() {
        let expected = Sha256Digest::new(HELLO).unwrap();
        assert!(verify_bytes(b"hello world", &expected).is_ok());
        let err = verify_bytes(b"hello world!", &expected).unwrap_err();
        assert!(matches!(err, DownloadError::HashMismatch { .. }));
    }

    #[test]
    fn verify_reader_returns_digest() {
        let expected = Sha256Digest::new(HELLO).unwrap();
        let got = verify_reader(&b"hello world"[..], &expected).unwrap();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn fetch_downloads_and_caches() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/hello.txt")
            .with_status(200)
            .with_body("hello world")
            .expect(1)
            .create_async()
            .await;

        let tmp = tempdir().unwrap();
        let host = host(tmp.path());
        let d = descriptor(&format!("{}/hello.txt", server.url()), HELLO);

        let fetched = fetch(&host, &d).await.unwrap();
        assert_eq!(std::fs::read(fetched.path()).unwrap(), b"hello world");
        assert_eq!(fetched.filename(), "hello.txt");
        assert_eq!(fetched.format(), SourceFormat::Raw);

        // Second fetch is served from the cache.
        fetch(&host, &d).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_rejects_mismatched_bytes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/jackpot")
            .with_status(200)
            .with_body("not the real artifact")
            .create_async()
            .await;

        let tmp = tempdir().unwrap();
        let host = host(tmp.path());
        let d = descriptor(
            &format!("{}/jackpot", server.url()),
            "b3d25aace78677caa9da91db69076b9ba01de39a5840024f1910c7c9ca490ce0",
        );

        let err = fetch(&host, &d).await.unwrap_err();
        assert!(matches!(err, DownloadError::HashMismatch { .. }));
        // Nothing is left behind in the cache.
        assert_eq!(std::fs::read_dir(&host.cache_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn fetch_reports_http_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gone")
            .with_status(404)
            .create_async()
            .await;

        let tmp = tempdir().unwrap();
        let d = descriptor(&format!("{}/gone", server.url()), HELLO);
        let err = fetch(&host(tmp.path()), &d).await.unwrap_err();
        assert!(matches!(err, DownloadError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn fetch_refetches_stale_cache_entry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/hello.txt")
            .with_body("hello world")
            .expect(1)
            .create_async()
            .await;

        let tmp = tempdir().unwrap();
        let host = host(tmp.path());
        let d = descriptor(&format!("{}/hello.txt", server.url()), HELLO);

        std::fs::create_dir_all(&host.cache_dir).unwrap();
        let cached = host.cache_dir.join(cache_name(&d));
        std::fs::write(&cached, b"corrupted").unwrap();

        fetch(&host, &d).await.unwrap();
        assert_eq!(std::fs::read(&cached).unwrap(), b"hello world");
        mock.assert_async().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cached_file_source_is_reverified_without_the_original() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("hello.txt");
        std::fs::write(&src, b"hello world").unwrap();

        let host = host(&tmp.path().join("home"));
        let d = descriptor(&format!("file://{}", src.display()), HELLO);
        let first = fetch(&host, &d).await.unwrap();

        std::fs::remove_file(&src).unwrap();
        let second = fetch(&host, &d).await.unwrap();
        assert_eq!(first.path(), second.path());
        assert!(!host.cache_dir.join(format!("{}.part", cache_name(&d))).exists());
    }

    #[tokio::test]
    async fn fetch_reads_file_urls() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("hello.txt");
        std::fs::write(&src, b"hello world").unwrap();

        let host = host(&tmp.path().join("home"));
        let d = descriptor(&format!("file://{}", src.display()), HELLO);
        let fetched = fetch(&host, &d).await.unwrap();
        assert_eq!(fetched.digest().as_str(), HELLO);

        let bad = descriptor(&format!("file://{}", src.display()), &"0".repeat(64));
        assert!(matches!(
            fetch(&host, &bad).await,
            Err(DownloadError::HashMismatch { .. })
        ));
    }
}
