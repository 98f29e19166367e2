// src/repository/mod.rs

//! Remote repositories and package downloading
//!
//! This module provides functionality for:
//! - Describing configured sync repositories
//! - Downloading databases and packages with retry support
//! - Promoting downloads into place atomically
//! - Verifying package checksums
//! - Caching and querying sync databases

pub mod checksum;
pub mod sync;

pub use sync::{ListedPackage, RemoteDatabase};

use crate::error::{Error, Result};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use url::Url;

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// A named sync repository and the server it is fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepository {
    name: String,
    server: Url,
    database_url: Url,
    cache_path: PathBuf,
}

impl RemoteRepository {
    /// Describe a repository whose database is cached below `db_path`
    ///
    /// The server URL always ends in `/` afterwards, so joining a file name
    /// appends to it instead of replacing its last segment.
    pub fn new(name: &str, server: &str, db_path: &Path) -> Result<Self> {
        if !Self::is_valid_name(name) {
            return Err(Error::ConfigError(format!(
                "invalid repository name '{}': only letters, '_' and '-' are allowed",
                name
            )));
        }
        let server = server.trim();
        if server.is_empty() {
            return Err(Error::ConfigError(format!(
                "repository '{}' has no server",
                name
            )));
        }

        let server = if server.ends_with('/') {
            Url::parse(server)?
        } else {
            Url::parse(&format!("{}/", server))?
        };
        let database_url = server.join(&format!("{}.db", name))?;

        Ok(Self {
            name: name.to_string(),
            server,
            database_url,
            cache_path: db_path.join("sync").join(format!("{}.db", name)),
        })
    }

    /// Repository names consist of ASCII letters, '_' and '-'
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphabetic() || c == '_' || c == '-')
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server(&self) -> &Url {
        &self.server
    }

    /// `<server>/<name>.db`
    pub fn database_url(&self) -> &Url {
        &self.database_url
    }

    /// `<db-path>/sync/<name>.db`
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// URL of a package archive offered by this repository
    pub fn package_url(&self, filename: &str) -> Result<Url> {
        Ok(self.server.join(filename)?)
    }
}

/// Blocking fetch of one URL into a local file
pub trait Downloader {
    fn download(&self, url: &Url, dest: &Path) -> Result<()>;
}

/// HTTP client wrapper with retry support
///
/// `file://` URLs are copied from disk, so local mirrors work offline.
pub struct RepositoryClient {
    client: Client,
    max_retries: u32,
    report_progress: bool,
}

impl RepositoryClient {
    /// Create a new repository client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
            report_progress: false,
        })
    }

    /// Log transfer progress at info level
    pub fn with_progress(mut self, report_progress: bool) -> Self {
        self.report_progress = report_progress;
        self
    }

    fn copy_local(&self, url: &Url, dest: &Path) -> Result<()> {
        let source = url
            .to_file_path()
            .map_err(|_| Error::DownloadError(format!("Not a local file URL: {}", url)))?;
        fs::copy(&source, dest).map_err(|e| {
            Error::DownloadError(format!("Failed to copy {}: {}", source.display(), e))
        })?;
        Ok(())
    }

    fn fetch_http(&self, url: &Url, dest: &Path) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url.as_str()).send() {
                Ok(mut response) => {
                    if !response.status().is_success() {
                        return Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }

                    let total = response.content_length();
                    let mut file = File::create(dest)?;
                    let written = io::copy(&mut response, &mut file).map_err(|e| {
                        Error::DownloadError(format!("Failed to write downloaded data: {}", e))
                    })?;

                    if self.report_progress {
                        match total {
                            Some(total) => info!("{}: {}/{} bytes", url, written, total),
                            None => info!("{}: {} bytes", url, written),
                        }
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to download {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl Downloader for RepositoryClient {
    fn download(&self, url: &Url, dest: &Path) -> Result<()> {
        debug!("Downloading {} to {}", url, dest.display());
        match url.scheme() {
            "file" => self.copy_local(url, dest),
            "http" | "https" => self.fetch_http(url, dest),
            other => Err(Error::DownloadError(format!(
                "Unsupported URL scheme '{}' in {}",
                other, url
            ))),
        }
    }
}

/// Download `url` and move it to `dest` only once the transfer succeeded
pub fn fetch_atomic(downloader: &dyn Downloader, url: &Url, dest: &Path) -> Result<()> {
    fetch_checked(downloader, url, dest, |_| Ok(()))
}

/// Like [`fetch_atomic`], with `check` run on the staged file before it
/// replaces `dest`
///
/// Each call downloads into its own scratch directory. When `dest` is on
/// another filesystem the file is copied next to it first and renamed from
/// there, so `dest` never holds a partial file.
pub fn fetch_checked<F>(downloader: &dyn Downloader, url: &Url, dest: &Path, check: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let parent = dest.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    let file_name = dest
        .file_name()
        .ok_or_else(|| Error::DownloadError(format!("Invalid destination {}", dest.display())))?;

    let scratch = TempDir::new()?;
    let staged = scratch.path().join(file_name);
    downloader.download(url, &staged)?;
    check(&staged)?;

    if let Err(e) = fs::rename(&staged, dest) {
        debug!(
            "Rename into {} failed ({}), copying instead",
            parent.display(),
            e
        );
        let sibling = tempfile::Builder::new()
            .prefix(".relpac-")
            .tempfile_in(parent)?;
        fs::copy(&staged, sibling.path())?;
        sibling.persist(dest).map_err(|e| Error::Io(e.error))?;
    }

    debug!("Stored {}", dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct FailingDownloader;

    impl Downloader for FailingDownloader {
        fn download(&self, _url: &Url, dest: &Path) -> Result<()> {
            fs::write(dest, b"partial")?;
            Err(Error::DownloadError("connection reset".to_string()))
        }
    }

    #[test]
    fn test_database_url_keeps_last_segment() {
        let dir = tempdir().unwrap();
        let repo =
            RemoteRepository::new("core", "https://mirror.example.com/core/os/x86_64", dir.path())
                .unwrap();
        assert_eq!(
            repo.database_url().as_str(),
            "https://mirror.example.com/core/os/x86_64/core.db"
        );
        assert_eq!(
            repo.package_url("bash-5.2-1-x86_64.pkg.tar.zst").unwrap().as_str(),
            "https://mirror.example.com/core/os/x86_64/bash-5.2-1-x86_64.pkg.tar.zst"
        );
        assert_eq!(repo.cache_path(), dir.path().join("sync/core.db"));
    }

    #[test]
    fn test_repository_validation() {
        let dir = tempdir().unwrap();
        assert!(RemoteRepository::new("mini-galaxy_2", "https://x.org", dir.path()).is_err());
        assert!(RemoteRepository::new("minigalaxy", "", dir.path()).is_err());
        assert!(RemoteRepository::new("minigalaxy", "not a url", dir.path()).is_err());
        assert!(RemoteRepository::new("mini-galaxy_", "https://x.org/", dir.path()).is_ok());
    }

    #[test]
    fn test_file_url_download() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source.db");
        fs::write(&source, b"archive").unwrap();

        let url = Url::from_file_path(&source).unwrap();
        let dest = dir.path().join("sync/copy.db");
        fetch_atomic(&RepositoryClient::new().unwrap(), &url, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"archive");
    }

    #[test]
    fn test_failed_download_leaves_destination_untouched() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("core.db");
        fs::write(&dest, b"previous").unwrap();

        let url = Url::parse("https://example.com/core.db").unwrap();
        assert!(fetch_atomic(&FailingDownloader, &url, &dest).is_err());
        assert_eq!(fs::read(&dest).unwrap(), b"previous");
    }

    #[test]
    fn test_rejected_download_is_not_promoted() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source.db");
        fs::write(&source, b"garbage").unwrap();
        let dest = dir.path().join("core.db");

        let url = Url::from_file_path(&source).unwrap();
        let result = fetch_checked(&RepositoryClient::new().unwrap(), &url, &dest, |_| {
            Err(Error::ArchiveError("not an archive".to_string()))
        });
        assert!(result.is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn test_unsupported_scheme() {
        let dir = tempdir().unwrap();
        let url = Url::parse("ftp://example.com/core.db").unwrap();
        let result = RepositoryClient::new()
            .unwrap()
            .download(&url, &dir.path().join("core.db"));
        assert!(matches!(result, Err(Error::DownloadError(_))));
    }
}
