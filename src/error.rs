// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for relpac
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed repository or package URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Version string without any digits
    #[error("Cannot parse version string '{0}'")]
    InvalidVersion(String),

    /// Descriptor or manifest text that does not satisfy the key schema
    #[error("Invalid package description: {0}")]
    Validation(String),

    /// No configured repository offers the package
    #[error("Package '{0}' was not found in any repository")]
    PackageNotFound(String),

    /// A repository filter matched no configured repository
    #[error("Repository '{0}' is not configured")]
    RepositoryNotFound(String),

    /// Package is not present in the local database
    #[error("Package '{0}' is not installed")]
    NotInstalled(String),

    /// Downloaded file does not match the hash from its descriptor
    #[error("{algorithm} checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        algorithm: &'static str,
        expected: String,
        actual: String,
    },

    /// Descriptor carries no hash while checksums are required
    #[error("Package '{0}' has no checksum and unverified installs are disabled")]
    MissingChecksum(String),

    /// Unreadable or corrupt archive
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// Archive entry or manifest path escaping the root
    #[error("Path safety violation: {0}")]
    PathSafety(String),

    /// Files listed for a package are missing after extraction
    #[error("Extraction of {package} is incomplete, missing: {}", missing.join(", "))]
    IncompleteExtraction {
        package: String,
        missing: Vec<String>,
    },

    /// Network or transfer failure
    #[error("Download failed: {0}")]
    DownloadError(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A dependency chain leads back to a package being installed
    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// Installing a dependency failed
    #[error("Failed to install dependency '{dependency}' of '{package}': {source}")]
    DependencyFailed {
        package: String,
        dependency: String,
        source: Box<Error>,
    },

    /// A package of an update batch failed
    #[error("Failed to update '{package}': {source}")]
    UpdateFailed { package: String, source: Box<Error> },

    /// Local database already holds another version of the package
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Result type alias using relpac's Error type
pub type Result<T> = std::result::Result<T, Error>;
