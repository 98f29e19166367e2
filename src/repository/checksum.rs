// src/repository/checksum.rs

//! Hash verification of downloaded package archives

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::debug;

/// Hash algorithms that package descriptors can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Md5,
    Sha256,
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Md5 => "MD5",
            Algorithm::Sha256 => "SHA-256",
        }
    }
}

/// Hex digest of a file's content
pub fn file_digest(path: &Path, algorithm: Algorithm) -> Result<String> {
    let mut file = File::open(path)?;

    let digest = match algorithm {
        Algorithm::Md5 => {
            let mut context = md5::Context::new();
            io::copy(&mut file, &mut context)?;
            format!("{:x}", context.compute())
        }
        Algorithm::Sha256 => {
            let mut hasher = Sha256::new();
            io::copy(&mut file, &mut hasher)?;
            format!("{:x}", hasher.finalize())
        }
    };

    Ok(digest)
}

/// Verify file checksum matches expected value (hex, any case)
pub fn verify(path: &Path, algorithm: Algorithm, expected: &str) -> Result<()> {
    debug!("Verifying {} checksum for {}", algorithm.name(), path.display());

    let actual = file_digest(path, algorithm)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(Error::ChecksumMismatch {
            path: path.to_path_buf(),
            algorithm: algorithm.name(),
            expected: expected.to_string(),
            actual,
        });
    }

    debug!("Checksum verified: {}", actual);
    Ok(())
}
