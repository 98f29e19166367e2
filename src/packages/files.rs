// src/packages/files.rs

//! File manifests (`files` records) of installed packages
//!
//! Every path that is written or removed under the root goes through
//! [`FileManifest::resolve`].

use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Header line of a `files` record
pub const FILES_HEADER: &str = "%FILES%";

/// Files owned by one installed package, relative to the root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileManifest {
    root: PathBuf,
    files: Vec<String>,
}

/// What [`FileManifest::remove_all`] did
#[derive(Debug, Default)]
pub struct RemovalSummary {
    pub removed_files: usize,
    pub removed_directories: usize,
    /// Listed regular files that did not exist
    pub missing: Vec<PathBuf>,
}

/// Strip parent-directory segments, leading separators and drive letters
pub(crate) fn sanitize(path: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect();

    if let Some(first) = segments.first() {
        let bytes = first.as_bytes();
        if bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            segments.remove(0);
        }
    }

    segments
}

impl FileManifest {
    pub fn new(root: impl Into<PathBuf>, files: Vec<String>) -> Self {
        Self {
            root: root.into(),
            files,
        }
    }

    /// Parse a `files` record: one path per non-empty line after the header
    pub fn parse(root: impl Into<PathBuf>, content: &str) -> Self {
        let files = content
            .lines()
            .filter(|line| !line.is_empty() && *line != FILES_HEADER)
            .map(str::to_string)
            .collect();
        Self::new(root, files)
    }

    pub fn serialize(&self) -> String {
        let mut out = String::from(FILES_HEADER);
        out.push('\n');
        for file in &self.files {
            out.push_str(file);
            out.push('\n');
        }
        out
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Package-relative paths in manifest order
    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Absolute location of a manifest path under the root
    pub fn resolve(&self, path: &str) -> PathBuf {
        let mut resolved = self.root.clone();
        for segment in sanitize(path) {
            resolved.push(segment);
        }
        resolved
    }

    /// Resolved locations of all listed paths
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| self.resolve(f)).collect()
    }

    /// Delete the package's files, then its now-empty directories
    ///
    /// Directories still holding foreign content are left alone. Missing
    /// regular files are reported in the summary.
    pub fn remove_all(&self) -> Result<RemovalSummary> {
        let mut summary = RemovalSummary::default();
        let mut directories = Vec::new();

        for file in &self.files {
            let path = self.resolve(file);
            if path == self.root {
                continue;
            }

            match fs::symlink_metadata(&path) {
                Ok(meta) if meta.is_dir() => directories.push(path),
                Ok(_) => {
                    fs::remove_file(&path)?;
                    summary.removed_files += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if !file.ends_with('/') {
                        warn!("Could not delete missing file: {}", path.display());
                        summary.missing.push(path);
                    }
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }

        // Children are listed after their parents
        for dir in directories.iter().rev() {
            match fs::remove_dir(dir) {
                Ok(()) => summary.removed_directories += 1,
                Err(e) => debug!("Keeping directory {}: {}", dir.display(), e),
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_and_serialize() {
        let content = "%FILES%\nusr/\nusr/bin/\nusr/bin/foo\n\n";
        let manifest = FileManifest::parse("/root", content);
        assert_eq!(manifest.files(), ["usr/", "usr/bin/", "usr/bin/foo"]);
        assert_eq!(manifest.serialize(), "%FILES%\nusr/\nusr/bin/\nusr/bin/foo\n");
    }

    #[test]
    fn test_resolve_stays_under_root() {
        let root = PathBuf::from("/srv/root");
        let manifest = FileManifest::new(&root, Vec::new());

        for path in [
            "../../etc/passwd",
            "/etc/passwd",
            "C:\\Windows\\x",
            "c:/Windows/x",
            "usr/../../../etc/shadow",
            "\\\\server\\share",
        ] {
            let resolved = manifest.resolve(path);
            assert!(resolved.starts_with(&root), "{} -> {}", path, resolved.display());
            assert_ne!(resolved, root, "{}", path);
            assert!(!resolved.components().any(|c| c == std::path::Component::ParentDir));
        }

        assert_eq!(manifest.resolve("../../etc/passwd"), root.join("etc/passwd"));
        assert_eq!(manifest.resolve("/etc/passwd"), root.join("etc/passwd"));
        assert_eq!(manifest.resolve("C:\\Windows\\x"), root.join("Windows/x"));
        assert_eq!(manifest.resolve("usr/bin/"), root.join("usr/bin"));
    }

    #[test]
    fn test_remove_all_removes_files_then_empty_directories() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join("usr/bin")).unwrap();
        fs::create_dir_all(root.path().join("usr/share")).unwrap();
        fs::write(root.path().join("usr/bin/foo"), b"foo").unwrap();
        fs::write(root.path().join("usr/share/other"), b"not ours").unwrap();

        let manifest = FileManifest::new(
            root.path(),
            vec![
                "usr/".to_string(),
                "usr/bin/".to_string(),
                "usr/bin/foo".to_string(),
                "usr/share/".to_string(),
            ],
        );

        let summary = manifest.remove_all().unwrap();
        assert_eq!(summary.removed_files, 1);
        assert_eq!(summary.removed_directories, 1);
        assert!(summary.missing.is_empty());
        assert!(!root.path().join("usr/bin").exists());
        assert!(root.path().join("usr/share/other").exists());
    }

    #[test]
    fn test_remove_all_reports_missing_files() {
        let root = tempdir().unwrap();
        let manifest = FileManifest::new(root.path(), vec!["usr/bin/gone".to_string()]);

        let summary = manifest.remove_all().unwrap();
        assert_eq!(summary.missing, vec![root.path().join("usr/bin/gone")]);
    }
}
