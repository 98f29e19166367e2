// src/packages/archive.rs

//! Compressed tar archives: sync databases and package files
//!
//! Compression is detected from magic bytes, so `.db`, `.pkg.tar.zst`,
//! `.pkg.tar.xz` and `.pkg.tar.gz` files are all opened the same way.

use super::files::FileManifest;
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tar::{Archive, Entry, EntryType};
use tracing::{debug, warn};
use xz2::read::XzDecoder;

/// Archive compression format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Gzip,
    Xz,
    Zstd,
    None,
}

impl CompressionFormat {
    /// Detect the format from the first bytes of a file
    pub fn detect(magic: &[u8]) -> Self {
        if magic.starts_with(&[0x1F, 0x8B]) {
            CompressionFormat::Gzip
        } else if magic.starts_with(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00]) {
            CompressionFormat::Xz
        } else if magic.starts_with(&[0x28, 0xB5, 0x2F, 0xFD]) {
            CompressionFormat::Zstd
        } else {
            CompressionFormat::None
        }
    }
}

/// Open and decompress an archive
pub fn open_archive(path: &Path) -> Result<Archive<Box<dyn Read>>> {
    let file = File::open(path).map_err(|e| {
        Error::ArchiveError(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let mut reader = BufReader::new(file);
    let compression = CompressionFormat::detect(reader.fill_buf()?);
    debug!("Opening {} ({:?})", path.display(), compression);

    let reader: Box<dyn Read> = match compression {
        CompressionFormat::Gzip => Box::new(GzDecoder::new(reader)),
        CompressionFormat::Xz => Box::new(XzDecoder::new(reader)),
        CompressionFormat::Zstd => Box::new(zstd::Decoder::with_buffer(reader).map_err(|e| {
            Error::ArchiveError(format!("Failed to create zstd decoder: {}", e))
        })?),
        CompressionFormat::None => Box::new(reader),
    };

    Ok(Archive::new(reader))
}

/// Whether a file can be read to the end as a (compressed) tar archive
pub fn is_valid_archive(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => {}
        _ => return false,
    }

    let check = || -> Result<()> {
        let mut archive = open_archive(path)?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            entry.path()?;
            io::copy(&mut entry, &mut io::sink())?;
        }
        Ok(())
    };

    match check() {
        Ok(()) => true,
        Err(e) => {
            debug!("{} is not a valid archive: {}", path.display(), e);
            false
        }
    }
}

/// Entry name as stored, without a leading "./"
pub(crate) fn entry_name<R: Read>(entry: &Entry<'_, R>) -> String {
    let raw = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
    let mut name = raw.as_str();
    while let Some(rest) = name.strip_prefix("./") {
        name = rest;
    }
    let mut name = name.to_string();
    if entry.header().entry_type().is_dir() && !name.is_empty() && !name.ends_with('/') {
        name.push('/');
    }
    name
}

/// Package metadata such as `.PKGINFO` or `.MTREE` at the top level
fn is_metadata_entry(name: &str) -> bool {
    name.starts_with('.') && !name.trim_end_matches('/').contains('/')
}

/// Entries that are never extracted, whatever the manifest says
pub fn is_unsafe_entry(name: &str) -> bool {
    name.starts_with('.')
        || name.split(['/', '\\']).any(|segment| segment == "..")
        || name.contains(":\\")
        || name.contains(":/")
}

/// Paths a package archive installs, sorted so parents precede children
pub fn package_file_list(path: &Path) -> Result<Vec<String>> {
    let mut archive = open_archive(path)?;
    let mut files = Vec::new();

    for entry in archive
        .entries()
        .map_err(|e| Error::ArchiveError(format!("Failed to read archive entries: {}", e)))?
    {
        let entry =
            entry.map_err(|e| Error::ArchiveError(format!("Failed to read archive entry: {}", e)))?;
        let name = entry_name(&entry);
        if name.is_empty() || is_metadata_entry(&name) {
            continue;
        }
        files.push(name);
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Outcome of [`extract_package`]
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub extracted: usize,
    /// Entries refused by the path safety checks
    pub rejected: Vec<String>,
}

/// Deepest existing ancestor of `path`, canonicalized
fn canonical_ancestor(path: &Path) -> io::Result<PathBuf> {
    let mut current = path;
    loop {
        if fs::symlink_metadata(current).is_ok() {
            return current.canonicalize();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return Err(io::Error::new(io::ErrorKind::NotFound, "no existing ancestor")),
        }
    }
}

/// Checks a destination against the root before anything is written
struct Containment {
    root_len: usize,
    canonical_root: PathBuf,
}

impl Containment {
    fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root_len: root.as_os_str().len(),
            canonical_root: root.canonicalize()?,
        })
    }

    fn check(&self, name: &str, destination: &Path, is_dir: bool) -> Result<()> {
        if destination.as_os_str().len() + 1 < self.root_len + name.len() {
            return Err(Error::PathSafety(format!(
                "{} resolves to suspiciously short path {}",
                name,
                destination.display()
            )));
        }

        // A file or link replaces whatever sits at the destination, so only
        // the directory it lands in has to be inside the root
        let probe = if is_dir {
            destination
        } else {
            destination.parent().unwrap_or(destination)
        };
        let ancestor = canonical_ancestor(probe)?;
        if !ancestor.starts_with(&self.canonical_root) {
            return Err(Error::PathSafety(format!(
                "{} escapes the root through {}",
                name,
                ancestor.display()
            )));
        }
        Ok(())
    }

    /// Location of an existing file a hard link may point at
    fn link_source(&self, target: &str, manifest: &FileManifest) -> Result<PathBuf> {
        if is_unsafe_entry(target) {
            return Err(Error::PathSafety(format!("unsafe link target {}", target)));
        }
        let source = manifest.resolve(target).canonicalize()?;
        if !source.starts_with(&self.canonical_root) {
            return Err(Error::PathSafety(format!(
                "link target {} escapes the root through {}",
                target,
                source.display()
            )));
        }
        Ok(source)
    }
}

fn remove_non_directory(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => fs::remove_file(path),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_symlink(_target: &Path, link: &Path) -> io::Result<()> {
    warn!("Symbolic links are not supported here, skipping {}", link.display());
    Ok(())
}

/// Extract the entries listed in `manifest` below its root
///
/// Unsafe entries are skipped even when listed; callers detect the gap by
/// checking that every listed path exists afterwards.
pub fn extract_package(path: &Path, manifest: &FileManifest) -> Result<ExtractionReport> {
    let containment = Containment::new(manifest.root())?;
    let mut archive = open_archive(path)?;
    let mut report = ExtractionReport::default();

    for entry in archive
        .entries()
        .map_err(|e| Error::ArchiveError(format!("Failed to read archive entries: {}", e)))?
    {
        let mut entry =
            entry.map_err(|e| Error::ArchiveError(format!("Failed to read archive entry: {}", e)))?;
        let name = entry_name(&entry);

        if is_unsafe_entry(&name) {
            if !is_metadata_entry(&name) {
                warn!("Skipping unsafe archive entry: {}", name);
                report.rejected.push(name);
            }
            continue;
        }
        if !manifest.files().iter().any(|f| *f == name) {
            continue;
        }

        let destination = manifest.resolve(&name);
        let entry_type = entry.header().entry_type();
        if let Err(e) = containment.check(&name, &destination, entry_type.is_dir()) {
            warn!("Skipping archive entry: {}", e);
            report.rejected.push(name);
            continue;
        }

        match entry_type {
            EntryType::Directory => {
                fs::create_dir_all(&destination)?;
            }
            EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent)?;
                }
                remove_non_directory(&destination)?;
                let mut file = File::create(&destination)?;
                io::copy(&mut entry, &mut file)?;
                if let Ok(mode) = entry.header().mode() {
                    set_mode(&destination, mode)?;
                }
            }
            EntryType::Symlink => {
                let Some(target) = entry.link_name()? else {
                    warn!("Symlink {} has no target, skipping", name);
                    continue;
                };
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent)?;
                }
                remove_non_directory(&destination)?;
                create_symlink(&target, &destination)?;
            }
            EntryType::Link => {
                let Some(target) = entry.link_name()? else {
                    warn!("Hard link {} has no target, skipping", name);
                    continue;
                };
                let target = target.to_string_lossy().into_owned();
                let source = match containment.link_source(&target, manifest) {
                    Ok(source) => source,
                    Err(e) => {
                        warn!("Skipping archive entry {}: {}", name, e);
                        report.rejected.push(name);
                        continue;
                    }
                };
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent)?;
                }
                remove_non_directory(&destination)?;
                fs::hard_link(&source, &destination)?;
            }
            other => {
                debug!("Skipping {} with unsupported entry type {:?}", name, other);
                continue;
            }
        }

        report.extracted += 1;
    }

    debug!(
        "Extracted {} entries from {}",
        report.extracted,
        path.file_name().unwrap_or(OsStr::new("")).to_string_lossy()
    );
    Ok(report)
}

/// Listed paths that do not exist under the root
pub fn missing_files(manifest: &FileManifest) -> Vec<String> {
    manifest
        .files()
        .iter()
        .filter(|f| fs::symlink_metadata(manifest.resolve(f)).is_err())
        .cloned()
        .collect()
}
