// src/db/mod.rs

//! Local database of installed packages
//!
//! Layout below the database path:
//!
//! ```text
//! local/ALPM_DB_VERSION
//! local/<name>-<version>-<release>/desc
//! local/<name>-<version>-<release>/files
//! ```
//!
//! The package directories are scanned once when the database is opened and
//! kept in a name index afterwards, so every lookup matches the exact name
//! and at most one version per name is visible.

use crate::error::{Error, Result};
use crate::packages::{FileManifest, LocalDescriptor, RemoteDescriptor};
use crate::repository::ListedPackage;
use crate::repository::sync::split_entry_name;
use crate::version::Version;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Version marker file written once into `local/`
pub const DB_VERSION_FILE: &str = "ALPM_DB_VERSION";

const DB_VERSION: &str = "9";

#[derive(Debug, Clone)]
struct InstalledEntry {
    directory: PathBuf,
    version: Version,
}

impl InstalledEntry {
    fn directory_name(&self) -> String {
        self.directory
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Installed-package records below `<db-path>/local`
#[derive(Debug)]
pub struct LocalDatabase {
    root: PathBuf,
    local_dir: PathBuf,
    index: BTreeMap<String, InstalledEntry>,
}

impl LocalDatabase {
    /// Open the local database, creating it on first use
    ///
    /// # Arguments
    ///
    /// * `db_path` - Database directory; records live in its `local/` child
    /// * `root` - Install root that manifests are resolved against
    pub fn open(db_path: &Path, root: &Path) -> Result<Self> {
        let local_dir = db_path.join("local");
        fs::create_dir_all(&local_dir)?;

        let marker = local_dir.join(DB_VERSION_FILE);
        if !marker.exists() {
            debug!("Stamping {}", marker.display());
            fs::write(&marker, format!("{}\n", DB_VERSION))?;
        }

        let mut db = Self {
            root: root.to_path_buf(),
            local_dir,
            index: BTreeMap::new(),
        };
        db.scan()?;
        Ok(db)
    }

    fn scan(&mut self) -> Result<()> {
        for entry in fs::read_dir(&self.local_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let dir_name = entry.file_name().to_string_lossy().into_owned();
            let Some((name, version)) = split_entry_name(&dir_name) else {
                debug!("Ignoring {} in local database", dir_name);
                continue;
            };
            let Ok(version) = Version::parse(version) else {
                warn!("Ignoring {} in local database: unreadable version", dir_name);
                continue;
            };

            let candidate = InstalledEntry {
                directory: entry.path(),
                version,
            };
            match self.index.get(name) {
                Some(existing) => {
                    warn!(
                        "Package {} is recorded twice ({} and {}), using the newer",
                        name,
                        existing.directory_name(),
                        dir_name
                    );
                    if candidate.version > existing.version {
                        self.index.insert(name.to_string(), candidate);
                    }
                }
                None => {
                    self.index.insert(name.to_string(), candidate);
                }
            }
        }

        debug!("Local database holds {} packages", self.index.len());
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `local/` directory
    pub fn path(&self) -> &Path {
        &self.local_dir
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get_package_directory(&self, name: &str) -> Option<&Path> {
        self.index.get(name).map(|entry| entry.directory.as_path())
    }

    pub fn get_package_version(&self, name: &str) -> Option<&Version> {
        self.index.get(name).map(|entry| &entry.version)
    }

    pub fn get_descriptor(&self, name: &str) -> Result<Option<LocalDescriptor>> {
        let Some(dir) = self.get_package_directory(name) else {
            return Ok(None);
        };
        let content = fs::read_to_string(dir.join("desc"))?;
        LocalDescriptor::parse(&content).map(Some)
    }

    /// File manifest of an installed package, resolved against the root
    pub fn get_file_manifest(&self, name: &str) -> Result<Option<FileManifest>> {
        let Some(dir) = self.get_package_directory(name) else {
            return Ok(None);
        };

        match fs::read_to_string(dir.join("files")) {
            Ok(content) => Ok(Some(FileManifest::parse(&self.root, &content))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Package {} has no file list", name);
                Ok(Some(FileManifest::new(&self.root, Vec::new())))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Record an installed package
    ///
    /// Re-recording the installed version replaces its records; a different
    /// installed version has to be removed first.
    pub fn install(
        &mut self,
        descriptor: RemoteDescriptor,
        manifest: &FileManifest,
        installed_explicitly: bool,
    ) -> Result<LocalDescriptor> {
        let name = descriptor.name().to_string();
        if let Some(existing) = self.index.get(&name)
            && existing.version != *descriptor.version()
        {
            return Err(Error::Conflict(format!(
                "{} {} is already installed, cannot record {}",
                name,
                existing.version,
                descriptor.version()
            )));
        }

        let directory = self
            .local_dir
            .join(format!("{}-{}", name, descriptor.version()));
        fs::create_dir_all(&directory)?;

        let local = descriptor.into_local(installed_explicitly);
        fs::write(directory.join("desc"), local.serialize())?;
        fs::write(directory.join("files"), manifest.serialize())?;

        info!("Recorded {} {}", name, local.version());
        self.index.insert(
            name,
            InstalledEntry {
                directory,
                version: local.version().clone(),
            },
        );
        Ok(local)
    }

    /// Delete a package's records; returns whether any were found
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let Some(entry) = self.index.remove(name) else {
            return Ok(false);
        };
        fs::remove_dir_all(&entry.directory)?;
        debug!("Removed {} from local database", entry.directory_name());
        Ok(true)
    }

    /// Installed packages sorted by record directory name
    pub fn list_installed(&self) -> Vec<ListedPackage> {
        let mut entries: Vec<(String, ListedPackage)> = self
            .index
            .iter()
            .map(|(name, entry)| {
                (
                    entry.directory_name(),
                    ListedPackage {
                        name: name.clone(),
                        version: entry.version.to_string(),
                    },
                )
            })
            .collect();
        entries.sort();
        entries.into_iter().map(|(_, package)| package).collect()
    }
}
