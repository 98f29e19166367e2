// src/manager/mod.rs

//! Package manager operations
//!
//! [`PackageManager`] ties the configured sync databases, the local
//! database and the download cache together. Installation and updates live
//! in [`install`]; queries, downloads and removal are here.

mod install;

pub use install::{InstallOutcome, UpdateOutcome};

use crate::config::Config;
use crate::db::LocalDatabase;
use crate::error::{Error, Result};
use crate::packages::files::RemovalSummary;
use crate::packages::{FileManifest, RemoteDescriptor};
use crate::repository::checksum::{self, Algorithm};
use crate::repository::{
    Downloader, ListedPackage, RemoteDatabase, RepositoryClient, fetch_atomic,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Orchestrates queries, downloads, installs and removals under one root
pub struct PackageManager {
    config: Config,
    downloader: Rc<dyn Downloader>,
    remotes: Vec<RemoteDatabase>,
    local: LocalDatabase,
}

impl PackageManager {
    /// Create a manager that downloads with [`RepositoryClient`]
    pub fn new(config: Config) -> Result<Self> {
        let client = RepositoryClient::new()?.with_progress(true);
        Self::with_downloader(config, Rc::new(client))
    }

    pub fn with_downloader(config: Config, downloader: Rc<dyn Downloader>) -> Result<Self> {
        let local = LocalDatabase::open(&config.db_path, &config.root_dir)?;
        let remotes = config
            .repositories
            .iter()
            .map(|repository| {
                RemoteDatabase::new(
                    repository.clone(),
                    config.refresh_after,
                    Rc::clone(&downloader),
                )
            })
            .collect();

        Ok(Self {
            config,
            downloader,
            remotes,
            local,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn local_database(&self) -> &LocalDatabase {
        &self.local
    }

    /// Refresh every sync database; returns how many were downloaded
    pub fn sync(&mut self, force: bool) -> Result<usize> {
        let mut downloaded = 0;
        for remote in &mut self.remotes {
            if remote.refresh(force)? {
                downloaded += 1;
            } else {
                debug!("{} is up to date", remote.name());
            }
        }
        Ok(downloaded)
    }

    /// Packages offered by the repository named `repository`, or by all
    /// repositories when it is empty
    pub fn list(&mut self, repository: &str) -> Result<Vec<ListedPackage>> {
        let mut matched = false;
        let mut packages = BTreeSet::new();

        for remote in &mut self.remotes {
            if repository.is_empty() || remote.name() == repository {
                matched = true;
                packages.extend(remote.list_packages()?);
            }
        }

        if !repository.is_empty() && !matched {
            return Err(Error::RepositoryNotFound(repository.to_string()));
        }
        Ok(packages.into_iter().collect())
    }

    /// Packages whose name contains `pattern`, across all repositories
    pub fn search(&mut self, pattern: &str) -> Result<Vec<ListedPackage>> {
        let mut packages = BTreeSet::new();
        for remote in &mut self.remotes {
            packages.extend(remote.search(pattern)?);
        }
        Ok(packages.into_iter().collect())
    }

    /// Reports for every offered descriptor named `name`, or for all
    /// descriptors when it is empty
    pub fn show(&mut self, name: &str) -> Result<Option<String>> {
        let mut reports = Vec::new();
        for remote in &mut self.remotes {
            if name.is_empty() {
                reports.extend(remote.descriptors()?.iter().map(|d| d.format_human()));
            } else if let Some(descriptor) = remote.get_descriptor(name)? {
                reports.push(descriptor.format_human());
            }
        }

        if reports.is_empty() {
            Ok(None)
        } else {
            Ok(Some(reports.join("\n")))
        }
    }

    /// Report for an installed package, or for every installed package
    /// when `name` is empty
    pub fn show_installed(&self, name: &str) -> Result<Option<String>> {
        if !name.is_empty() {
            return Ok(self.local.get_descriptor(name)?.map(|d| d.format_human()));
        }

        let mut reports = Vec::new();
        for package in self.local.list_installed() {
            if let Some(descriptor) = self.local.get_descriptor(&package.name)? {
                reports.push(descriptor.format_human());
            }
        }

        if reports.is_empty() {
            Ok(None)
        } else {
            Ok(Some(reports.join("\n")))
        }
    }

    /// Newest descriptor for `name` across all repositories
    ///
    /// On equal versions the repository configured first wins.
    pub fn find_package(&mut self, name: &str) -> Result<Option<RemoteDescriptor>> {
        let mut newest: Option<RemoteDescriptor> = None;
        for remote in &mut self.remotes {
            let Some(candidate) = remote.get_descriptor(name)? else {
                continue;
            };
            match &newest {
                Some(current) if candidate.version() <= current.version() => {}
                _ => newest = Some(candidate),
            }
        }
        Ok(newest)
    }

    /// Installed packages, sorted
    pub fn installed(&self) -> Vec<ListedPackage> {
        self.local.list_installed()
    }

    /// File list of an installed package
    pub fn files(&self, name: &str) -> Result<FileManifest> {
        self.local
            .get_file_manifest(name)?
            .ok_or_else(|| Error::NotInstalled(name.to_string()))
    }

    /// Delete an installed package's files and its local record
    ///
    /// Packages depending on it are left alone.
    pub fn remove(&mut self, name: &str) -> Result<RemovalSummary> {
        let manifest = self
            .local
            .get_file_manifest(name)?
            .ok_or_else(|| Error::NotInstalled(name.to_string()))?;

        let summary = manifest.remove_all()?;
        self.local.remove(name)?;

        info!(
            "Removed {} ({} files, {} directories)",
            name, summary.removed_files, summary.removed_directories
        );
        Ok(summary)
    }

    /// Fetch a package archive into `<cache>/pkg/` and verify it
    ///
    /// An archive already in the cache is not downloaded again, but it is
    /// verified every time. A file failing verification is deleted.
    pub fn download(&self, descriptor: &RemoteDescriptor) -> Result<PathBuf> {
        let filename = descriptor.filename().ok_or_else(|| {
            Error::Validation(format!("{} has no %FILENAME%", descriptor.name()))
        })?;
        if filename.contains(['/', '\\']) || filename.starts_with('.') {
            return Err(Error::PathSafety(format!(
                "package file name '{}' of {} is not a plain file name",
                filename,
                descriptor.name()
            )));
        }

        let remote = self
            .remotes
            .iter()
            .find(|remote| remote.name() == descriptor.repository())
            .ok_or_else(|| Error::RepositoryNotFound(descriptor.repository().to_string()))?;
        let url = remote.repository().package_url(filename)?;

        let package_dir = self.config.cache_dir.join("pkg");
        fs::create_dir_all(&package_dir)?;
        let dest = package_dir.join(filename);

        if dest.exists() {
            debug!("{} is already cached", filename);
        } else {
            info!("Downloading {}", filename);
            fetch_atomic(self.downloader.as_ref(), &url, &dest)?;
        }

        if let Err(e) = self.verify(descriptor, &dest) {
            if matches!(e, Error::ChecksumMismatch { .. }) {
                warn!("Deleting corrupt download {}", dest.display());
                fs::remove_file(&dest)?;
            }
            return Err(e);
        }

        Ok(dest)
    }

    fn verify(&self, descriptor: &RemoteDescriptor, path: &Path) -> Result<()> {
        let hashes = [
            (Algorithm::Md5, descriptor.md5sum()),
            (Algorithm::Sha256, descriptor.sha256sum()),
        ];

        let mut verified = false;
        for (algorithm, expected) in hashes {
            if let Some(expected) = expected {
                checksum::verify(path, algorithm, expected)?;
                verified = true;
            }
        }

        if !verified {
            if self.config.require_checksums {
                return Err(Error::MissingChecksum(descriptor.name().to_string()));
            }
            warn!("{} has no checksum, installing unverified", descriptor.name());
        }
        Ok(())
    }
}
