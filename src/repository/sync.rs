// src/repository/sync.rs

//! Cached sync databases
//!
//! A sync database is an archive with one `<name>-<version>-<release>/`
//! directory per offered package, each holding a `desc` record. The archive
//! is cached at `<db-path>/sync/<repo>.db` and fetched again when it is
//! missing, unreadable or older than the refresh threshold.

use super::{Downloader, RemoteRepository, fetch_checked};
use crate::error::{Error, Result};
use crate::packages::RemoteDescriptor;
use crate::packages::archive::{self, entry_name};
use crate::version::Version;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// One `name version-release` line of a listing
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListedPackage {
    pub name: String,
    pub version: String,
}

impl fmt::Display for ListedPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// Split `<name>-<version>-<release>` on its last two hyphens
pub(crate) fn split_entry_name(dir: &str) -> Option<(&str, &str)> {
    let (rest, release) = dir.rsplit_once('-')?;
    let (name, version) = rest.rsplit_once('-')?;
    if name.is_empty() || version.is_empty() || release.is_empty() {
        return None;
    }
    Some((name, &dir[name.len() + 1..]))
}

#[derive(Debug)]
struct SyncEntry {
    name: String,
    version: String,
    desc: Option<String>,
}

/// Sync database of one repository
pub struct RemoteDatabase {
    repository: RemoteRepository,
    refresh_after: Duration,
    downloader: Rc<dyn Downloader>,
    entries: Option<Vec<SyncEntry>>,
}

impl RemoteDatabase {
    pub fn new(
        repository: RemoteRepository,
        refresh_after: Duration,
        downloader: Rc<dyn Downloader>,
    ) -> Self {
        Self {
            repository,
            refresh_after,
            downloader,
            entries: None,
        }
    }

    pub fn repository(&self) -> &RemoteRepository {
        &self.repository
    }

    pub fn name(&self) -> &str {
        self.repository.name()
    }

    /// Whether the cached archive is absent, unreadable or too old
    pub fn needs_refresh(&self) -> bool {
        let path = self.repository.cache_path();
        let Ok(meta) = fs::metadata(path) else {
            debug!("{} has no cached database", self.name());
            return true;
        };

        let age = meta
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .unwrap_or_default();
        if age > self.refresh_after {
            debug!("{} database is {}s old", self.name(), age.as_secs());
            return true;
        }

        !archive::is_valid_archive(path)
    }

    /// Download the database if it is missing, stale or corrupt, or always
    /// when `force` is set
    ///
    /// Returns whether a download took place.
    pub fn refresh(&mut self, force: bool) -> Result<bool> {
        if !force && !self.needs_refresh() {
            return Ok(false);
        }

        info!("Synchronizing repository: {}", self.name());
        fetch_checked(
            self.downloader.as_ref(),
            self.repository.database_url(),
            self.repository.cache_path(),
            |staged| {
                if archive::is_valid_archive(staged) {
                    Ok(())
                } else {
                    Err(Error::ArchiveError(format!(
                        "{} is not a valid database archive",
                        self.repository.database_url()
                    )))
                }
            },
        )?;

        self.entries = None;
        Ok(true)
    }

    fn load(&mut self) -> Result<&[SyncEntry]> {
        if self.entries.is_none() {
            self.refresh(false)?;
            let entries = read_entries(self.repository.cache_path())?;
            debug!("{} offers {} packages", self.name(), entries.len());
            self.entries = Some(entries);
        }
        Ok(self.entries.as_deref().unwrap_or_default())
    }

    /// Every package the repository offers, ordered
    pub fn list_packages(&mut self) -> Result<Vec<ListedPackage>> {
        self.search("")
    }

    /// Packages whose name contains `pattern`
    pub fn search(&mut self, pattern: &str) -> Result<Vec<ListedPackage>> {
        let mut packages: Vec<ListedPackage> = self
            .load()?
            .iter()
            .filter(|entry| entry.name.contains(pattern))
            .map(|entry| ListedPackage {
                name: entry.name.clone(),
                version: entry.version.clone(),
            })
            .collect();
        packages.sort();
        packages.dedup();
        Ok(packages)
    }

    /// Newest descriptor for exactly `name`
    pub fn get_descriptor(&mut self, name: &str) -> Result<Option<RemoteDescriptor>> {
        let repository = self.name().to_string();
        let newest = self
            .load()?
            .iter()
            .filter(|entry| entry.name == name)
            .filter_map(|entry| Version::parse(&entry.version).ok().map(|v| (v, entry)))
            .max_by(|a, b| a.0.cmp(&b.0));

        let Some((_, entry)) = newest else {
            return Ok(None);
        };
        let desc = entry.desc.as_deref().ok_or_else(|| {
            Error::ArchiveError(format!(
                "{}-{} in {} has no desc record",
                entry.name, entry.version, repository
            ))
        })?;
        RemoteDescriptor::parse(desc, &repository).map(Some)
    }

    /// Descriptors of every offered package; unparsable records are skipped
    pub fn descriptors(&mut self) -> Result<Vec<RemoteDescriptor>> {
        let repository = self.name().to_string();
        let mut descriptors = Vec::new();
        for entry in self.load()? {
            let Some(desc) = entry.desc.as_deref() else {
                continue;
            };
            match RemoteDescriptor::parse(desc, &repository) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => warn!(
                    "Skipping {}-{} in {}: {}",
                    entry.name, entry.version, repository, e
                ),
            }
        }
        descriptors.sort_by(|a, b| Ord::cmp(&**a, &**b));
        Ok(descriptors)
    }
}

/// Read package directories and their `desc` records from a database archive
fn read_entries(path: &Path) -> Result<Vec<SyncEntry>> {
    let mut archive = archive::open_archive(path)?;
    let mut directories: BTreeMap<String, Option<String>> = BTreeMap::new();

    for entry in archive
        .entries()
        .map_err(|e| Error::ArchiveError(format!("Failed to read {}: {}", path.display(), e)))?
    {
        let mut entry = entry
            .map_err(|e| Error::ArchiveError(format!("Failed to read {}: {}", path.display(), e)))?;
        let name = entry_name(&entry);
        let Some((dir, rest)) = name.split_once('/') else {
            continue;
        };
        let slot = directories.entry(dir.to_string()).or_default();

        if rest == "desc" {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            *slot = Some(content);
        }
    }

    Ok(directories
        .into_iter()
        .filter_map(|(dir, desc)| match split_entry_name(&dir) {
            Some((name, version)) => Some(SyncEntry {
                name: name.to_string(),
                version: version.to_string(),
                desc,
            }),
            None => {
                debug!("Ignoring database entry {}", dir);
                None
            }
        })
        .collect())
}
