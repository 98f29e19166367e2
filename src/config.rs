// src/config.rs

//! Configuration context
//!
//! Paths, refresh policy and the repository list are collected into one
//! [`Config`] value that is handed to every component. It is read from a
//! pacman.conf-style INI file:
//!
//! ```text
//! [options]
//! RootDir = psp
//! CacheDir = var/cache/relpac
//! DBPath = var/lib/relpac
//! RefreshAfter = 30
//! RequireChecksum = false
//!
//! [minigalaxy]
//! Server = https://example.com/$repo
//! ```
//!
//! All paths stay inside the base directory: the root is resolved below it,
//! and the cache and database directories below the root.

use crate::error::{Error, Result};
use crate::packages::files::sanitize;
use crate::repository::RemoteRepository;
use ini::{Ini, ParseOption, Properties};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const APPLICATION_NAME: &str = "relpac";

/// Sync databases older than this are downloaded again
pub const DEFAULT_REFRESH_AFTER: Duration = Duration::from_secs(30 * 60);

/// File names looked up by [`Config::discover`], in order
const CONFIG_NAMES: [&str; 2] = ["relpac.conf", "pacman.conf"];

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: Option<PathBuf>,
    pub root_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub db_path: PathBuf,
    pub refresh_after: Duration,
    pub require_checksums: bool,
    pub repositories: Vec<RemoteRepository>,
}

/// `path` with `..`, leading separators and drive letters removed, below `base`
fn under(base: &Path, path: &str) -> PathBuf {
    let mut resolved = base.to_path_buf();
    for segment in sanitize(path) {
        resolved.push(segment);
    }
    resolved
}

/// Drop valueless flags such as `Color` that the INI parser rejects
fn strip_flags(content: &str) -> String {
    content
        .lines()
        .filter(|line| {
            let line = line.trim();
            line.is_empty()
                || line.starts_with(['#', ';', '['])
                || line.contains('=')
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn lookup<'a>(properties: &'a Properties, key: &str) -> Option<&'a str> {
    properties
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(Error::ConfigError(format!(
            "{} must be true or false, got '{}'",
            key, value
        ))),
    }
}

impl Config {
    /// Configuration with explicit paths and no repositories
    pub fn new(
        root_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
        db_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config_path: None,
            root_dir: root_dir.into(),
            cache_dir: cache_dir.into(),
            db_path: db_path.into(),
            refresh_after: DEFAULT_REFRESH_AFTER,
            require_checksums: false,
            repositories: Vec::new(),
        }
    }

    /// Default layout below `base`
    pub fn with_defaults(base: &Path) -> Self {
        Self::new(
            base,
            base.join("var").join("cache").join(APPLICATION_NAME),
            base.join("var").join("lib").join(APPLICATION_NAME),
        )
    }

    /// Append a repository whose database is cached below `db_path`
    pub fn with_repository(mut self, name: &str, server: &str) -> Result<Self> {
        let repository = RemoteRepository::new(name, server, &self.db_path)?;
        self.repositories.push(repository);
        Ok(self)
    }

    pub fn with_refresh_after(mut self, refresh_after: Duration) -> Self {
        self.refresh_after = refresh_after;
        self
    }

    pub fn with_required_checksums(mut self, required: bool) -> Self {
        self.require_checksums = required;
        self
    }

    /// Directory the configured paths are relative to
    ///
    /// A config file inside an `etc` directory belongs to the directory above
    /// it; any other config file to its own directory.
    pub fn base_directory(config_path: &Path) -> Result<PathBuf> {
        let config_path = std::path::absolute(config_path)?;
        let config_dir = config_path.parent().unwrap_or(Path::new("/"));

        match (config_dir.file_name(), config_dir.parent()) {
            (Some(name), Some(parent)) if name == "etc" => Ok(parent.to_path_buf()),
            _ => Ok(config_dir.to_path_buf()),
        }
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let base = Self::base_directory(path)?;
        let mut config = Self::parse(&content, &base)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Load the first config file found below `start`
    pub fn discover(start: &Path) -> Result<Self> {
        for name in CONFIG_NAMES {
            for dir in [start.join("etc"), start.to_path_buf()] {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    debug!("Config file found at {}", candidate.display());
                    return Self::load(&candidate);
                }
                debug!("No config file at {}", candidate.display());
            }
        }

        Err(Error::ConfigError(format!(
            "No configuration file was found in {}",
            start.display()
        )))
    }

    /// Parse config text with paths resolved below `base`
    ///
    /// Invalid repository sections are dropped with a warning; invalid
    /// options are errors.
    pub fn parse(content: &str, base: &Path) -> Result<Self> {
        let option = ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(&strip_flags(content), option)
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {}", e)))?;

        let mut config = Self::with_defaults(base);
        let mut cache_dir = None;
        let mut db_path = None;

        if let Some(options) = ini.section(Some("options")) {
            for (key, value) in options.iter() {
                let value = value.trim();
                match key.to_ascii_lowercase().as_str() {
                    "rootdir" => config.root_dir = under(base, value),
                    "cachedir" => cache_dir = Some(value.to_string()),
                    "dbpath" => db_path = Some(value.to_string()),
                    "refreshafter" => {
                        let minutes: u64 = value.parse().map_err(|_| {
                            Error::ConfigError(format!(
                                "RefreshAfter must be a number of minutes, got '{}'",
                                value
                            ))
                        })?;
                        let seconds = minutes.checked_mul(60).ok_or_else(|| {
                            Error::ConfigError(format!("RefreshAfter is too large: {}", value))
                        })?;
                        config.refresh_after = Duration::from_secs(seconds);
                    }
                    "requirechecksum" => {
                        config.require_checksums = parse_bool(key, value)?;
                    }
                    _ => debug!("Ignoring option {}", key),
                }
            }
        }

        let root = config.root_dir.clone();
        config.cache_dir = match cache_dir {
            Some(dir) => under(&root, &dir),
            None => root.join("var").join("cache").join(APPLICATION_NAME),
        };
        config.db_path = match db_path {
            Some(dir) => under(&root, &dir),
            None => root.join("var").join("lib").join(APPLICATION_NAME),
        };

        for (section, properties) in ini.iter() {
            let Some(name) = section else {
                continue;
            };
            if name == "options" {
                continue;
            }

            if !RemoteRepository::is_valid_name(name) {
                warn!("{} is not a valid repository name, skipping", name);
                continue;
            }
            let Some(server) = lookup(properties, "Server").filter(|s| !s.is_empty()) else {
                warn!("Server url for repository {} is not valid, skipping", name);
                continue;
            };

            let server = server
                .replace("$repo", name)
                .replace("$arch", std::env::consts::ARCH);
            match RemoteRepository::new(name, &server, &config.db_path) {
                Ok(repository) => config.repositories.push(repository),
                Err(e) => warn!("Skipping repository {}: {}", name, e),
            }
        }

        Ok(config)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.config_path {
            writeln!(f, "{:<16}: {}", "Config File", path.display())?;
        }
        writeln!(f, "{:<16}: {}", "Root Directory", self.root_dir.display())?;
        writeln!(f, "{:<16}: {}", "Cache Directory", self.cache_dir.display())?;
        writeln!(f, "{:<16}: {}", "Database Path", self.db_path.display())?;
        writeln!(
            f,
            "{:<16}: {} minutes",
            "Refresh After",
            self.refresh_after.as_secs() / 60
        )?;
        writeln!(f, "{:<16}: {}", "Require Checksum", self.require_checksums)?;
        for repository in &self.repositories {
            writeln!(f, "[{}]", repository.name())?;
            writeln!(f, "Server = {}", repository.server())?;
        }
        Ok(())
    }
}
