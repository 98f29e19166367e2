// src/packages/desc.rs

//! Package descriptors (`desc` records)
//!
//! A descriptor exists in two shapes. [`RemoteDescriptor`] comes from a sync
//! database and still carries download metadata (file name, compressed size,
//! hashes, build dependencies). [`LocalDescriptor`] is what the local
//! database records once a package is installed; it is produced only by
//! [`RemoteDescriptor::into_local`] or by reading a local record back.

use super::dependency::Dependency;
use super::keyblock::KeyBlock;
use super::schema::{self, Scope};
use crate::error::Result;
use crate::version::Version;
use std::cmp::Ordering;
use std::ops::Deref;

/// Source name used for descriptors read from the local database
pub const LOCAL_SOURCE: &str = "local";

const NONE: &str = "None";

/// Fields shared by sync and local descriptors
#[derive(Debug, Clone)]
pub struct Descriptor {
    block: KeyBlock,
    name: String,
    version: Version,
    architecture: String,
}

impl Descriptor {
    fn from_block(block: KeyBlock) -> Result<Self> {
        // Presence of the required keys was checked by KeyBlock::parse
        let name = block.first("NAME").unwrap_or_default().to_string();
        let version = Version::parse(block.first("VERSION").unwrap_or_default())?;
        let architecture = block.first("ARCH").unwrap_or_default().to_string();

        Ok(Self {
            block,
            name,
            version,
            architecture,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Package version in "version-release" form, e.g. 1.0.1-4
    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn base(&self) -> Option<&str> {
        self.block.first("BASE")
    }

    pub fn description(&self) -> String {
        self.block.get("DESC").join("\n")
    }

    /// Upstream homepage
    pub fn url(&self) -> Option<&str> {
        self.block.first("URL")
    }

    pub fn licenses(&self) -> &[String] {
        self.block.get("LICENSE")
    }

    pub fn groups(&self) -> &[String] {
        self.block.get("GROUPS")
    }

    /// Packages required at runtime
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.block
            .get("DEPENDS")
            .iter()
            .map(|d| Dependency::parse(d))
            .collect()
    }

    pub fn optional_dependencies(&self) -> Vec<Dependency> {
        self.block
            .get("OPTDEPENDS")
            .iter()
            .map(|d| Dependency::parse_optional(d))
            .collect()
    }

    pub fn provides(&self) -> &[String] {
        self.block.get("PROVIDES")
    }

    pub fn conflicts(&self) -> &[String] {
        self.block.get("CONFLICTS")
    }

    pub fn replaces(&self) -> &[String] {
        self.block.get("REPLACES")
    }

    /// Name and possibly email of the packager
    pub fn packager(&self) -> Option<&str> {
        self.block.first("PACKAGER")
    }

    /// Build time as seconds since the Unix epoch
    pub fn build_date(&self) -> Option<i64> {
        self.block.integer("BUILDDATE")
    }

    pub fn key_block(&self) -> &KeyBlock {
        &self.block
    }

    fn report(&self, source: &str, sizes: Sizes, dates: &[(&str, String)], validated_by: &[String]) -> String {
        let mut out = String::new();
        let mut line = |label: &str, value: &str| {
            out.push_str(&format!("{:<16}: {}\n", label, value));
        };

        line("Repository", source);
        line("Name", &self.name);
        line("Version", self.version.as_str());
        line("Description", &self.block.get("DESC").join(&format!("\n{:18}", "")));
        line("Architecture", &self.architecture);
        line("URL", self.url().unwrap_or(NONE));
        line("Licenses", &join_or_none(self.licenses()));
        line("Groups", &join_or_none(self.groups()));
        line("Provides", &join_or_none(self.provides()));
        line("Depends On", &join_or_none(self.block.get("DEPENDS")));
        line("Optional Deps", &join_or_none(self.block.get("OPTDEPENDS")));
        line("Conflicts With", &join_or_none(self.conflicts()));
        line("Replaces", &join_or_none(self.replaces()));
        if let Some(size) = sizes.download {
            line("Download Size", &kib(size));
        }
        line("Installed Size", &sizes.installed.map(kib).unwrap_or_else(|| NONE.to_string()));
        line("Packager", self.packager().unwrap_or("Unknown Packager"));
        line("Build Date", &calendar(self.build_date()));
        for (label, value) in dates {
            line(*label, value.as_str());
        }
        line("Validated By", &join_or_none(validated_by));
        out.push('\n');
        out
    }
}

struct Sizes {
    download: Option<i64>,
    installed: Option<i64>,
}

fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        NONE.to_string()
    } else {
        values.join("  ")
    }
}

fn kib(bytes: i64) -> String {
    format!("{:.2} KiB", bytes as f64 / 1024.0)
}

fn calendar(timestamp: Option<i64>) -> String {
    timestamp
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%a %b %e %H:%M:%S %Y").to_string())
        .unwrap_or_else(|| NONE.to_string())
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Descriptor {}

impl Ord for Descriptor {
    /// Name first, then version
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for Descriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Descriptor of a package offered by a sync repository
#[derive(Debug, Clone)]
pub struct RemoteDescriptor {
    desc: Descriptor,
    repository: String,
}

impl RemoteDescriptor {
    pub fn parse(content: &str, repository: &str) -> Result<Self> {
        let block = KeyBlock::parse(content, Scope::Remote)?;
        Ok(Self {
            desc: Descriptor::from_block(block)?,
            repository: repository.to_string(),
        })
    }

    /// Name of the repository this descriptor was read from
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Package archive file name, relative to the repository server
    pub fn filename(&self) -> Option<&str> {
        self.desc.block.first("FILENAME")
    }

    pub fn compressed_size(&self) -> Option<i64> {
        self.desc.block.integer("CSIZE")
    }

    pub fn installed_size(&self) -> Option<i64> {
        self.desc.block.integer("ISIZE")
    }

    pub fn md5sum(&self) -> Option<&str> {
        self.desc.block.first("MD5SUM")
    }

    pub fn sha256sum(&self) -> Option<&str> {
        self.desc.block.first("SHA256SUM")
    }

    pub fn pgp_signature(&self) -> Option<&str> {
        self.desc.block.first("PGPSIG")
    }

    /// Packages needed to build this package
    pub fn build_dependencies(&self) -> Vec<Dependency> {
        self.desc
            .block
            .get("MAKEDEPENDS")
            .iter()
            .map(|d| Dependency::parse(d))
            .collect()
    }

    /// Methods the archive can be validated with once installed
    ///
    /// PGP signatures are never checked, so `PGPSIG` does not count.
    pub fn validation_methods(&self) -> Vec<String> {
        let mut methods = Vec::new();
        if self.md5sum().is_some() {
            methods.push("md5".to_string());
        }
        if self.sha256sum().is_some() {
            methods.push("sha256".to_string());
        }
        if methods.is_empty() {
            methods.push("none".to_string());
        }
        methods
    }

    /// Convert into the record the local database keeps
    pub fn into_local(self, installed_explicitly: bool) -> LocalDescriptor {
        let validation = self.validation_methods();
        let installed_size = self.desc.block.get("ISIZE").to_vec();
        let mut block = self.desc.block;

        for spec in schema::FIELDS.iter().filter(|s| s.scope == Scope::Remote) {
            block.remove(spec.key);
        }

        if !installed_size.is_empty() {
            block.set("SIZE", installed_size);
        }
        if !block.contains("INSTALLDATE") {
            block.set("INSTALLDATE", vec![chrono::Utc::now().timestamp().to_string()]);
        }
        block.set("VALIDATION", validation);
        if !installed_explicitly {
            block.set("REASON", vec!["1".to_string()]);
        }

        LocalDescriptor {
            desc: Descriptor { block, ..self.desc },
        }
    }

    pub fn serialize(&self) -> String {
        self.desc.block.serialize()
    }

    /// Labeled report in the style of `pacman -Si`
    pub fn format_human(&self) -> String {
        let mut validated_by = Vec::new();
        if self.md5sum().is_some() {
            validated_by.push("MD5 Sum".to_string());
        }
        if self.sha256sum().is_some() {
            validated_by.push("SHA-256 Sum".to_string());
        }
        if self.pgp_signature().is_some() {
            validated_by.push("Signature".to_string());
        }

        let sizes = Sizes {
            download: self.compressed_size(),
            installed: self.installed_size(),
        };
        self.desc.report(&self.repository, sizes, &[], &validated_by)
    }
}

impl Deref for RemoteDescriptor {
    type Target = Descriptor;

    fn deref(&self) -> &Descriptor {
        &self.desc
    }
}

/// Why a package is installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallReason {
    Explicit,
    Dependency,
}

/// Descriptor of an installed package
#[derive(Debug, Clone)]
pub struct LocalDescriptor {
    desc: Descriptor,
}

impl LocalDescriptor {
    pub fn parse(content: &str) -> Result<Self> {
        let block = KeyBlock::parse(content, Scope::Local)?;
        Ok(Self {
            desc: Descriptor::from_block(block)?,
        })
    }

    pub fn install_date(&self) -> Option<i64> {
        self.desc.block.integer("INSTALLDATE")
    }

    pub fn installed_size(&self) -> Option<i64> {
        self.desc.block.integer("SIZE")
    }

    pub fn reason(&self) -> InstallReason {
        match self.desc.block.integer("REASON") {
            Some(1) => InstallReason::Dependency,
            _ => InstallReason::Explicit,
        }
    }

    pub fn validation(&self) -> &[String] {
        self.desc.block.get("VALIDATION")
    }

    pub fn serialize(&self) -> String {
        self.desc.block.serialize()
    }

    /// Labeled report in the style of `pacman -Qi`
    pub fn format_human(&self) -> String {
        let validated_by: Vec<String> = self
            .validation()
            .iter()
            .map(|method| match method.as_str() {
                "md5" => "MD5 Sum".to_string(),
                "sha256" => "SHA-256 Sum".to_string(),
                "none" => NONE.to_string(),
                other => other.to_string(),
            })
            .collect();

        let reason = match self.reason() {
            InstallReason::Explicit => "Explicitly installed",
            InstallReason::Dependency => "Installed as a dependency for another package",
        };
        let dates = [
            ("Install Date", calendar(self.install_date())),
            ("Install Reason", reason.to_string()),
        ];

        let sizes = Sizes {
            download: None,
            installed: self.installed_size(),
        };
        self.desc.report(LOCAL_SOURCE, sizes, &dates, &validated_by)
    }
}

impl Deref for LocalDescriptor {
    type Target = Descriptor;

    fn deref(&self) -> &Descriptor {
        &self.desc
    }
}

/// Either shape of descriptor, selected by where it was read from
#[derive(Debug, Clone)]
pub enum PackageDescriptor {
    Remote(RemoteDescriptor),
    Local(LocalDescriptor),
}

impl PackageDescriptor {
    /// Parse a `desc` record; `source` is a repository name or "local"
    pub fn parse(content: &str, source: &str) -> Result<Self> {
        if source == LOCAL_SOURCE {
            LocalDescriptor::parse(content).map(Self::Local)
        } else {
            RemoteDescriptor::parse(content, source).map(Self::Remote)
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Self::Remote(remote) => remote.repository(),
            Self::Local(_) => LOCAL_SOURCE,
        }
    }

    pub fn serialize(&self) -> String {
        match self {
            Self::Remote(remote) => remote.serialize(),
            Self::Local(local) => local.serialize(),
        }
    }

    pub fn format_human(&self) -> String {
        match self {
            Self::Remote(remote) => remote.format_human(),
            Self::Local(local) => local.format_human(),
        }
    }
}

impl Deref for PackageDescriptor {
    type Target = Descriptor;

    fn deref(&self) -> &Descriptor {
        match self {
            Self::Remote(remote) => &remote.desc,
            Self::Local(local) => &local.desc,
        }
    }
}

impl PartialEq for PackageDescriptor {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl Eq for PackageDescriptor {}

impl Ord for PackageDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        (**self).cmp(&**other)
    }
}

impl PartialOrd for PackageDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
