// src/manager/install.rs

//! Installation and updates
//!
//! Dependencies are installed depth first from an explicit stack instead of
//! by recursion. The chain of packages currently being installed doubles as
//! the cycle check: meeting a name that is already on the chain fails with
//! [`Error::DependencyCycle`].

use super::PackageManager;
use crate::error::{Error, Result};
use crate::packages::archive;
use crate::packages::{FileManifest, InstallReason, RemoteDescriptor};
use crate::version::Version;
use tracing::{debug, info};

/// Result of a successful [`PackageManager::install`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Packages that were installed, dependencies first
    Installed(Vec<String>),
    /// The installed version is not lower than the newest available one
    AlreadySatisfied(Version),
}

/// Result of a successful [`PackageManager::update`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated { from: Version, to: Version },
    AlreadyCurrent(Version),
}

enum Step {
    /// Resolve a package and schedule its dependencies
    Enter { name: String, explicit: bool },
    /// Dependencies are done; install the package itself
    Finish {
        descriptor: RemoteDescriptor,
        explicit: bool,
    },
}

enum Prepared {
    Satisfied(Version),
    Needed {
        descriptor: RemoteDescriptor,
        explicit: bool,
    },
}

/// Attribute `error` to the chain of packages that pulled `name` in
fn blame(chain: &[String], name: &str, error: Error) -> Error {
    let mut error = error;
    let mut dependency = name.to_string();
    for package in chain.iter().rev() {
        error = Error::DependencyFailed {
            package: package.clone(),
            dependency,
            source: Box::new(error),
        };
        dependency = package.clone();
    }
    error
}

impl PackageManager {
    /// Install the newest available version of `name` and its missing
    /// dependencies
    ///
    /// Dependencies pulled in here are recorded as installed for another
    /// package. An older installed version is removed first; an installed
    /// version that is not lower than the available one makes this a no-op.
    pub fn install(&mut self, name: &str, installed_explicitly: bool) -> Result<InstallOutcome> {
        let mut stack = vec![Step::Enter {
            name: name.to_string(),
            explicit: installed_explicitly,
        }];
        let mut chain: Vec<String> = Vec::new();
        let mut installed = Vec::new();

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter { name, explicit } => {
                    if let Some(start) = chain.iter().position(|n| *n == name) {
                        let mut cycle = chain[start..].to_vec();
                        cycle.push(name);
                        return Err(Error::DependencyCycle(cycle));
                    }

                    let prepared = self
                        .prepare(&name, explicit)
                        .map_err(|e| blame(&chain, &name, e))?;

                    let (descriptor, explicit) = match prepared {
                        Prepared::Satisfied(version) => {
                            if chain.is_empty() {
                                info!("{} {} is already installed", name, version);
                                return Ok(InstallOutcome::AlreadySatisfied(version));
                            }
                            continue;
                        }
                        Prepared::Needed {
                            descriptor,
                            explicit,
                        } => (descriptor, explicit),
                    };

                    let dependencies = descriptor.dependencies();
                    chain.push(name);
                    stack.push(Step::Finish {
                        descriptor,
                        explicit,
                    });
                    for dependency in dependencies.into_iter().rev() {
                        if self.local.is_installed(&dependency.name) {
                            debug!("Dependency {} is already installed", dependency.name);
                            continue;
                        }
                        stack.push(Step::Enter {
                            name: dependency.name,
                            explicit: false,
                        });
                    }
                }
                Step::Finish {
                    descriptor,
                    explicit,
                } => {
                    let name = descriptor.name().to_string();
                    chain.pop();
                    if self.local.is_installed(&name) {
                        continue;
                    }
                    self.install_archive(descriptor, explicit)
                        .map_err(|e| blame(&chain, &name, e))?;
                    installed.push(name);
                }
            }
        }

        Ok(InstallOutcome::Installed(installed))
    }

    /// Resolve `name` and clear an outdated installed version out of the way
    fn prepare(&mut self, name: &str, explicit: bool) -> Result<Prepared> {
        let descriptor = self
            .find_package(name)?
            .ok_or_else(|| Error::PackageNotFound(name.to_string()))?;

        let Some(installed) = self.local.get_package_version(name).cloned() else {
            return Ok(Prepared::Needed {
                descriptor,
                explicit,
            });
        };
        if installed >= *descriptor.version() {
            return Ok(Prepared::Satisfied(installed));
        }

        // Keep an explicit install explicit across the replacement
        let was_explicit = self
            .local
            .get_descriptor(name)?
            .is_some_and(|local| local.reason() == InstallReason::Explicit);

        info!(
            "Replacing {} {} with {}",
            name,
            installed,
            descriptor.version()
        );
        self.remove(name)?;

        Ok(Prepared::Needed {
            descriptor,
            explicit: explicit || was_explicit,
        })
    }

    /// Download, verify, extract and record one package
    fn install_archive(&mut self, descriptor: RemoteDescriptor, explicit: bool) -> Result<()> {
        let name = descriptor.name().to_string();
        let package = self.download(&descriptor)?;

        let files = archive::package_file_list(&package)?;
        let manifest = FileManifest::new(&self.config.root_dir, files);
        let report = archive::extract_package(&package, &manifest)?;
        debug!(
            "{}: {} entries extracted, {} rejected",
            name,
            report.extracted,
            report.rejected.len()
        );

        let missing = archive::missing_files(&manifest);
        if !missing.is_empty() {
            return Err(Error::IncompleteExtraction {
                package: name,
                missing,
            });
        }

        let local = self.local.install(descriptor, &manifest, explicit)?;
        info!("Installed {} {}", name, local.version());
        Ok(())
    }

    /// Replace an installed package with the newest available version
    ///
    /// The install reason of the installed package is kept.
    pub fn update(&mut self, name: &str) -> Result<UpdateOutcome> {
        let installed = self
            .local
            .get_package_version(name)
            .cloned()
            .ok_or_else(|| Error::NotInstalled(name.to_string()))?;
        let descriptor = self
            .find_package(name)?
            .ok_or_else(|| Error::PackageNotFound(name.to_string()))?;

        if *descriptor.version() <= installed {
            debug!("{} {} is up to date", name, installed);
            return Ok(UpdateOutcome::AlreadyCurrent(installed));
        }

        let explicit = self
            .local
            .get_descriptor(name)?
            .is_none_or(|local| local.reason() == InstallReason::Explicit);

        match self.install(name, explicit)? {
            InstallOutcome::Installed(_) => Ok(UpdateOutcome::Updated {
                from: installed,
                to: descriptor.version().clone(),
            }),
            InstallOutcome::AlreadySatisfied(version) => Ok(UpdateOutcome::AlreadyCurrent(version)),
        }
    }

    /// Installed packages for which a newer version is available
    pub fn update_candidates(&mut self) -> Result<Vec<String>> {
        let installed = self.local.list_installed();
        let mut candidates = Vec::new();

        for package in installed {
            let Some(current) = self.local.get_package_version(&package.name).cloned() else {
                continue;
            };
            match self.find_package(&package.name)? {
                Some(available) if *available.version() > current => {
                    candidates.push(package.name);
                }
                Some(_) => {}
                None => debug!("{} is not offered by any repository", package.name),
            }
        }

        Ok(candidates)
    }

    /// Update the given packages, or every package with a newer version
    ///
    /// Stops at the first failure. Returns the packages that changed.
    pub fn update_all(&mut self, names: Option<&[String]>) -> Result<Vec<String>> {
        let targets = match names {
            Some(names) => names.to_vec(),
            None => self.update_candidates()?,
        };
        if targets.is_empty() {
            info!("Nothing to update");
            return Ok(Vec::new());
        }

        let mut updated = Vec::new();
        for name in targets {
            match self.update(&name) {
                Ok(UpdateOutcome::Updated { from, to }) => {
                    info!("Updated {} {} -> {}", name, from, to);
                    updated.push(name);
                }
                Ok(UpdateOutcome::AlreadyCurrent(_)) => {}
                Err(e) => {
                    return Err(Error::UpdateFailed {
                        package: name,
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(updated)
    }
}
