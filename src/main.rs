// src/main.rs

use anyhow::{Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use relpac::{Config, InstallOutcome, PackageManager};
use std::io;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "relpac")]
#[command(author, version, about = "pacman-compatible package manager for relative root directories", long_about = None)]
struct Cli {
    /// Configuration file (default: relpac.conf or pacman.conf in ./etc or .)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install packages and their dependencies
    Install {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Remove installed packages
    Remove {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Update installed packages from repositories
    Update {
        /// Package names (updates everything outdated if omitted)
        packages: Vec<String>,
    },
    /// List packages offered by repositories
    List {
        /// Only list this repository
        repository: Option<String>,
    },
    /// Search package names in repositories
    Search {
        /// Substring of the package name
        pattern: String,
    },
    /// Show package details
    Show {
        /// Package name (shows every package if omitted)
        package: Option<String>,
        /// Show the installed package instead of the repository one
        #[arg(short, long)]
        installed: bool,
    },
    /// List installed packages
    Installed,
    /// List the files owned by an installed package
    Files {
        /// Package name
        package: String,
    },
    /// Download repository databases
    Sync {
        /// Download even when the cached databases are recent
        #[arg(short, long)]
        force: bool,
    },
    /// Print the effective configuration
    Config,
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(&path)?,
        None => Config::discover(&std::env::current_dir()?)?,
    };
    Ok(config)
}

/// Run `action` for every name, then fail if any of them failed
fn for_each_package<F>(packages: &[String], verb: &str, mut action: F) -> Result<()>
where
    F: FnMut(&str) -> relpac::Result<()>,
{
    let mut failed = Vec::new();
    for package in packages {
        if let Err(e) = action(package) {
            error!("Failed to {} {}: {}", verb, package, e);
            failed.push(package.as_str());
        }
    }

    if !failed.is_empty() {
        bail!(
            "Failed to {} {} of {} package(s): {}",
            verb,
            failed.len(),
            packages.len(),
            failed.join(", ")
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let command = match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "relpac", &mut io::stdout());
            return Ok(());
        }
        Some(command) => command,
        None => {
            println!("Relpac Package Manager v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'relpac --help' for usage information");
            return Ok(());
        }
    };

    let config = load_config(cli.config)?;
    if let Commands::Config = command {
        print!("{}", config);
        return Ok(());
    }

    let mut manager = PackageManager::new(config)?;

    match command {
        Commands::Install { packages } => {
            for_each_package(&packages, "install", |name| {
                match manager.install(name, true)? {
                    InstallOutcome::Installed(installed) => {
                        println!("Installed: {}", installed.join(", "));
                    }
                    InstallOutcome::AlreadySatisfied(version) => {
                        println!("{} {} is already installed", name, version);
                    }
                }
                Ok(())
            })
        }
        Commands::Remove { packages } => for_each_package(&packages, "remove", |name| {
            let summary = manager.remove(name)?;
            println!(
                "Removed {} ({} files, {} directories)",
                name, summary.removed_files, summary.removed_directories
            );
            Ok(())
        }),
        Commands::Update { packages } => {
            let names = (!packages.is_empty()).then_some(packages.as_slice());
            let updated = manager.update_all(names)?;
            if updated.is_empty() {
                println!("Everything is up to date");
            } else {
                println!("Updated: {}", updated.join(", "));
            }
            Ok(())
        }
        Commands::List { repository } => {
            let packages = manager.list(repository.as_deref().unwrap_or(""))?;
            for package in packages {
                println!("{}", package);
            }
            Ok(())
        }
        Commands::Search { pattern } => {
            let packages = manager.search(&pattern)?;
            if packages.is_empty() {
                println!("No packages found.");
            }
            for package in packages {
                println!("{}", package);
            }
            Ok(())
        }
        Commands::Show { package, installed } => {
            let name = package.as_deref().unwrap_or("");
            let report = if installed {
                manager.show_installed(name)?
            } else {
                manager.show(name)?
            };
            match report {
                Some(report) => {
                    print!("{}", report);
                    Ok(())
                }
                None if name.is_empty() => {
                    println!("No packages found.");
                    Ok(())
                }
                None => bail!("Package '{}' was not found", name),
            }
        }
        Commands::Installed => {
            let packages = manager.installed();
            if packages.is_empty() {
                println!("No packages installed.");
            }
            for package in packages {
                println!("{}", package);
            }
            Ok(())
        }
        Commands::Files { package } => {
            let manifest = manager.files(&package)?;
            for path in manifest.paths() {
                println!("{} {}", package, path.display());
            }
            Ok(())
        }
        Commands::Sync { force } => {
            let downloaded = manager.sync(force)?;
            info!("{} database(s) downloaded", downloaded);
            Ok(())
        }
        Commands::Config | Commands::Completions { .. } => Ok(()),
    }
}
