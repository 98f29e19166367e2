// src/lib.rs

//! Relpac Package Manager
//!
//! pacman-compatible package manager that installs into a root directory of
//! your choosing instead of `/`.
//!
//! # Architecture
//!
//! - Sync databases: cached repository archives of `desc` records
//! - Local database: `<db>/local/<name>-<version>/{desc,files}` records
//! - Descriptors: schema-checked key blocks in a sync and a local shape
//! - Extraction: every archive path is confined to the root before writing
//! - Explicit configuration context: no global state

pub mod config;
pub mod db;
mod error;
pub mod manager;
pub mod packages;
pub mod repository;
pub mod version;

pub use config::Config;
pub use error::{Error, Result};
pub use manager::{InstallOutcome, PackageManager, UpdateOutcome};
pub use version::Version;
