// src/packages/mod.rs

//! Package metadata and package archives
//!
//! Descriptors are the `desc` records of sync and local databases, parsed
//! from `%KEY%` blocks and checked against one schema table. File manifests
//! and archive extraction live next to them since installation needs both.

pub mod archive;
pub mod dependency;
pub mod desc;
pub mod files;
pub mod keyblock;
pub mod schema;

pub use dependency::Dependency;
pub use desc::{InstallReason, LocalDescriptor, PackageDescriptor, RemoteDescriptor};
pub use files::FileManifest;
