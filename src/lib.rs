// src/lib.rs

//! Zif: repository metadata cache and query engine
//!
//! Keeps a checksum-verified local copy of yum-style repository metadata
//! and answers package queries against it.
//!
//! # Architecture
//!
//! - Handles: every cached artifact runs one validate, download and
//!   decompress pipeline before it is parsed
//! - Indexes: primary, filelists and changelogs are queried in place as
//!   SQLite databases; comps and update advisories are parsed into memory
//! - Repositories: one per `*.repo` section, resolving mirrors and owning
//!   its handles and cache directory
//! - Packages: identity up front, every other field filled in on first use

pub mod cancel;
pub mod config;
mod error;
pub mod keyfile;
pub mod metadata;
pub mod packages;
pub mod repository;
pub mod store;
pub mod version;

pub use cancel::Cancellable;
pub use config::Config;
pub use error::{Error, Result};
pub use packages::{Depend, DependFlag, Package, PackageIdentity};
pub use repository::{Fetcher, HttpFetcher, RemoteRepository, RepositorySet};
pub use store::{InstalledPackages, LocalStore, RpmDirectoryStore};
