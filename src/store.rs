// src/store.rs

//! Installed package views
//!
//! A [`LocalStore`] is the comparison side of update detection and the
//! preferred source when resolving group members.

use crate::error::{Error, Result};
use crate::packages::{LocalPackage, Package};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Packages installed on this system
pub trait LocalStore {
    fn get_packages(&self) -> Result<Vec<Package>>;

    /// Installed packages named exactly `name`
    fn resolve(&self, name: &str) -> Result<Vec<Package>> {
        Ok(self
            .get_packages()?
            .into_iter()
            .filter(|package| package.name() == name)
            .collect())
    }

    /// Installed packages whose name contains `text`
    fn search_name(&self, text: &str) -> Result<Vec<Package>> {
        Ok(self
            .get_packages()?
            .into_iter()
            .filter(|package| package.name().contains(text))
            .collect())
    }
}

/// A fixed list of installed packages held in memory
#[derive(Debug, Clone, Default)]
pub struct InstalledPackages {
    packages: Vec<Package>,
}

impl InstalledPackages {
    pub fn new(packages: Vec<Package>) -> Self {
        Self { packages }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl LocalStore for InstalledPackages {
    fn get_packages(&self) -> Result<Vec<Package>> {
        Ok(self.packages.clone())
    }
}

/// Every `*.rpm` in one directory, read as installed packages
#[derive(Debug)]
pub struct RpmDirectoryStore {
    packages: InstalledPackages,
}

impl RpmDirectoryStore {
    /// Read the header of each RPM in `dir`
    ///
    /// Files that cannot be parsed are logged and skipped.
    pub fn open(dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(dir).map_err(|e| {
            Error::IoError(format!("Failed to read directory {}: {}", dir.display(), e))
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "rpm") && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut packages = Vec::with_capacity(paths.len());
        for path in paths {
            match LocalPackage::open(&path) {
                Ok(package) => {
                    debug!("Loaded {}", package.id());
                    packages.push(package);
                }
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        info!("Loaded {} installed packages from {}", packages.len(), dir.display());
        Ok(Self {
            packages: InstalledPackages::new(packages),
        })
    }
}

impl LocalStore for RpmDirectoryStore {
    fn get_packages(&self) -> Result<Vec<Package>> {
        self.packages.get_packages()
    }
}
