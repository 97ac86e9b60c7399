// src/packages/local.rs

//! Installed packages backed by an RPM header
//!
//! The header is parsed once when the package is opened. Every optional
//! field is copied out of it the first time it is asked for.

use crate::error::{Error, Result};
use crate::packages::{
    Depend, DependFlag, EnsureData, Group, INSTALLED_DATA, Package, PackageField,
    PackageIdentity, PackageSource,
};
use rpm::{DependencyFlags, PackageMetadata};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Header data for one installed package
#[derive(Clone)]
pub struct LocalPackage {
    path: PathBuf,
    metadata: Arc<PackageMetadata>,
}

impl fmt::Debug for LocalPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalPackage")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LocalPackage {
    /// Read the header of an RPM file and wrap it as an installed package
    pub fn open(path: &Path) -> Result<Package> {
        debug!("Reading RPM header: {}", path.display());

        let file = File::open(path)
            .map_err(|e| Error::IoError(format!("Failed to open {}: {}", path.display(), e)))?;
        let mut reader = BufReader::new(file);

        let pkg = rpm::Package::parse(&mut reader)
            .map_err(|e| Error::RpmError(format!("Failed to parse {}: {}", path.display(), e)))?;

        Self::from_metadata(path, pkg.metadata)
    }

    fn from_metadata(path: &Path, metadata: PackageMetadata) -> Result<Package> {
        let tag = |what: &str, e: rpm::Error| {
            Error::RpmError(format!("{}: no {} in header: {}", path.display(), what, e))
        };

        let id = PackageIdentity::new(
            metadata.get_name().map_err(|e| tag("name", e))?,
            metadata.get_epoch().ok(),
            metadata.get_version().map_err(|e| tag("version", e))?,
            metadata.get_release().map_err(|e| tag("release", e))?,
            metadata.get_arch().map_err(|e| tag("arch", e))?,
            INSTALLED_DATA,
        );

        let local = LocalPackage {
            path: path.to_path_buf(),
            metadata: Arc::new(metadata),
        };
        Ok(Package::with_source(id, true, PackageSource::Local(local)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn depends(&self, field: PackageField) -> Result<Vec<Depend>> {
        let entries = match field {
            PackageField::Requires => self.metadata.get_requires(),
            PackageField::Provides => self.metadata.get_provides(),
            PackageField::Conflicts => self.metadata.get_conflicts(),
            _ => self.metadata.get_obsoletes(),
        }
        .map_err(|e| Error::RpmError(format!("Failed to read {}: {}", field, e)))?;

        Ok(entries.into_iter().filter_map(convert_dependency).collect())
    }
}

/// Convert a header dependency, dropping `rpmlib(...)` markers and entries
/// with a comparison we cannot represent
fn convert_dependency(dep: rpm::Dependency) -> Option<Depend> {
    if dep.name.starts_with("rpmlib(") {
        return None;
    }

    if dep.version.is_empty() {
        return Some(Depend::any(dep.name));
    }

    let flag = if dep.flags.contains(DependencyFlags::LESS) {
        DependFlag::Less
    } else if dep.flags.contains(DependencyFlags::GREATER) {
        DependFlag::Greater
    } else if dep.flags.contains(DependencyFlags::EQUAL) {
        DependFlag::Equal
    } else {
        warn!("ignoring {} with unknown flags {:?}", dep.name, dep.flags);
        return None;
    };

    Some(Depend::new(dep.name, flag, Some(dep.version)))
}

impl EnsureData for LocalPackage {
    fn ensure(&self, package: &Package, field: PackageField) -> Result<()> {
        let md = &self.metadata;
        match field {
            PackageField::Summary => {
                if let Ok(summary) = md.get_summary() {
                    package.set_summary(Arc::from(summary))?;
                }
            }
            PackageField::Description => {
                let description = md.get_description().unwrap_or_default();
                package.set_description(Arc::from(description))?;
            }
            PackageField::License => {
                if let Ok(license) = md.get_license() {
                    package.set_license(Arc::from(license))?;
                }
            }
            PackageField::Url => {
                if let Ok(url) = md.get_url() {
                    package.set_url(Arc::from(url))?;
                }
            }
            PackageField::Category => {
                if let Ok(category) = md.get_group() {
                    package.set_category(Arc::from(category))?;
                }
            }
            PackageField::Group => {
                if let Some(group) = md.get_group().ok().and_then(Group::for_category) {
                    package.set_group(group)?;
                }
            }
            PackageField::Size => {
                if let Ok(size) = md.get_installed_size() {
                    package.set_size(size)?;
                }
            }
            PackageField::Files => {
                let files = md
                    .get_file_paths()
                    .map(|paths| {
                        paths
                            .iter()
                            .map(|p| p.to_string_lossy().into_owned())
                            .collect()
                    })
                    .unwrap_or_default();
                package.set_files(files)?;
            }
            PackageField::Requires => package.set_requires(self.depends(field)?)?,
            PackageField::Provides => package.set_provides(self.depends(field)?)?,
            PackageField::Conflicts => package.set_conflicts(self.depends(field)?)?,
            PackageField::Obsoletes => package.set_obsoletes(self.depends(field)?)?,
            PackageField::LocationHref => {}
        }
        Ok(())
    }
}
