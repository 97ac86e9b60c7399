// src/packages/remote.rs

//! Packages available from a repository index
//!
//! Scalar fields come straight from the primary index row. File lists and
//! dependency lists are read from the index databases on first access.

use crate::error::{Error, Result};
use crate::packages::{
    Depend, DependFlag, EnsureData, Group, Package, PackageField, PackageIdentity, PackageSource,
};
use crate::metadata::open_index;
use rusqlite::{Row, params};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Columns every primary query selects, in `from_row` order
pub const PRIMARY_COLUMNS: &str = "pkgId, name, arch, version, epoch, release, summary, \
     description, url, rpm_license, rpm_group, size_package, location_href";

/// Handle back to the index databases a remote package came from
#[derive(Debug, Clone)]
pub struct RemotePackage {
    pkg_id: String,
    primary: PathBuf,
    filelists: Option<PathBuf>,
}

impl RemotePackage {
    /// Build a package from a row selecting [`PRIMARY_COLUMNS`]
    pub fn from_row(
        row: &Row,
        repo_id: &str,
        primary: &Path,
        filelists: Option<&Path>,
    ) -> rusqlite::Result<Package> {
        let pkg_id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let arch: String = row.get(2)?;
        let version: String = row.get(3)?;
        let epoch: Option<String> = row.get(4)?;
        let release: String = row.get(5)?;

        let id = PackageIdentity::new(
            name,
            epoch.as_deref().and_then(|e| e.parse().ok()),
            version,
            release,
            arch,
            repo_id,
        );

        let remote = RemotePackage {
            pkg_id,
            primary: primary.to_path_buf(),
            filelists: filelists.map(Path::to_path_buf),
        };
        let package = Package::with_source(id, false, PackageSource::Remote(remote));

        // fresh cells: these sets cannot collide
        let text = |idx: usize| -> rusqlite::Result<Option<Arc<str>>> {
            Ok(row.get::<_, Option<String>>(idx)?.map(Arc::from))
        };
        if let Some(summary) = text(6)? {
            let _ = package.set_summary(summary);
        }
        if let Some(description) = text(7)? {
            let _ = package.set_description(description);
        }
        if let Some(url) = text(8)? {
            let _ = package.set_url(url);
        }
        if let Some(license) = text(9)? {
            let _ = package.set_license(license);
        }
        if let Some(category) = text(10)? {
            let _ = package.set_category(category);
        }
        if let Some(size) = row.get::<_, Option<i64>>(11)? {
            let _ = package.set_size(size.max(0) as u64);
        }
        if let Some(location_href) = text(12)? {
            let _ = package.set_location_href(location_href);
        }

        Ok(package)
    }

    /// Checksum id of the package inside the index
    pub fn pkg_id(&self) -> &str {
        &self.pkg_id
    }

    fn files(&self) -> Result<Vec<String>> {
        let path = self
            .filelists
            .as_deref()
            .ok_or_else(|| Error::NotFound(format!("no file list index for {}", self.pkg_id)))?;
        let conn = open_index(path)?;

        let mut stmt = conn.prepare(
            "SELECT f.dirname, f.filenames FROM filelist f \
             JOIN packages p ON p.pkgKey = f.pkgKey WHERE p.pkgId = ?1",
        )?;
        let rows = stmt
            .query_map(params![self.pkg_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut files = Vec::new();
        for (dirname, filenames) in rows {
            let dirname = dirname.trim_end_matches('/');
            files.extend(
                filenames
                    .split('/')
                    .filter(|name| !name.is_empty())
                    .map(|name| format!("{}/{}", dirname, name)),
            );
        }
        debug!("{} files for {}", files.len(), self.pkg_id);
        Ok(files)
    }

    fn depends(&self, field: PackageField) -> Result<Vec<Depend>> {
        let table = match field {
            PackageField::Requires => "requires",
            PackageField::Provides => "provides",
            PackageField::Conflicts => "conflicts",
            _ => "obsoletes",
        };
        let conn = open_index(&self.primary)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT d.name, d.flags, d.epoch, d.version, d.release FROM {} d \
             JOIN packages p ON p.pkgKey = d.pkgKey WHERE p.pkgId = ?1",
            table
        ))?;

        let depends = stmt
            .query_map(params![self.pkg_id], depend_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(depends.into_iter().flatten().collect())
    }
}

/// Read a dependency row of `(name, flags, epoch, version, release)`
///
/// Rows with a flag we cannot represent come back as `None`.
pub fn depend_from_row(row: &Row) -> rusqlite::Result<Option<Depend>> {
    let name: String = row.get(0)?;
    let flags: Option<String> = row.get(1)?;
    let epoch: Option<String> = row.get(2)?;
    let version: Option<String> = row.get(3)?;
    let release: Option<String> = row.get(4)?;

    let Some(flag) = DependFlag::from_index_text(flags.as_deref()) else {
        debug!("skipping {} with flags {:?}", name, flags);
        return Ok(None);
    };

    let version = version.filter(|v| !v.is_empty()).map(|version| {
        let mut evr = match epoch.as_deref() {
            Some(epoch) if !epoch.is_empty() && epoch != "0" => format!("{}:{}", epoch, version),
            _ => version,
        };
        if let Some(release) = release.filter(|r| !r.is_empty()) {
            evr.push('-');
            evr.push_str(&release);
        }
        evr
    });

    if flag == DependFlag::Any || version.is_none() {
        return Ok(Some(Depend::any(name)));
    }
    Ok(Some(Depend::new(name, flag, version)))
}

impl EnsureData for RemotePackage {
    fn ensure(&self, package: &Package, field: PackageField) -> Result<()> {
        match field {
            PackageField::Files => package.set_files(self.files()?)?,
            PackageField::Requires => package.set_requires(self.depends(field)?)?,
            PackageField::Provides => package.set_provides(self.depends(field)?)?,
            PackageField::Conflicts => package.set_conflicts(self.depends(field)?)?,
            PackageField::Obsoletes => package.set_obsoletes(self.depends(field)?)?,
            PackageField::Group => {
                let group = package
                    .category()
                    .ok()
                    .and_then(|category| Group::for_category(category));
                if let Some(group) = group {
                    package.set_group(group)?;
                }
            }
            // filled from the index row or absent
            _ => {}
        }
        Ok(())
    }
}
