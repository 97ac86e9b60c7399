// src/metadata/primary.rs

//! Primary index: one row per package in `primary.sqlite`

use crate::error::{Error, Result};
use crate::metadata::{MetadataFile, MetadataHandle, MetadataKind, open_index};
use crate::packages::Package;
use crate::packages::remote::{PRIMARY_COLUMNS, RemotePackage};
use rusqlite::{Connection, ToSql, params};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Package queries over the primary database
#[derive(Debug)]
pub struct PrimaryIndex {
    md: MetadataHandle,
    conn: Option<Connection>,
    path: Option<PathBuf>,
    filelists: Option<PathBuf>,
}

impl PrimaryIndex {
    pub fn new(repo_id: &str) -> Result<Self> {
        let mut md = MetadataHandle::new(repo_id);
        md.set_kind(MetadataKind::Primary)?;
        Ok(Self {
            md,
            conn: None,
            path: None,
            filelists: None,
        })
    }

    /// Where packages read their file lists from
    pub fn set_filelists_path(&mut self, path: Option<PathBuf>) {
        self.filelists = path;
    }

    fn search(&self, predicate: &str, args: &[&dyn ToSql]) -> Result<Vec<Package>> {
        let (Some(conn), Some(path)) = (&self.conn, &self.path) else {
            return Err(Error::Incomplete(format!(
                "primary metadata for {} is not loaded",
                self.md.id()
            )));
        };

        let sql = format!("SELECT {} FROM packages{}", PRIMARY_COLUMNS, predicate);
        let mut stmt = conn.prepare(&sql)?;
        let packages = stmt
            .query_map(args, |row| {
                RemotePackage::from_row(row, self.md.id(), path, self.filelists.as_deref())
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!("{} matches in {}", packages.len(), self.md.id());
        Ok(packages)
    }

    /// Packages named exactly `name`
    pub fn resolve(&self, name: &str) -> Result<Vec<Package>> {
        self.search(" WHERE name = ?1", params![name])
    }

    /// Packages whose name contains `text`
    pub fn search_name(&self, text: &str) -> Result<Vec<Package>> {
        self.search(" WHERE name LIKE ?1", params![format!("%{}%", text)])
    }

    /// Packages whose name, summary or description contains `text`
    pub fn search_details(&self, text: &str) -> Result<Vec<Package>> {
        self.search(
            " WHERE name LIKE ?1 OR summary LIKE ?1 OR description LIKE ?1",
            params![format!("%{}%", text)],
        )
    }

    /// Packages in RPM group `group`
    pub fn search_group(&self, group: &str) -> Result<Vec<Package>> {
        self.search(" WHERE rpm_group = ?1", params![group])
    }

    /// Package with checksum id `pkg_id`
    pub fn search_pkgid(&self, pkg_id: &str) -> Result<Vec<Package>> {
        self.search(" WHERE pkgId = ?1", params![pkg_id])
    }

    /// Packages with this name and architecture
    pub fn find_by_name_arch(&self, name: &str, arch: &str) -> Result<Vec<Package>> {
        self.search(" WHERE name = ?1 AND arch = ?2", params![name, arch])
    }

    /// Packages providing the capability `name`
    pub fn what_provides(&self, name: &str) -> Result<Vec<Package>> {
        self.search(
            " WHERE pkgKey IN (SELECT pkgKey FROM provides WHERE name = ?1)",
            params![name],
        )
    }

    /// Every package in the repository
    pub fn get_packages(&self) -> Result<Vec<Package>> {
        self.search("", params![])
    }
}

impl MetadataFile for PrimaryIndex {
    fn md(&self) -> &MetadataHandle {
        &self.md
    }

    fn md_mut(&mut self) -> &mut MetadataHandle {
        &mut self.md
    }

    fn parse(&mut self, path: &Path) -> Result<()> {
        debug!("Opening primary index {}", path.display());
        self.conn = Some(open_index(path)?);
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    fn unload(&mut self) {
        self.conn = None;
        self.path = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::Cancellable;
    use crate::metadata::ChecksumType;
    use crate::metadata::testing::{MemorySource, sha256_hex};
    use crate::packages::remote::fixtures::write_primary;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn loaded() -> (TempDir, PrimaryIndex) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("primary.sqlite");
        write_primary(&path);

        let mut index = PrimaryIndex::new("fedora").unwrap();
        index.parse(&path).unwrap();
        (dir, index)
    }

    fn ids(packages: &[Package]) -> Vec<String> {
        let mut ids: Vec<String> = packages.iter().map(|p| p.package_id()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_not_loaded() {
        let index = PrimaryIndex::new("fedora").unwrap();
        assert!(matches!(index.resolve("hal"), Err(Error::Incomplete(_))));
    }

    #[test]
    fn test_resolve() {
        let (_dir, index) = loaded();
        assert_eq!(
            ids(&index.resolve("hal").unwrap()),
            vec!["hal;0.5.13-1.fc11;i386;fedora", "hal;0.5.14-1.fc11;i386;fedora"]
        );
        assert!(index.resolve("ha").unwrap().is_empty());
    }

    #[test]
    fn test_search_name_and_details() {
        let (_dir, index) = loaded();
        assert_eq!(index.search_name("power").unwrap().len(), 1);
        assert_eq!(index.search_details("daemon").unwrap().len(), 2);
        assert_eq!(index.search_details("desktop").unwrap().len(), 1);
    }

    #[test]
    fn test_search_group_and_pkgid() {
        let (_dir, index) = loaded();
        assert_eq!(
            index.search_group("System Environment/Libraries").unwrap().len(),
            2
        );
        let found = index.search_pkgid("ddd444").unwrap();
        assert_eq!(ids(&found), vec!["kernel;1:2.6.31-5.fc12;i686;fedora"]);
    }

    #[test]
    fn test_find_by_name_arch() {
        let (_dir, index) = loaded();
        assert_eq!(index.find_by_name_arch("kernel", "i686").unwrap().len(), 1);
        assert!(index.find_by_name_arch("kernel", "x86_64").unwrap().is_empty());
    }

    #[test]
    fn test_what_provides_and_get_packages() {
        let (_dir, index) = loaded();
        assert_eq!(index.what_provides("libhal.so.1").unwrap().len(), 2);
        assert_eq!(index.get_packages().unwrap().len(), 4);
    }

    #[test]
    fn test_like_text_is_bound() {
        let (_dir, index) = loaded();
        assert!(index.search_name("'; DROP TABLE packages; --").unwrap().is_empty());
        assert_eq!(index.get_packages().unwrap().len(), 4);
    }

    #[test]
    fn test_load_through_handle_is_idempotent() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("build.sqlite");
        write_primary(&db);
        let data = fs::read(&db).unwrap();

        let mut index = PrimaryIndex::new("fedora").unwrap();
        let md = index.md_mut();
        md.set_location("repodata/primary.sqlite").unwrap();
        md.set_checksum(&sha256_hex(&data)).unwrap();
        md.set_checksum_type(ChecksumType::Sha256).unwrap();
        md.set_timestamp(1).unwrap();
        md.set_filename(&dir.path().join("primary.sqlite"));

        let source = MemorySource::with("repodata/primary.sqlite", data);
        let cancel = Cancellable::new();
        index.load(true, &source, &cancel).unwrap();
        assert!(index.is_loaded());
        index.load(true, &source, &cancel).unwrap();
        assert_eq!(source.requests.borrow().len(), 1);
        assert_eq!(index.resolve("kernel").unwrap().len(), 1);

        index.invalidate();
        assert!(!index.is_loaded());
        assert!(index.resolve("kernel").is_err());
    }
}
