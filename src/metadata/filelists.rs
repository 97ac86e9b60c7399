// src/metadata/filelists.rs

//! Filelists index: which package owns which path
//!
//! Each `filelist` row holds one directory of one package, with the file
//! names in that directory joined by `/`.

use crate::error::{Error, Result};
use crate::metadata::{MetadataFile, MetadataHandle, MetadataKind, open_index};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tracing::debug;

#[derive(Debug)]
pub struct FilelistsIndex {
    md: MetadataHandle,
    conn: Option<Connection>,
}

impl FilelistsIndex {
    pub fn new(repo_id: &str) -> Result<Self> {
        let mut md = MetadataHandle::new(repo_id);
        md.set_kind(MetadataKind::Filelists)?;
        Ok(Self { md, conn: None })
    }

    /// Checksum ids of the packages that ship `path`
    pub fn search_file(&self, path: &str) -> Result<Vec<String>> {
        let conn = self.conn.as_ref().ok_or_else(|| {
            Error::Incomplete(format!(
                "filelists metadata for {} is not loaded",
                self.md.id()
            ))
        })?;

        let (dirname, basename) = match path.rsplit_once('/') {
            Some(("", basename)) => ("/", basename),
            Some(split) => split,
            None => return Err(Error::NotFound(format!("{} is not an absolute path", path))),
        };

        let mut stmt = conn.prepare("SELECT filenames, pkgKey FROM filelist WHERE dirname = ?1")?;
        let rows = stmt
            .query_map(params![dirname], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut lookup = conn.prepare("SELECT pkgId FROM packages WHERE pkgKey = ?1 LIMIT 1")?;
        let mut pkg_ids = Vec::new();
        for (filenames, pkg_key) in rows {
            if !filenames.split('/').any(|name| name == basename) {
                continue;
            }

            let pkg_id: String = lookup
                .query_row(params![pkg_key], |row| row.get(0))
                .optional()?
                .ok_or_else(|| {
                    Error::NotFound(format!(
                        "no package for key {} in {} filelists",
                        pkg_key,
                        self.md.id()
                    ))
                })?;
            pkg_ids.push(pkg_id);
        }

        debug!("{} packages ship {}", pkg_ids.len(), path);
        Ok(pkg_ids)
    }
}

impl MetadataFile for FilelistsIndex {
    fn md(&self) -> &MetadataHandle {
        &self.md
    }

    fn md_mut(&mut self) -> &mut MetadataHandle {
        &mut self.md
    }

    fn parse(&mut self, path: &Path) -> Result<()> {
        debug!("Opening filelists index {}", path.display());
        self.conn = Some(open_index(path)?);
        Ok(())
    }

    fn unload(&mut self) {
        self.conn = None;
    }
}
