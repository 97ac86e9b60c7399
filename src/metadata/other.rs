// src/metadata/other.rs

//! Changelog index from `other.sqlite`
//!
//! The database keys packages by its own `pkgKey`, so every lookup goes
//! through the checksum id first.

use crate::error::{Error, Result};
use crate::metadata::{MetadataFile, MetadataHandle, MetadataKind, open_index};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

/// One changelog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Changeset {
    /// Seconds since the epoch
    pub date: u64,
    pub author: String,
    /// Version named in the header, if the packager wrote one
    pub version: Option<String>,
    pub description: String,
}

impl Changeset {
    /// Build an entry from a raw `author - version` header
    pub fn from_header(header: &str, date: u64, description: &str) -> Result<Self> {
        let (author, version) = parse_header(header)?;
        Ok(Self {
            date,
            author,
            version,
            description: description.to_string(),
        })
    }

    pub fn date_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::try_from(self.date).ok()?, 0)
    }
}

/// Split `Name <mail> - 1.2-3` into author and version
///
/// A header ending in `>` is all author. Otherwise the last word is the
/// version and trailing dashes are trimmed off the author.
pub fn parse_header(header: &str) -> Result<(String, Option<String>)> {
    let header = header.trim();
    if header.ends_with('>') {
        return Ok((header.to_string(), None));
    }

    let (author, version) = header
        .rsplit_once(' ')
        .ok_or_else(|| Error::ParseError(format!("changelog header has no author: {}", header)))?;
    let author = author.trim_end_matches([' ', '-']);
    Ok((author.to_string(), Some(version.to_string())))
}

#[derive(Debug)]
pub struct OtherIndex {
    md: MetadataHandle,
    conn: Option<Connection>,
}

impl OtherIndex {
    pub fn new(repo_id: &str) -> Result<Self> {
        let mut md = MetadataHandle::new(repo_id);
        md.set_kind(MetadataKind::Other)?;
        Ok(Self { md, conn: None })
    }

    /// Changelog of the package with checksum id `pkg_id`, newest first
    pub fn get_changelog(&self, pkg_id: &str) -> Result<Vec<Changeset>> {
        let conn = self.conn.as_ref().ok_or_else(|| {
            Error::Incomplete(format!("other metadata for {} is not loaded", self.md.id()))
        })?;

        let mut stmt = conn.prepare("SELECT pkgKey FROM packages WHERE pkgId = ?1")?;
        let keys = stmt
            .query_map(params![pkg_id], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if keys.is_empty() {
            return Err(Error::NotFound(format!(
                "no changelog for {} in {}",
                pkg_id,
                self.md.id()
            )));
        }

        let mut stmt = conn.prepare(
            "SELECT author, date, changelog FROM changelog WHERE pkgKey = ?1 ORDER BY date DESC",
        )?;
        let mut changesets = Vec::new();
        for key in keys {
            let rows = stmt
                .query_map(params![key], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            if rows.is_empty() {
                warn!("no changelog entries for {} (key {})", pkg_id, key);
            }
            for (header, date, text) in rows {
                changesets.push(Changeset::from_header(
                    &header,
                    date.max(0) as u64,
                    text.as_deref().unwrap_or_default(),
                )?);
            }
        }

        debug!("{} changelog entries for {}", changesets.len(), pkg_id);
        Ok(changesets)
    }
}

impl MetadataFile for OtherIndex {
    fn md(&self) -> &MetadataHandle {
        &self.md
    }

    fn md_mut(&mut self) -> &mut MetadataHandle {
        &mut self.md
    }

    fn parse(&mut self, path: &Path) -> Result<()> {
        debug!("Opening other index {}", path.display());
        self.conn = Some(open_index(path)?);
        Ok(())
    }

    fn unload(&mut self) {
        self.conn = None;
    }
}
