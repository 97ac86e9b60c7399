// src/metadata/mod.rs

//! Repository metadata artifacts
//!
//! Every artifact a repository advertises is tracked by a [`MetadataHandle`]
//! that owns its cache files and validity state. The format-specific types
//! wrap a handle and add the parsed or opened form of the file:
//! - [`PrimaryIndex`] and [`FilelistsIndex`]: SQLite databases
//! - [`GroupCatalog`]: comps XML held in memory
//! - [`OtherIndex`]: per-package changelogs, an SQLite database
//! - [`UpdateInfo`]: update advisories, XML held in memory
//! - [`MirrorList`] and [`Metalink`]: candidate base URLs
//!
//! All of them share the load pipeline in [`MetadataFile::load`].

pub mod comps;
pub mod decompress;
pub mod filelists;
pub mod handle;
pub mod metalink;
pub mod mirrorlist;
pub mod other;
pub mod primary;
pub mod updateinfo;

pub use comps::{Category, GroupCatalog, GroupEntry};
pub use filelists::FilelistsIndex;
pub use handle::MetadataHandle;
pub use metalink::Metalink;
pub use mirrorlist::MirrorList;
pub use other::{Changeset, OtherIndex};
pub use primary::PrimaryIndex;
pub use updateinfo::{Update, UpdateInfo, UpdateKind, UpdateReference, UpdateState};

use crate::cancel::Cancellable;
use crate::error::{Error, Result};
use md5::Md5;
use rusqlite::Connection;
use sha1::Sha1;
use sha2::digest::Output;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Kinds of metadata a repository keeps a handle for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    Primary,
    Filelists,
    Comps,
    Other,
    Updateinfo,
    Mirrorlist,
    Metalink,
}

impl MetadataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataKind::Primary => "primary",
            MetadataKind::Filelists => "filelists",
            MetadataKind::Comps => "comps",
            MetadataKind::Other => "other",
            MetadataKind::Updateinfo => "updateinfo",
            MetadataKind::Mirrorlist => "mirrorlist",
            MetadataKind::Metalink => "metalink",
        }
    }

    /// Mirror documents are fetched straight from their URL and carry no digest
    pub fn is_mirror_source(&self) -> bool {
        matches!(self, MetadataKind::Mirrorlist | MetadataKind::Metalink)
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Digest algorithm named by repomd.xml
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumType {
    #[default]
    Md5,
    Sha1,
    Sha256,
}

impl ChecksumType {
    /// `sha` and `sha1` are SHA-1, `sha256` is SHA-256, anything else is MD5
    pub fn from_name(name: &str) -> Self {
        match name {
            "sha" | "sha1" => ChecksumType::Sha1,
            "sha256" => ChecksumType::Sha256,
            _ => ChecksumType::Md5,
        }
    }

    /// Hex digest of a file, checking for cancellation between buffers
    pub fn digest_file(&self, path: &Path, cancel: &Cancellable) -> Result<String> {
        let file = File::open(path)
            .map_err(|e| Error::IoError(format!("Failed to open {}: {}", path.display(), e)))?;

        match self {
            ChecksumType::Md5 => Ok(format!("{:x}", digest_reader(Md5::new(), file, cancel)?)),
            ChecksumType::Sha1 => Ok(format!("{:x}", digest_reader(Sha1::new(), file, cancel)?)),
            ChecksumType::Sha256 => Ok(format!("{:x}", digest_reader(Sha256::new(), file, cancel)?)),
        }
    }
}

fn digest_reader<D: Digest>(
    mut hasher: D,
    mut reader: impl Read,
    cancel: &Cancellable,
) -> Result<Output<D>> {
    let mut buf = [0u8; 8192];
    loop {
        cancel.check()?;
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// Open a downloaded SQLite index
pub(crate) fn open_index(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(Error::NotFound(format!(
            "index {} has not been downloaded",
            path.display()
        )));
    }

    let conn = Connection::open(path)?;
    // the cache copy is disposable
    conn.execute_batch("PRAGMA synchronous = OFF;")?;
    Ok(conn)
}

/// Somewhere a handle can fetch its artifact from
///
/// Implemented by the repository's mirror set; `location` is relative to a
/// base URL and the file lands in `directory` under its basename.
pub trait MetadataSource {
    fn fetch(&self, location: &str, directory: &Path, cancel: &Cancellable) -> Result<()>;
}

/// A metadata artifact with a format-specific parsed form
pub trait MetadataFile {
    fn md(&self) -> &MetadataHandle;

    fn md_mut(&mut self) -> &mut MetadataHandle;

    /// Parse or open the uncompressed file
    fn parse(&mut self, path: &Path) -> Result<()>;

    /// Drop the parsed form
    fn unload(&mut self);

    fn is_loaded(&self) -> bool {
        self.md().is_loaded()
    }

    /// Validate, fetch and decompress as needed, then parse
    ///
    /// A handle that is already loaded returns immediately without touching
    /// disk. On failure the handle stays unloaded.
    fn load(&mut self, online: bool, source: &dyn MetadataSource, cancel: &Cancellable) -> Result<()> {
        if self.md().is_loaded() {
            return Ok(());
        }

        let path = self.md().prepare(online, source, cancel)?;
        self.parse(&path)?;
        self.md_mut().set_loaded(true);
        Ok(())
    }

    /// Forget the parsed form so the next query reloads from disk
    fn invalidate(&mut self) {
        self.unload();
        self.md_mut().set_loaded(false);
    }

    /// Unload and delete the cached files
    fn clean(&mut self) -> Result<()> {
        self.invalidate();
        self.md().clean()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes shared by the handle tests

    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::fs;

    /// Serves files from memory and records every requested location
    #[derive(Default)]
    pub struct MemorySource {
        pub files: HashMap<String, Vec<u8>>,
        pub requests: RefCell<Vec<String>>,
    }

    impl MemorySource {
        pub fn with(location: &str, contents: Vec<u8>) -> Self {
            let mut source = Self::default();
            source.files.insert(location.to_string(), contents);
            source
        }
    }

    impl MetadataSource for MemorySource {
        fn fetch(&self, location: &str, directory: &Path, _cancel: &Cancellable) -> Result<()> {
            self.requests.borrow_mut().push(location.to_string());
            let contents = self
                .files
                .get(location)
                .ok_or_else(|| Error::AllMirrorsFailed(location.to_string()))?;
            let basename = location.rsplit('/').next().unwrap_or(location);
            fs::write(directory.join(basename), contents)?;
            Ok(())
        }
    }

    pub fn sha256_hex(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }
}
