// src/metadata/handle.rs

//! Cache lifecycle of one metadata artifact
//!
//! A handle knows where its artifact lives upstream (`location`), what it
//! should hash to before and after decompression, and where the two cached
//! copies live on disk. Descriptor fields are write-once: a repomd.xml that
//! names the same element twice is malformed, not something to overwrite.

use crate::cancel::Cancellable;
use crate::error::{Error, Result};
use crate::metadata::decompress::{self, uncompressed_path};
use crate::metadata::{ChecksumType, MetadataKind, MetadataSource};
use std::fmt::Debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Location of the mirrorlist document in the repository cache
pub const MIRRORLIST_LOCATION: &str = "mirrorlist.txt";
/// Location of the metalink document in the repository cache
pub const METALINK_LOCATION: &str = "metalink.xml";

#[derive(Debug, Clone, Default)]
pub struct MetadataHandle {
    id: String,
    kind: Option<MetadataKind>,
    location: Option<String>,
    checksum: Option<String>,
    checksum_uncompressed: Option<String>,
    checksum_type: Option<ChecksumType>,
    timestamp: Option<u64>,
    filename: Option<PathBuf>,
    filename_uncompressed: Option<PathBuf>,
    loaded: bool,
}

fn set_once<T: Debug>(slot: &mut Option<T>, field: &'static str, value: T) -> Result<()> {
    if let Some(current) = slot {
        return Err(Error::AlreadySet {
            field,
            current: format!("{:?}", current),
            requested: format!("{:?}", value),
        });
    }
    *slot = Some(value);
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::IoError(format!(
            "Failed to delete {}: {}",
            path.display(),
            e
        ))),
    }
}

impl MetadataHandle {
    /// Empty handle owned by repository `id`
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    /// Repository the handle belongs to
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> Option<MetadataKind> {
        self.kind
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    pub fn checksum_uncompressed(&self) -> Option<&str> {
        self.checksum_uncompressed.as_deref()
    }

    pub fn checksum_type(&self) -> ChecksumType {
        self.checksum_type.unwrap_or_default()
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.timestamp
    }

    /// Cached copy as downloaded
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Cached copy after decompression
    pub fn filename_uncompressed(&self) -> Option<&Path> {
        self.filename_uncompressed.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub(crate) fn set_loaded(&mut self, loaded: bool) {
        self.loaded = loaded;
    }

    pub fn set_location(&mut self, location: &str) -> Result<()> {
        set_once(&mut self.location, "location", location.to_string())
    }

    pub fn set_checksum(&mut self, checksum: &str) -> Result<()> {
        set_once(&mut self.checksum, "checksum", checksum.to_string())
    }

    pub fn set_checksum_uncompressed(&mut self, checksum: &str) -> Result<()> {
        set_once(
            &mut self.checksum_uncompressed,
            "checksum_uncompressed",
            checksum.to_string(),
        )
    }

    pub fn set_checksum_type(&mut self, checksum_type: ChecksumType) -> Result<()> {
        set_once(&mut self.checksum_type, "checksum_type", checksum_type)
    }

    pub fn set_timestamp(&mut self, timestamp: u64) -> Result<()> {
        set_once(&mut self.timestamp, "timestamp", timestamp)
    }

    /// Assign the artifact kind
    ///
    /// Mirror documents get a fixed location. Any other kind whose location
    /// is already known must also have its checksum and timestamp.
    pub fn set_kind(&mut self, kind: MetadataKind) -> Result<()> {
        set_once(&mut self.kind, "kind", kind)?;

        match kind {
            MetadataKind::Mirrorlist => self.set_location(MIRRORLIST_LOCATION),
            MetadataKind::Metalink => self.set_location(METALINK_LOCATION),
            _ => self.check_complete(),
        }
    }

    /// A located artifact must also carry its checksum and timestamp
    pub fn check_complete(&self) -> Result<()> {
        if self.location.is_some() && (self.checksum.is_none() || self.timestamp.is_none()) {
            return Err(Error::Incomplete(format!(
                "{} location set without checksum or timestamp for {}",
                self.kind_name(),
                self.id
            )));
        }
        Ok(())
    }

    /// Set the cached path of the downloaded file
    ///
    /// The decompressed sibling is derived by dropping a compression suffix.
    pub fn set_filename(&mut self, filename: &Path) {
        self.filename_uncompressed = Some(uncompressed_path(filename));
        self.filename = Some(filename.to_path_buf());
    }

    /// Forget everything learned from repomd.xml
    ///
    /// The kind survives, and mirror documents keep their fixed location.
    pub fn reset(&mut self) {
        let kind = self.kind;
        let filename = self.filename.clone();
        *self = Self::new(&self.id);
        self.kind = kind;
        if let Some(kind) = kind.filter(MetadataKind::is_mirror_source) {
            self.location = Some(
                match kind {
                    MetadataKind::Mirrorlist => MIRRORLIST_LOCATION,
                    _ => METALINK_LOCATION,
                }
                .to_string(),
            );
            if let Some(filename) = filename {
                self.set_filename(&filename);
            }
        }
    }

    fn kind_name(&self) -> &'static str {
        self.kind.map(|k| k.as_str()).unwrap_or("unknown")
    }

    fn is_compressed(&self) -> bool {
        self.filename != self.filename_uncompressed
    }

    /// Check a cached copy against its advertised digest
    pub fn file_check(&self, use_uncompressed: bool, cancel: &Cancellable) -> Result<()> {
        let (path, expected) = if use_uncompressed {
            (&self.filename_uncompressed, &self.checksum_uncompressed)
        } else {
            (&self.filename, &self.checksum)
        };

        let path = path.as_deref().ok_or_else(|| {
            Error::Incomplete(format!("no filename for {} in {}", self.kind_name(), self.id))
        })?;
        let expected = expected.as_deref().ok_or_else(|| {
            Error::Incomplete(format!("no checksum for {}", path.display()))
        })?;

        let actual = self.checksum_type().digest_file(path, cancel)?;
        if actual != expected {
            return Err(Error::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: expected.to_string(),
                actual,
            });
        }

        debug!("{} checksum correct ({})", path.display(), expected);
        Ok(())
    }

    /// Run the validate, download and decompress steps of a load
    ///
    /// Returns the path of the uncompressed file, ready to parse.
    pub(crate) fn prepare(
        &self,
        online: bool,
        source: &dyn MetadataSource,
        cancel: &Cancellable,
    ) -> Result<PathBuf> {
        let filename = self.filename.as_deref().ok_or_else(|| {
            Error::Incomplete(format!("no filename for {} in {}", self.kind_name(), self.id))
        })?;
        let uncompressed = self
            .filename_uncompressed
            .clone()
            .unwrap_or_else(|| filename.to_path_buf());

        if self.kind.is_some_and(|k| k.is_mirror_source()) {
            return Ok(uncompressed);
        }

        if self.is_compressed() && self.file_check(true, cancel).is_ok() {
            return Ok(uncompressed);
        }

        if let Err(e) = self.file_check(false, cancel) {
            if matches!(e, Error::Cancelled) {
                return Err(e);
            }
            debug!("{} is not usable: {}", filename.display(), e);
            remove_if_exists(filename)?;

            if !online {
                return Err(Error::OfflineAndStale(format!(
                    "{} metadata for {}",
                    self.kind_name(),
                    self.id
                )));
            }

            let location = self.location.as_deref().ok_or_else(|| {
                Error::Incomplete(format!("no location for {} in {}", self.kind_name(), self.id))
            })?;
            let directory = filename.parent().unwrap_or_else(|| Path::new("."));
            fs::create_dir_all(directory)?;

            info!("Downloading {} for {}", location, self.id);
            source.fetch(location, directory, cancel)?;
            self.file_check(false, cancel)?;
        }

        if self.is_compressed() {
            remove_if_exists(&uncompressed)?;
            decompress::decompress(filename, &uncompressed, cancel)?;
            self.file_check(true, cancel)?;
        }

        Ok(uncompressed)
    }

    /// Delete both cached copies
    pub fn clean(&self) -> Result<()> {
        if let Some(filename) = &self.filename {
            remove_if_exists(filename)?;
        }
        if let Some(filename) = &self.filename_uncompressed {
            remove_if_exists(filename)?;
        }
        Ok(())
    }
}
