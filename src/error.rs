// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for zif
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error with file context
    #[error("I/O error: {0}")]
    IoError(String),

    /// A write-once field already holds a value
    #[error("{field} already set to '{current}', cannot overwrite with '{requested}'")]
    AlreadySet {
        field: &'static str,
        current: String,
        requested: String,
    },

    /// A descriptor named something without the data needed to use it
    #[error("Incomplete metadata: {0}")]
    Incomplete(String),

    /// Cached data is invalid and the network may not be used to fix it
    #[error("{0} is stale and the network is disabled")]
    OfflineAndStale(String),

    /// A network operation was requested while offline
    #[error("Offline: {0}")]
    Offline(String),

    /// On-disk data does not match the advertised digest
    #[error("Checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// No mirror could be resolved for a repository
    #[error("No baseurls for {0}")]
    NoBaseUrls(String),

    /// Every mirror was tried and none produced usable content
    #[error("Failed to download {0} from any sources")]
    AllMirrorsFailed(String),

    /// Query, group or category yielded nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// An identity lookup matched more than one package
    #[error("Multiple matches: {0}")]
    MultipleMatches(String),

    /// repomd.xml advertised a data type we do not know
    #[error("Unknown metadata type '{found}', expecting one of: {known}")]
    UnknownMetadataType { found: String, known: String },

    /// Operation cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Package id string is not `name;evr;arch;data`
    #[error("Invalid package id: {0}")]
    InvalidPackageId(String),

    /// Parse errors (XML, INI, numbers)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Transport errors
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    ConfigError(String),

    /// RPM header errors
    #[error("RPM error: {0}")]
    RpmError(String),
}

/// Result type alias using zif's Error type
pub type Result<T> = std::result::Result<T, Error>;
