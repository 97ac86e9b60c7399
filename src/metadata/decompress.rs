// src/metadata/decompress.rs

//! Decompression of downloaded metadata
//!
//! The format is picked from the file suffix, never from content sniffing:
//! repository indexes always name their compression.

use crate::cancel::Cancellable;
use crate::error::{Error, Result};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use xz2::read::XzDecoder;

const BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressedWith {
    // .gz
    Gzip,
    // .bz2
    Bzip2,
    // .xz
    Xz,
    // .zst
    Zstd,
    Uncompressed,
}

impl CompressedWith {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") => CompressedWith::Gzip,
            Some("bz2") => CompressedWith::Bzip2,
            Some("xz") => CompressedWith::Xz,
            Some("zst") => CompressedWith::Zstd,
            _ => CompressedWith::Uncompressed,
        }
    }
}

/// Strip a known compression suffix, returning the path unchanged otherwise
pub fn uncompressed_path(path: &Path) -> PathBuf {
    match CompressedWith::from_path(path) {
        CompressedWith::Uncompressed => path.to_path_buf(),
        _ => path.with_extension(""),
    }
}

pub fn stream<'a, R: Read + 'a>(comp: CompressedWith, reader: R) -> Result<Box<dyn Read + 'a>> {
    match comp {
        CompressedWith::Gzip => Ok(Box::new(GzDecoder::new(reader))),
        CompressedWith::Bzip2 => Ok(Box::new(BzDecoder::new(reader))),
        CompressedWith::Xz => Ok(Box::new(XzDecoder::new(reader))),
        CompressedWith::Zstd => Ok(Box::new(zstd::Decoder::new(reader)?)),
        CompressedWith::Uncompressed => Ok(Box::new(reader)),
    }
}

/// Decompress `source` into `dest`, checking for cancellation between buffers
pub fn decompress(source: &Path, dest: &Path, cancel: &Cancellable) -> Result<()> {
    let comp = CompressedWith::from_path(source);
    debug!("Decompressing {} ({:?}) to {}", source.display(), comp, dest.display());

    let input = File::open(source)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", source.display(), e)))?;
    let mut reader = stream(comp, BufReader::new(input))?;
    let mut output = File::create(dest)
        .map_err(|e| Error::IoError(format!("Failed to create {}: {}", dest.display(), e)))?;

    let mut buf = vec![0u8; BUFFER_SIZE];
    let result = (|| -> Result<()> {
        loop {
            cancel.check()?;
            let n = reader.read(&mut buf).map_err(|e| {
                Error::IoError(format!("Failed to decompress {}: {}", source.display(), e))
            })?;
            if n == 0 {
                break;
            }
            output.write_all(&buf[..n])?;
        }
        output.flush()?;
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(dest);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_detect_from_suffix() {
        assert_eq!(
            CompressedWith::from_path(Path::new("primary.sqlite.bz2")),
            CompressedWith::Bzip2
        );
        assert_eq!(
            CompressedWith::from_path(Path::new("comps.xml.gz")),
            CompressedWith::Gzip
        );
        assert_eq!(
            CompressedWith::from_path(Path::new("repomd.xml")),
            CompressedWith::Uncompressed
        );
    }

    #[test]
    fn test_uncompressed_path() {
        assert_eq!(
            uncompressed_path(Path::new("/cache/fedora/primary.sqlite.bz2")),
            PathBuf::from("/cache/fedora/primary.sqlite")
        );
        assert_eq!(
            uncompressed_path(Path::new("/cache/fedora/filelists.sqlite.xz")),
            PathBuf::from("/cache/fedora/filelists.sqlite")
        );
        assert_eq!(
            uncompressed_path(Path::new("/cache/fedora/mirrorlist.txt")),
            PathBuf::from("/cache/fedora/mirrorlist.txt")
        );
    }

    #[test]
    fn test_decompress_gzip() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("comps.xml.gz");
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"<comps/>").unwrap();
        fs::write(&source, encoder.finish().unwrap()).unwrap();

        let dest = dir.path().join("comps.xml");
        decompress(&source, &dest, &Cancellable::new()).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"<comps/>");
    }

    #[test]
    fn test_decompress_bzip2() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("primary.sqlite.bz2");
        let mut encoder =
            bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(b"SQLite format 3").unwrap();
        fs::write(&source, encoder.finish().unwrap()).unwrap();

        let dest = dir.path().join("primary.sqlite");
        decompress(&source, &dest, &Cancellable::new()).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"SQLite format 3");
    }

    #[test]
    fn test_decompress_corrupt_removes_output() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("primary.sqlite.gz");
        fs::write(&source, b"definitely not gzip").unwrap();

        let dest = dir.path().join("primary.sqlite");
        assert!(decompress(&source, &dest, &Cancellable::new()).is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn test_decompress_cancelled() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("comps.xml");
        fs::write(&source, b"<comps/>").unwrap();

        let cancel = Cancellable::new();
        cancel.cancel();
        let dest = dir.path().join("out.xml");
        assert!(matches!(
            decompress(&source, &dest, &cancel),
            Err(Error::Cancelled)
        ));
    }
}
