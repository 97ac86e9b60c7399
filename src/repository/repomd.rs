// src/repository/repomd.rs

//! `repodata/repomd.xml`: the index of a repository's metadata files
//!
//! Each `<data type="...">` element names one artifact with its location,
//! compressed and uncompressed checksums and a timestamp.

use crate::error::{Error, Result};
use crate::metadata::{ChecksumType, MetadataKind};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Data types that map onto a handle
const HANDLED_TYPES: &[(&str, MetadataKind)] = &[
    ("primary_db", MetadataKind::Primary),
    ("filelists_db", MetadataKind::Filelists),
    ("group_gz", MetadataKind::Comps),
    ("other_db", MetadataKind::Other),
    ("updateinfo", MetadataKind::Updateinfo),
];

/// Data types that are recognised but not used
const IGNORED_TYPES: &[&str] = &[
    "primary",
    "filelists",
    "other",
    "group",
    "prestodelta",
];

/// One `<data>` element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepomdRecord {
    pub data_type: String,
    pub location: Option<String>,
    pub checksum: Option<String>,
    pub checksum_type: Option<ChecksumType>,
    pub checksum_open: Option<String>,
    pub timestamp: Option<u64>,
}

/// Which handle a `data type` feeds, if any
///
/// Types in neither table are an error so that a format change upstream is
/// noticed rather than silently ignored.
pub fn kind_for_type(data_type: &str) -> Result<Option<MetadataKind>> {
    if let Some((_, kind)) = HANDLED_TYPES.iter().find(|(name, _)| *name == data_type) {
        return Ok(Some(*kind));
    }
    if IGNORED_TYPES.contains(&data_type) {
        return Ok(None);
    }

    let known: Vec<&str> = HANDLED_TYPES
        .iter()
        .map(|(name, _)| *name)
        .chain(IGNORED_TYPES.iter().copied())
        .collect();
    Err(Error::UnknownMetadataType {
        found: data_type.to_string(),
        known: known.join(", "),
    })
}

fn attribute(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| String::from_utf8_lossy(attr.value.as_ref()).to_string())
}

/// Timestamps are integral in current repos and fractional in older ones
fn parse_timestamp(text: &str) -> Result<u64> {
    let text = text.trim();
    text.parse::<u64>()
        .or_else(|_| text.parse::<f64>().map(|secs| secs as u64))
        .map_err(|_| Error::ParseError(format!("invalid repomd timestamp '{}'", text)))
}

/// Parse repomd.xml text
pub fn parse_str(xml: &str) -> Result<Vec<RepomdRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut records = Vec::new();
    let mut current: Option<RepomdRecord> = None;
    let mut tag = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"data" => {
                    current = Some(RepomdRecord {
                        data_type: attribute(&e, b"type").unwrap_or_default(),
                        ..RepomdRecord::default()
                    });
                }
                b"checksum" => {
                    if let Some(record) = current.as_mut() {
                        record.checksum_type = attribute(&e, b"type")
                            .map(|name| ChecksumType::from_name(&name));
                    }
                    tag = "checksum".to_string();
                }
                name => tag = String::from_utf8_lossy(name).to_string(),
            },
            Ok(Event::Empty(e)) if e.name().as_ref() == b"location" => {
                if let Some(record) = current.as_mut() {
                    record.location = attribute(&e, b"href");
                }
            }
            Ok(Event::Text(e)) => {
                let Some(record) = current.as_mut() else {
                    buf.clear();
                    continue;
                };
                let text = e
                    .unescape()
                    .map_err(|e| Error::ParseError(format!("Invalid repomd text: {}", e)))?
                    .to_string();

                match tag.as_str() {
                    "checksum" => record.checksum = Some(text),
                    "open-checksum" => record.checksum_open = Some(text),
                    "timestamp" => record.timestamp = Some(parse_timestamp(&text)?),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"data" {
                    if let Some(record) = current.take() {
                        records.push(record);
                    }
                }
                tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseError(format!(
                    "Failed to parse repomd.xml at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    debug!("{} data entries in repomd.xml", records.len());
    Ok(records)
}

/// Parse a cached repomd.xml
pub fn parse_file(path: &Path) -> Result<Vec<RepomdRecord>> {
    let xml = fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_str(&xml).map_err(|e| match e {
        Error::ParseError(msg) => Error::ParseError(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPOMD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <data type="other_db">
    <location href="repodata/other.sqlite.bz2"/>
    <checksum type="sha">6fb5d0b2bd2e7dbc1d7e1b1b0e4d2a1c9d8b7a6f</checksum>
    <timestamp>1257174287</timestamp>
    <open-checksum type="sha">0c2b1d4e8c1f3b4a5d6e7f8091a2b3c4d5e6f708</open-checksum>
  </data>
  <data type="primary_db">
    <location href="repodata/primary.sqlite.bz2"/>
    <checksum type="sha256">aaaa</checksum>
    <timestamp>1257174288.25</timestamp>
    <open-checksum type="sha256">bbbb</open-checksum>
    <database_version>10</database_version>
  </data>
  <data type="group_gz">
    <location href="repodata/comps.xml.gz"/>
    <checksum type="sha256">cccc</checksum>
    <timestamp>1257174289</timestamp>
    <open-checksum type="sha256">dddd</open-checksum>
  </data>
</repomd>
"#;

    #[test]
    fn test_parse_records() {
        let records = parse_str(REPOMD).unwrap();
        assert_eq!(records.len(), 3);

        let primary = &records[1];
        assert_eq!(primary.data_type, "primary_db");
        assert_eq!(primary.location.as_deref(), Some("repodata/primary.sqlite.bz2"));
        assert_eq!(primary.checksum.as_deref(), Some("aaaa"));
        assert_eq!(primary.checksum_open.as_deref(), Some("bbbb"));
        assert_eq!(primary.checksum_type, Some(ChecksumType::Sha256));
        assert_eq!(primary.timestamp, Some(1257174288));

        assert_eq!(records[0].checksum_type, Some(ChecksumType::Sha1));
        assert_eq!(records[2].location.as_deref(), Some("repodata/comps.xml.gz"));
    }

    #[test]
    fn test_kind_for_type() {
        assert_eq!(kind_for_type("primary_db").unwrap(), Some(MetadataKind::Primary));
        assert_eq!(kind_for_type("filelists_db").unwrap(), Some(MetadataKind::Filelists));
        assert_eq!(kind_for_type("group_gz").unwrap(), Some(MetadataKind::Comps));
        assert_eq!(kind_for_type("other_db").unwrap(), Some(MetadataKind::Other));
        assert_eq!(kind_for_type("updateinfo").unwrap(), Some(MetadataKind::Updateinfo));
        assert_eq!(kind_for_type("prestodelta").unwrap(), None);

        match kind_for_type("deltainfo") {
            Err(Error::UnknownMetadataType { found, known }) => {
                assert_eq!(found, "deltainfo");
                assert!(known.contains("primary_db"));
                assert!(known.contains("prestodelta"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_bad_timestamp() {
        let xml = r#"<repomd><data type="primary_db"><timestamp>soon</timestamp></data></repomd>"#;
        assert!(matches!(parse_str(xml), Err(Error::ParseError(_))));
    }
}
