// src/metadata/metalink.rs

//! Metalink document: ranked mirrors for repomd.xml
//!
//! Each `<url>` carries a protocol and a preference from 0 to 100. Only
//! HTTP mirrors at or above a preference threshold are used, best first.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metadata::{MetadataFile, MetadataHandle, MetadataKind};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const REPOMD_SUFFIX: &str = "repodata/repomd.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Ftp,
    Rsync,
    Unknown,
}

impl Protocol {
    fn from_text(text: &str) -> Self {
        match text {
            "http" => Protocol::Http,
            "ftp" => Protocol::Ftp,
            "rsync" => Protocol::Rsync,
            _ => Protocol::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MirrorEntry {
    protocol: Protocol,
    preference: u32,
    uri: String,
}

#[derive(Debug)]
pub struct Metalink {
    md: MetadataHandle,
    config: Arc<Config>,
    entries: Vec<MirrorEntry>,
}

impl Metalink {
    pub fn new(repo_id: &str, config: Arc<Config>) -> Result<Self> {
        let mut md = MetadataHandle::new(repo_id);
        md.set_kind(MetadataKind::Metalink)?;
        Ok(Self {
            md,
            config,
            entries: Vec::new(),
        })
    }

    /// Base URLs of HTTP mirrors with `preference >= threshold`, best first
    ///
    /// The advertised URLs point at repomd.xml itself; the trailing
    /// `repodata/repomd.xml` is removed so each entry is a base URL.
    pub fn get_uris(&self, threshold: u32) -> Result<Vec<String>> {
        if !self.md.is_loaded() {
            return Err(Error::Incomplete(format!(
                "metalink for {} is not loaded",
                self.md.id()
            )));
        }

        let mut ranked: Vec<&MirrorEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.protocol == Protocol::Http && entry.preference >= threshold)
            .collect();
        ranked.sort_by(|a, b| b.preference.cmp(&a.preference));

        ranked
            .into_iter()
            .map(|entry| {
                let uri = entry.uri.strip_suffix(REPOMD_SUFFIX).unwrap_or(&entry.uri);
                self.config.expand_substitutions(uri)
            })
            .collect()
    }

    fn parse_str(&mut self, xml: &str) -> Result<()> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut current: Option<MirrorEntry> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) if e.name().as_ref() == b"url" => {
                    let mut entry = MirrorEntry {
                        protocol: Protocol::Unknown,
                        preference: 0,
                        uri: String::new(),
                    };
                    for attr in e.attributes().filter_map(|a| a.ok()) {
                        let value = String::from_utf8_lossy(attr.value.as_ref()).to_string();
                        match attr.key.as_ref() {
                            b"protocol" => entry.protocol = Protocol::from_text(&value),
                            b"preference" => entry.preference = value.trim().parse().unwrap_or(0),
                            _ => {}
                        }
                    }
                    current = Some(entry);
                }
                Ok(Event::Text(e)) => {
                    if let Some(entry) = current.as_mut() {
                        let text = e.unescape().map_err(|e| {
                            Error::ParseError(format!("Invalid metalink text: {}", e))
                        })?;
                        entry.uri.push_str(text.trim());
                    }
                }
                Ok(Event::End(e)) if e.name().as_ref() == b"url" => {
                    if let Some(entry) = current.take() {
                        self.entries.push(entry);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::ParseError(format!(
                        "Failed to parse metalink at position {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        debug!("{} mirrors in metalink for {}", self.entries.len(), self.md.id());
        Ok(())
    }
}

impl MetadataFile for Metalink {
    fn md(&self) -> &MetadataHandle {
        &self.md
    }

    fn md_mut(&mut self) -> &mut MetadataHandle {
        &mut self.md
    }

    fn parse(&mut self, path: &Path) -> Result<()> {
        let xml = fs::read_to_string(path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
        self.unload();
        self.parse_str(&xml)
    }

    fn unload(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::Cancellable;
    use crate::metadata::testing::MemorySource;
    use tempfile::tempdir;

    const METALINK: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<metalink version="3.0" xmlns="http://www.metalinker.org/">
 <files>
  <file name="repomd.xml">
   <resources maxconnections="1">
    <url protocol="ftp" type="ftp" location="GB" preference="100">ftp://ftp.example.org/fedora/12/i386/os/repodata/repomd.xml</url>
    <url protocol="http" type="http" location="GB" preference="98">http://mirror1.example.org/fedora/12/i386/os/repodata/repomd.xml</url>
    <url protocol="http" type="http" location="DE" preference="99">http://mirror2.example.org/fedora/12/i386/os/repodata/repomd.xml</url>
    <url protocol="http" type="http" location="US" preference="10">http://slow.example.org/fedora/12/i386/os/repodata/repomd.xml</url>
    <url protocol="rsync" type="rsync" location="GB" preference="99">rsync://rsync.example.org/fedora/12/i386/os/repodata/repomd.xml</url>
   </resources>
  </file>
 </files>
</metalink>
"#;

    fn config() -> Arc<Config> {
        let config = Config::parse("[main]\n").unwrap();
        config.set_local("releasever", "12").unwrap();
        config.set_local("basearch", "i386").unwrap();
        Arc::new(config)
    }

    fn loaded() -> Metalink {
        let mut metalink = Metalink::new("fedora", config()).unwrap();
        metalink.parse_str(METALINK).unwrap();
        metalink.md_mut().set_loaded(true);
        metalink
    }

    #[test]
    fn test_location_is_fixed() {
        let metalink = Metalink::new("fedora", Arc::new(Config::default())).unwrap();
        assert_eq!(metalink.md().location(), Some("metalink.xml"));
    }

    #[test]
    fn test_get_uris_ranked_http_only() {
        let metalink = loaded();
        assert_eq!(
            metalink.get_uris(50).unwrap(),
            vec![
                "http://mirror2.example.org/fedora/12/i386/os/",
                "http://mirror1.example.org/fedora/12/i386/os/",
            ]
        );
        assert_eq!(metalink.get_uris(0).unwrap().len(), 3);
        assert!(metalink.get_uris(100).unwrap().is_empty());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metalink.xml");
        fs::write(&path, METALINK).unwrap();

        let mut metalink = Metalink::new("fedora", config()).unwrap();
        metalink.md_mut().set_filename(&path);
        metalink
            .load(false, &MemorySource::default(), &Cancellable::new())
            .unwrap();
        assert_eq!(metalink.get_uris(50).unwrap().len(), 2);
    }
}
