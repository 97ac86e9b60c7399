// src/metadata/mirrorlist.rs

//! Plaintext mirror list: one candidate base URL per line

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metadata::{MetadataFile, MetadataHandle, MetadataKind};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct MirrorList {
    md: MetadataHandle,
    config: Arc<Config>,
    lines: Vec<String>,
}

impl MirrorList {
    pub fn new(repo_id: &str, config: Arc<Config>) -> Result<Self> {
        let mut md = MetadataHandle::new(repo_id);
        md.set_kind(MetadataKind::Mirrorlist)?;
        Ok(Self {
            md,
            config,
            lines: Vec::new(),
        })
    }

    /// HTTP mirrors in file order, with substitutions expanded
    pub fn get_uris(&self) -> Result<Vec<String>> {
        if !self.md.is_loaded() {
            return Err(Error::Incomplete(format!(
                "mirrorlist for {} is not loaded",
                self.md.id()
            )));
        }

        self.lines
            .iter()
            .map(|line| self.config.expand_substitutions(line))
            .collect()
    }
}

/// Keep lines that look like HTTP URLs; comments and blanks never do
fn http_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("http://"))
        .map(str::to_string)
        .collect()
}

impl MetadataFile for MirrorList {
    fn md(&self) -> &MetadataHandle {
        &self.md
    }

    fn md_mut(&mut self) -> &mut MetadataHandle {
        &mut self.md
    }

    fn parse(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
        self.lines = http_lines(&contents);
        debug!("{} mirrors in {}", self.lines.len(), path.display());
        Ok(())
    }

    fn unload(&mut self) {
        self.lines.clear();
    }
}
