// src/keyfile.rs

//! INI-style key files (`yum.conf`, `*.repo`)
//!
//! Values are looked up by `(group, key)`. Comments, blank lines and the
//! original spelling of untouched entries are preserved so a file can be
//! rewritten in place after a single value changes.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
enum Line {
    /// Comment or blank line, kept verbatim
    Other(String),
    Group(String),
    Entry {
        key: String,
        value: String,
        /// Original text, dropped once the value is rewritten
        raw: Option<String>,
    },
}

/// Parsed key file
#[derive(Debug, Clone, Default)]
pub struct KeyFile {
    lines: Vec<Line>,
}

impl KeyFile {
    /// Load and parse a key file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&contents)
            .map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Parse key file text
    pub fn parse(contents: &str) -> Result<Self> {
        let mut lines = Vec::new();
        let mut in_group = false;

        for (lineno, line) in contents.lines().enumerate() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                lines.push(Line::Other(line.to_string()));
                continue;
            }

            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                let name = trimmed[1..trimmed.len() - 1].trim();
                if name.is_empty() {
                    return Err(Error::ParseError(format!(
                        "empty group name on line {}",
                        lineno + 1
                    )));
                }
                lines.push(Line::Group(name.to_string()));
                in_group = true;
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(Error::ParseError(format!(
                    "line {} is not a group, comment or key=value: '{}'",
                    lineno + 1,
                    trimmed
                )));
            };

            if !in_group {
                return Err(Error::ParseError(format!(
                    "key '{}' on line {} is outside any group",
                    key.trim(),
                    lineno + 1
                )));
            }

            lines.push(Line::Entry {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
                raw: Some(line.to_string()),
            });
        }

        Ok(Self { lines })
    }

    /// Group names in file order
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for line in &self.lines {
            if let Line::Group(name) = line {
                if !groups.contains(&name.as_str()) {
                    groups.push(name);
                }
            }
        }
        groups
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.lines
            .iter()
            .any(|line| matches!(line, Line::Group(name) if name == group))
    }

    /// Look up a value; a repeated key takes the last value
    pub fn get(&self, group: &str, key: &str) -> Option<&str> {
        let mut current: Option<&str> = None;
        let mut found = None;

        for line in &self.lines {
            match line {
                Line::Group(name) => current = Some(name),
                Line::Entry { key: k, value, .. } if current == Some(group) && k == key => {
                    found = Some(value.as_str());
                }
                _ => {}
            }
        }

        found
    }

    /// Set a value, replacing an existing entry or appending to the group
    pub fn set(&mut self, group: &str, key: &str, value: &str) {
        let mut current: Option<String> = None;
        let mut existing = None;
        let mut group_end = None;

        for (idx, line) in self.lines.iter().enumerate() {
            match line {
                Line::Group(name) => current = Some(name.clone()),
                Line::Entry { key: k, .. } if current.as_deref() == Some(group) => {
                    if k == key {
                        existing = Some(idx);
                    }
                    group_end = Some(idx + 1);
                }
                _ if current.as_deref() == Some(group) && group_end.is_none() => {
                    group_end = Some(idx);
                }
                _ => {}
            }
        }

        let entry = Line::Entry {
            key: key.to_string(),
            value: value.to_string(),
            raw: None,
        };

        if let Some(idx) = existing {
            self.lines[idx] = entry;
        } else if let Some(idx) = group_end {
            self.lines.insert(idx, entry);
        } else if self.has_group(group) {
            // group header with no entries yet
            let header = self
                .lines
                .iter()
                .position(|line| matches!(line, Line::Group(name) if name == group))
                .map(|idx| idx + 1)
                .unwrap_or(self.lines.len());
            self.lines.insert(header, entry);
        } else {
            self.lines.push(Line::Group(group.to_string()));
            self.lines.push(entry);
        }
    }

    /// Serialize back to text
    pub fn to_data(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Other(text) => out.push_str(text),
                Line::Group(name) => {
                    out.push('[');
                    out.push_str(name);
                    out.push(']');
                }
                Line::Entry { raw: Some(raw), .. } => out.push_str(raw),
                Line::Entry { key, value, raw: None } => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                }
            }
            out.push('\n');
        }
        out
    }

    /// Write the file back to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_data()).map_err(|e| {
            Error::IoError(format!("Failed to write {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPO: &str = "\
# Fedora
[fedora]
name=Fedora $releasever - $basearch
enabled = 1
mirrorlist=https://mirrors.fedoraproject.org/metalink?repo=fedora-$releasever&arch=$basearch

[fedora-debuginfo]
name=Fedora $releasever - $basearch - Debug
enabled=0
";

    #[test]
    fn test_get_values() {
        let file = KeyFile::parse(REPO).unwrap();
        assert_eq!(file.groups(), vec!["fedora", "fedora-debuginfo"]);
        assert_eq!(file.get("fedora", "enabled"), Some("1"));
        assert_eq!(file.get("fedora-debuginfo", "enabled"), Some("0"));
        assert_eq!(file.get("fedora", "baseurl"), None);
        assert_eq!(file.get("missing", "name"), None);
    }

    #[test]
    fn test_set_preserves_other_lines() {
        let mut file = KeyFile::parse(REPO).unwrap();
        file.set("fedora", "enabled", "0");
        let data = file.to_data();

        assert!(data.starts_with("# Fedora\n[fedora]\n"));
        assert!(data.contains("\nenabled=0\nmirrorlist="));
        assert!(data.contains("name=Fedora $releasever - $basearch - Debug"));

        let reparsed = KeyFile::parse(&data).unwrap();
        assert_eq!(reparsed.get("fedora", "enabled"), Some("0"));
    }

    #[test]
    fn test_set_new_key_and_group() {
        let mut file = KeyFile::parse(REPO).unwrap();
        file.set("fedora", "gpgcheck", "1");
        file.set("updates", "enabled", "1");

        let reparsed = KeyFile::parse(&file.to_data()).unwrap();
        assert_eq!(reparsed.get("fedora", "gpgcheck"), Some("1"));
        assert_eq!(reparsed.get("updates", "enabled"), Some("1"));
        assert_eq!(reparsed.groups().len(), 3);
    }

    #[test]
    fn test_key_outside_group_is_error() {
        assert!(KeyFile::parse("name=foo\n[main]\n").is_err());
        assert!(KeyFile::parse("[main]\nnot a pair\n").is_err());
    }
}
