// src/repository/descriptor.rs

//! One `[id]` section of a `*.repo` file

use crate::config::{Config, boolean_from_text};
use crate::error::{Error, Result};
use crate::keyfile::KeyFile;
use std::path::Path;
use tracing::debug;

const METALINK_MARKER: &str = "metalink?";

/// Repository ids with these suffixes hold debug or unreleased content
const DEVEL_SUFFIXES: &[&str] = &[
    "-debuginfo",
    "-testing",
    "-debug",
    "-development",
    "-source",
];

/// Settings for a single repository, with substitutions applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDescriptor {
    pub id: String,
    pub name: String,
    pub name_expanded: String,
    pub enabled: bool,
    pub baseurl: Option<String>,
    pub mirrorlist: Option<String>,
    pub metalink: Option<String>,
}

impl RepoDescriptor {
    /// Read section `id` of a parsed repo file
    pub fn from_keyfile(keyfile: &KeyFile, id: &str, config: &Config) -> Result<Self> {
        let required = |key: &str| {
            keyfile.get(id, key).ok_or_else(|| {
                Error::ConfigError(format!("failed to get {} for {}", key, id))
            })
        };

        let name = required("name")?.to_string();
        let enabled = boolean_from_text(required("enabled")?);

        let optional = |key: &str| -> Result<Option<String>> {
            keyfile
                .get(id, key)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(|value| config.expand_substitutions(value))
                .transpose()
        };

        let baseurl = optional("baseurl")?;
        let mut mirrorlist = optional("mirrorlist")?;
        let mut metalink = optional("metalink")?;

        // Fedora ships metalinks under the mirrorlist key
        if metalink.is_none() && mirrorlist.as_deref().is_some_and(|m| m.contains(METALINK_MARKER)) {
            debug!("treating mirrorlist of {} as a metalink", id);
            metalink = mirrorlist.take();
        }

        if enabled && baseurl.is_none() && mirrorlist.is_none() && metalink.is_none() {
            return Err(Error::ConfigError(format!(
                "{} has no baseurl, mirrorlist or metalink",
                id
            )));
        }

        Ok(Self {
            id: id.to_string(),
            name_expanded: config.expand_substitutions(&name)?,
            name,
            enabled,
            baseurl,
            mirrorlist,
            metalink,
        })
    }

    /// Debug, testing or source repository
    pub fn is_devel(&self) -> bool {
        DEVEL_SUFFIXES.iter().any(|suffix| self.id.ends_with(suffix))
    }
}

/// Rewrite the `enabled` key of section `id` in place
pub fn write_enabled(repo_file: &Path, id: &str, enabled: bool) -> Result<()> {
    let mut keyfile = KeyFile::load(repo_file)?;
    if !keyfile.has_group(id) {
        return Err(Error::NotFound(format!(
            "no section {} in {}",
            id,
            repo_file.display()
        )));
    }
    keyfile.set(id, "enabled", if enabled { "1" } else { "0" });
    keyfile.save(repo_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const FEDORA_REPO: &str = "\
[fedora]
name=Fedora $releasever - $basearch
failovermethod=priority
#baseurl=http://download.fedoraproject.org/pub/fedora/linux/releases/$releasever/Everything/$basearch/os/
mirrorlist=https://mirrors.fedoraproject.org/metalink?repo=fedora-$releasever&arch=$basearch
enabled=1
gpgcheck=1

[fedora-debuginfo]
name=Fedora $releasever - $basearch - Debug
baseurl=http://download.example.org/fedora/$releasever/$basearch/debug/
enabled=0

[broken]
name=Broken
enabled=yes

[nameless]
enabled=1
baseurl=http://example.org/
";

    fn config() -> Config {
        let config = Config::parse("[main]\n").unwrap();
        config.set_local("releasever", "12").unwrap();
        config.set_local("basearch", "i386").unwrap();
        config
    }

    #[test]
    fn test_metalink_in_mirrorlist_key() {
        let keyfile = KeyFile::parse(FEDORA_REPO).unwrap();
        let repo = RepoDescriptor::from_keyfile(&keyfile, "fedora", &config()).unwrap();

        assert!(repo.enabled);
        assert_eq!(repo.name, "Fedora $releasever - $basearch");
        assert_eq!(repo.name_expanded, "Fedora 12 - i386");
        assert_eq!(repo.mirrorlist, None);
        assert_eq!(
            repo.metalink.as_deref(),
            Some("https://mirrors.fedoraproject.org/metalink?repo=fedora-12&arch=i386")
        );
        assert!(repo.baseurl.is_none());
        assert!(!repo.is_devel());
    }

    #[test]
    fn test_disabled_devel_repo() {
        let keyfile = KeyFile::parse(FEDORA_REPO).unwrap();
        let repo = RepoDescriptor::from_keyfile(&keyfile, "fedora-debuginfo", &config()).unwrap();

        assert!(!repo.enabled);
        assert!(repo.is_devel());
        assert_eq!(
            repo.baseurl.as_deref(),
            Some("http://download.example.org/fedora/12/i386/debug/")
        );
    }

    #[test]
    fn test_enabled_without_sources_fails() {
        let keyfile = KeyFile::parse(FEDORA_REPO).unwrap();
        assert!(matches!(
            RepoDescriptor::from_keyfile(&keyfile, "broken", &config()),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_name_is_required() {
        let keyfile = KeyFile::parse(FEDORA_REPO).unwrap();
        assert!(RepoDescriptor::from_keyfile(&keyfile, "nameless", &config()).is_err());
        assert!(RepoDescriptor::from_keyfile(&keyfile, "missing", &config()).is_err());
    }

    #[test]
    fn test_write_enabled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fedora.repo");
        fs::write(&path, FEDORA_REPO).unwrap();

        write_enabled(&path, "fedora", false).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("gpgcheck=1"));
        assert!(contents.contains("#baseurl=http://download.fedoraproject.org"));

        let keyfile = KeyFile::load(&path).unwrap();
        assert_eq!(keyfile.get("fedora", "enabled"), Some("0"));
        assert_eq!(keyfile.get("fedora-debuginfo", "enabled"), Some("0"));

        assert!(matches!(
            write_enabled(&path, "missing", true),
            Err(Error::NotFound(_))
        ));
    }
}
