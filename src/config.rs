// src/config.rs

//! Process-wide settings
//!
//! Values are resolved from, in order:
//! - local overrides set with [`Config::set_local`]
//! - the `[main]` section of the system config file (`/etc/yum.conf`)
//! - built-in defaults for a handful of well-known keys; `releasever` falls
//!   back to the version named in `/etc/fedora-release`
//!
//! One `Config` is built at start-up and shared as `Arc<Config>` by every
//! repository, handle and store that needs it.

use crate::error::{Error, Result};
use crate::keyfile::KeyFile;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

const MAIN_GROUP: &str = "main";

/// Distribution release file consulted when `releasever` is not configured
pub const RELEASE_FILE: &str = "/etc/fedora-release";

/// Settings provider
#[derive(Debug)]
pub struct Config {
    keyfile: KeyFile,
    overrides: RwLock<HashMap<String, String>>,
    release_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_keyfile(KeyFile::default())
    }
}

impl Config {
    /// Load the system config file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ConfigError(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        debug!("Loading config from {}", path.display());
        let keyfile = KeyFile::load(path)?;
        Ok(Self::from_keyfile(keyfile))
    }

    /// Parse config text, mostly useful for tests and embedded defaults
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(Self::from_keyfile(KeyFile::parse(contents)?))
    }

    fn from_keyfile(keyfile: KeyFile) -> Self {
        Self {
            keyfile,
            overrides: RwLock::new(HashMap::new()),
            release_file: PathBuf::from(RELEASE_FILE),
        }
    }

    /// Read the release version from `path` instead of [`RELEASE_FILE`]
    pub fn with_release_file(mut self, path: &Path) -> Self {
        self.release_file = path.to_path_buf();
        self
    }

    /// Set a value used in preference to the config file
    ///
    /// Overrides are write-once; use [`Config::reset_default`] to clear them.
    pub fn set_local(&self, key: &str, value: &str) -> Result<()> {
        let mut overrides = self
            .overrides
            .write()
            .map_err(|_| Error::ConfigError("override table poisoned".to_string()))?;

        if let Some(current) = overrides.get(key) {
            return Err(Error::AlreadySet {
                field: "config key",
                current: format!("{}={}", key, current),
                requested: value.to_string(),
            });
        }

        overrides.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Remove every local override
    pub fn reset_default(&self) {
        if let Ok(mut overrides) = self.overrides.write() {
            overrides.clear();
        }
    }

    /// Get a string value
    pub fn get_string(&self, key: &str) -> Result<String> {
        if let Ok(overrides) = self.overrides.read() {
            if let Some(value) = overrides.get(key) {
                return Ok(value.clone());
            }
        }

        if let Some(value) = self.keyfile.get(MAIN_GROUP, key) {
            return Ok(value.to_string());
        }

        match key {
            "reposdir" => Ok("/etc/yum.repos.d".to_string()),
            "pidfile" => Ok("/var/run/yum.pid".to_string()),
            "cachedir" => Ok("/var/cache/yum".to_string()),
            "basearch" => Ok(normalize_basearch(std::env::consts::ARCH).to_string()),
            "releasever" => releasever_from_file(&self.release_file),
            _ => Err(Error::ConfigError(format!("failed to read {}: not set", key))),
        }
    }

    /// Get a boolean value (`true`, `yes` or `1`, case-insensitive)
    pub fn get_boolean(&self, key: &str) -> Result<bool> {
        Ok(boolean_from_text(&self.get_string(key)?))
    }

    /// Get an unsigned integer value
    pub fn get_uint(&self, key: &str) -> Result<u32> {
        let value = self.get_string(key)?;
        value.trim().parse().map_err(|_| {
            Error::ConfigError(format!("failed to convert '{}' to unsigned integer", value))
        })
    }

    /// Get a duration in seconds from values like `90m` or `2d`
    pub fn get_time(&self, key: &str) -> Result<u64> {
        Ok(string_to_time(&self.get_string(key)?))
    }

    /// Replace `$releasever` and `$basearch` with the running system's values
    ///
    /// A value is only looked up when its placeholder appears, so text
    /// without placeholders is returned unchanged even if nothing is set.
    pub fn expand_substitutions(&self, text: &str) -> Result<String> {
        let mut expanded = text.to_string();
        if expanded.contains("$releasever") {
            expanded = expanded.replace("$releasever", &self.get_string("releasever")?);
        }
        if expanded.contains("$basearch") {
            expanded = expanded.replace("$basearch", &self.get_string("basearch")?);
        }
        Ok(expanded)
    }

    /// Architectures that are native on this machine
    pub fn basearch_list(&self) -> Result<Vec<String>> {
        let basearch = self.get_string("basearch")?;
        let mut list = vec![basearch.clone(), "noarch".to_string()];
        if basearch == "i386" {
            list.extend(["i486", "i586", "i686"].map(String::from));
        }
        Ok(list)
    }

    /// Whether network access is allowed; absent means offline
    pub fn network_enabled(&self) -> bool {
        self.get_boolean("network").unwrap_or(false)
    }

    /// Root of the metadata cache
    pub fn cache_dir(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(self.get_string("cachedir")?))
    }

    /// Directory holding `*.repo` files
    pub fn repos_dir(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(self.get_string("reposdir")?))
    }

    /// Transport timeout, if configured
    pub fn connection_timeout(&self) -> Option<Duration> {
        match self.get_uint("connection_timeout") {
            Ok(secs) => Some(Duration::from_secs(u64::from(secs))),
            Err(Error::ConfigError(msg)) if msg.contains("convert") => {
                warn!("Ignoring connection_timeout: {}", msg);
                None
            }
            Err(_) => None,
        }
    }
}

/// Interpret `true`/`yes`/`1` (any case) as true, anything else as false
pub fn boolean_from_text(text: &str) -> bool {
    let text = text.trim();
    text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("yes") || text == "1"
}

fn releasever_from_file(path: &Path) -> Result<String> {
    let contents = fs::read_to_string(path).map_err(|e| {
        Error::ConfigError(format!(
            "failed to read releasever: not set and {} unreadable: {}",
            path.display(),
            e
        ))
    })?;

    let releasever = release_from_text(&contents).ok_or_else(|| {
        Error::ConfigError(format!("no release version in {}", path.display()))
    })?;
    debug!("Using releasever {} from {}", releasever, path.display());
    Ok(releasever)
}

/// The word after `release` in lines like `Fedora release 11.92 (Rawhide)`
fn release_from_text(text: &str) -> Option<String> {
    let mut words = text.split_whitespace();
    words.position(|word| word == "release")?;
    words.next().map(String::from)
}

fn normalize_basearch(arch: &str) -> &str {
    match arch {
        "i486" | "i586" | "i686" | "x86" => "i386",
        other => other,
    }
}

/// Converts `10s`, `10m`, `10h` and `10d` to seconds; anything malformed is 0
fn string_to_time(value: &str) -> u64 {
    let value = value.trim();
    if value.chars().count() < 2 {
        return 0;
    }

    let Some((idx, suffix)) = value.char_indices().last() else {
        return 0;
    };
    let number = &value[..idx];
    let Ok(number) = number.parse::<u64>() else {
        warn!("failed to convert {}", number);
        return 0;
    };

    match suffix {
        's' => number,
        'm' => number * 60,
        'h' => number * 60 * 60,
        'd' => number * 24 * 60 * 60,
        _ => {
            warn!("unknown suffix: '{}'", suffix);
            0
        }
    }
}
