// src/repository/download.rs

//! Fetching repository files from mirrors
//!
//! This module provides:
//! - the [`Fetcher`] transport seam and its HTTP implementation
//! - [`MirrorSet`], which rotates through a repository's base URLs until one
//!   returns usable content
//!
//! Mirror rotation is the only retry policy: each mirror is tried once, in
//! configured order.

use crate::cancel::Cancellable;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metadata::MetadataSource;
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Moves the contents of a URL into a local file
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, dest: &Path, cancel: &Cancellable) -> Result<()>;
}

/// Blocking HTTP transport
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout.unwrap_or(HTTP_TIMEOUT))
            .build()
            .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path, cancel: &Cancellable) -> Result<()> {
        debug!("GET {}", url);

        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to download {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| {
            Error::IoError(format!("Failed to create directory {}: {}", parent.display(), e))
        })?;

        // Write to a temporary file in the same directory, then rename
        let mut temp = NamedTempFile::new_in(parent)?;
        let mut buf = [0u8; 16 * 1024];
        loop {
            cancel.check()?;
            let n = response
                .read(&mut buf)
                .map_err(|e| Error::DownloadError(format!("Failed to read {}: {}", url, e)))?;
            if n == 0 {
                break;
            }
            temp.write_all(&buf[..n])?;
        }

        temp.persist(dest).map_err(|e| {
            Error::IoError(format!("Failed to move download to {}: {}", dest.display(), e))
        })?;
        Ok(())
    }
}

/// Does a downloaded file look like real content rather than an error page
fn looks_usable(path: &Path) -> Result<bool> {
    let mut head = [0u8; 6];
    let mut file = File::open(path)?;
    let n = file.read(&mut head)?;
    Ok(n > 0 && &head[..n] != b"<html>")
}

/// The resolved base URLs of one repository and a transport to use them
pub struct MirrorSet {
    repo_id: String,
    config: Arc<Config>,
    fetcher: Arc<dyn Fetcher>,
    base_urls: Vec<String>,
}

impl MirrorSet {
    pub fn new(repo_id: &str, config: Arc<Config>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            config,
            fetcher,
            base_urls: Vec::new(),
        }
    }

    pub fn base_urls(&self) -> &[String] {
        &self.base_urls
    }

    pub fn push(&mut self, base_url: String) {
        self.base_urls.push(base_url);
    }

    pub fn extend(&mut self, base_urls: impl IntoIterator<Item = String>) {
        self.base_urls.extend(base_urls);
    }

    pub fn clear(&mut self) {
        self.base_urls.clear();
    }

    fn ensure_online(&self, what: &str) -> Result<()> {
        if !self.config.network_enabled() {
            return Err(Error::Offline(format!(
                "failed to download {} as offline",
                what
            )));
        }
        Ok(())
    }

    /// Fetch an absolute URL straight to `dest`, bypassing the mirrors
    pub fn download_url(&self, url: &str, dest: &Path, cancel: &Cancellable) -> Result<()> {
        self.ensure_online(url)?;
        info!("Downloading {} to {}", url, dest.display());
        self.fetcher.fetch(url, dest, cancel)
    }

    /// Download `relative` into `directory`, trying each base URL in turn
    pub fn download(&self, relative: &str, directory: &Path, cancel: &Cancellable) -> Result<PathBuf> {
        self.ensure_online(relative)?;

        if relative.starts_with('/') {
            return Err(Error::DownloadError(format!(
                "filename {} must not be absolute",
                relative
            )));
        }
        if self.base_urls.is_empty() {
            return Err(Error::NoBaseUrls(self.repo_id.clone()));
        }

        let basename = relative.rsplit('/').next().unwrap_or(relative);
        let dest = directory.join(basename);

        for base_url in &self.base_urls {
            let url = format!("{}/{}", base_url.trim_end_matches('/'), relative);
            match self.fetcher.fetch(&url, &dest, cancel) {
                Ok(()) if looks_usable(&dest)? => {
                    info!("Downloaded {} for {}", url, self.repo_id);
                    return Ok(dest);
                }
                Ok(()) => {
                    warn!("{} returned an empty file or error page", url);
                    if let Err(e) = fs::remove_file(&dest) {
                        warn!("Failed to remove {}: {}", dest.display(), e);
                    }
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => warn!("Failed to download {}: {}", url, e),
            }
        }

        Err(Error::AllMirrorsFailed(format!(
            "{} for {}",
            relative, self.repo_id
        )))
    }
}

impl MetadataSource for MirrorSet {
    fn fetch(&self, location: &str, directory: &Path, cancel: &Cancellable) -> Result<()> {
        self.download(location, directory, cancel).map(|_| ())
    }
}
