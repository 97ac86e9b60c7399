// src/repository/set.rs

//! All repositories configured under `reposdir`

use crate::cancel::Cancellable;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::keyfile::KeyFile;
use crate::repository::{Fetcher, RemoteRepository};
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub struct RepositorySet {
    repos: Vec<RemoteRepository>,
}

impl RepositorySet {
    /// Load every repository from the configured `reposdir`
    pub fn load(config: Arc<Config>, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        let dir = config.repos_dir()?;
        Self::load_dir(&dir, config, fetcher)
    }

    /// Load every section of every `*.repo` file in `dir`
    pub fn load_dir(dir: &Path, config: Arc<Config>, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        let entries = fs::read_dir(dir).map_err(|e| {
            Error::IoError(format!("Failed to read repo directory {}: {}", dir.display(), e))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "repo") && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let mut repos = Vec::new();
        for path in &files {
            let keyfile = KeyFile::load(path)?;
            for id in keyfile.groups() {
                debug!("Found repository {} in {}", id, path.display());
                repos.push(RemoteRepository::new(
                    path,
                    &keyfile,
                    id,
                    config.clone(),
                    fetcher.clone(),
                )?);
            }
        }

        info!("Loaded {} repositories from {} files", repos.len(), files.len());
        Ok(Self { repos })
    }

    pub fn get_stores(&mut self) -> &mut [RemoteRepository] {
        &mut self.repos
    }

    pub fn get_stores_enabled(&mut self) -> Vec<&mut RemoteRepository> {
        self.repos.iter_mut().filter(|repo| repo.is_enabled()).collect()
    }

    pub fn get_store(&mut self, id: &str) -> Result<&mut RemoteRepository> {
        self.repos
            .iter_mut()
            .find(|repo| repo.id() == id)
            .ok_or_else(|| Error::NotFound(format!("no repository {}", id)))
    }

    /// Refresh every enabled repository in parallel
    ///
    /// Each repository writes only to its own cache directory. Returns one
    /// result per repository, in configured order.
    pub fn refresh_all(&mut self, force: bool, cancel: &Cancellable) -> Vec<(String, Result<()>)> {
        self.repos
            .par_iter_mut()
            .filter(|repo| repo.is_enabled())
            .map(|repo| (repo.id().to_string(), repo.refresh(force, cancel)))
            .collect()
    }
}
