// src/repository/mod.rs

//! Remote repositories
//!
//! A [`RemoteRepository`] is one `[id]` section of a `*.repo` file together
//! with the metadata handles for everything the repository publishes:
//! - mirror documents (mirrorlist, metalink) that expand the base URLs
//! - `repomd.xml`, which locates and checksums the rest
//! - the primary and filelists indexes and the comps group catalog
//! - changelogs and update advisories, loaded only when asked for
//!
//! Queries load whatever they need first, running each handle through its
//! validate, download and decompress pipeline. Operations take `&mut self`;
//! separate repositories own separate cache directories and can be driven
//! from separate threads.

pub mod descriptor;
pub mod download;
pub mod repomd;
pub mod set;

pub use descriptor::RepoDescriptor;
pub use download::{Fetcher, HTTP_TIMEOUT, HttpFetcher, MirrorSet};
pub use set::RepositorySet;

use crate::cancel::Cancellable;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::keyfile::KeyFile;
use crate::metadata::handle::{METALINK_LOCATION, MIRRORLIST_LOCATION};
use crate::metadata::{
    Category, Changeset, FilelistsIndex, GroupCatalog, MetadataFile, MetadataHandle, MetadataKind,
    Metalink, MirrorList, OtherIndex, PrimaryIndex, Update, UpdateInfo,
};
use crate::packages::{self, Package, PackageIdentity};
use crate::store::LocalStore;
use crate::version::compare_evr;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where repomd.xml lives relative to a base URL
pub const REPOMD_LOCATION: &str = "repodata/repomd.xml";

/// Metalink mirrors below this preference are not used
const METALINK_THRESHOLD: u32 = 50;

/// What `repo-list` shows for one repository
#[derive(Debug, Clone, Serialize)]
pub struct RepoSummary {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub devel: bool,
    /// When repomd.xml was last written to the cache
    pub updated: Option<DateTime<Utc>>,
}

pub struct RemoteRepository {
    descriptor: RepoDescriptor,
    repo_file: PathBuf,
    config: Arc<Config>,
    /// `<cachedir>/<id>`
    directory: PathBuf,
    mirrors: MirrorSet,
    primary: PrimaryIndex,
    filelists: FilelistsIndex,
    comps: GroupCatalog,
    other: OtherIndex,
    updateinfo: UpdateInfo,
    mirrorlist: MirrorList,
    metalink: Metalink,
    loaded_metadata: bool,
}

/// Download a mirror document straight from its URL, then parse it
fn load_mirror_document(
    file: &mut dyn MetadataFile,
    url: &str,
    mirrors: &MirrorSet,
    force: bool,
    cancel: &Cancellable,
) -> Result<()> {
    let path = file
        .md()
        .filename()
        .map(Path::to_path_buf)
        .ok_or_else(|| Error::Incomplete(format!("no cache path for {}", url)))?;

    if force || !path.exists() {
        file.invalidate();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        mirrors.download_url(url, &path, cancel)?;
    }
    file.load(false, mirrors, cancel)
}

/// Cached copy still matches repomd.xml
fn is_current(md: &MetadataHandle, cancel: &Cancellable) -> bool {
    let compressed = md.filename() != md.filename_uncompressed();
    md.file_check(compressed, cancel).is_ok()
}

impl RemoteRepository {
    /// Build repository `id` from an already-parsed repo file
    pub fn new(
        repo_file: &Path,
        keyfile: &KeyFile,
        id: &str,
        config: Arc<Config>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let descriptor = RepoDescriptor::from_keyfile(keyfile, id, &config)?;
        let directory = config.cache_dir()?.join(id);

        let mut mirrorlist = MirrorList::new(id, config.clone())?;
        mirrorlist
            .md_mut()
            .set_filename(&directory.join(MIRRORLIST_LOCATION));
        let mut metalink = Metalink::new(id, config.clone())?;
        metalink.md_mut().set_filename(&directory.join(METALINK_LOCATION));

        let mut repo = Self {
            mirrors: MirrorSet::new(id, config.clone(), fetcher),
            primary: PrimaryIndex::new(id)?,
            filelists: FilelistsIndex::new(id)?,
            comps: GroupCatalog::new(id)?,
            other: OtherIndex::new(id)?,
            updateinfo: UpdateInfo::new(id)?,
            mirrorlist,
            metalink,
            descriptor,
            repo_file: repo_file.to_path_buf(),
            config,
            directory,
            loaded_metadata: false,
        };
        repo.reset_base_urls();
        Ok(repo)
    }

    /// Read repository `id` from a repo file on disk
    pub fn open(
        repo_file: &Path,
        id: &str,
        config: Arc<Config>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let keyfile = KeyFile::load(repo_file)?;
        Self::new(repo_file, &keyfile, id, config, fetcher)
    }

    /// Re-read the descriptor, dropping everything derived from the old one
    pub fn load_descriptor(&mut self) -> Result<()> {
        let keyfile = KeyFile::load(&self.repo_file)?;
        self.descriptor = RepoDescriptor::from_keyfile(&keyfile, &self.descriptor.id, &self.config)?;
        self.invalidate();
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn name_expanded(&self) -> &str {
        &self.descriptor.name_expanded
    }

    pub fn is_enabled(&self) -> bool {
        self.descriptor.enabled
    }

    pub fn is_devel(&self) -> bool {
        self.descriptor.is_devel()
    }

    pub fn descriptor(&self) -> &RepoDescriptor {
        &self.descriptor
    }

    pub fn repo_file(&self) -> &Path {
        &self.repo_file
    }

    /// Cache directory for this repository
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Base URLs resolved so far, literal first
    pub fn base_urls(&self) -> &[String] {
        self.mirrors.base_urls()
    }

    pub fn repomd_path(&self) -> PathBuf {
        self.directory.join("repomd.xml")
    }

    pub fn summary(&self) -> RepoSummary {
        let updated = fs::metadata(self.repomd_path())
            .and_then(|meta| meta.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        RepoSummary {
            id: self.descriptor.id.clone(),
            name: self.descriptor.name_expanded.clone(),
            enabled: self.descriptor.enabled,
            devel: self.is_devel(),
            updated,
        }
    }

    /// Rewrite `enabled` in the repo file and adopt the new value
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        descriptor::write_enabled(&self.repo_file, &self.descriptor.id, enabled)?;
        self.descriptor.enabled = enabled;
        info!(
            "{} repository {}",
            if enabled { "Enabled" } else { "Disabled" },
            self.descriptor.id
        );
        Ok(())
    }

    fn online(&self) -> bool {
        self.config.network_enabled()
    }

    fn ensure_online(&self, what: &str) -> Result<()> {
        if !self.online() {
            return Err(Error::Offline(format!("cannot {} {}", what, self.descriptor.id)));
        }
        Ok(())
    }

    /// Drop mirror-derived URLs, keeping the configured `baseurl`
    fn reset_base_urls(&mut self) {
        self.mirrors.clear();
        if let Some(baseurl) = &self.descriptor.baseurl {
            self.mirrors.push(baseurl.clone());
        }
    }

    /// Append the mirrors named by the mirrorlist and metalink, in that order
    fn resolve_mirrors(&mut self, force: bool, cancel: &Cancellable) -> Result<()> {
        self.reset_base_urls();

        if let Some(url) = self.descriptor.mirrorlist.clone() {
            load_mirror_document(&mut self.mirrorlist, &url, &self.mirrors, force, cancel)?;
            let uris = self.mirrorlist.get_uris()?;
            if uris.is_empty() {
                return Err(Error::NoBaseUrls(format!(
                    "{} (mirrorlist {} has no usable mirrors)",
                    self.descriptor.id, url
                )));
            }
            debug!("{} mirrors from mirrorlist for {}", uris.len(), self.descriptor.id);
            self.mirrors.extend(uris);
        }

        if let Some(url) = self.descriptor.metalink.clone() {
            load_mirror_document(&mut self.metalink, &url, &self.mirrors, force, cancel)?;
            let uris = self.metalink.get_uris(METALINK_THRESHOLD)?;
            if uris.is_empty() {
                return Err(Error::NoBaseUrls(format!(
                    "{} (metalink {} has no usable mirrors)",
                    self.descriptor.id, url
                )));
            }
            debug!("{} mirrors from metalink for {}", uris.len(), self.descriptor.id);
            self.mirrors.extend(uris);
        }

        if self.mirrors.base_urls().is_empty() {
            return Err(Error::NoBaseUrls(self.descriptor.id.clone()));
        }
        Ok(())
    }

    /// Copy what repomd.xml says about each artifact onto its handle
    fn apply_repomd(&mut self, path: &Path) -> Result<()> {
        let records = repomd::parse_file(path)?;

        let files: [&mut dyn MetadataFile; 5] = [
            &mut self.primary,
            &mut self.filelists,
            &mut self.comps,
            &mut self.other,
            &mut self.updateinfo,
        ];
        for file in files {
            file.invalidate();
            file.md_mut().reset();
        }

        for record in records {
            let md = match repomd::kind_for_type(&record.data_type)? {
                Some(MetadataKind::Primary) => self.primary.md_mut(),
                Some(MetadataKind::Filelists) => self.filelists.md_mut(),
                Some(MetadataKind::Comps) => self.comps.md_mut(),
                Some(MetadataKind::Other) => self.other.md_mut(),
                Some(MetadataKind::Updateinfo) => self.updateinfo.md_mut(),
                _ => continue,
            };

            if let Some(location) = &record.location {
                md.set_location(location)?;
            }
            if let Some(checksum) = &record.checksum {
                md.set_checksum(checksum)?;
            }
            if let Some(checksum_type) = record.checksum_type {
                md.set_checksum_type(checksum_type)?;
            }
            if let Some(checksum) = &record.checksum_open {
                md.set_checksum_uncompressed(checksum)?;
            }
            if let Some(timestamp) = record.timestamp {
                md.set_timestamp(timestamp)?;
            }
        }

        for md in [
            self.primary.md_mut(),
            self.filelists.md_mut(),
            self.comps.md_mut(),
            self.other.md_mut(),
            self.updateinfo.md_mut(),
        ] {
            md.check_complete()?;
            let Some(location) = md.location() else {
                continue;
            };
            let basename = location.rsplit('/').next().unwrap_or(location).to_string();
            md.set_filename(&self.directory.join(basename));
        }

        if self.primary.md().location().is_none() {
            return Err(Error::Incomplete(format!(
                "no primary_db in repomd.xml for {}",
                self.descriptor.id
            )));
        }

        self.primary.set_filelists_path(
            self.filelists
                .md()
                .filename_uncompressed()
                .map(Path::to_path_buf),
        );
        Ok(())
    }

    /// Resolve mirrors and read repomd.xml, fetching it if it is not cached
    ///
    /// Does nothing once it has succeeded, until the next invalidation.
    pub fn load_metadata(&mut self, cancel: &Cancellable) -> Result<()> {
        if self.loaded_metadata {
            return Ok(());
        }

        self.resolve_mirrors(false, cancel)?;

        let repomd = self.repomd_path();
        if !repomd.exists() {
            self.ensure_online("fetch repomd.xml for")?;
            fs::create_dir_all(&self.directory).map_err(|e| {
                Error::IoError(format!(
                    "Failed to create directory {}: {}",
                    self.directory.display(),
                    e
                ))
            })?;
            self.mirrors.download(REPOMD_LOCATION, &self.directory, cancel)?;
        }

        self.apply_repomd(&repomd)?;
        self.loaded_metadata = true;
        debug!("Loaded metadata for {}", self.descriptor.id);
        Ok(())
    }

    /// Download a file from the first mirror that serves it
    pub fn download(
        &mut self,
        relative: &str,
        directory: &Path,
        cancel: &Cancellable,
    ) -> Result<PathBuf> {
        self.ensure_online("download from")?;
        if relative.starts_with('/') {
            return Err(Error::DownloadError(format!(
                "filename {} must not be absolute",
                relative
            )));
        }
        self.load_metadata(cancel)?;
        self.mirrors.download(relative, directory, cancel)
    }

    /// Fetch a fresh repomd.xml and bring every artifact up to date
    ///
    /// Artifacts whose cached copy still matches are left alone unless
    /// `force` is set.
    pub fn refresh(&mut self, force: bool, cancel: &Cancellable) -> Result<()> {
        self.ensure_online("refresh")?;
        info!("Refreshing {}", self.descriptor.id);

        self.invalidate();
        self.resolve_mirrors(force, cancel)?;

        fs::create_dir_all(&self.directory)?;
        let repomd = self.mirrors.download(REPOMD_LOCATION, &self.directory, cancel)?;
        self.apply_repomd(&repomd)?;
        self.loaded_metadata = true;

        for md in [
            self.primary.md(),
            self.filelists.md(),
            self.comps.md(),
            self.other.md(),
            self.updateinfo.md(),
        ] {
            if md.location().is_none() {
                continue;
            }
            if !force && is_current(md, cancel) {
                debug!("{} for {} is up to date", md.kind().map(|k| k.as_str()).unwrap_or("?"), md.id());
                continue;
            }
            md.clean()?;
            md.prepare(true, &self.mirrors, cancel)?;
        }

        info!("Refreshed {}", self.descriptor.id);
        Ok(())
    }

    /// Delete every cached file for this repository
    ///
    /// Metadata is loaded first, best effort, so the handles know their
    /// filenames.
    pub fn clean(&mut self, cancel: &Cancellable) -> Result<()> {
        if let Err(e) = self.load_metadata(cancel) {
            debug!("failed to load metadata for {} before clean: {}", self.descriptor.id, e);
        }

        let files: [&mut dyn MetadataFile; 7] = [
            &mut self.primary,
            &mut self.filelists,
            &mut self.comps,
            &mut self.other,
            &mut self.updateinfo,
            &mut self.mirrorlist,
            &mut self.metalink,
        ];
        for file in files {
            file.clean()?;
        }

        match fs::remove_file(self.repomd_path()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to delete {}: {}",
                    self.repomd_path().display(),
                    e
                )));
            }
        }

        self.invalidate();
        info!("Cleaned {}", self.descriptor.id);
        Ok(())
    }

    /// Forget everything loaded from the cache
    ///
    /// Called when a cached file changes underneath us. The next query
    /// reloads from disk.
    pub fn invalidate(&mut self) {
        let files: [&mut dyn MetadataFile; 7] = [
            &mut self.primary,
            &mut self.filelists,
            &mut self.comps,
            &mut self.other,
            &mut self.updateinfo,
            &mut self.mirrorlist,
            &mut self.metalink,
        ];
        for file in files {
            file.invalidate();
            file.md_mut().reset();
        }

        self.primary.set_filelists_path(None);
        self.loaded_metadata = false;
        self.reset_base_urls();
        debug!("Invalidated {}", self.descriptor.id);
    }

    fn primary_index(&mut self, cancel: &Cancellable) -> Result<&PrimaryIndex> {
        self.load_metadata(cancel)?;
        let online = self.online();
        self.primary.load(online, &self.mirrors, cancel)?;
        Ok(&self.primary)
    }

    /// Make sure package file lists can be read
    pub fn load_filelists(&mut self, cancel: &Cancellable) -> Result<()> {
        self.load_metadata(cancel)?;
        if self.filelists.md().location().is_none() {
            return Err(Error::Incomplete(format!(
                "no filelists_db in repomd.xml for {}",
                self.descriptor.id
            )));
        }
        let online = self.online();
        self.filelists.load(online, &self.mirrors, cancel)
    }

    /// Load the comps catalog, or report that the repository has none
    fn load_comps(&mut self, cancel: &Cancellable) -> Result<bool> {
        self.load_metadata(cancel)?;
        if self.comps.md().location().is_none() {
            debug!("no group_gz for {}", self.descriptor.id);
            return Ok(false);
        }
        let online = self.online();
        self.comps.load(online, &self.mirrors, cancel)?;
        Ok(true)
    }

    fn load_other(&mut self, cancel: &Cancellable) -> Result<()> {
        self.load_metadata(cancel)?;
        if self.other.md().location().is_none() {
            return Err(Error::Incomplete(format!(
                "no other_db in repomd.xml for {}",
                self.descriptor.id
            )));
        }
        let online = self.online();
        self.other.load(online, &self.mirrors, cancel)
    }

    fn load_updateinfo(&mut self, cancel: &Cancellable) -> Result<()> {
        self.load_metadata(cancel)?;
        if self.updateinfo.md().location().is_none() {
            return Err(Error::Incomplete(format!(
                "no updateinfo in repomd.xml for {}",
                self.descriptor.id
            )));
        }
        let online = self.online();
        self.updateinfo.load(online, &self.mirrors, cancel)
    }

    pub fn resolve(&mut self, name: &str, cancel: &Cancellable) -> Result<Vec<Package>> {
        self.primary_index(cancel)?.resolve(name)
    }

    pub fn search_name(&mut self, text: &str, cancel: &Cancellable) -> Result<Vec<Package>> {
        self.primary_index(cancel)?.search_name(text)
    }

    pub fn search_details(&mut self, text: &str, cancel: &Cancellable) -> Result<Vec<Package>> {
        self.primary_index(cancel)?.search_details(text)
    }

    pub fn search_group(&mut self, group: &str, cancel: &Cancellable) -> Result<Vec<Package>> {
        self.primary_index(cancel)?.search_group(group)
    }

    pub fn get_packages(&mut self, cancel: &Cancellable) -> Result<Vec<Package>> {
        self.primary_index(cancel)?.get_packages()
    }

    pub fn what_provides(&mut self, name: &str, cancel: &Cancellable) -> Result<Vec<Package>> {
        self.primary_index(cancel)?.what_provides(name)
    }

    /// Packages shipping the absolute path `path`
    pub fn search_file(&mut self, path: &str, cancel: &Cancellable) -> Result<Vec<Package>> {
        self.load_filelists(cancel)?;
        let pkg_ids = self.filelists.search_file(path)?;

        let primary = self.primary_index(cancel)?;
        let mut packages = Vec::new();
        for pkg_id in pkg_ids {
            packages.extend(primary.search_pkgid(&pkg_id)?);
        }
        Ok(packages)
    }

    /// The single package with this `name;evr;arch;data` id
    pub fn find_package(&mut self, package_id: &str, cancel: &Cancellable) -> Result<Package> {
        let id = PackageIdentity::parse(package_id)?;
        let wanted = id.to_string();

        let mut matches: Vec<Package> = self
            .primary_index(cancel)?
            .find_by_name_arch(&id.name, &id.arch)?
            .into_iter()
            .filter(|package| package.id().to_string() == wanted)
            .collect();

        match matches.len() {
            0 => Err(Error::NotFound(format!(
                "{} in {}",
                package_id, self.descriptor.id
            ))),
            1 => matches
                .pop()
                .ok_or_else(|| Error::NotFound(package_id.to_string())),
            n => Err(Error::MultipleMatches(format!(
                "{} packages match {} in {}",
                n, package_id, self.descriptor.id
            ))),
        }
    }

    /// Remote packages newer than what `store` has installed
    pub fn get_updates(&mut self, store: &dyn LocalStore, cancel: &Cancellable) -> Result<Vec<Package>> {
        let installed = store.get_packages()?;
        let primary = self.primary_index(cancel)?;

        let mut updates = Vec::new();
        for package in &installed {
            for candidate in primary.resolve(package.name())? {
                // arch alone never makes an update
                if compare_evr(&candidate.id().evr(), &package.id().evr()) == Ordering::Greater {
                    debug!("{} updates {}", candidate.id(), package.id());
                    updates.push(candidate);
                }
            }
        }
        Ok(updates)
    }

    /// Changelog of one package, newest entry first
    pub fn get_changelog(&mut self, package_id: &str, cancel: &Cancellable) -> Result<Vec<Changeset>> {
        let package = self.find_package(package_id, cancel)?;
        let pkg_id = package
            .pkg_id()
            .ok_or_else(|| Error::NotFound(format!("no index id for {}", package_id)))?
            .to_string();

        self.load_other(cancel)?;
        self.other.get_changelog(&pkg_id)
    }

    /// Advisories that ship the package `package_id`
    pub fn get_update_detail(&mut self, package_id: &str, cancel: &Cancellable) -> Result<Vec<Update>> {
        PackageIdentity::parse(package_id)?;
        self.load_updateinfo(cancel)?;
        self.updateinfo.get_detail_for_package(package_id)
    }

    /// Every category followed by the groups it lists
    pub fn get_categories(&mut self, cancel: &Cancellable) -> Result<Vec<Category>> {
        if !self.load_comps(cancel)? {
            return Ok(Vec::new());
        }

        let mut categories = Vec::new();
        for category in self.comps.get_categories()? {
            let groups = self.comps.get_groups_for_category(&category.id)?;
            categories.push(category);
            categories.extend(groups);
        }
        Ok(categories)
    }

    /// Newest package for each member of a comps group
    ///
    /// Installed packages from `store` win over available ones. Members found
    /// in neither are skipped.
    pub fn search_category(
        &mut self,
        group_id: &str,
        store: &dyn LocalStore,
        cancel: &Cancellable,
    ) -> Result<Vec<Package>> {
        if !self.load_comps(cancel)? {
            return Ok(Vec::new());
        }

        let names = match self.comps.get_packages_for_group(group_id) {
            Ok(names) => names,
            Err(Error::NotFound(msg)) => {
                debug!("{}", msg);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let primary = self.primary_index(cancel)?;
        let mut packages = Vec::with_capacity(names.len());
        for name in &names {
            let installed = store.resolve(name).unwrap_or_else(|e| {
                warn!("failed to resolve installed {}: {}", name, e);
                Vec::new()
            });
            if let Ok(package) = packages::newest(&installed) {
                packages.push(package.clone());
                continue;
            }

            let available = primary.resolve(name).unwrap_or_else(|e| {
                warn!("failed to resolve {}: {}", name, e);
                Vec::new()
            });
            match packages::newest(&available) {
                Ok(package) => packages.push(package.clone()),
                Err(_) => debug!("failed to get {} locally or remotely", name),
            }
        }
        Ok(packages)
    }
}
