// src/packages/mod.rs

//! Package value model
//!
//! A [`Package`] is keyed by a [`PackageIdentity`] and carries a set of
//! optional fields that are filled in lazily:
//! - remote packages get their scalar fields from the primary index row and
//!   read files and dependencies on demand
//! - installed packages read every field on demand from their RPM header
//!
//! Each optional field moves from unset to set exactly once. A second set
//! is an [`Error::AlreadySet`].

pub mod depend;
pub mod local;
pub mod remote;

pub use depend::{Depend, DependFlag};
pub use local::LocalPackage;
pub use remote::RemotePackage;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::version::{compare_evr, split_evr};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Immutable text shared between packages without copying
pub type SharedString = Arc<str>;

/// Origin recorded in the package id of installed packages
pub const INSTALLED_DATA: &str = "installed";

/// Name, EVR, architecture and origin of a package
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PackageIdentity {
    pub name: String,
    pub epoch: Option<u32>,
    pub version: String,
    pub release: String,
    pub arch: String,
    /// `installed` or the repository id
    pub data: String,
}

impl PackageIdentity {
    pub fn new(
        name: impl Into<String>,
        epoch: Option<u32>,
        version: impl Into<String>,
        release: impl Into<String>,
        arch: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            epoch,
            version: version.into(),
            release: release.into(),
            arch: arch.into(),
            data: data.into(),
        }
    }

    /// Parse a `name;[epoch:]version-release;arch;data` package id
    pub fn parse(package_id: &str) -> Result<Self> {
        let parts: Vec<&str> = package_id.split(';').collect();
        if parts.len() != 4 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(Error::InvalidPackageId(package_id.to_string()));
        }

        let (epoch, version, release) = split_evr(parts[1]);
        let epoch = match epoch {
            Some(epoch) => Some(
                epoch
                    .parse()
                    .map_err(|_| Error::InvalidPackageId(package_id.to_string()))?,
            ),
            None => None,
        };

        Ok(Self::new(
            parts[0],
            epoch,
            version,
            release.unwrap_or_default(),
            parts[2],
            parts[3],
        ))
    }

    /// `[epoch:]version-release`, with a zero epoch left out
    pub fn evr(&self) -> String {
        match self.epoch {
            Some(epoch) if epoch > 0 => format!("{}:{}-{}", epoch, self.version, self.release),
            _ => format!("{}-{}", self.version, self.release),
        }
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{};{}", self.name, self.evr(), self.arch, self.data)
    }
}

/// Build a package id from index columns
///
/// The epoch is dropped when it is missing or starts with `0`.
pub fn package_id_from_nevra(
    name: &str,
    epoch: Option<&str>,
    version: &str,
    release: &str,
    arch: &str,
    data: &str,
) -> String {
    match epoch {
        Some(epoch) if !epoch.is_empty() && !epoch.starts_with('0') => {
            format!("{};{}:{}-{};{};{}", name, epoch, version, release, arch, data)
        }
        _ => format!("{};{}-{};{};{}", name, version, release, arch, data),
    }
}

/// Optional package fields that may need a lazy fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageField {
    Files,
    Summary,
    License,
    Description,
    Url,
    Size,
    Group,
    Requires,
    Provides,
    Conflicts,
    Obsoletes,
    Category,
    LocationHref,
}

impl PackageField {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageField::Files => "files",
            PackageField::Summary => "summary",
            PackageField::License => "license",
            PackageField::Description => "description",
            PackageField::Url => "url",
            PackageField::Size => "size",
            PackageField::Group => "group",
            PackageField::Requires => "requires",
            PackageField::Provides => "provides",
            PackageField::Conflicts => "conflicts",
            PackageField::Obsoletes => "obsoletes",
            PackageField::Category => "category",
            PackageField::LocationHref => "location_href",
        }
    }
}

impl fmt::Display for PackageField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse UI grouping of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Group {
    Accessories,
    AdminTools,
    Communication,
    DesktopGnome,
    DesktopKde,
    DesktopOther,
    Education,
    Fonts,
    Games,
    Graphics,
    Internet,
    Localization,
    Multimedia,
    Network,
    Office,
    Programming,
    Publishing,
    Security,
    Servers,
    System,
    Virtualization,
    Documentation,
    Other,
}

impl Group {
    /// Map an RPM group (`Development/Libraries`) or comps group id
    /// (`gnome-desktop`) onto a UI group
    pub fn for_category(category: &str) -> Option<Group> {
        const TABLE: &[(&str, Group)] = &[
            ("amusements", Group::Games),
            ("applications/archiving", Group::Accessories),
            ("applications/communications", Group::Communication),
            ("applications/editors", Group::Accessories),
            ("applications/emulators", Group::Virtualization),
            ("applications/internet", Group::Internet),
            ("applications/multimedia", Group::Multimedia),
            ("applications/productivity", Group::Office),
            ("applications/publishing", Group::Publishing),
            ("applications/system", Group::AdminTools),
            ("applications/text", Group::Accessories),
            ("development", Group::Programming),
            ("documentation", Group::Documentation),
            ("system environment/daemons", Group::Servers),
            ("system environment", Group::System),
            ("user interface/desktops", Group::DesktopOther),
            ("user interface/x", Group::DesktopOther),
            ("user interface", Group::DesktopOther),
            ("admin-tools", Group::AdminTools),
            ("system-tools", Group::AdminTools),
            ("base", Group::System),
            ("core", Group::System),
            ("kde-desktop", Group::DesktopKde),
            ("gnome-desktop", Group::DesktopGnome),
            ("xfce-desktop", Group::DesktopOther),
            ("fonts", Group::Fonts),
            ("education", Group::Education),
            ("games", Group::Games),
            ("graphics", Group::Graphics),
            ("graphical-internet", Group::Internet),
            ("text-internet", Group::Internet),
            ("office", Group::Office),
            ("sound-and-video", Group::Multimedia),
            ("authoring-and-publishing", Group::Publishing),
            ("security", Group::Security),
            ("web-server", Group::Servers),
            ("mail-server", Group::Servers),
            ("network-server", Group::Network),
            ("virtualization", Group::Virtualization),
            ("development-tools", Group::Programming),
            ("development-libs", Group::Programming),
            ("language-support", Group::Localization),
        ];

        let lower = category.to_ascii_lowercase();
        if lower.ends_with("-support") {
            return Some(Group::Localization);
        }

        TABLE
            .iter()
            .find(|(prefix, _)| lower == *prefix || lower.starts_with(&format!("{}/", prefix)))
            .map(|(_, group)| *group)
    }
}

/// Short names of licenses considered free
const FREE_LICENSES: &[&str] = &[
    "AFL", "AGPLv1", "AGPLv3", "APSL 2.0", "ASL 1.0", "ASL 1.1", "ASL 2.0", "Artistic 2.0",
    "Artistic clarified", "BSD", "BSD with advertising", "Boost", "CC0", "CDDL", "CPL",
    "Copyright only", "EPL", "FTL", "GFDL", "GPL", "GPLv1", "GPLv2", "GPLv2 with exceptions",
    "GPLv3", "GPLv3 with exceptions", "IBM", "ISC", "LGPL", "LGPLv2", "LGPLv2 with exceptions",
    "LGPLv3", "LPPL", "MIT", "MPLv1.0", "MPLv1.1", "MPLv2.0", "NCSA", "OFL", "OpenLDAP",
    "OpenSSL", "PHP", "Public Domain", "Python", "QPL", "Ruby", "SISSL", "Sleepycat", "TCL",
    "UCD", "Vim", "W3C", "X11", "ZPLv2.1", "Zend", "zlib", "zlib with acknowledgement",
    "Artistic",
];

/// Populates one field of a package from its backing data
///
/// Implementations set the field on `package` with the matching setter, or
/// leave it unset when the backing data has no value for it.
pub trait EnsureData {
    fn ensure(&self, package: &Package, field: PackageField) -> Result<()>;
}

/// Where a package's lazily-fetched fields come from
#[derive(Debug, Clone)]
pub enum PackageSource {
    Local(LocalPackage),
    Remote(RemotePackage),
}

impl EnsureData for PackageSource {
    fn ensure(&self, package: &Package, field: PackageField) -> Result<()> {
        match self {
            PackageSource::Local(local) => local.ensure(package, field),
            PackageSource::Remote(remote) => remote.ensure(package, field),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Fields {
    summary: OnceLock<SharedString>,
    description: OnceLock<SharedString>,
    license: OnceLock<SharedString>,
    url: OnceLock<SharedString>,
    category: OnceLock<SharedString>,
    location_href: OnceLock<SharedString>,
    group: OnceLock<Group>,
    size: OnceLock<u64>,
    files: OnceLock<Vec<String>>,
    requires: OnceLock<Vec<Depend>>,
    provides: OnceLock<Vec<Depend>>,
    conflicts: OnceLock<Vec<Depend>>,
    obsoletes: OnceLock<Vec<Depend>>,
}

/// A package, installed or available from a repository
#[derive(Debug, Clone)]
pub struct Package {
    id: PackageIdentity,
    installed: bool,
    fields: Fields,
    source: Option<PackageSource>,
}

fn set_once<T: fmt::Debug>(cell: &OnceLock<T>, field: PackageField, value: T) -> Result<()> {
    cell.set(value).map_err(|requested| Error::AlreadySet {
        field: field.as_str(),
        current: cell.get().map(|v| format!("{:?}", v)).unwrap_or_default(),
        requested: format!("{:?}", requested),
    })
}

impl Package {
    /// Package whose fields are all supplied through the setters
    pub fn new(id: PackageIdentity, installed: bool) -> Self {
        Self {
            id,
            installed,
            fields: Fields::default(),
            source: None,
        }
    }

    /// Package that fetches missing fields from `source` on first access
    pub fn with_source(id: PackageIdentity, installed: bool, source: PackageSource) -> Self {
        Self {
            id,
            installed,
            fields: Fields::default(),
            source: Some(source),
        }
    }

    pub fn id(&self) -> &PackageIdentity {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn arch(&self) -> &str {
        &self.id.arch
    }

    /// `name;evr;arch;data`
    pub fn package_id(&self) -> String {
        self.id.to_string()
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Checksum id inside the repository index, for remote packages
    pub fn pkg_id(&self) -> Option<&str> {
        match &self.source {
            Some(PackageSource::Remote(remote)) => Some(remote.pkg_id()),
            _ => None,
        }
    }

    /// Make sure `field` has been fetched from the backing data
    pub fn ensure(&self, field: PackageField) -> Result<()> {
        match &self.source {
            Some(source) => source.ensure(self, field),
            None => Ok(()),
        }
    }

    fn lazy<'a, T>(&'a self, cell: &'a OnceLock<T>, field: PackageField) -> Result<&'a T> {
        if cell.get().is_none() {
            self.ensure(field)?;
        }
        cell.get()
            .ok_or_else(|| Error::NotFound(format!("no {} for {}", field, self.id)))
    }

    pub fn summary(&self) -> Result<&SharedString> {
        self.lazy(&self.fields.summary, PackageField::Summary)
    }

    pub fn description(&self) -> Result<&SharedString> {
        self.lazy(&self.fields.description, PackageField::Description)
    }

    pub fn license(&self) -> Result<&SharedString> {
        self.lazy(&self.fields.license, PackageField::License)
    }

    pub fn url(&self) -> Result<&SharedString> {
        self.lazy(&self.fields.url, PackageField::Url)
    }

    /// RPM group text, e.g. `System Environment/Base`
    pub fn category(&self) -> Result<&SharedString> {
        self.lazy(&self.fields.category, PackageField::Category)
    }

    pub fn group(&self) -> Result<Group> {
        self.lazy(&self.fields.group, PackageField::Group).copied()
    }

    pub fn size(&self) -> Result<u64> {
        self.lazy(&self.fields.size, PackageField::Size).copied()
    }

    pub fn files(&self) -> Result<&[String]> {
        self.lazy(&self.fields.files, PackageField::Files)
            .map(Vec::as_slice)
    }

    pub fn requires(&self) -> Result<&[Depend]> {
        self.lazy(&self.fields.requires, PackageField::Requires)
            .map(Vec::as_slice)
    }

    pub fn provides(&self) -> Result<&[Depend]> {
        self.lazy(&self.fields.provides, PackageField::Provides)
            .map(Vec::as_slice)
    }

    pub fn conflicts(&self) -> Result<&[Depend]> {
        self.lazy(&self.fields.conflicts, PackageField::Conflicts)
            .map(Vec::as_slice)
    }

    pub fn obsoletes(&self) -> Result<&[Depend]> {
        self.lazy(&self.fields.obsoletes, PackageField::Obsoletes)
            .map(Vec::as_slice)
    }

    /// Path of the package file relative to the repository root
    pub fn filename(&self) -> Result<&SharedString> {
        if self.installed {
            return Err(Error::NotFound(format!(
                "cannot get remote filename for installed package {}",
                self.id
            )));
        }
        self.fields
            .location_href
            .get()
            .ok_or_else(|| Error::NotFound(format!("no data for {}", self.id.name)))
    }

    pub fn set_summary(&self, summary: SharedString) -> Result<()> {
        set_once(&self.fields.summary, PackageField::Summary, summary)
    }

    pub fn set_description(&self, description: SharedString) -> Result<()> {
        set_once(&self.fields.description, PackageField::Description, description)
    }

    pub fn set_license(&self, license: SharedString) -> Result<()> {
        set_once(&self.fields.license, PackageField::License, license)
    }

    pub fn set_url(&self, url: SharedString) -> Result<()> {
        set_once(&self.fields.url, PackageField::Url, url)
    }

    pub fn set_category(&self, category: SharedString) -> Result<()> {
        set_once(&self.fields.category, PackageField::Category, category)
    }

    pub fn set_location_href(&self, location_href: SharedString) -> Result<()> {
        set_once(&self.fields.location_href, PackageField::LocationHref, location_href)
    }

    pub fn set_group(&self, group: Group) -> Result<()> {
        set_once(&self.fields.group, PackageField::Group, group)
    }

    pub fn set_size(&self, size: u64) -> Result<()> {
        set_once(&self.fields.size, PackageField::Size, size)
    }

    pub fn set_files(&self, files: Vec<String>) -> Result<()> {
        set_once(&self.fields.files, PackageField::Files, files)
    }

    pub fn set_requires(&self, requires: Vec<Depend>) -> Result<()> {
        set_once(&self.fields.requires, PackageField::Requires, requires)
    }

    pub fn set_provides(&self, provides: Vec<Depend>) -> Result<()> {
        set_once(&self.fields.provides, PackageField::Provides, provides)
    }

    pub fn set_conflicts(&self, conflicts: Vec<Depend>) -> Result<()> {
        set_once(&self.fields.conflicts, PackageField::Conflicts, conflicts)
    }

    pub fn set_obsoletes(&self, obsoletes: Vec<Depend>) -> Result<()> {
        set_once(&self.fields.obsoletes, PackageField::Obsoletes, obsoletes)
    }

    /// Order two builds of the same package
    ///
    /// Returns `None` when the names differ. Equal versions fall back to
    /// the architecture so the ordering is deterministic.
    pub fn compare(&self, other: &Package) -> Option<Ordering> {
        if self.id.name != other.id.name {
            warn!("comparing between {} and {}", self.id, other.id);
            return None;
        }

        Some(
            compare_evr(&self.id.evr(), &other.id.evr())
                .then_with(|| other.id.arch.cmp(&self.id.arch)),
        )
    }

    /// Development, debug or library subpackage
    pub fn is_devel(&self) -> bool {
        ["-debuginfo", "-devel", "-static", "-libs"]
            .iter()
            .any(|suffix| self.id.name.ends_with(suffix))
    }

    /// Links against a graphical toolkit
    pub fn is_gui(&self) -> Result<bool> {
        Ok(self
            .requires()?
            .iter()
            .any(|depend| depend.name().contains("gtk") || depend.name().contains("kde")))
    }

    /// Every `and` clause has at least one free license among its `or` choices
    pub fn is_free(&self) -> Result<bool> {
        Ok(license_is_free(self.license()?))
    }

    /// Architecture is native to this machine
    pub fn is_native(&self, config: &Config) -> Result<bool> {
        Ok(config.basearch_list()?.iter().any(|arch| *arch == self.id.arch))
    }
}

fn license_is_free(license: &str) -> bool {
    let mut one_free_group = false;

    for group in license.split(" and ") {
        let group = group.replace(['(', ')'], " ");
        let mut group_is_free = false;

        for candidate in group.split(" or ") {
            let candidate = candidate.replace('+', " ");
            let candidate = candidate.trim();
            if candidate.is_empty() {
                continue;
            }
            if FREE_LICENSES.contains(&candidate) {
                group_is_free = true;
                one_free_group = true;
                break;
            }
        }

        if !group_is_free {
            return false;
        }
    }

    one_free_group
}

/// Newest package in a list of builds of the same package
pub fn newest(packages: &[Package]) -> Result<&Package> {
    let (first, rest) = packages
        .split_first()
        .ok_or_else(|| Error::NotFound("nothing in array".to_string()))?;

    Ok(rest.iter().fold(first, |newest, package| {
        match package.compare(newest) {
            Some(Ordering::Greater) => package,
            _ => newest,
        }
    }))
}

/// Keep only the newest build of each package name, in first-seen order
pub fn filter_newest(packages: Vec<Package>) -> Vec<Package> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<Package> = Vec::with_capacity(packages.len());

    for package in packages {
        match index.get(package.name()) {
            None => {
                index.insert(package.name().to_string(), kept.len());
                kept.push(package);
            }
            Some(&slot) => {
                if package.compare(&kept[slot]) == Some(Ordering::Less) {
                    debug!("{} is older than {}, so ignoring it", package.id, kept[slot].id);
                    continue;
                }
                debug!("replacing {} with {}", kept[slot].id, package.id);
                kept[slot] = package;
            }
        }
    }

    kept
}
