// src/metadata/updateinfo.rs

//! Update advisories from `updateinfo.xml`
//!
//! Each `<update>` is one advisory: an id such as `FEDORA-2009-10992`, a
//! title and description, references to bug trackers, and the list of
//! packages it ships. Packages are keyed by the same
//! `name;evr;arch;data` id the rest of the crate uses, with the owning
//! repository as data.

use crate::config::boolean_from_text;
use crate::error::{Error, Result};
use crate::metadata::{MetadataFile, MetadataHandle, MetadataKind};
use crate::packages::package_id_from_nevra;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// `status` attribute of an advisory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateState {
    Stable,
    Testing,
    #[default]
    Unknown,
}

impl UpdateState {
    pub fn from_name(name: &str) -> Self {
        match name {
            "stable" => UpdateState::Stable,
            "testing" | "unstable" => UpdateState::Testing,
            _ => UpdateState::Unknown,
        }
    }
}

/// `type` attribute of an advisory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Security,
    Bugfix,
    Enhancement,
    Newpackage,
    #[default]
    Unknown,
}

impl UpdateKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "security" => UpdateKind::Security,
            "bugfix" => UpdateKind::Bugfix,
            "enhancement" => UpdateKind::Enhancement,
            "newpackage" => UpdateKind::Newpackage,
            _ => UpdateKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Security => "security",
            UpdateKind::Bugfix => "bugfix",
            UpdateKind::Enhancement => "enhancement",
            UpdateKind::Newpackage => "newpackage",
            UpdateKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Cve,
    Bugzilla,
    #[default]
    Unknown,
}

impl ReferenceKind {
    /// `cve` and `bz`; vendor trackers are unknown
    pub fn from_name(name: &str) -> Self {
        match name {
            "cve" => ReferenceKind::Cve,
            "bz" => ReferenceKind::Bugzilla,
            _ => ReferenceKind::Unknown,
        }
    }
}

/// A `<reference>` to a bug or CVE
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReference {
    pub kind: ReferenceKind,
    pub url: Option<String>,
    pub title: Option<String>,
}

/// One advisory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Update {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub issued: Option<String>,
    pub state: UpdateState,
    pub kind: UpdateKind,
    pub reboot: bool,
    pub references: Vec<UpdateReference>,
    /// Package ids shipped by the advisory
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Update,
    References,
    Pkglist,
}

fn attribute(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok().map(|value| value.to_string()))
}

#[derive(Debug)]
pub struct UpdateInfo {
    md: MetadataHandle,
    updates: Vec<Update>,
}

impl UpdateInfo {
    pub fn new(repo_id: &str) -> Result<Self> {
        let mut md = MetadataHandle::new(repo_id);
        md.set_kind(MetadataKind::Updateinfo)?;
        Ok(Self {
            md,
            updates: Vec::new(),
        })
    }

    fn ensure_loaded(&self) -> Result<()> {
        if !self.md.is_loaded() {
            return Err(Error::Incomplete(format!(
                "updateinfo metadata for {} is not loaded",
                self.md.id()
            )));
        }
        Ok(())
    }

    /// Every advisory in document order
    pub fn get_detail(&self) -> Result<&[Update]> {
        self.ensure_loaded()?;
        Ok(&self.updates)
    }

    /// Advisories that ship the package `package_id`
    pub fn get_detail_for_package(&self, package_id: &str) -> Result<Vec<Update>> {
        self.ensure_loaded()?;
        let updates: Vec<Update> = self
            .updates
            .iter()
            .filter(|update| update.packages.iter().any(|id| id == package_id))
            .cloned()
            .collect();

        if updates.is_empty() {
            return Err(Error::NotFound(format!(
                "could not find package ({} in sack): {}",
                self.updates.len(),
                package_id
            )));
        }
        Ok(updates)
    }

    fn package_id(&self, e: &BytesStart) -> Option<String> {
        let name = attribute(e, b"name")?;
        let epoch = attribute(e, b"epoch");
        let version = attribute(e, b"version").unwrap_or_default();
        let release = attribute(e, b"release").unwrap_or_default();
        let arch = attribute(e, b"arch").unwrap_or_default();
        Some(package_id_from_nevra(
            &name,
            epoch.as_deref(),
            &version,
            &release,
            &arch,
            self.md.id(),
        ))
    }

    /// Handle an opening or self-closing element
    fn start(&self, e: &BytesStart, section: &mut Section, update: &mut Update) {
        match (*section, e.name().as_ref()) {
            (Section::None, b"update") => {
                *section = Section::Update;
                *update = Update::default();
                if let Some(status) = attribute(e, b"status") {
                    update.state = UpdateState::from_name(&status);
                }
                if let Some(kind) = attribute(e, b"type") {
                    update.kind = UpdateKind::from_name(&kind);
                }
            }
            (Section::Update, b"issued") => update.issued = attribute(e, b"date"),
            (Section::Update, b"references") => *section = Section::References,
            (Section::Update, b"pkglist") => *section = Section::Pkglist,
            (Section::References, b"reference") => update.references.push(UpdateReference {
                kind: attribute(e, b"type")
                    .map(|kind| ReferenceKind::from_name(&kind))
                    .unwrap_or_default(),
                url: attribute(e, b"href"),
                title: attribute(e, b"title"),
            }),
            (Section::Pkglist, b"package") => match self.package_id(e) {
                Some(id) => update.packages.push(id),
                None => debug!("skipping pkglist entry without a name in {}", update.id),
            },
            _ => {}
        }
    }

    fn parse_str(&mut self, xml: &str) -> Result<()> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut section = Section::None;
        let mut tag = String::new();
        let mut update = Update::default();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    self.start(&e, &mut section, &mut update);
                    tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                }
                Ok(Event::Empty(e)) => {
                    self.start(&e, &mut section, &mut update);
                    if e.name().as_ref() == b"reboot_suggested" && section != Section::None {
                        update.reboot = true;
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|e| Error::ParseError(format!("Invalid updateinfo text: {}", e)))?
                        .to_string();

                    match (section, tag.as_str()) {
                        (Section::Update, "id") => update.id = text,
                        (Section::Update, "title") => update.title = Some(text),
                        (Section::Update, "description") => update.description = Some(text),
                        (Section::Update | Section::Pkglist, "reboot_suggested") => {
                            update.reboot |= boolean_from_text(&text)
                        }
                        _ => {}
                    }
                }
                Ok(Event::End(e)) => {
                    match (section, e.name().as_ref()) {
                        (Section::Update, b"update") => {
                            section = Section::None;
                            self.updates.push(std::mem::take(&mut update));
                        }
                        (Section::References, b"references") | (Section::Pkglist, b"pkglist") => {
                            section = Section::Update
                        }
                        _ => {}
                    }
                    tag.clear();
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::ParseError(format!(
                        "Failed to parse updateinfo at position {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        debug!("Parsed {} advisories for {}", self.updates.len(), self.md.id());
        Ok(())
    }
}

impl MetadataFile for UpdateInfo {
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
        self.updates.clear();
    }
}
