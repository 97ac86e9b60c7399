// src/metadata/comps.rs

//! Group and category taxonomy from comps XML
//!
//! The document is parsed once into two tables:
//! - groups, each with the names of the packages it pulls in
//! - categories, each listing member group ids
//!
//! Names and descriptions are repeated per locale in comps; only the first
//! (untranslated) value of each is kept.

use crate::config::boolean_from_text;
use crate::error::{Error, Result};
use crate::metadata::{MetadataFile, MetadataHandle, MetadataKind};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const ICON_DIR: &str = "/usr/share/pixmaps/comps";
const ICON_MISSING: &str = "image-missing";

/// One `<group>` element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupEntry {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub user_visible: bool,
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct CategoryEntry {
    id: String,
    name: Option<String>,
    description: Option<String>,
    groups: Vec<String>,
}

/// A category or group as presented to a UI
///
/// Top-level categories have no parent; groups carry the id of the
/// category they were listed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub parent_id: Option<String>,
    pub id: String,
    pub name: String,
    pub summary: String,
    pub icon: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Group,
    Category,
}

#[derive(Debug)]
pub struct GroupCatalog {
    md: MetadataHandle,
    groups: Vec<GroupEntry>,
    categories: Vec<CategoryEntry>,
    icon_dir: PathBuf,
}

impl GroupCatalog {
    pub fn new(repo_id: &str) -> Result<Self> {
        let mut md = MetadataHandle::new(repo_id);
        md.set_kind(MetadataKind::Comps)?;
        Ok(Self {
            md,
            groups: Vec::new(),
            categories: Vec::new(),
            icon_dir: PathBuf::from(ICON_DIR),
        })
    }

    /// Look for icons somewhere other than the system pixmaps directory
    pub fn set_icon_dir(&mut self, dir: &Path) {
        self.icon_dir = dir.to_path_buf();
    }

    fn ensure_loaded(&self) -> Result<()> {
        if !self.md.is_loaded() {
            return Err(Error::Incomplete(format!(
                "comps metadata for {} is not loaded",
                self.md.id()
            )));
        }
        Ok(())
    }

    /// Own icon if installed, else the parent's, else a placeholder
    fn icon(&self, id: &str, parent_id: Option<&str>) -> String {
        std::iter::once(id)
            .chain(parent_id)
            .find(|candidate| self.icon_dir.join(format!("{}.png", candidate)).exists())
            .map(str::to_string)
            .unwrap_or_else(|| ICON_MISSING.to_string())
    }

    /// Top-level categories in document order
    pub fn get_categories(&self) -> Result<Vec<Category>> {
        self.ensure_loaded()?;
        Ok(self
            .categories
            .iter()
            .map(|category| Category {
                parent_id: None,
                id: category.id.clone(),
                name: category.name.clone().unwrap_or_default(),
                summary: category.description.clone().unwrap_or_default(),
                icon: self.icon(&category.id, None),
            })
            .collect())
    }

    /// Groups listed by a category, in listed order
    ///
    /// Listed ids with no matching group are dropped.
    pub fn get_groups_for_category(&self, category_id: &str) -> Result<Vec<Category>> {
        self.ensure_loaded()?;
        let category = self
            .categories
            .iter()
            .find(|c| c.id == category_id)
            .ok_or_else(|| Error::NotFound(format!("could not find category: {}", category_id)))?;

        Ok(category
            .groups
            .iter()
            .filter_map(|group_id| self.groups.iter().find(|g| &g.id == group_id))
            .map(|group| Category {
                parent_id: Some(category_id.to_string()),
                id: group.id.clone(),
                name: group.name.clone().unwrap_or_default(),
                summary: group.description.clone().unwrap_or_default(),
                icon: self.icon(&group.id, Some(category_id)),
            })
            .collect())
    }

    /// Package names pulled in by a group
    pub fn get_packages_for_group(&self, group_id: &str) -> Result<Vec<String>> {
        self.group(group_id)?
            .map(|group| group.packages.clone())
            .ok_or_else(|| Error::NotFound(format!("could not find group: {}", group_id)))
    }

    /// Raw group entry by id
    pub fn group(&self, group_id: &str) -> Result<Option<&GroupEntry>> {
        self.ensure_loaded()?;
        Ok(self.groups.iter().find(|g| g.id == group_id))
    }

    fn parse_str(&mut self, xml: &str) -> Result<()> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut section = Section::None;
        let mut tag = String::new();
        let mut group = GroupEntry::default();
        let mut category = CategoryEntry::default();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    match (section, name.as_str()) {
                        (Section::None, "group") => {
                            section = Section::Group;
                            group = GroupEntry::default();
                        }
                        (Section::None, "category") => {
                            section = Section::Category;
                            category = CategoryEntry::default();
                        }
                        _ => tag = name,
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|e| Error::ParseError(format!("Invalid comps text: {}", e)))?
                        .to_string();

                    match (section, tag.as_str()) {
                        (Section::Group, "id") => group.id = text,
                        (Section::Group, "name") => {
                            group.name.get_or_insert(text);
                        }
                        (Section::Group, "description") => {
                            group.description.get_or_insert(text);
                        }
                        (Section::Group, "uservisible") => {
                            group.user_visible = boolean_from_text(&text)
                        }
                        (Section::Group, "packagereq") => group.packages.push(text),
                        (Section::Category, "id") => category.id = text,
                        (Section::Category, "name") => {
                            category.name.get_or_insert(text);
                        }
                        (Section::Category, "description") => {
                            category.description.get_or_insert(text);
                        }
                        (Section::Category, "groupid") => category.groups.push(text),
                        _ => {}
                    }
                }
                Ok(Event::End(e)) => match e.name().as_ref() {
                    b"group" if section == Section::Group => {
                        section = Section::None;
                        self.groups.push(std::mem::take(&mut group));
                    }
                    b"category" if section == Section::Category => {
                        section = Section::None;
                        self.categories.push(std::mem::take(&mut category));
                    }
                    _ => tag.clear(),
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::ParseError(format!(
                        "Failed to parse comps at position {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        debug!(
            "Parsed {} groups and {} categories for {}",
            self.groups.len(),
            self.categories.len(),
            self.md.id()
        );
        Ok(())
    }
}

impl MetadataFile for GroupCatalog {
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
        self.groups.clear();
        self.categories.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const COMPS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<comps>
  <group>
    <id>admin-tools</id>
    <name>Administration Tools</name>
    <name xml:lang="fr">Outils d'administration</name>
    <description>Graphical system administration tools.</description>
    <description xml:lang="fr">Outils graphiques.</description>
    <default>true</default>
    <uservisible>true</uservisible>
    <packagelist>
      <packagereq type="default">system-config-boot</packagereq>
      <packagereq type="optional">system-config-kdump</packagereq>
    </packagelist>
  </group>
  <group>
    <id>other</id>
    <name>Other</name>
    <description>Other things.</description>
    <uservisible>false</uservisible>
    <packagelist>
      <packagereq>hal</packagereq>
    </packagelist>
  </group>
  <category>
    <id>apps</id>
    <name>Applications</name>
    <description>Applications to perform a variety of tasks</description>
    <grouplist>
      <groupid>admin-tools</groupid>
      <groupid>missing-group</groupid>
      <groupid>other</groupid>
    </grouplist>
  </category>
  <category>
    <id>system</id>
    <name>System</name>
    <description>System tools</description>
    <grouplist>
      <groupid>admin-tools</groupid>
    </grouplist>
  </category>
</comps>
"#;

    fn loaded(icon_dir: &Path) -> GroupCatalog {
        let mut catalog = GroupCatalog::new("fedora").unwrap();
        catalog.set_icon_dir(icon_dir);
        catalog.parse_str(COMPS).unwrap();
        catalog.md_mut().set_loaded(true);
        catalog
    }

    #[test]
    fn test_get_categories() {
        let dir = tempdir().unwrap();
        let catalog = loaded(dir.path());
        let categories = catalog.get_categories().unwrap();

        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].id, "apps");
        assert_eq!(categories[0].name, "Applications");
        assert_eq!(categories[0].parent_id, None);
        assert_eq!(categories[0].icon, "image-missing");
    }

    #[test]
    fn test_get_groups_for_category() {
        let dir = tempdir().unwrap();
        let catalog = loaded(dir.path());
        let groups = catalog.get_groups_for_category("apps").unwrap();

        let ids: Vec<&str> = groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["admin-tools", "other"]);
        assert_eq!(groups[0].name, "Administration Tools");
        assert_eq!(groups[0].summary, "Graphical system administration tools.");
        assert_eq!(groups[0].parent_id.as_deref(), Some("apps"));
    }

    #[test]
    fn test_unknown_category_is_not_found() {
        let dir = tempdir().unwrap();
        let catalog = loaded(dir.path());
        assert!(matches!(
            catalog.get_groups_for_category("dave"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_get_packages_for_group() {
        let dir = tempdir().unwrap();
        let catalog = loaded(dir.path());
        assert_eq!(
            catalog.get_packages_for_group("admin-tools").unwrap(),
            vec!["system-config-boot", "system-config-kdump"]
        );
        assert!(matches!(
            catalog.get_packages_for_group("dave"),
            Err(Error::NotFound(_))
        ));
        assert!(catalog.group("admin-tools").unwrap().unwrap().user_visible);
        assert!(!catalog.group("other").unwrap().unwrap().user_visible);
    }

    #[test]
    fn test_icon_fallback() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("apps.png"), b"png").unwrap();
        fs::write(dir.path().join("other.png"), b"png").unwrap();
        let catalog = loaded(dir.path());

        let groups = catalog.get_groups_for_category("apps").unwrap();
        assert_eq!(groups[0].icon, "apps");
        assert_eq!(groups[1].icon, "other");

        let groups = catalog.get_groups_for_category("system").unwrap();
        assert_eq!(groups[0].icon, "image-missing");
    }

    #[test]
    fn test_queries_need_load() {
        let catalog = GroupCatalog::new("fedora").unwrap();
        assert!(matches!(
            catalog.get_categories(),
            Err(Error::Incomplete(_))
        ));
    }

    #[test]
    fn test_parse_from_disk_replaces_tables() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("comps.xml");
        fs::write(&path, COMPS).unwrap();

        let mut catalog = GroupCatalog::new("fedora").unwrap();
        catalog.parse(&path).unwrap();
        catalog.parse(&path).unwrap();
        catalog.md_mut().set_loaded(true);
        assert_eq!(catalog.get_categories().unwrap().len(), 2);
    }

    #[test]
    fn test_malformed_xml() {
        let mut catalog = GroupCatalog::new("fedora").unwrap();
        assert!(catalog.parse_str("<comps><group><id>x</name></comps>").is_err());
    }
}
