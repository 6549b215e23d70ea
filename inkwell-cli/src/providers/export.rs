//! Export-directory source.
//!
//! ```text
//! <listing_path>                     JSON array of library entries (cloud metadata shape)
//! <pages_dir>/<id>/*.png             rendered pages of one notebook, or
//! <pages_dir>/<name>.page-<n>.png    flat layout keyed by sanitized name
//! ```
//!
//! `fetch` snapshots a notebook's page images into the work directory so a
//! concurrent export cannot change them mid-run.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use inkwell_core::types::{Item, ItemId, ItemKind, Version};
use inkwell_sync::planner::sanitize_folder_name;
use inkwell_sync::providers::{FetchedDocument, SourceProvider};
use inkwell_sync::ProviderError;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// One listing entry as exported from the tablet cloud.
#[derive(Debug, Deserialize)]
struct ListingEntry {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "VissibleName", alias = "VisibleName", default)]
    name: String,
    #[serde(rename = "Parent", default)]
    parent: String,
    #[serde(rename = "Type")]
    kind: String,
    #[serde(default)]
    hash: Option<String>,
    #[serde(rename = "Version", default)]
    version: Option<u64>,
    #[serde(rename = "Deleted", default)]
    deleted: bool,
    #[serde(rename = "ModifiedClient", default)]
    modified_client: Option<String>,
    #[serde(rename = "fileType", default)]
    file_type: Option<String>,
}

impl ListingEntry {
    fn into_item(self) -> Option<Item> {
        let kind = match self.kind.as_str() {
            "CollectionType" => ItemKind::Folder,
            "DocumentType" => ItemKind::Document,
            other => {
                tracing::warn!("listing entry {} has unknown type {other:?}, ignored", self.id);
                return None;
            }
        };
        let version = match self.hash.filter(|h| !h.is_empty()) {
            Some(hash) => Version::from(hash),
            None => Version::from(self.version.unwrap_or(1)),
        };
        let modified_at = self
            .modified_client
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));
        Some(Item {
            id: ItemId::from(self.id),
            name: self.name,
            parent_id: Some(self.parent)
                .filter(|p| !p.is_empty())
                .map(ItemId::from),
            kind,
            version,
            deleted: self.deleted,
            modified_at,
            file_type: self.file_type.filter(|t| !t.is_empty()),
        })
    }
}

pub struct ExportSource {
    listing_path: PathBuf,
    pages_dir: PathBuf,
}

impl ExportSource {
    pub fn new(listing_path: PathBuf, pages_dir: PathBuf) -> Self {
        ExportSource {
            listing_path,
            pages_dir,
        }
    }

    /// Page images of `item` in the export, unordered.
    fn locate_pages(&self, item: &Item) -> Result<Vec<PathBuf>, ProviderError> {
        let per_notebook = self.pages_dir.join(item.id.as_str());
        if per_notebook.is_dir() {
            return list_images(&per_notebook, |_| true);
        }
        if !self.pages_dir.is_dir() {
            return Ok(Vec::new());
        }
        let prefix = format!("{}.page-", sanitize_folder_name(item.name.trim()));
        list_images(&self.pages_dir, |name| name.starts_with(&prefix))
    }
}

fn unavailable(path: &Path, e: impl std::fmt::Display) -> ProviderError {
    ProviderError::Unavailable(format!("{}: {e}", path.display()))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn list_images(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>, ProviderError> {
    let entries = fs::read_dir(dir).map_err(|e| unavailable(dir, e))?;
    Ok(entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_image(p))
        .filter(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(&keep))
        .collect())
}

impl SourceProvider for ExportSource {
    fn list_items(&self) -> Result<Vec<Item>, ProviderError> {
        let contents = fs::read_to_string(&self.listing_path)
            .map_err(|e| unavailable(&self.listing_path, e))?;
        let entries: Vec<ListingEntry> = serde_json::from_str(&contents)
            .map_err(|e| unavailable(&self.listing_path, e))?;
        Ok(entries.into_iter().filter_map(ListingEntry::into_item).collect())
    }

    fn fetch(&self, item: &Item, work_dir: &Path) -> Result<FetchedDocument, ProviderError> {
        let target = work_dir.join("pages");
        fs::create_dir_all(&target).map_err(|e| unavailable(&target, e))?;
        for page in self.locate_pages(item)? {
            let Some(name) = page.file_name() else {
                continue;
            };
            let dest = target.join(name);
            fs::copy(&page, &dest).map_err(|e| unavailable(&page, e))?;
        }
        Ok(FetchedDocument {
            item: item.clone(),
            path: target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LISTING: &str = r#"[
        {"ID": "f1", "VissibleName": "Work", "Parent": "", "Type": "CollectionType", "Version": 3},
        {"ID": "n1", "VissibleName": "Standup", "Parent": "f1", "Type": "DocumentType",
         "hash": "abc", "Version": 7, "ModifiedClient": "2024-05-01T10:00:00Z", "fileType": "notebook"},
        {"ID": "n2", "VisibleName": "Old", "Parent": "trash", "Type": "DocumentType", "Version": 2},
        {"ID": "n3", "VissibleName": "Paper", "Parent": "", "Type": "DocumentType", "fileType": "pdf"},
        {"ID": "x", "VissibleName": "?", "Parent": "", "Type": "TemplateType"}
    ]"#;

    fn source(dir: &TempDir) -> ExportSource {
        let listing = dir.path().join("listing.json");
        fs::write(&listing, LISTING).unwrap();
        ExportSource::new(listing, dir.path().join("pages"))
    }

    #[test]
    fn listing_maps_cloud_fields() {
        let dir = TempDir::new().unwrap();
        let items = source(&dir).list_items().unwrap();
        assert_eq!(items.len(), 4, "unknown types are dropped");

        let folder = &items[0];
        assert!(folder.is_folder());
        assert_eq!(folder.parent_id, None);
        assert_eq!(folder.version, Version::from("3"));

        let n1 = &items[1];
        assert_eq!(n1.version, Version::from("abc"), "hash wins over Version");
        assert_eq!(n1.parent_id, Some(ItemId::from("f1")));
        assert!(n1.modified_at.is_some());

        assert!(items[2].in_trash());
        assert_eq!(items[2].name, "Old");
        assert_eq!(items[3].version, Version::from("1"));
        assert!(!items[3].is_native_notebook());
    }

    #[test]
    fn missing_listing_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let src = ExportSource::new(dir.path().join("none.json"), dir.path().into());
        assert!(matches!(src.list_items(), Err(ProviderError::Unavailable(_))));
    }

    #[test]
    fn fetch_copies_pages_from_either_layout() {
        let dir = TempDir::new().unwrap();
        let src = source(&dir);
        let items = src.list_items().unwrap();
        let pages = dir.path().join("pages");

        fs::create_dir_all(pages.join("n1")).unwrap();
        fs::write(pages.join("n1/1.png"), b"a").unwrap();
        fs::write(pages.join("n1/notes.txt"), b"skip").unwrap();
        fs::write(pages.join("Paper.page-1.png"), b"b").unwrap();
        fs::write(pages.join("Paper.page-2.png"), b"c").unwrap();
        fs::write(pages.join("Other.page-1.png"), b"d").unwrap();

        let work = TempDir::new().unwrap();
        let doc = src.fetch(&items[1], &work.path().join("n1")).unwrap();
        assert!(doc.path.join("1.png").is_file());
        assert!(!doc.path.join("notes.txt").exists());

        let doc = src.fetch(&items[3], &work.path().join("n3")).unwrap();
        let mut names: Vec<_> = fs::read_dir(&doc.path)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["Paper.page-1.png", "Paper.page-2.png"]);
    }
}
