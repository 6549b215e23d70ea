//! Domain types for the tablet library mirror.
//!
//! The source hierarchy is a flat list of [`Item`]s linked by `parent_id`.
//! All identifiers are opaque strings wrapped in newtypes so that notebook
//! ids, version tokens and destination names cannot be mixed up.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parent id the tablet cloud uses for items that were moved to the trash.
pub const TRASH_PARENT: &str = "trash";

/// Destination name for the Apple Notes publisher.
pub const APPLE_NOTES: &str = "apple_notes";

/// Destination name for the Obsidian vault publisher.
pub const OBSIDIAN: &str = "obsidian";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Stable identifier of a folder or document in the source hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub String);

/// Notebooks are documents; their identity is the item id.
pub type NotebookId = ItemId;

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque content version token. Changes iff the notebook content changed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(pub String);

impl Version {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<u64> for Version {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// Name of a publish target. Unknown names read from disk are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DestinationName(pub String);

impl DestinationName {
    pub fn apple_notes() -> Self {
        Self::from(APPLE_NOTES)
    }

    pub fn obsidian() -> Self {
        Self::from(OBSIDIAN)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DestinationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for DestinationName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DestinationName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Whether an item is a folder or a document (notebook).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Folder,
    Document,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Folder => write!(f, "folder"),
            ItemKind::Document => write!(f, "document"),
        }
    }
}

/// A node of the source hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Display name; may contain characters that are unsafe in paths.
    pub name: String,
    /// `None` (or an empty id) means the item lives at the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ItemId>,
    pub kind: ItemKind,
    pub version: Version,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    /// Source file type of a document (`notebook`, `pdf`, `epub`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

impl Item {
    /// Parent id, normalising an empty string to "no parent".
    pub fn parent(&self) -> Option<&ItemId> {
        self.parent_id.as_ref().filter(|p| !p.0.is_empty())
    }

    pub fn is_document(&self) -> bool {
        self.kind == ItemKind::Document
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }

    /// The item itself sits directly in the trash.
    pub fn in_trash(&self) -> bool {
        self.parent().is_some_and(|p| p.0 == TRASH_PARENT)
    }

    /// Handwritten notebooks only; imported PDFs and EPUBs are not native.
    pub fn is_native_notebook(&self) -> bool {
        !matches!(
            self.file_type.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("pdf") | Some("epub")
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
