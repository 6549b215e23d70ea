//! Folder-tree resolution.
//!
//! The source library arrives as a flat list of items linked by parent ids.
//! [`build_index`] keeps the folders; [`resolve`] walks a document's parent
//! chain to find its folder path and the top-level folder it lives under.
//!
//! Folder identity is recomputed from every snapshot. A renamed top-level
//! folder therefore resolves to its new name and content mirrors into a new
//! destination folder; the old one is left in place.

use std::collections::HashMap;

use inkwell_core::types::{Item, ItemId, TRASH_PARENT};

use crate::error::TreeError;

/// One folder of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub name: String,
    pub parent_id: Option<ItemId>,
}

/// Folders of one snapshot keyed by id.
#[derive(Debug, Clone, Default)]
pub struct FolderIndex {
    folders: HashMap<ItemId, FolderEntry>,
}

impl FolderIndex {
    pub fn get(&self, id: &ItemId) -> Option<&FolderEntry> {
        self.folders.get(id)
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }
}

/// Index every folder in `items`. Documents are ignored.
pub fn build_index(items: &[Item]) -> FolderIndex {
    let folders = items
        .iter()
        .filter(|item| item.is_folder())
        .map(|item| {
            (
                item.id.clone(),
                FolderEntry {
                    name: item.name.clone(),
                    parent_id: item.parent().cloned(),
                },
            )
        })
        .collect();
    FolderIndex { folders }
}

/// Where an item sits in the hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Name of the ancestor one level below root; `None` for root items.
    pub top_level: Option<String>,
    /// Folder names from the top-level folder down to the direct parent.
    pub folder_path: Vec<String>,
    /// The chain ends in the trash rather than at the root.
    pub trashed: bool,
    /// Parent id that was not found in the index. The walk treated it as
    /// the root; callers should warn.
    pub orphaned_parent: Option<ItemId>,
}

impl Resolution {
    /// Folder path joined with `/`, empty for root items.
    pub fn path_string(&self) -> String {
        self.folder_path.join("/")
    }
}

/// Walk `item`'s parent chain.
///
/// The walk takes at most `index.len()` steps; a longer chain can only be a
/// cycle and yields [`TreeError::CorruptHierarchy`].
pub fn resolve(index: &FolderIndex, item: &Item) -> Result<Resolution, TreeError> {
    let mut resolution = Resolution::default();
    let mut current = item.parent();
    let mut steps = 0usize;

    while let Some(id) = current {
        if id.as_str() == TRASH_PARENT {
            resolution.trashed = true;
            break;
        }
        let Some(folder) = index.get(id) else {
            resolution.orphaned_parent = Some(id.clone());
            break;
        };
        steps += 1;
        if steps > index.len() {
            return Err(TreeError::CorruptHierarchy {
                item: item.id.clone(),
                steps,
            });
        }
        resolution.folder_path.push(folder.name.clone());
        current = folder.parent_id.as_ref();
    }

    resolution.folder_path.reverse();
    resolution.top_level = resolution.folder_path.first().cloned();
    Ok(resolution)
}

/// Name of the top-level folder above `item`, or `None` when it sits at root.
pub fn resolve_top_level(index: &FolderIndex, item: &Item) -> Result<Option<String>, TreeError> {
    resolve(index, item).map(|r| r.top_level)
}
