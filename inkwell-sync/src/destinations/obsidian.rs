//! Obsidian vault, written as Markdown files.
//!
//! ```text
//! <vault>/<sub_folder>/<title>.md
//! <vault>/<sub_folder>/<attachments>/<title>_<page image>
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use inkwell_core::types::DestinationName;
use inkwell_render::{NoteContext, NoteFormat, Renderer};

use crate::dispatch::{Destination, PublishUnit};
use crate::error::{dest_io_err, DestinationError};
use crate::planner::sanitize_folder_name;
use crate::writer;

/// Replace path separators and colons, which vaults cannot hold in names.
pub fn sanitize_note_name(name: &str) -> String {
    name.replace(['/', ':', '\\'], "-")
}

pub struct ObsidianDestination {
    vault: PathBuf,
    attachments_folder: String,
    renderer: Arc<Renderer>,
}

impl ObsidianDestination {
    /// Fails when `vault` does not exist; a vault is never created implicitly.
    pub fn new(
        vault: &Path,
        attachments_folder: &str,
        renderer: Arc<Renderer>,
    ) -> Result<Self, DestinationError> {
        if !vault.is_dir() {
            return Err(DestinationError::VaultMissing(vault.to_path_buf()));
        }
        let vault = fs::canonicalize(vault).map_err(|e| dest_io_err(vault, e))?;
        Ok(ObsidianDestination {
            vault,
            attachments_folder: attachments_folder.to_string(),
            renderer,
        })
    }

    pub fn vault(&self) -> &Path {
        &self.vault
    }

    fn target_dir(&self, unit: &PublishUnit) -> PathBuf {
        match &unit.sub_folder {
            Some(sub) => self.vault.join(sanitize_folder_name(sub)),
            None => self.vault.clone(),
        }
    }

    /// Path of the note `unit` is published to.
    pub fn note_path(&self, unit: &PublishUnit) -> PathBuf {
        self.target_dir(unit)
            .join(format!("{}.md", sanitize_note_name(&unit.title)))
    }
}

impl Destination for ObsidianDestination {
    fn name(&self) -> DestinationName {
        DestinationName::obsidian()
    }

    fn publish(&self, unit: &PublishUnit) -> Result<(), DestinationError> {
        let target = self.target_dir(unit);
        let attach_dir = target.join(&self.attachments_folder);
        fs::create_dir_all(&attach_dir).map_err(|e| dest_io_err(&attach_dir, e))?;

        let safe_title = sanitize_note_name(&unit.title);
        let mut embeds = Vec::with_capacity(unit.attachments.len());
        for image in unit.attachments.iter().filter(|p| p.exists()) {
            let Some(file_name) = image.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let name = format!("{safe_title}_{file_name}");
            let dest = attach_dir.join(&name);
            fs::copy(image, &dest).map_err(|e| dest_io_err(&dest, e))?;
            embeds.push(name);
        }

        let ctx = NoteContext::new(&unit.title, &unit.text)
            .with_source_path(unit.source_path())
            .with_image_embeds(&embeds);
        let markdown = self.renderer.render(&ctx, NoteFormat::ObsidianMarkdown)?;

        let note = self.note_path(unit);
        writer::atomic_write(&note, markdown.as_bytes()).map_err(|e| dest_io_err(&note, e))?;
        tracing::info!("Obsidian note written: {}", note.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell_core::types::{NotebookId, Version};
    use tempfile::TempDir;

    fn unit(attachments: Vec<PathBuf>) -> PublishUnit {
        PublishUnit {
            notebook_id: NotebookId::from("n1"),
            version: Version::from("h1"),
            notebook_name: "Standup".into(),
            title: "Work / Standup".into(),
            sub_folder: Some("Work".into()),
            folder_path: vec!["Work".into()],
            text: "# Agenda\nship it".into(),
            attachments,
        }
    }

    fn destination(vault: &Path) -> ObsidianDestination {
        ObsidianDestination::new(vault, "attachments", Arc::new(Renderer::new().unwrap())).unwrap()
    }

    #[test]
    fn missing_vault_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = ObsidianDestination::new(
            &tmp.path().join("nope"),
            "attachments",
            Arc::new(Renderer::new().unwrap()),
        )
        .err()
        .expect("must fail");
        assert!(matches!(err, DestinationError::VaultMissing(_)));
    }

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize_note_name("A / B: C\\D"), "A - B- C-D");
    }

    #[test]
    fn publish_writes_note_and_attachments() {
        let vault = TempDir::new().unwrap();
        let pages = TempDir::new().unwrap();
        let page = pages.path().join("Standup.page-1.png");
        fs::write(&page, b"png").unwrap();

        let dest = destination(vault.path());
        dest.publish(&unit(vec![page, pages.path().join("missing.png")])).unwrap();

        let note = dest.vault().join("Work").join("Work - Standup.md");
        let md = fs::read_to_string(&note).unwrap();
        assert!(md.contains("source: Remarkable/Work/Standup\n"), "got:\n{md}");
        assert!(md.contains("# Agenda\nship it"));
        assert!(md.contains("![[Work - Standup_Standup.page-1.png]]"));
        assert!(dest
            .vault()
            .join("Work/attachments/Work - Standup_Standup.page-1.png")
            .is_file());
    }

    #[test]
    fn republish_overwrites() {
        let vault = TempDir::new().unwrap();
        let dest = destination(vault.path());
        let mut u = unit(vec![]);
        dest.publish(&u).unwrap();
        u.text = "second".into();
        dest.publish(&u).unwrap();

        let files: Vec<_> = fs::read_dir(dest.vault().join("Work"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "md"))
            .collect();
        assert_eq!(files.len(), 1);
        assert!(fs::read_to_string(dest.note_path(&u)).unwrap().contains("second"));
    }

    #[test]
    fn dot_dot_sub_folder_stays_inside_the_vault() {
        let vault = TempDir::new().unwrap();
        let dest = destination(vault.path());
        let mut u = unit(vec![]);
        u.sub_folder = Some("..".into());
        dest.publish(&u).unwrap();
        let note = dest.note_path(&u);
        assert!(note.starts_with(dest.vault().join("__")), "got {}", note.display());
        assert!(note.is_file());
    }

    #[test]
    fn root_notebooks_go_to_vault_root() {
        let vault = TempDir::new().unwrap();
        let dest = destination(vault.path());
        let mut u = unit(vec![]);
        u.sub_folder = None;
        u.folder_path.clear();
        u.title = "Inbox".into();
        dest.publish(&u).unwrap();
        assert!(dest.vault().join("Inbox.md").is_file());
    }
}
