//! Note context: the serializable payload handed to every template.

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Tags attached to every Obsidian note.
pub const DEFAULT_TAGS: &[&str] = &["remarkable", "handwritten"];

/// Rendering payload for one notebook.
///
/// `text` is the cleaned notebook text. `html_body` is derived from it for
/// destinations that take HTML, and is kept in sync by [`NoteContext::with_text`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteContext {
    pub title: String,
    pub text: String,
    pub html_body: String,
    /// Folder path of the notebook in the source hierarchy, `/`-joined.
    pub source_path: String,
    /// Date the note was rendered, `YYYY-MM-DD`.
    pub created: String,
    pub root_folder: String,
    pub sub_folder: Option<String>,
    pub tags: Vec<String>,
    /// Obsidian wiki embeds (`![[page-1.png]]`), one per page image.
    pub image_embeds: Vec<String>,
    /// Absolute page image paths for destinations that attach files.
    pub attachments: Vec<String>,
    pub meta: MetaCtx,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaCtx {
    pub inkwell_version: String,
}

impl NoteContext {
    pub fn new(title: &str, text: &str) -> Self {
        NoteContext {
            title: title.to_string(),
            text: text.to_string(),
            html_body: notes_html(text),
            source_path: title.to_string(),
            created: Local::now().date_naive().to_string(),
            root_folder: String::new(),
            sub_folder: None,
            tags: DEFAULT_TAGS.iter().map(|t| t.to_string()).collect(),
            image_embeds: Vec::new(),
            attachments: Vec::new(),
            meta: MetaCtx {
                inkwell_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self.html_body = notes_html(text);
        self
    }

    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = path.into();
        self
    }

    /// Root folder plus optional sub-folder. An empty sub-folder is dropped.
    pub fn with_folders(mut self, root: impl Into<String>, sub: Option<String>) -> Self {
        self.root_folder = root.into();
        self.sub_folder = sub.filter(|s| !s.is_empty());
        self
    }

    pub fn with_image_embeds(mut self, file_names: &[String]) -> Self {
        self.image_embeds = file_names.iter().map(|f| format!("![[{f}]]")).collect();
        self
    }

    pub fn with_attachments(mut self, paths: Vec<String>) -> Self {
        self.attachments = paths;
        self
    }

    pub fn with_created(mut self, created: impl Into<String>) -> Self {
        self.created = created.into();
        self
    }

    /// Convert to a [`tera::Context`] for rendering.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::Context)
    }
}

/// Minimal HTML escaping for text placed in element content or attributes.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Apple Notes body: one `<div>` per line, blank lines as `<div><br></div>`.
///
/// Notes uses the first line of the body as the visible title, so a leading
/// blank div keeps the note name from being overwritten by the first line.
pub fn notes_html(text: &str) -> String {
    let mut html = String::from("<div><br></div>");
    for line in text.trim_start().lines() {
        if line.trim().is_empty() {
            html.push_str("<div><br></div>");
        } else {
            html.push_str("<div>");
            html.push_str(&escape_html(line));
            html.push_str("</div>");
        }
    }
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_escapes_markup() {
        assert_eq!(escape_html("a<b>&\"'"), "a&lt;b&gt;&amp;&quot;&#x27;");
    }

    #[test]
    fn notes_html_wraps_lines_and_blanks() {
        let html = notes_html("\n\nfirst\n\nsecond <x>");
        assert_eq!(
            html,
            "<div><br></div><div>first</div><div><br></div><div>second &lt;x&gt;</div>"
        );
    }

    #[test]
    fn empty_sub_folder_is_dropped() {
        let ctx = NoteContext::new("t", "x").with_folders("Work", Some(String::new()));
        assert_eq!(ctx.root_folder, "Work");
        assert!(ctx.sub_folder.is_none());
    }

    #[test]
    fn with_text_refreshes_html() {
        let ctx = NoteContext::new("t", "old").with_text("new");
        assert!(ctx.html_body.contains("<div>new</div>"));
        assert!(!ctx.html_body.contains("old"));
    }

    #[test]
    fn to_tera_context_succeeds() {
        let ctx = NoteContext::new("Title", "body").with_image_embeds(&["p-1.png".into()]);
        assert_eq!(ctx.image_embeds, vec!["![[p-1.png]]".to_string()]);
        ctx.to_tera_context().expect("context conversion");
    }
}
