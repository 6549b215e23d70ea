//! Tera rendering engine: [`NoteFormat`] enum and [`Renderer`].
//!
//! | Format            | Template                              | Consumer                 |
//! |-------------------|---------------------------------------|--------------------------|
//! | ObsidianMarkdown  | `obsidian/note.md.tera`               | written into the vault   |
//! | AppleNotesScript  | `apple_notes/note.applescript.tera`   | piped to `osascript`     |

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tera::{Tera, Value};

use crate::context::NoteContext;
use crate::error::RenderError;

// ---------------------------------------------------------------------------
// Embedded templates
// ---------------------------------------------------------------------------

const TPLS: &[(&str, &str)] = &[
    (
        "obsidian/note.md.tera",
        include_str!("templates/obsidian_note.md.tera"),
    ),
    (
        "apple_notes/note.applescript.tera",
        include_str!("templates/apple_notes.applescript.tera"),
    ),
];

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io { path: path.into(), source }
}

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

fn collect_template_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RenderError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let meta = entry.metadata().map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            collect_template_files(&path, out)?;
        } else if meta.is_file() && path.extension().and_then(|s| s.to_str()) == Some("tera") {
            out.push(path);
        }
    }
    Ok(())
}

/// User overrides, named by their path relative to `dir`.
fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, RenderError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut files = Vec::new();
    collect_template_files(dir, &mut files)?;
    files
        .into_iter()
        .map(|path| {
            let rel = path.strip_prefix(dir).unwrap_or(path.as_path());
            let name = normalize_template_name(rel);
            let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            Ok((name, contents.replace("\r\n", "\n")))
        })
        .collect()
}

/// AppleScript string literal for `s`.
///
/// AppleScript knows only the `\"`, `\\`, `\n`, `\r` and `\t` escapes, so
/// any other control character is dropped.
fn applescript_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn applescript_quote_filter(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let quoted = match value {
        Value::String(s) => applescript_quote(s),
        Value::Null => applescript_quote(""),
        other => applescript_quote(&other.to_string()),
    };
    Ok(Value::String(quoted))
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let mut templates: HashMap<String, String> = TPLS
        .iter()
        .map(|(name, content)| (normalize_template_name(Path::new(name)), (*content).to_string()))
        .collect();
    if let Some(dir) = user_template_dir {
        templates.extend(load_user_templates(dir)?);
    }

    let mut tera = Tera::default();
    // Script and markdown output must never be HTML-escaped by the engine.
    tera.autoescape_on(vec![]);
    tera.register_filter("applescript_quote", applescript_quote_filter);
    tera.add_raw_templates(templates.into_iter().collect::<Vec<_>>())?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// NoteFormat
// ---------------------------------------------------------------------------

/// Every output format a destination can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteFormat {
    ObsidianMarkdown,
    AppleNotesScript,
}

impl NoteFormat {
    pub fn all() -> &'static [NoteFormat] {
        &[NoteFormat::ObsidianMarkdown, NoteFormat::AppleNotesScript]
    }

    pub fn template_name(&self) -> &'static str {
        match self {
            NoteFormat::ObsidianMarkdown => "obsidian/note.md.tera",
            NoteFormat::AppleNotesScript => "apple_notes/note.applescript.tera",
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateEngine
// ---------------------------------------------------------------------------

/// Tera engine with embedded templates and optional user overrides.
///
/// A `.tera` file in `user_template_dir` whose relative path matches an
/// embedded template name (e.g. `obsidian/note.md.tera`) replaces it.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, RenderError> {
        Ok(TemplateEngine { tera: build_tera(user_template_dir)? })
    }

    pub fn render(&self, ctx: &NoteContext, format: NoteFormat) -> Result<String, RenderError> {
        let tera_ctx = ctx.to_tera_context()?;
        self.tera
            .render(format.template_name(), &tera_ctx)
            .map_err(|source| RenderError::Render {
                template: format.template_name(),
                source,
            })
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Create once and share; rendering takes `&self`.
pub struct Renderer {
    engine: TemplateEngine,
}

impl Renderer {
    /// Embedded templates only.
    pub fn new() -> Result<Self, RenderError> {
        Ok(Renderer { engine: TemplateEngine::new(None)? })
    }

    pub fn with_templates(dir: &Path) -> Result<Self, RenderError> {
        Ok(Renderer { engine: TemplateEngine::new(Some(dir))? })
    }

    pub fn render(&self, ctx: &NoteContext, format: NoteFormat) -> Result<String, RenderError> {
        self.engine.render(ctx, format)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NoteContext {
        NoteContext::new("Work / Meetings / Standup", "line one\n\nline <two>")
            .with_source_path("Work/Meetings/Standup")
            .with_folders("reMarkable", Some("Work".to_string()))
            .with_created("2024-03-01")
    }

    #[test]
    fn renderer_new_succeeds() {
        Renderer::new().expect("embedded templates parse");
    }

    #[test]
    fn all_formats_render_without_error() {
        let renderer = Renderer::new().unwrap();
        for format in NoteFormat::all() {
            let out = renderer
                .render(&ctx(), *format)
                .unwrap_or_else(|e| panic!("render failed for {format:?}: {e}"));
            assert!(!out.is_empty());
            assert!(!out.contains('\r'), "{format:?} output contains CR");
        }
    }

    #[test]
    fn markdown_has_frontmatter_and_text() {
        let out = Renderer::new().unwrap().render(&ctx(), NoteFormat::ObsidianMarkdown).unwrap();
        assert!(out.starts_with("---\ncreated: 2024-03-01\n"), "got:\n{out}");
        assert!(out.contains("source: Remarkable/Work/Meetings/Standup\n"));
        assert!(out.contains("  - remarkable\n  - handwritten\n---\n"));
        assert!(out.contains("line <two>"), "markdown must not be html-escaped");
        assert!(!out.contains("## Original Pages"));
    }

    #[test]
    fn markdown_lists_page_embeds() {
        let c = ctx().with_image_embeds(&["a-page-1.png".into(), "a-page-2.png".into()]);
        let out = Renderer::new().unwrap().render(&c, NoteFormat::ObsidianMarkdown).unwrap();
        assert!(out.contains("## Original Pages\n![[a-page-1.png]]\n\n![[a-page-2.png]]"));
    }

    #[test]
    fn applescript_quotes_every_string() {
        let c = ctx()
            .with_text("say \"hi\"")
            .with_attachments(vec!["/tmp/p \"1\".png".to_string()]);
        let out = Renderer::new().unwrap().render(&c, NoteFormat::AppleNotesScript).unwrap();
        assert!(out.contains(r#"set rootFolderName to "reMarkable""#));
        assert!(out.contains(r#"set subFolderName to "Work""#));
        assert!(out.contains(r#"set noteName to "Work / Meetings / Standup""#));
        assert!(out.contains(r#"<div>say &quot;hi&quot;</div>"#));
        assert!(out.contains(r#"POSIX file "/tmp/p \"1\".png""#));
    }

    #[test]
    fn applescript_strips_control_characters() {
        let c = ctx().with_text("a\u{000C}b\u{0008}c\td");
        let out = Renderer::new().unwrap().render(&c, NoteFormat::AppleNotesScript).unwrap();
        assert!(out.contains("<div>abc\\td</div>"), "got:\n{out}");
        assert!(!out.contains("\\f") && !out.contains("\\b") && !out.contains("\\u00"));
        assert!(!out.contains('\u{000C}') && !out.contains('\u{0008}'));
    }

    #[test]
    fn applescript_quote_escapes_only_what_applescript_reads() {
        assert_eq!(applescript_quote(r#"say "hi" \ bye"#), r#""say \"hi\" \\ bye""#);
        assert_eq!(applescript_quote("a\nb\r\u{0007}é"), "\"a\\nb\\ré\"");
    }

    #[test]
    fn applescript_without_sub_folder_targets_root() {
        let c = ctx().with_folders("reMarkable", None);
        let out = Renderer::new().unwrap().render(&c, NoteFormat::AppleNotesScript).unwrap();
        assert!(!out.contains("subFolderName"));
        assert!(out.contains("make new note at targetFolder"));
    }

    #[test]
    fn template_names_are_unique() {
        let names: std::collections::HashSet<_> =
            NoteFormat::all().iter().map(|f| f.template_name()).collect();
        assert_eq!(names.len(), NoteFormat::all().len());
    }
}
