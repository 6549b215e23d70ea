use inkwell_render::{NoteContext, NoteFormat, Renderer, TemplateEngine};
use tempfile::TempDir;

#[test]
fn user_template_overrides_embedded_default() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("obsidian")).unwrap();
    std::fs::write(
        dir.path().join("obsidian/note.md.tera"),
        "# {{ title }}\r\n\r\n{{ text }}\r\n",
    )
    .unwrap();

    let renderer = Renderer::with_templates(dir.path()).unwrap();
    let out = renderer
        .render(&NoteContext::new("Ideas", "hello"), NoteFormat::ObsidianMarkdown)
        .unwrap();
    assert_eq!(out, "# Ideas\n\nhello\n");

    // Formats without an override still use the embedded template.
    let script = renderer
        .render(&NoteContext::new("Ideas", "hello"), NoteFormat::AppleNotesScript)
        .unwrap();
    assert!(script.starts_with("tell application \"Notes\""));
}

#[test]
fn missing_override_dir_falls_back_to_embedded() {
    let dir = TempDir::new().unwrap();
    let engine = TemplateEngine::new(Some(&dir.path().join("nope"))).unwrap();
    let out = engine
        .render(&NoteContext::new("t", "body"), NoteFormat::ObsidianMarkdown)
        .unwrap();
    assert!(out.contains("body"));
}

#[test]
fn broken_override_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("obsidian")).unwrap();
    std::fs::write(dir.path().join("obsidian/note.md.tera"), "{{ unclosed").unwrap();
    assert!(Renderer::with_templates(dir.path()).is_err());
}
