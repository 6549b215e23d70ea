//! # inkwell-render
//!
//! Tera-based rendering of a processed notebook into the formats each
//! destination understands: an Obsidian Markdown note and an AppleScript
//! program that creates the note in Apple Notes.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use inkwell_render::{NoteContext, NoteFormat, Renderer};
//!
//! fn render_markdown(title: &str, text: &str) {
//!     if let Ok(renderer) = Renderer::new() {
//!         let ctx = NoteContext::new(title, text);
//!         if let Ok(markdown) = renderer.render(&ctx, NoteFormat::ObsidianMarkdown) {
//!             println!("{} bytes", markdown.len());
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::{escape_html, notes_html, NoteContext};
pub use engine::{NoteFormat, Renderer, TemplateEngine};
pub use error::RenderError;
