//! Concrete publish targets.

pub mod apple_notes;
pub mod obsidian;

pub use apple_notes::{AppleNotesDestination, Osascript, ScriptRunner};
pub use obsidian::ObsidianDestination;
