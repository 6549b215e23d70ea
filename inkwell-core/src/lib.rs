//! Inkwell core library: domain types, configuration, home layout, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes and the source [`Item`] model
//! - [`config`]: YAML configuration load / save / validate
//! - [`paths`]: `~/.inkwell/` layout helpers
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod paths;
pub mod types;

pub use config::Config;
pub use error::ConfigError;
pub use types::{DestinationName, Item, ItemId, ItemKind, NotebookId, Version};
