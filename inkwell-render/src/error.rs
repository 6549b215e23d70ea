use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// An embedded or user-supplied template does not parse.
    #[error("failed to load note templates: {0}")]
    Load(#[from] tera::Error),

    #[error("failed to render {template}: {source}")]
    Render {
        template: &'static str,
        #[source]
        source: tera::Error,
    },

    #[error("note context could not be serialized: {0}")]
    Context(#[source] tera::Error),

    #[error("cannot read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
