//! Concrete collaborators behind the engine's provider contracts.

pub mod cleanup;
pub mod export;
pub mod http;
pub mod pages;
pub mod vision;

pub use cleanup::OpenAiCleanup;
pub use export::ExportSource;
pub use pages::PageDirRenderer;
pub use vision::GoogleVisionOcr;
