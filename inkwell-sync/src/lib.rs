//! # inkwell-sync
//!
//! Incremental sync and multi-destination publish engine.
//!
//! The [`pipeline::Pipeline`] lists the source library, asks the
//! [`planner`] which notebooks need work, reuses or produces an artifact
//! through the [`artifact_cache`], fans it out through the
//! [`dispatch::Dispatcher`] and records what each destination received in
//! the [`state_store::StateStore`].

pub mod artifact_cache;
pub mod destinations;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod planner;
pub mod providers;
pub mod retry;
pub mod state_store;
pub mod tree;
pub mod writer;

pub use artifact_cache::{Artifact, ArtifactCache};
pub use dispatch::{Destination, Dispatcher, PublishUnit};
pub use error::{DestinationError, ProviderError, SyncError, TreeError};
pub use pipeline::{CancelToken, Outcome, Pipeline, RunSummary};
pub use planner::{Plan, PlanOptions};
pub use state_store::{StateStore, SyncRecord};
