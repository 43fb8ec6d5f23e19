//! Broadcast engine
//!
//! Replicates one source record into linked copies on other workspaces.
//!
//! Flow of one operation:
//! 1. [`Broadcaster::prepare`] - validate the request and build a [`BroadcastContext`]
//! 2. [`Broadcaster::replicate`] - collect terms, attributes and assets once,
//!    then create or update the copy on every target
//! 3. [`Pipeline`] stages fire around each step so handlers can skip targets
//!    or rewrite the body
//!
//! Linked copies are managed afterwards through [`actions`].

pub mod actions;
pub mod assets;
pub mod context;
pub mod guard;
pub mod metadata;
pub mod orchestrator;
pub mod pipeline;
pub mod shortcode;
pub mod taxonomy;

pub use actions::{ActionReport, LifecycleEvent, RecordAction};
pub use context::{BroadcastContext, BroadcastRequest, Facets, TargetOutcome, TargetStatus};
pub use orchestrator::{Broadcaster, SaveHookOutcome, SkipReason};
pub use pipeline::{Pipeline, Stage, StageFlow, StageHandler};
