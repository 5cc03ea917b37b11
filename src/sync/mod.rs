//! Dirty-flag sync to the remote tracker.
//!
//! # Protocol
//!
//! 1. Trigger detectors mutate the cache and set `dirty` on the epic
//! 2. At a checkpoint, [`SyncEngine::sync_dirty`] renders each dirty epic
//! 3. Body, labels, state and (optionally) a progress comment are pushed
//! 4. On success `dirty` is cleared and the cache saved; transient
//!    failures leave it set for the next pass
//!
//! # Example
//!
//! ```ignore
//! use epictrack::sync::SyncEngine;
//!
//! let engine = SyncEngine::new(client, plans, settings.tracking, store, repo.slug());
//! let report = engine.sync_dirty(&mut cache).await?;
//! ```

mod engine;
mod render;
mod status;
mod types;

pub use engine::SyncEngine;
pub use render::{BODY_MARKER, render_epic_body, render_progress_comment};
pub use status::{print_status, sync_status};
pub use types::{DeferredSync, FailedSync, SyncOutcome, SyncReport, SyncStatus};
