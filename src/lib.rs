//! # markersync - Membership reconciliation for marker trackers
//!
//! A tracker moving along a path periodically recomputes which markers it can
//! currently detect. markersync keeps a persistent *active set* of markers in
//! step with that *observed set*, firing an enter or leave transition for each
//! difference. Transition listeners run synchronously and may change the
//! observed set while a pass is in progress; the engine notices through the
//! source's revision counter and restarts, so it never double-fires and never
//! loops forever.
//!
//! ## Core Concepts
//!
//! - **TrackedEntry**: An immutable observation of one marker: key, content, digest
//! - **ObservedSnapshot**: Entries currently detectable, tagged with a revision
//! - **ReconciliationEngine**: Owns the active set and runs reconcile/clear passes
//! - **TransitionListener**: The owner's callback for enter and leave events
//!
//! ## Usage
//!
//! ```rust
//! use markersync::{EntryRef, MarkerContent, ObservedSet, ReconciliationEngine, TrackedEntry};
//!
//! let source = ObservedSet::new();
//! source.upsert(TrackedEntry::named("world:12,64,-3", MarkerContent::new(["[train]", "station"]))?.into_ref());
//!
//! let mut engine = ReconciliationEngine::new(|entry: &EntryRef, entered: bool| {
//!     println!("{} {}", entry.key(), if entered { "entered" } else { "left" });
//! });
//! engine.reconcile(&source)?;
//! assert_eq!(engine.len(), 1);
//!
//! engine.clear()?;
//! assert!(engine.is_empty());
//! # Ok::<(), markersync::ReconcileError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod snapshot;
pub mod stream;

// Re-export primary types at crate root for convenience
pub use config::ReconcilerConfig;
pub use engine::{
    ActiveEntries, ActiveSet, ClearReport, ReconcileReport, ReconciliationEngine, TransitionListener,
};
pub use entry::{ContentDigest, EntryRef, MarkerContent, MarkerKey, TrackedEntry};
pub use error::{PassKind, ReconcileError, ReconcileResult, ValidationError};
pub use snapshot::{ObservedSet, ObservedSnapshot, Revision, SnapshotSource};
pub use stream::{transition_stream, StreamListener, TransitionEvent, TransitionStream};
