//! Reconciliation engine.
//!
//! The engine owns the active set and brings it in line with an observed
//! snapshot, notifying a [`TransitionListener`] of every enter and leave.
//! Listeners run on the same call stack as the pass and may change the source
//! being reconciled against; the engine detects this through the source's
//! revision and restarts the pass, up to a configured number of attempts.

/// Keyed, ordered set of active entries.
pub mod active_set;
/// Transition sink trait.
pub mod listener;

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use crate::config::ReconcilerConfig;
use crate::entry::{EntryRef, MarkerKey, TrackedEntry};
use crate::error::{PassKind, ReconcileError, ReconcileResult};
use crate::snapshot::{Revision, SnapshotSource};

pub use active_set::{ActiveEntries, ActiveSet};
pub use listener::TransitionListener;

/// Summary of a successful `reconcile` call.
///
/// Counts cover every attempt, including transitions fired by attempts that
/// were later restarted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Attempts made, the successful one included.
    pub attempts: usize,
    /// Revision of the snapshot the final attempt completed against.
    pub revision: Revision,
    /// Enter transitions fired.
    pub entered: usize,
    /// Leave transitions fired.
    pub left: usize,
    /// Entries swapped for a new object with identical content, without events.
    pub refreshed: usize,
}

impl ReconcileReport {
    /// True if no transition fired.
    #[must_use]
    pub const fn is_quiet(&self) -> bool {
        self.entered == 0 && self.left == 0
    }
}

/// Summary of a successful `clear` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearReport {
    /// Leave transitions fired.
    pub left: usize,
    /// Times a listener changed the active set mid-clear.
    pub restarts: usize,
}

/// Where in a pass a conflict was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Drain,
    Enter,
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Complete,
    Conflict(Stage),
}

/// Keeps an active set of markers in sync with what a detector observes.
///
/// Not meant for concurrent use; `reconcile` and `clear` take `&mut self`.
#[derive(Debug)]
pub struct ReconciliationEngine<L> {
    config: ReconcilerConfig,
    listener: L,
    active: ActiveSet,
    // Reused between passes.
    stale: Vec<EntryRef>,
    update_requested: bool,
}

impl<L: TransitionListener> ReconciliationEngine<L> {
    /// Creates an engine with default limits.
    pub fn new(listener: L) -> Self {
        Self {
            config: ReconcilerConfig::default(),
            listener,
            active: ActiveSet::new(),
            stale: Vec::new(),
            update_requested: false,
        }
    }

    /// Creates an engine with explicit limits.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any limit is zero.
    pub fn with_config(config: ReconcilerConfig, listener: L) -> ReconcileResult<Self> {
        config.validate()?;
        let mut engine = Self::new(listener);
        engine.config = config;
        Ok(engine)
    }

    /// Limits this engine runs with.
    #[must_use]
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// The injected transition listener.
    #[must_use]
    pub const fn listener(&self) -> &L {
        &self.listener
    }

    /// Mutable access to the listener between passes.
    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// Consumes the engine without firing leave events for active entries.
    pub fn into_listener(self) -> L {
        self.listener
    }

    /// Read-only view of the active set.
    #[must_use]
    pub const fn active(&self) -> &ActiveSet {
        &self.active
    }

    /// Active entries in stable iteration order.
    #[must_use]
    pub fn active_entries(&self) -> ActiveEntries {
        self.active.entries()
    }

    /// Returns true if an entry with `key` is active.
    #[must_use]
    pub fn contains(&self, key: MarkerKey) -> bool {
        self.active.contains_key(key)
    }

    /// True if `entry`, or an entry with the same key and content, is active.
    #[must_use]
    pub fn contains_matching(&self, entry: &EntryRef) -> bool {
        self.active.contains_matching(entry)
    }

    /// Returns true if nothing is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of active entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Flags that the owner should reconcile on its next tick.
    pub fn request_update(&mut self) {
        self.update_requested = true;
    }

    /// Whether an update was requested and not yet taken.
    #[must_use]
    pub const fn update_requested(&self) -> bool {
        self.update_requested
    }

    /// Returns the update flag and resets it.
    pub fn take_update_request(&mut self) -> bool {
        std::mem::take(&mut self.update_requested)
    }

    /// Brings the active set in line with `source`.
    ///
    /// Restarts from a fresh snapshot whenever a listener changes the source or
    /// the active set mid-pass.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::RetryLimitExceeded` if every allowed attempt
    /// was invalidated. The active set is then left as the last attempt left
    /// it; the next successful call repairs it.
    pub fn reconcile<S>(&mut self, source: &S) -> ReconcileResult<ReconcileReport>
    where
        S: SnapshotSource + ?Sized,
    {
        let mut report = ReconcileReport::default();
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            report.attempts = attempt;
            match self.try_reconcile(source, &mut report) {
                Attempt::Complete => return Ok(report),
                Attempt::Conflict(stage) => {
                    debug!(attempt, ?stage, "observed markers changed mid-pass; restarting");
                }
            }
        }

        error!(
            attempts = max_attempts,
            active = self.active.len(),
            "reached limit of attempts reconciling active markers"
        );
        Err(ReconcileError::RetryLimitExceeded {
            operation: PassKind::Reconcile,
            attempts: max_attempts,
        })
    }

    fn try_reconcile<S>(&mut self, source: &S, report: &mut ReconcileReport) -> Attempt
    where
        S: SnapshotSource + ?Sized,
    {
        let snapshot = source.snapshot();
        let revision = snapshot.revision();
        report.revision = revision;

        if snapshot.is_empty() {
            while let Some(entry) = self.active.pop_front() {
                let mods = self.active.modifications();
                self.fire(&entry, false);
                report.left += 1;
                if self.conflicted(source, revision, mods) {
                    return Attempt::Conflict(Stage::Drain);
                }
            }
            return Attempt::Complete;
        }

        for entry in snapshot.entries() {
            let mods = match self.active.insert(Arc::clone(entry)) {
                None => {
                    let mods = self.active.modifications();
                    self.fire(entry, true);
                    report.entered += 1;
                    mods
                }
                Some(prev) if Arc::ptr_eq(&prev, entry) => continue,
                Some(prev) if prev.has_identical_content(entry) => {
                    report.refreshed += 1;
                    continue;
                }
                Some(prev) => {
                    let mods = self.active.modifications();
                    self.fire(&prev, false);
                    report.left += 1;
                    self.fire(entry, true);
                    report.entered += 1;
                    mods
                }
            };
            if self.conflicted(source, revision, mods) {
                return Attempt::Conflict(Stage::Enter);
            }
        }

        // Every observed entry is stored by now, so anything active that is not
        // one of the observed objects is stale.
        let observed: HashSet<*const TrackedEntry> = snapshot.entries().iter().map(Arc::as_ptr).collect();
        self.stale.clear();
        self.stale.extend(
            self.active
                .iter()
                .filter(|e| !observed.contains(&Arc::as_ptr(e)))
                .cloned(),
        );

        for idx in 0..self.stale.len() {
            let old = Arc::clone(&self.stale[idx]);
            let removed = self.active.remove(old.key());
            let mods = self.active.modifications();
            if removed.is_some_and(|r| Arc::ptr_eq(&r, &old)) {
                self.fire(&old, false);
                report.left += 1;
            }
            if self.conflicted(source, revision, mods) {
                self.stale.clear();
                return Attempt::Conflict(Stage::Leave);
            }
        }
        self.stale.clear();

        Attempt::Complete
    }

    /// Empties the active set, firing a leave for each entry in order.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::RetryLimitExceeded` if listeners kept changing
    /// the active set. The set is emptied regardless.
    pub fn clear(&mut self) -> ReconcileResult<ClearReport> {
        let mut report = ClearReport::default();
        let mut expected = self.active.len();
        let mut exhausted = false;

        while let Some(entry) = self.active.pop_front() {
            expected = expected.saturating_sub(1);
            self.fire(&entry, false);
            report.left += 1;

            if self.active.len() != expected {
                expected = self.active.len();
                report.restarts += 1;
                if report.restarts >= self.config.max_clear_restarts {
                    exhausted = true;
                    break;
                }
            }
        }

        self.active.clear();

        if exhausted {
            warn!(
                restarts = report.restarts,
                left = report.left,
                "clearing active markers exceeded restart limit; dropped the rest silently"
            );
            return Err(ReconcileError::RetryLimitExceeded {
                operation: PassKind::Clear,
                attempts: report.restarts,
            });
        }
        Ok(report)
    }

    /// Removes one active entry, firing a leave for it.
    ///
    /// Returns false if nothing was active under `key`.
    pub fn remove(&mut self, key: MarkerKey) -> bool {
        match self.active.remove(key) {
            Some(entry) => {
                self.fire(&entry, false);
                true
            }
            None => false,
        }
    }

    fn fire(&mut self, entry: &EntryRef, became_active: bool) {
        trace!(key = %entry.key(), became_active, "marker transition");
        self.listener.on_transition(entry, became_active, &mut self.active);
    }

    fn conflicted<S>(&self, source: &S, revision: Revision, modifications: u64) -> bool
    where
        S: SnapshotSource + ?Sized,
    {
        self.active.modifications() != modifications || source.revision() != revision
    }
}
