//! Observed snapshots and the sources that produce them.
//!
//! A snapshot is a point-in-time read of what the detector currently sees,
//! tagged with the source's revision. The engine compares revisions taken at
//! different points of one pass to detect that a listener changed the source
//! underneath it.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use crate::entry::{EntryRef, MarkerKey};
use crate::error::ValidationError;

/// Monotonic modification counter of a snapshot source.
pub type Revision = u64;

/// Point-in-time view of the observed entries.
#[derive(Debug, Clone, Default)]
pub struct ObservedSnapshot {
    revision: Revision,
    entries: Vec<EntryRef>,
}

impl ObservedSnapshot {
    /// Pairs `entries` with the revision they were read at.
    #[must_use]
    pub fn new(revision: Revision, entries: Vec<EntryRef>) -> Self {
        Self { revision, entries }
    }

    /// Source revision at read time.
    #[must_use]
    pub const fn revision(&self) -> Revision {
        self.revision
    }

    /// Observed entries in detection order.
    #[must_use]
    pub fn entries(&self) -> &[EntryRef] {
        &self.entries
    }

    /// Returns true if nothing was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of observed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks that no key appears twice.
    ///
    /// The engine does not call this; which occurrence of a duplicated key wins
    /// is unspecified, so owners assembling snapshots by hand should.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DuplicateKey` for the first repeated key.
    pub fn validate_unique_keys(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !seen.insert(entry.key()) {
                return Err(ValidationError::DuplicateKey { key: entry.key() });
            }
        }
        Ok(())
    }
}

/// Supplier of observed snapshots.
///
/// Every call must reflect the current truth, not a cached read: the engine
/// calls it again mid-pass to learn whether a listener changed anything.
pub trait SnapshotSource {
    /// Reads the current entries and revision.
    fn snapshot(&self) -> ObservedSnapshot;

    /// Reads only the current revision.
    ///
    /// Sources that can answer without building a snapshot should override this.
    fn revision(&self) -> Revision {
        self.snapshot().revision()
    }
}

impl<F> SnapshotSource for F
where
    F: Fn() -> ObservedSnapshot,
{
    fn snapshot(&self) -> ObservedSnapshot {
        self()
    }
}

#[derive(Debug, Default)]
struct ObservedState {
    revision: Revision,
    entries: Vec<EntryRef>,
}

impl ObservedState {
    fn position(&self, key: MarkerKey) -> Option<usize> {
        self.entries.iter().position(|e| e.key() == key)
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}

/// Shareable, modification-tracked list of observed entries.
///
/// Clones share the same underlying list, so an owner can hand one clone to
/// the engine as its source and another to the listener that reacts to
/// transitions. The revision only moves on structural change: re-inserting the
/// very same `EntryRef` is a no-op.
///
/// Keys are unique: `upsert` replaces an entry with the same key in place.
#[derive(Debug, Clone, Default)]
pub struct ObservedSet {
    inner: Arc<RwLock<ObservedState>>,
}

impl ObservedSet {
    /// Creates an empty set at revision 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set seeded with `entries`; later duplicates of a key win.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = EntryRef>) -> Self {
        let set = Self::new();
        for entry in entries {
            set.upsert(entry);
        }
        set
    }

    // Lock is never held across caller code, so poisoning only means a panic
    // in one of the short methods below; the state is still coherent.
    fn read<R>(&self, f: impl FnOnce(&ObservedState) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut ObservedState) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Inserts or replaces the entry for its key.
    ///
    /// Returns the replaced entry, if any.
    pub fn upsert(&self, entry: EntryRef) -> Option<EntryRef> {
        self.write(|state| match state.position(entry.key()) {
            Some(idx) if Arc::ptr_eq(&state.entries[idx], &entry) => None,
            Some(idx) => {
                let old = std::mem::replace(&mut state.entries[idx], entry);
                state.bump();
                Some(old)
            }
            None => {
                state.entries.push(entry);
                state.bump();
                None
            }
        })
    }

    /// Removes the entry with `key`.
    pub fn remove(&self, key: MarkerKey) -> Option<EntryRef> {
        self.write(|state| {
            let idx = state.position(key)?;
            let old = state.entries.remove(idx);
            state.bump();
            Some(old)
        })
    }

    /// Replaces the whole list, bumping the revision only if it differs.
    ///
    /// Later duplicates of a key replace earlier ones.
    pub fn replace_all(&self, entries: impl IntoIterator<Item = EntryRef>) {
        let mut next: Vec<EntryRef> = Vec::new();
        for entry in entries {
            match next.iter().position(|e| e.key() == entry.key()) {
                Some(idx) => next[idx] = entry,
                None => next.push(entry),
            }
        }
        self.write(|state| {
            let unchanged = state.entries.len() == next.len()
                && state.entries.iter().zip(&next).all(|(a, b)| Arc::ptr_eq(a, b));
            if !unchanged {
                state.entries = next;
                state.bump();
            }
        });
    }

    /// Removes every entry; bumps the revision only if it was non-empty.
    pub fn clear(&self) {
        self.write(|state| {
            if !state.entries.is_empty() {
                state.entries.clear();
                state.bump();
            }
        });
    }

    /// Returns true if an entry with `key` is observed.
    #[must_use]
    pub fn contains(&self, key: MarkerKey) -> bool {
        self.read(|state| state.position(key).is_some())
    }

    /// Number of observed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read(|state| state.entries.len())
    }

    /// Returns true if nothing is observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotSource for ObservedSet {
    fn snapshot(&self) -> ObservedSnapshot {
        self.read(|state| ObservedSnapshot::new(state.revision, state.entries.clone()))
    }

    fn revision(&self) -> Revision {
        self.read(|state| state.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{MarkerContent, TrackedEntry};

    fn entry(name: &str, text: &str) -> EntryRef {
        TrackedEntry::named(name, MarkerContent::new([text])).unwrap().into_ref()
    }

    #[test]
    fn test_revision_moves_on_structural_change_only() {
        let set = ObservedSet::new();
        assert_eq!(set.revision(), 0);

        let a = entry("a", "x");
        set.upsert(Arc::clone(&a));
        assert_eq!(set.revision(), 1);

        // Same object again: no change.
        set.upsert(Arc::clone(&a));
        assert_eq!(set.revision(), 1);

        // Same key, new object: replaced in place.
        let a2 = entry("a", "x");
        let old = set.upsert(Arc::clone(&a2)).unwrap();
        assert!(Arc::ptr_eq(&old, &a));
        assert_eq!(set.revision(), 2);
        assert_eq!(set.len(), 1);

        assert!(set.remove(MarkerKey::from_name("missing")).is_none());
        assert_eq!(set.revision(), 2);

        assert!(set.remove(a2.key()).is_some());
        assert_eq!(set.revision(), 3);

        set.clear();
        assert_eq!(set.revision(), 3);
    }

    #[test]
    fn test_clones_share_state() {
        let set = ObservedSet::new();
        let other = set.clone();
        other.upsert(entry("a", "x"));
        assert!(set.contains(MarkerKey::from_name("a")));
        assert_eq!(set.revision(), other.revision());
    }

    #[test]
    fn test_replace_all_detects_identity() {
        let a = entry("a", "x");
        let b = entry("b", "y");
        let set = ObservedSet::with_entries([Arc::clone(&a), Arc::clone(&b)]);
        let rev = set.revision();

        set.replace_all([Arc::clone(&a), Arc::clone(&b)]);
        assert_eq!(set.revision(), rev);

        set.replace_all([Arc::clone(&b), Arc::clone(&a)]);
        assert_eq!(set.revision(), rev + 1);

        let snap = set.snapshot();
        assert_eq!(snap.entries()[0].key(), b.key());
        assert_eq!(snap.revision(), rev + 1);
    }

    #[test]
    fn test_validate_unique_keys() {
        let a = entry("a", "x");
        let a_again = entry("a", "y");
        let snap = ObservedSnapshot::new(1, vec![Arc::clone(&a), entry("b", "z")]);
        assert!(snap.validate_unique_keys().is_ok());

        let dup = ObservedSnapshot::new(1, vec![a, a_again]);
        assert!(matches!(
            dup.validate_unique_keys(),
            Err(ValidationError::DuplicateKey { key }) if key == MarkerKey::from_name("a")
        ));
    }

    #[test]
    fn test_closure_source_reports_revision_via_snapshot() {
        let source = || ObservedSnapshot::new(7, Vec::new());
        assert_eq!(source.revision(), 7);
        assert!(source.snapshot().is_empty());
    }
}
