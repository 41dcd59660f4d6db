//! The engine's belief of which markers are currently in effect.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::entry::{EntryRef, MarkerKey};

/// Shared, copy-on-write list of active entries.
///
/// Holding one of these while the engine keeps running is safe: the engine
/// copies the list before its next change instead of mutating it in place.
pub type ActiveEntries = Arc<VecDeque<EntryRef>>;

/// Keyed, ordered set of active entries.
///
/// The key index and the ordered list always hold the same entries. Mutations
/// made through this type never fire transitions; they are what a listener
/// sees when it is handed the set during a callback, and every change bumps
/// [`ActiveSet::modifications`] so the engine notices it.
#[derive(Debug, Default)]
pub struct ActiveSet {
    by_key: HashMap<MarkerKey, EntryRef>,
    ordered: ActiveEntries,
    modifications: u64,
}

impl ActiveSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Returns true if nothing is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Count of structural changes ever made to this set.
    #[must_use]
    pub const fn modifications(&self) -> u64 {
        self.modifications
    }

    /// Entry currently stored under `key`.
    #[must_use]
    pub fn get(&self, key: MarkerKey) -> Option<&EntryRef> {
        self.by_key.get(&key)
    }

    /// Returns true if some entry is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: MarkerKey) -> bool {
        self.by_key.contains_key(&key)
    }

    /// True if `entry` itself is active, or an entry with its key and
    /// identical content is.
    #[must_use]
    pub fn contains_matching(&self, entry: &EntryRef) -> bool {
        self.by_key
            .get(&entry.key())
            .is_some_and(|tracked| Arc::ptr_eq(tracked, entry) || tracked.has_identical_content(entry))
    }

    /// Cheap shared handle to the current ordered list.
    #[must_use]
    pub fn entries(&self) -> ActiveEntries {
        Arc::clone(&self.ordered)
    }

    /// Iterates active entries in order.
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, EntryRef> {
        self.ordered.iter()
    }

    /// Stores `entry` under its key.
    ///
    /// A new key is appended; an existing key keeps its position and has its
    /// entry swapped. Returns the previous entry for that key. Storing the very
    /// entry that is already there changes nothing.
    pub fn insert(&mut self, entry: EntryRef) -> Option<EntryRef> {
        let key = entry.key();
        if let Some(prev) = self.by_key.get(&key) {
            if Arc::ptr_eq(prev, &entry) {
                return Some(Arc::clone(prev));
            }
        }

        let prev = self.by_key.insert(key, Arc::clone(&entry));
        let ordered = Arc::make_mut(&mut self.ordered);
        let slot = prev
            .as_ref()
            .and_then(|p| ordered.iter().position(|e| Arc::ptr_eq(e, p)));
        match slot {
            Some(idx) => ordered[idx] = entry,
            None => ordered.push_back(entry),
        }
        self.modifications += 1;
        self.debug_check();
        prev
    }

    /// Removes the entry stored under `key`.
    pub fn remove(&mut self, key: MarkerKey) -> Option<EntryRef> {
        let removed = self.by_key.remove(&key)?;
        let ordered = Arc::make_mut(&mut self.ordered);
        if let Some(idx) = ordered.iter().position(|e| Arc::ptr_eq(e, &removed)) {
            ordered.remove(idx);
        }
        self.modifications += 1;
        self.debug_check();
        Some(removed)
    }

    /// Removes and returns the first entry in iteration order.
    pub fn pop_front(&mut self) -> Option<EntryRef> {
        if self.ordered.is_empty() {
            return None;
        }
        let front = Arc::make_mut(&mut self.ordered).pop_front()?;
        self.by_key.remove(&front.key());
        self.modifications += 1;
        debug_assert_eq!(self.by_key.len(), self.ordered.len());
        Some(front)
    }

    /// Empties the set in one step.
    pub fn clear(&mut self) {
        if self.ordered.is_empty() && self.by_key.is_empty() {
            return;
        }
        self.by_key.clear();
        self.ordered = Arc::new(VecDeque::new());
        self.modifications += 1;
    }

    fn debug_check(&self) {
        debug_assert_eq!(self.by_key.len(), self.ordered.len());
        debug_assert!(self
            .ordered
            .iter()
            .all(|e| self.by_key.get(&e.key()).is_some_and(|k| Arc::ptr_eq(k, e))));
    }
}

impl<'a> IntoIterator for &'a ActiveSet {
    type Item = &'a EntryRef;
    type IntoIter = std::collections::vec_deque::Iter<'a, EntryRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
