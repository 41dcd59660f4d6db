//! The owner-facing transition sink.

use crate::entry::EntryRef;

use super::active_set::ActiveSet;

/// Receives enter/leave notifications from a
/// [`ReconciliationEngine`](super::ReconciliationEngine).
///
/// Called synchronously from inside a pass. Implementations may change the
/// snapshot source the engine is reading, or the active set they are handed;
/// the engine detects either and restarts the pass. Do not assume the active
/// set looks the same after the call returns.
pub trait TransitionListener {
    /// `became_active` is true for an enter, false for a leave.
    fn on_transition(&mut self, entry: &EntryRef, became_active: bool, active: &mut ActiveSet);
}

impl<F> TransitionListener for F
where
    F: FnMut(&EntryRef, bool),
{
    fn on_transition(&mut self, entry: &EntryRef, became_active: bool, _active: &mut ActiveSet) {
        self(entry, became_active);
    }
}
