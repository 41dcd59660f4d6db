//! Channel-backed transition sink.
//!
//! Owners that prefer to process transitions after a pass, or on another
//! thread, can plug a [`StreamListener`] into the engine and read events from
//! the paired [`TransitionStream`]. Sending never blocks the pass: when the
//! buffer is full or the stream is gone, the event is dropped and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::engine::{ActiveSet, TransitionListener};
use crate::entry::EntryRef;

/// One fired transition.
#[derive(Debug, Clone)]
pub struct TransitionEvent {
    /// Entry the transition fired for.
    pub entry: EntryRef,
    /// True for an enter, false for a leave.
    pub became_active: bool,
    /// When the listener received it.
    pub fired_at: DateTime<Utc>,
}

/// Creates a listener/stream pair with room for `capacity` pending events.
#[must_use]
pub fn transition_stream(capacity: usize) -> (StreamListener, TransitionStream) {
    let (tx, rx) = bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let listener = StreamListener {
        tx,
        dropped: Arc::clone(&dropped),
    };
    (listener, TransitionStream { rx, dropped })
}

/// Listener half: forwards every transition into the channel.
#[derive(Debug)]
pub struct StreamListener {
    tx: Sender<TransitionEvent>,
    dropped: Arc<AtomicU64>,
}

impl TransitionListener for StreamListener {
    fn on_transition(&mut self, entry: &EntryRef, became_active: bool, _active: &mut ActiveSet) {
        let event = TransitionEvent {
            entry: Arc::clone(entry),
            became_active,
            fired_at: Utc::now(),
        };
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Receiving half.
#[derive(Debug)]
pub struct TransitionStream {
    rx: Receiver<TransitionEvent>,
    dropped: Arc<AtomicU64>,
}

impl TransitionStream {
    /// Next pending event, if any.
    #[must_use]
    pub fn try_recv(&self) -> Option<TransitionEvent> {
        self.rx.try_recv().ok()
    }

    /// Takes every pending event, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<TransitionEvent> {
        self.rx.try_iter().collect()
    }

    /// Events lost because the buffer was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
