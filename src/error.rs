//! Error types for markersync.
//!
//! All errors in markersync are strongly typed using thiserror.
//! Revision conflicts during a pass are ordinary control flow and never
//! surface here; only conditions the owner should know about do.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::MarkerKey;

/// Validation errors that occur during input validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The same key appears twice in one snapshot.
    #[error("Duplicate marker key in snapshot: {key}")]
    DuplicateKey {
        /// The repeated key.
        key: MarkerKey,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration field '{field}': {reason}")]
    InvalidConfig {
        /// Name of the offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A named entry was given a blank name.
    #[error("Marker name cannot be empty")]
    EmptyMarkerName,
}

/// The kind of pass that ran out of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    /// A `reconcile` call against a snapshot source.
    Reconcile,
    /// A forced `clear` of the active set.
    Clear,
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconcile => write!(f, "reconcile"),
            Self::Clear => write!(f, "clear"),
        }
    }
}

/// Top-level error type for markersync.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The pass kept being invalidated by listener side effects.
    ///
    /// The active set is left as the last attempt left it.
    #[error("{operation} gave up after {attempts} attempts; a listener keeps mutating its input")]
    RetryLimitExceeded {
        /// Which pass gave up.
        operation: PassKind,
        /// Attempts (or restarts, for `clear`) made before giving up.
        attempts: usize,
    },

    /// Configuration could not be read or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable cause.
        message: String,
    },
}

impl ReconcileError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if a pass hit its attempt ceiling.
    #[must_use]
    pub const fn is_retry_limit(&self) -> bool {
        matches!(self, Self::RetryLimitExceeded { .. })
    }
}

/// Result type alias for markersync operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
