//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, ReconcileResult, ValidationError};

/// Limits applied by a [`ReconciliationEngine`](crate::ReconciliationEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Attempts one `reconcile` call may make before giving up for this tick.
    pub max_attempts: usize,
    /// Times `clear` may restart after a listener changed the active set.
    pub max_clear_restarts: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1000,
            max_clear_restarts: 100,
        }
    }
}

impl ReconcilerConfig {
    /// Checks that every limit allows at least one attempt.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_clear_restarts == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "max_clear_restarts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Parses and validates a JSON document. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Config` on malformed JSON and
    /// `ReconcileError::Validation` on out-of-range limits.
    pub fn from_json_str(json: &str) -> ReconcileResult<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| ReconcileError::config(format!("invalid reconciler config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses, and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_json_str`], plus `ReconcileError::Config` if the
    /// file cannot be read.
    pub fn from_json_file(path: impl AsRef<Path>) -> ReconcileResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ReconcileError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ReconcilerConfig::default();
        assert_eq!(cfg.max_attempts, 1000);
        assert_eq!(cfg.max_clear_restarts, 100);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg = ReconcilerConfig::from_json_str(r#"{"max_attempts": 8}"#).unwrap();
        assert_eq!(cfg.max_attempts, 8);
        assert_eq!(cfg.max_clear_restarts, 100);
    }

    #[test]
    fn test_zero_limits_rejected() {
        let err = ReconcilerConfig::from_json_str(r#"{"max_clear_restarts": 0}"#).unwrap_err();
        assert!(err.is_validation());
        assert!(format!("{err}").contains("max_clear_restarts"));
    }

    #[test]
    fn test_malformed_json() {
        let err = ReconcilerConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ReconcileError::Config { .. }));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconciler.json");
        std::fs::write(&path, r#"{"max_attempts": 3, "max_clear_restarts": 2}"#).unwrap();

        let cfg = ReconcilerConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg, ReconcilerConfig { max_attempts: 3, max_clear_restarts: 2 });

        let missing = ReconcilerConfig::from_json_file(dir.path().join("nope.json")).unwrap_err();
        assert!(format!("{missing}").contains("failed to read"));
    }
}
