//! Tracked entries and their identity.
//!
//! A `TrackedEntry` is one detectable marker as the detector saw it at a point
//! in time. The key identifies the marker slot; the content is what the marker
//! currently says. Entries are immutable and shared by reference, so object
//! identity (`Arc::ptr_eq`) is meaningful: the same observation seen twice is
//! the same `EntryRef`.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Namespace for deterministic marker keys derived from names.
const MARKER_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_8d3b_4c7a_9e05_b1d2_c3f4_a5e6);

/// Shared handle to an immutable tracked entry.
pub type EntryRef = Arc<TrackedEntry>;

/// Stable identity of a marker slot.
///
/// Two entries with the same key denote the same slot, even when their content
/// differs.
///
/// # Examples
///
/// ```
/// use markersync::MarkerKey;
///
/// let a = MarkerKey::from_name("world:12,64,-3");
/// let b = MarkerKey::from_name("world:12,64,-3");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerKey(Uuid);

impl MarkerKey {
    /// Creates a new random key.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derives a deterministic key from a slot name (e.g. a block position).
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&MARKER_NAMESPACE, name.as_bytes()))
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MarkerKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MarkerKey {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Rendered content of a marker: its text lines, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerContent {
    /// Text lines, top to bottom.
    pub lines: Vec<String>,
}

impl MarkerContent {
    /// Creates content from any sequence of lines.
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// BLAKE3 digest of the lines, length-prefixed so that line boundaries count.
    #[must_use]
    pub fn digest(&self) -> ContentDigest {
        let mut hasher = blake3::Hasher::new();
        for line in &self.lines {
            hasher.update(&(line.len() as u64).to_le_bytes());
            hasher.update(line.as_bytes());
        }
        ContentDigest(*hasher.finalize().as_bytes())
    }
}

/// Stable hash of a marker's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Lowercase hex rendering, for logs.
    #[must_use]
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

/// One detectable marker as observed by the detector.
///
/// Never mutated after construction. The engine only ever holds it through an
/// [`EntryRef`].
///
/// The serialized digest is informational; deserializing recomputes it from
/// the content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "EntryRecord")]
pub struct TrackedEntry {
    key: MarkerKey,
    content: MarkerContent,
    digest: ContentDigest,
    observed_at: DateTime<Utc>,
}

impl TrackedEntry {
    /// Creates an entry observed now.
    #[must_use]
    pub fn new(key: MarkerKey, content: MarkerContent) -> Self {
        Self::with_observed_at(key, content, Utc::now())
    }

    /// Creates an entry with an explicit observation time.
    #[must_use]
    pub fn with_observed_at(key: MarkerKey, content: MarkerContent, observed_at: DateTime<Utc>) -> Self {
        let digest = content.digest();
        Self {
            key,
            content,
            digest,
            observed_at,
        }
    }

    /// Creates an entry whose key is derived from a slot name.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyMarkerName` if `name` is blank.
    pub fn named(name: &str, content: MarkerContent) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyMarkerName);
        }
        Ok(Self::new(MarkerKey::from_name(name), content))
    }

    /// Wraps this entry in a shared reference.
    #[must_use]
    pub fn into_ref(self) -> EntryRef {
        Arc::new(self)
    }

    /// Slot identity.
    #[must_use]
    pub const fn key(&self) -> MarkerKey {
        self.key
    }

    /// Observed content.
    #[must_use]
    pub const fn content(&self) -> &MarkerContent {
        &self.content
    }

    /// Digest of [`Self::content`].
    #[must_use]
    pub const fn digest(&self) -> ContentDigest {
        self.digest
    }

    /// When the detector produced this entry.
    #[must_use]
    pub const fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Returns true if both entries render exactly the same content.
    ///
    /// Keys are not compared.
    #[must_use]
    pub fn has_identical_content(&self, other: &Self) -> bool {
        self.digest == other.digest && self.content == other.content
    }
}

/// Wire shape of a `TrackedEntry`; any stored digest is ignored.
#[derive(Deserialize)]
struct EntryRecord {
    key: MarkerKey,
    content: MarkerContent,
    observed_at: DateTime<Utc>,
}

impl From<EntryRecord> for TrackedEntry {
    fn from(record: EntryRecord) -> Self {
        Self::with_observed_at(record.key, record.content, record.observed_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(lines: &[&str]) -> MarkerContent {
        MarkerContent::new(lines.iter().copied())
    }

    #[test]
    fn test_named_keys_are_deterministic() {
        assert_eq!(MarkerKey::from_name("a"), MarkerKey::from_name("a"));
        assert_ne!(MarkerKey::from_name("a"), MarkerKey::from_name("b"));
    }

    #[test]
    fn test_random_keys_differ() {
        assert_ne!(MarkerKey::new(), MarkerKey::new());
    }

    #[test]
    fn test_identical_content_ignores_key_and_time() {
        let a = TrackedEntry::new(MarkerKey::new(), content(&["[train]", "station"]));
        let b = TrackedEntry::new(MarkerKey::new(), content(&["[train]", "station"]));
        assert!(a.has_identical_content(&b));
    }

    #[test]
    fn test_line_boundaries_matter() {
        let a = content(&["ab", "c"]);
        let b = content(&["a", "bc"]);
        assert_ne!(a.digest(), b.digest());

        let ea = TrackedEntry::new(MarkerKey::new(), a);
        let eb = TrackedEntry::new(MarkerKey::new(), b);
        assert!(!ea.has_identical_content(&eb));
    }

    #[test]
    fn test_named_rejects_blank() {
        assert!(matches!(
            TrackedEntry::named("   ", MarkerContent::default()),
            Err(ValidationError::EmptyMarkerName)
        ));
        let entry = TrackedEntry::named(" slot ", MarkerContent::default()).unwrap();
        assert_eq!(entry.key(), MarkerKey::from_name("slot"));
    }

    #[test]
    fn test_digest_hex_is_64_chars() {
        assert_eq!(content(&["x"]).digest().to_hex().len(), 64);
    }

    #[test]
    fn test_entry_serde_roundtrip_keeps_digest() {
        let entry = TrackedEntry::named("slot", content(&["[train]"])).unwrap();
        let json = serde_json::to_string(&entry).unwrap();
        let back: TrackedEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.key(), entry.key());
        assert_eq!(back.observed_at(), entry.observed_at());
        assert!(back.has_identical_content(&entry));
    }

    #[test]
    fn test_deserialize_recomputes_stale_digest() {
        let entry = TrackedEntry::named("slot", content(&["[train]", "station"])).unwrap();
        let mut value = serde_json::to_value(&entry).unwrap();
        value["digest"] = serde_json::to_value(content(&["tampered"]).digest()).unwrap();

        let back: TrackedEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back.digest(), entry.content().digest());
        assert!(back.has_identical_content(&entry));
        assert!(entry.has_identical_content(&back));

        let mut without = serde_json::to_value(&entry).unwrap();
        without.as_object_mut().unwrap().remove("digest");
        let back: TrackedEntry = serde_json::from_value(without).unwrap();
        assert_eq!(back.digest(), entry.digest());
    }
}
