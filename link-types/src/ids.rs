//! Identity types for Notelink.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// An opaque, stable reference to an artifact's content.
///
/// In practice this is a filesystem path on the capturing endpoint.
/// The locator must remain stable for the artifact's entire lifetime;
/// the delivery queue deduplicates on it.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    /// Create a locator from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The locator as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The locator interpreted as a filesystem path.
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator({})", self.0)
    }
}

impl From<&str> for Locator {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for Locator {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A unique identifier for one bulk-transfer attempt.
///
/// UUID v4 format (16 bytes). A new id is assigned per attempt, so a
/// retried artifact gets a fresh id each time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(uuid::Uuid);

impl TransferId {
    /// Create a new random TransferId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransferId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_roundtrips_as_transparent_string() {
        let loc = Locator::new("/tmp/recordings/a.m4a");
        let json = serde_json::to_string(&loc).unwrap();
        assert_eq!(json, "\"/tmp/recordings/a.m4a\"");
        let restored: Locator = serde_json::from_str(&json).unwrap();
        assert_eq!(loc, restored);
    }

    #[test]
    fn locator_as_path() {
        let loc = Locator::new("/tmp/a.m4a");
        assert_eq!(loc.as_path().extension().unwrap(), "m4a");
    }

    #[test]
    fn locator_equality_is_by_value() {
        assert_eq!(Locator::new("x"), Locator::from("x"));
        assert_ne!(Locator::new("x"), Locator::new("y"));
    }

    #[test]
    fn transfer_id_is_uuid_v4() {
        let id = TransferId::new();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn transfer_ids_are_unique() {
        assert_ne!(TransferId::new(), TransferId::new());
    }
}
