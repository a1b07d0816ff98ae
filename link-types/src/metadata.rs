//! Metadata attached to bulk artifact transfers.

use serde::{Deserialize, Serialize};

use crate::WireError;

/// The kind of content carried by a bulk transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    /// An audio recording captured on the companion
    Recording,
}

/// Metadata travelling alongside every bulk transfer.
///
/// `created_at` is the capture-time timestamp, preserved end-to-end so
/// the receiver can order artifacts by true creation time, not arrival
/// time. `queued` distinguishes a backlog drain transfer from a fresh
/// real-time one; the receiver uses it only for acknowledgment routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetadata {
    /// Content kind; receivers discard transfers of unexpected kinds
    #[serde(rename = "type")]
    pub kind: TransferKind,
    /// True when this transfer drains the offline backlog
    pub queued: bool,
    /// Unix timestamp (seconds) assigned at capture time
    pub created_at: u64,
    /// Free-form provenance tag (e.g. capture location)
    pub origin: String,
}

impl TransferMetadata {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_roundtrip() {
        let meta = TransferMetadata {
            kind: TransferKind::Recording,
            queued: true,
            created_at: 1756500000,
            origin: "wrist".into(),
        };

        let bytes = meta.to_bytes().unwrap();
        let restored = TransferMetadata::from_bytes(&bytes).unwrap();

        assert_eq!(meta, restored);
    }

    #[test]
    fn queued_flag_distinguishes_drain_from_fresh() {
        let fresh = TransferMetadata {
            kind: TransferKind::Recording,
            queued: false,
            created_at: 1,
            origin: String::new(),
        };
        let drained = TransferMetadata {
            queued: true,
            ..fresh.clone()
        };
        assert_ne!(fresh, drained);
    }
}
