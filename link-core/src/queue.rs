//! In-memory model of the persistent artifact queue.
//!
//! This module owns the delivered-flag invariants; link-engine wraps the
//! snapshot with a write-through store for durability. Content-existence
//! is injected as a closure so the model stays pure and instantly
//! testable.
//!
//! Invariant: exactly one record exists per distinct locator, ever.
//! Re-inserting a locator is a no-op, and a delivered record never
//! reappears in the pending view.

use link_types::Locator;
use serde::{Deserialize, Serialize};

/// One pending or historical artifact delivery record.
///
/// This is also the persisted shape: the queue file is a JSON array of
/// these records and must round-trip exactly through process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Stable reference to the artifact's content.
    pub locator: Locator,
    /// Unix timestamp (seconds) assigned at capture time - preserved
    /// through the entire delivery pipeline.
    pub created_at: u64,
    /// Free-form provenance tag, propagated end-to-end.
    pub origin: String,
    /// False until the receiver acknowledged complete receipt.
    pub delivered: bool,
}

/// The full, ordered set of artifact records.
///
/// Records are kept in insertion order (oldest first); delivered records
/// are retained for audit but excluded from the pending view.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    records: Vec<ArtifactRecord>,
}

impl QueueSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a snapshot from persisted records.
    pub fn from_records(records: Vec<ArtifactRecord>) -> Self {
        Self { records }
    }

    /// All records, including delivered ones (for persistence/audit).
    pub fn records(&self) -> &[ArtifactRecord] {
        &self.records
    }

    /// Idempotent insert. Returns true when a new record was created,
    /// false when the locator was already present (delivered or not).
    pub fn insert(&mut self, locator: Locator, created_at: u64, origin: String) -> bool {
        if self.records.iter().any(|r| r.locator == locator) {
            return false;
        }
        self.records.push(ArtifactRecord {
            locator,
            created_at,
            origin,
            delivered: false,
        });
        true
    }

    /// Idempotent delivered-flag set. Returns true when the flag
    /// actually flipped.
    pub fn mark_delivered(&mut self, locator: &Locator) -> bool {
        match self
            .records
            .iter_mut()
            .find(|r| &r.locator == locator && !r.delivered)
        {
            Some(record) => {
                record.delivered = true;
                true
            }
            None => false,
        }
    }

    /// Look up a record by locator.
    pub fn get(&self, locator: &Locator) -> Option<&ArtifactRecord> {
        self.records.iter().find(|r| &r.locator == locator)
    }

    /// Number of records with `delivered == false`.
    pub fn pending_count(&self) -> usize {
        self.records.iter().filter(|r| !r.delivered).count()
    }

    /// Pending records whose content still exists, oldest first.
    ///
    /// Records whose content has vanished are marked delivered as a side
    /// effect (purged): a vanished source can never be retried, so it is
    /// dropped from the pending view to avoid infinite retry loops. The
    /// second tuple element is the number of records purged this way.
    pub fn pending_with(
        &mut self,
        exists: impl Fn(&Locator) -> bool,
    ) -> (Vec<ArtifactRecord>, usize) {
        let mut purged = 0;
        for record in self.records.iter_mut().filter(|r| !r.delivered) {
            if !exists(&record.locator) {
                record.delivered = true;
                purged += 1;
            }
        }
        let pending = self
            .records
            .iter()
            .filter(|r| !r.delivered)
            .cloned()
            .collect();
        (pending, purged)
    }
}
