//! Durable storage for the artifact queue.
//!
//! The queue snapshot is persisted as a JSON array of records, written
//! atomically (temp file then rename) so a crash mid-write never leaves
//! a corrupt ledger. A memory-backed implementation is provided for
//! testing.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, warn};

use link_core::{ArtifactRecord, QueueSnapshot};
use link_types::Locator;

/// Errors from queue persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("queue i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file is not valid JSON.
    #[error("queue file corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Persistence backend for the artifact queue.
///
/// Load returns the full set of records; save replaces it. Operations
/// are synchronous because snapshots are small and callers hold no
/// locks across them.
pub trait QueueStore: Send + Sync {
    /// Load all records. A missing backing file is an empty queue.
    fn load(&self) -> Result<Vec<ArtifactRecord>, StoreError>;

    /// Replace the persisted records with the given set.
    fn save(&self, records: &[ArtifactRecord]) -> Result<(), StoreError>;
}

/// Queue store backed by a JSON file on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store backed by the given file path. The file is not
    /// touched until the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl QueueStore for JsonFileStore {
    fn load(&self) -> Result<Vec<ArtifactRecord>, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn save(&self, records: &[ArtifactRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(records)?;
        // Write to a sibling temp file and rename over the target so a
        // crash mid-write cannot corrupt the ledger.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory queue store for testing. Cloning shares state.
#[derive(Debug, Default, Clone)]
pub struct MemoryQueueStore {
    records: Arc<Mutex<Vec<ArtifactRecord>>>,
}

impl MemoryQueueStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueStore for MemoryQueueStore {
    fn load(&self) -> Result<Vec<ArtifactRecord>, StoreError> {
        Ok(self.records.lock().unwrap().clone())
    }

    fn save(&self, records: &[ArtifactRecord]) -> Result<(), StoreError> {
        *self.records.lock().unwrap() = records.to_vec();
        Ok(())
    }
}

/// The durable artifact queue: an in-memory snapshot written through to
/// a [`QueueStore`] on every mutation.
pub struct ArtifactQueue {
    snapshot: QueueSnapshot,
    store: Box<dyn QueueStore>,
}

impl ArtifactQueue {
    /// Load the queue from the given store.
    pub fn load(store: Box<dyn QueueStore>) -> Result<Self, StoreError> {
        let records = store.load()?;
        debug!(records = records.len(), "loaded artifact queue");
        Ok(Self {
            snapshot: QueueSnapshot::from_records(records),
            store,
        })
    }

    /// Enqueue an artifact. Idempotent: a locator that already has a
    /// record (delivered or not) is left untouched and `false` is
    /// returned.
    pub fn enqueue(
        &mut self,
        locator: Locator,
        created_at: u64,
        origin: String,
    ) -> Result<bool, StoreError> {
        if !self.snapshot.insert(locator.clone(), created_at, origin) {
            debug!(%locator, "artifact already tracked, skipping enqueue");
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Mark an artifact delivered. Idempotent; unknown locators are a
    /// no-op.
    pub fn mark_delivered(&mut self, locator: &Locator) -> Result<bool, StoreError> {
        if !self.snapshot.mark_delivered(locator) {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Look up the record for a locator.
    pub fn get(&self, locator: &Locator) -> Option<&ArtifactRecord> {
        self.snapshot.get(locator)
    }

    /// Number of records not yet delivered, without checking the
    /// filesystem.
    pub fn pending_count(&self) -> usize {
        self.snapshot.pending_count()
    }

    /// All records, delivered or not, in insertion order.
    pub fn records(&self) -> &[ArtifactRecord] {
        self.snapshot.records()
    }

    /// Pending records whose content still exists on disk, oldest
    /// first. Records whose content has vanished are marked delivered
    /// so they are never retried.
    pub fn pending_artifacts(&mut self) -> Result<Vec<ArtifactRecord>, StoreError> {
        let (pending, purged) = self
            .snapshot
            .pending_with(|locator| locator.as_path().exists());
        if purged > 0 {
            warn!(purged, "purged queue records whose content vanished");
            self.persist()?;
        }
        Ok(pending)
    }

    fn persist(&self) -> Result<(), StoreError> {
        self.store.save(self.snapshot.records())
    }
}
