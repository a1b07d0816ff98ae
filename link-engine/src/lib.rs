//! # link-engine
//!
//! The I/O layer of Notelink: drives the pure state machines in
//! `link-core` against a pluggable [`Transport`], persists the artifact
//! queue, and exposes the engine operations applications call.
//!
//! ## Example
//!
//! ```ignore
//! use link_engine::{EngineConfig, MockTransport, NullRecorder, SyncEngine};
//! use link_engine::store::JsonFileStore;
//! use std::sync::Arc;
//!
//! let config = EngineConfig::default();
//! let transport = Arc::new(MockTransport::new());
//! let store = Box::new(JsonFileStore::new(&config.queue_path));
//! let engine = SyncEngine::new(config, transport, store, Box::new(NullRecorder))?;
//! engine.start().await;
//!
//! engine.send_artifact("recordings/rec-1.m4a".into(), 1756500000, "wrist".into()).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commands;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod store;
pub mod transport;

pub use commands::{CommandChannel, CommandOutcome};
pub use config::{ConfigError, EngineConfig};
pub use coordinator::{AttemptOutcome, TransferCoordinator};
pub use engine::{EngineEvent, NullRecorder, ReceivedArtifact, RecorderControl, SyncEngine};
pub use error::EngineError;
pub use store::{ArtifactQueue, JsonFileStore, MemoryQueueStore, QueueStore, StoreError};
pub use transport::{LinkEvent, MockTransport, TransferHandle, Transport, TransportError};
