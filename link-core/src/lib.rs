//! # link-core
//!
//! Pure logic for Notelink (no I/O, instant tests).
//!
//! This crate implements the state machines and queue model for
//! companion/primary sync without any network or disk I/O, enabling fast
//! unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce
//! output without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (transport, disk) is performed by `link-engine`, which
//! interprets the actions produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod link;
pub mod queue;
pub mod session;
pub mod transfer;

pub use link::{LinkHealth, ReachabilityChange};
pub use queue::{ArtifactRecord, QueueSnapshot};
pub use session::{SessionAction, SessionEvent, SessionState};
pub use transfer::{TransferAction, TransferEvent, TransferPhase};
