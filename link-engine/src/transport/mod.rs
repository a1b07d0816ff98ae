//! Transport abstraction for Notelink.
//!
//! This module provides a pluggable transport layer that abstracts the
//! underlying device link (a platform session in production, mock for
//! testing).
//!
//! # Design
//!
//! The transport exposes the three delivery primitives the sync engine
//! relies on:
//! - `request()` - send-now with a reply expectation (needs live
//!   reachability)
//! - `send_store_and_forward()` - transport-buffered, survives
//!   disconnect, eventual delivery
//! - `transfer()` - chunked bulk transfer with observable progress
//!
//! Inbound traffic arrives as an explicit [`LinkEvent`] stream rather
//! than a shared delegate object, and transfer completion is a single
//! future on the returned [`TransferHandle`] rather than a callback.

mod mock;

pub use mock::MockTransport;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

use link_types::{TransferId, TransferMetadata};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The link has not been activated.
    #[error("link not activated")]
    NotActivated,

    /// The peer is not currently reachable.
    #[error("peer not reachable")]
    NotReachable,

    /// Activation failed.
    #[error("activation failed: {0}")]
    ActivationFailed(String),

    /// A send-now message could not be delivered.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// A reply-expected request failed or got no reply.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// A bulk transfer failed.
    #[error("transfer failed: {0}")]
    TransferFailed(String),

    /// The link was closed.
    #[error("link closed")]
    Closed,
}

/// Inbound traffic and link state changes, as an explicit event stream.
#[derive(Debug)]
pub enum LinkEvent {
    /// The link's activation/reachability state changed.
    Reachability {
        /// The link completed activation.
        activated: bool,
        /// The raw reachability flag.
        reachable: bool,
        /// The activation attempt reported an error.
        activation_error: bool,
    },
    /// A message arrived. `reply` is present when the sender expects an
    /// answer.
    Message {
        /// Encoded [`Message`](link_types::Message) payload.
        payload: Vec<u8>,
        /// One-shot reply channel, when the sender expects a reply.
        reply: Option<oneshot::Sender<Vec<u8>>>,
    },
    /// A bulk transfer arrived in full.
    TransferReceived {
        /// The artifact content.
        content: Vec<u8>,
        /// The metadata attached by the sender.
        metadata: TransferMetadata,
    },
}

/// Handle to one in-flight outbound bulk transfer.
///
/// Progress is a subscribable 0-100 channel; completion is a single
/// success/failure result delivered exactly once.
#[derive(Debug)]
pub struct TransferHandle {
    /// Identifier for this transfer attempt.
    pub id: TransferId,
    /// Progress updates, 0-100.
    pub progress: watch::Receiver<u8>,
    /// Resolves when the transport reports the transfer finished.
    pub completion: oneshot::Receiver<Result<(), TransportError>>,
}

/// Transport trait for the companion/primary device link.
///
/// Implementations handle the underlying session mechanism (platform
/// connectivity framework in production, [`MockTransport`] for tests).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Bring the link up. Completion is also reported through a
    /// [`LinkEvent::Reachability`] event.
    async fn activate(&self) -> Result<(), TransportError>;

    /// Whether activation has completed.
    fn is_activated(&self) -> bool;

    /// The raw reachability flag (may be stale; the handshake is the
    /// authoritative liveness check).
    fn is_reachable(&self) -> bool;

    /// Send a message best-effort, no reply expected. Requires live
    /// reachability.
    async fn send_now(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Send a message and wait for the peer's reply. Requires live
    /// reachability.
    async fn request(&self, payload: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Hand a message to the transport's store-and-forward buffer.
    /// Survives disconnect; delivered eventually, best-effort FIFO.
    async fn send_store_and_forward(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Begin a bulk transfer of artifact content with attached metadata.
    async fn transfer(
        &self,
        content: Vec<u8>,
        metadata: TransferMetadata,
    ) -> Result<TransferHandle, TransportError>;

    /// Subscribe to inbound events. State changes and transfers fan out
    /// to every subscriber; a reply-bearing message goes to exactly one.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<LinkEvent>;
}
