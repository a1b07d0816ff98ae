//! Mock transport for testing.
//!
//! Allows driving reachability, queueing request replies, capturing
//! outbound traffic by tier, and completing bulk transfers manually or
//! automatically.

use super::{LinkEvent, Transport, TransferHandle, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};

use link_types::{TransferId, TransferMetadata};

/// Mock transport for testing.
///
/// Cloning shares state, so a test can keep a handle while the engine
/// owns another.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

#[derive(Debug, Default)]
struct MockInner {
    activated: bool,
    reachable: bool,
    activation_error: bool,
    auto_complete: bool,
    sent: Vec<Vec<u8>>,
    requests: Vec<Vec<u8>>,
    replies: VecDeque<Vec<u8>>,
    forwarded: Vec<Vec<u8>>,
    transfers: Vec<MockTransfer>,
    subscribers: Vec<mpsc::UnboundedSender<LinkEvent>>,
    fail_next_activate: Option<String>,
    fail_next_request: Option<String>,
    fail_next_transfer: Option<String>,
}

#[derive(Debug)]
struct MockTransfer {
    id: TransferId,
    content: Vec<u8>,
    metadata: TransferMetadata,
    progress_tx: watch::Sender<u8>,
    completion_tx: Option<oneshot::Sender<Result<(), TransportError>>>,
}

impl MockTransport {
    /// Create a new mock transport (not activated, not reachable).
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete every transfer immediately with success and 100%
    /// progress. Convenient for tests that exercise the pipeline end to
    /// end without driving progress by hand.
    pub fn with_auto_complete(self) -> Self {
        self.inner.lock().unwrap().auto_complete = true;
        self
    }

    /// Flip the raw reachability flag, emitting a reachability event.
    pub fn set_reachable(&self, reachable: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.reachable = reachable;
        Self::emit_reachability(&mut inner);
    }

    /// Set or clear an activation error, emitting a reachability event.
    pub fn set_activation_error(&self, error: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.activation_error = error;
        Self::emit_reachability(&mut inner);
    }

    /// Queue a payload to be returned by the next `request()` call.
    pub fn queue_reply(&self, payload: Vec<u8>) {
        self.inner.lock().unwrap().replies.push_back(payload);
    }

    /// All payloads sent via `send_now`.
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// All payloads sent via `request`.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// All payloads handed to the store-and-forward buffer.
    pub fn forwarded(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().forwarded.clone()
    }

    /// Ids and metadata of all initiated transfers, in order.
    pub fn started_transfers(&self) -> Vec<(TransferId, TransferMetadata)> {
        self.inner
            .lock()
            .unwrap()
            .transfers
            .iter()
            .map(|t| (t.id, t.metadata.clone()))
            .collect()
    }

    /// The content handed to a given transfer.
    pub fn transfer_content(&self, id: TransferId) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .transfers
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.content.clone())
    }

    /// Drive progress on an in-flight transfer.
    pub fn progress_transfer(&self, id: TransferId, percent: u8) {
        let inner = self.inner.lock().unwrap();
        if let Some(transfer) = inner.transfers.iter().find(|t| t.id == id) {
            let _ = transfer.progress_tx.send(percent);
        }
    }

    /// Resolve an in-flight transfer. No-op if already completed.
    pub fn complete_transfer(&self, id: TransferId, result: Result<(), TransportError>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(transfer) = inner.transfers.iter_mut().find(|t| t.id == id) {
            if let Some(tx) = transfer.completion_tx.take() {
                let _ = tx.send(result);
            }
        }
    }

    /// Cause the next `activate()` to fail with the given error.
    pub fn fail_next_activate(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_activate = Some(error.to_string());
    }

    /// Cause the next `request()` to fail with the given error.
    pub fn fail_next_request(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_request = Some(error.to_string());
    }

    /// Cause the next `transfer()` to fail with the given error.
    pub fn fail_next_transfer(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_transfer = Some(error.to_string());
    }

    /// Deliver an inbound message with no reply expectation.
    pub fn push_message(&self, payload: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        Self::emit(&mut inner, LinkEvent::Message {
            payload,
            reply: None,
        });
    }

    /// Deliver an inbound message that expects a reply; the returned
    /// receiver resolves with the engine's answer.
    pub fn push_request(&self, payload: Vec<u8>) -> oneshot::Receiver<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().unwrap();
        Self::emit(&mut inner, LinkEvent::Message {
            payload,
            reply: Some(tx),
        });
        rx
    }

    /// Deliver an inbound bulk transfer.
    pub fn push_transfer(&self, content: Vec<u8>, metadata: TransferMetadata) {
        let mut inner = self.inner.lock().unwrap();
        Self::emit(&mut inner, LinkEvent::TransferReceived { content, metadata });
    }

    fn emit_reachability(inner: &mut MockInner) {
        let event = LinkEvent::Reachability {
            activated: inner.activated,
            reachable: inner.reachable,
            activation_error: inner.activation_error,
        };
        Self::emit(inner, event);
    }

    fn emit(inner: &mut MockInner, event: LinkEvent) {
        inner.subscribers.retain(|s| !s.is_closed());
        match event {
            LinkEvent::Reachability {
                activated,
                reachable,
                activation_error,
            } => {
                for subscriber in &inner.subscribers {
                    let _ = subscriber.send(LinkEvent::Reachability {
                        activated,
                        reachable,
                        activation_error,
                    });
                }
            }
            LinkEvent::TransferReceived { content, metadata } => {
                for subscriber in &inner.subscribers {
                    let _ = subscriber.send(LinkEvent::TransferReceived {
                        content: content.clone(),
                        metadata: metadata.clone(),
                    });
                }
            }
            // Reply-bearing messages carry a oneshot sender and cannot
            // fan out; the most recent subscriber gets them.
            message @ LinkEvent::Message { .. } => {
                if let Some(last) = inner.subscribers.last() {
                    let _ = last.send(message);
                }
            }
        }
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn activate(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_activate.take() {
            inner.activation_error = true;
            Self::emit_reachability(&mut inner);
            return Err(TransportError::ActivationFailed(error));
        }
        inner.activated = true;
        Self::emit_reachability(&mut inner);
        Ok(())
    }

    fn is_activated(&self) -> bool {
        self.inner.lock().unwrap().activated
    }

    fn is_reachable(&self) -> bool {
        self.inner.lock().unwrap().reachable
    }

    async fn send_now(&self, payload: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.activated {
            return Err(TransportError::NotActivated);
        }
        if !inner.reachable {
            return Err(TransportError::NotReachable);
        }
        inner.sent.push(payload.to_vec());
        Ok(())
    }

    async fn request(&self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.activated {
            return Err(TransportError::NotActivated);
        }
        if !inner.reachable {
            return Err(TransportError::NotReachable);
        }
        if let Some(error) = inner.fail_next_request.take() {
            return Err(TransportError::RequestFailed(error));
        }
        inner.requests.push(payload.to_vec());
        inner
            .replies
            .pop_front()
            .ok_or_else(|| TransportError::RequestFailed("no reply queued".into()))
    }

    async fn send_store_and_forward(&self, payload: &[u8]) -> Result<(), TransportError> {
        // Store-and-forward works regardless of reachability.
        self.inner.lock().unwrap().forwarded.push(payload.to_vec());
        Ok(())
    }

    async fn transfer(
        &self,
        content: Vec<u8>,
        metadata: TransferMetadata,
    ) -> Result<TransferHandle, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.activated {
            return Err(TransportError::NotActivated);
        }
        if !inner.reachable {
            return Err(TransportError::NotReachable);
        }
        if let Some(error) = inner.fail_next_transfer.take() {
            return Err(TransportError::TransferFailed(error));
        }

        let id = TransferId::new();
        let (progress_tx, progress_rx) = watch::channel(0u8);
        let (completion_tx, completion_rx) = oneshot::channel();

        let mut record = MockTransfer {
            id,
            content,
            metadata,
            progress_tx,
            completion_tx: Some(completion_tx),
        };
        if inner.auto_complete {
            let _ = record.progress_tx.send(100);
            if let Some(tx) = record.completion_tx.take() {
                let _ = tx.send(Ok(()));
            }
        }
        inner.transfers.push(record);

        Ok(TransferHandle {
            id,
            progress: progress_rx,
            completion: completion_rx,
        })
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<LinkEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().unwrap().subscribers.push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use link_types::TransferKind;

    fn meta(queued: bool) -> TransferMetadata {
        TransferMetadata {
            kind: TransferKind::Recording,
            queued,
            created_at: 1756500000,
            origin: "test".into(),
        }
    }

    async fn up() -> MockTransport {
        let transport = MockTransport::new();
        transport.activate().await.unwrap();
        transport.set_reachable(true);
        transport
    }

    #[tokio::test]
    async fn activate_then_reachable() {
        let transport = MockTransport::new();
        assert!(!transport.is_activated());

        transport.activate().await.unwrap();
        assert!(transport.is_activated());
        assert!(!transport.is_reachable());

        transport.set_reachable(true);
        assert!(transport.is_reachable());
    }

    #[tokio::test]
    async fn request_requires_reachability() {
        let transport = MockTransport::new();
        transport.activate().await.unwrap();

        let result = transport.request(b"ping").await;
        assert!(matches!(result, Err(TransportError::NotReachable)));
    }

    #[tokio::test]
    async fn request_returns_queued_reply() {
        let transport = up().await;
        transport.queue_reply(b"pong".to_vec());

        let reply = transport.request(b"ping").await.unwrap();
        assert_eq!(reply, b"pong");
        assert_eq!(transport.requests(), vec![b"ping".to_vec()]);
    }

    #[tokio::test]
    async fn request_without_reply_fails() {
        let transport = up().await;
        let result = transport.request(b"ping").await;
        assert!(matches!(result, Err(TransportError::RequestFailed(_))));
    }

    #[tokio::test]
    async fn store_and_forward_works_while_unreachable() {
        let transport = MockTransport::new();
        transport.send_store_and_forward(b"later").await.unwrap();
        assert_eq!(transport.forwarded(), vec![b"later".to_vec()]);
    }

    #[tokio::test]
    async fn transfer_captures_content_and_metadata() {
        let transport = up().await;
        let handle = transport
            .transfer(vec![1, 2, 3], meta(false))
            .await
            .unwrap();

        let started = transport.started_transfers();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].0, handle.id);
        assert!(!started[0].1.queued);
        assert_eq!(transport.transfer_content(handle.id), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn manual_transfer_completion() {
        let transport = up().await;
        let handle = transport.transfer(vec![0], meta(true)).await.unwrap();

        transport.progress_transfer(handle.id, 50);
        transport.complete_transfer(handle.id, Ok(()));

        let outcome = handle.completion.await.unwrap();
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn auto_complete_resolves_immediately() {
        let transport = up().await;
        let transport = transport.with_auto_complete();
        let handle = transport.transfer(vec![0], meta(true)).await.unwrap();

        assert_eq!(*handle.progress.borrow(), 100);
        assert!(handle.completion.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn forced_request_failure() {
        let transport = up().await;
        transport.queue_reply(b"unused".to_vec());
        transport.fail_next_request("session dropped");

        let result = transport.request(b"ping").await;
        assert!(matches!(result, Err(TransportError::RequestFailed(_))));

        // Next request succeeds and consumes the queued reply.
        assert_eq!(transport.request(b"ping").await.unwrap(), b"unused");
    }

    #[tokio::test]
    async fn reachability_events_reach_subscriber() {
        let transport = MockTransport::new();
        let mut events = transport.subscribe();

        transport.set_reachable(true);

        match events.recv().await.unwrap() {
            LinkEvent::Reachability {
                reachable,
                activated,
                ..
            } => {
                assert!(reachable);
                assert!(!activated);
            }
            other => panic!("expected Reachability, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn pushed_request_carries_reply_channel() {
        let transport = MockTransport::new();
        let mut events = transport.subscribe();

        let reply_rx = transport.push_request(b"hello".to_vec());

        match events.recv().await.unwrap() {
            LinkEvent::Message {
                payload,
                reply: Some(reply),
            } => {
                assert_eq!(payload, b"hello");
                reply.send(b"world".to_vec()).unwrap();
            }
            other => panic!("expected Message with reply, got {:?}", other),
        }
        assert_eq!(reply_rx.await.unwrap(), b"world");
    }

    #[tokio::test]
    async fn activation_failure_sets_error_flag() {
        let transport = MockTransport::new();
        transport.fail_next_activate("unsupported");

        let result = transport.activate().await;
        assert!(matches!(result, Err(TransportError::ActivationFailed(_))));
        assert!(!transport.is_activated());
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let transport1 = MockTransport::new();
        let transport2 = transport1.clone();

        transport1.activate().await.unwrap();
        assert!(transport2.is_activated());
    }
}
