//! Per-artifact transfer pipeline.
//!
//! The coordinator runs exactly one delivery attempt at a time: check
//! preconditions, perform the date handshake, hand the content to the
//! transport, and follow progress until the completion callback fires.
//! All sequencing decisions live in the pure [`TransferPhase`] machine;
//! this module only executes the actions it emits.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use link_core::{ArtifactRecord, TransferAction, TransferEvent, TransferPhase};
use link_types::{DateRequest, Message, TransferKind, TransferMetadata};

use crate::transport::{TransferHandle, Transport};

/// Terminal result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The receiver confirmed complete receipt.
    Delivered {
        /// Receiver-side timestamp obtained during the handshake.
        stamp: u64,
    },
    /// Transient failure; the record stays pending for a later drain.
    Requeue {
        /// What went wrong.
        reason: String,
    },
    /// Permanent failure; the record is retired from the pending view.
    Purge {
        /// Why the content can never be delivered.
        reason: String,
    },
}

/// Runs delivery attempts for individual artifacts.
pub struct TransferCoordinator {
    transport: Arc<dyn Transport>,
    content_ext: String,
}

impl TransferCoordinator {
    /// Create a coordinator that accepts content with the given file
    /// extension (e.g. `"m4a"`).
    pub fn new(transport: Arc<dyn Transport>, content_ext: String) -> Self {
        Self {
            transport,
            content_ext,
        }
    }

    /// Run one delivery attempt for the given record.
    ///
    /// `queued` marks a backlog drain (vs a fresh send) and is carried
    /// in the transfer metadata. `reachable` is the caller's effective
    /// reachability; an unreachable peer requeues without touching the
    /// wire. Progress (0-100) is forwarded to `on_progress` as the
    /// transport reports it.
    pub async fn attempt(
        &self,
        record: &ArtifactRecord,
        queued: bool,
        reachable: bool,
        mut on_progress: impl FnMut(u8) + Send,
    ) -> AttemptOutcome {
        if !reachable {
            return AttemptOutcome::Requeue {
                reason: "peer not reachable".to_string(),
            };
        }

        let path = record.locator.as_path();
        let mut events: VecDeque<TransferEvent> = VecDeque::new();
        events.push_back(self.check_content(path));

        let mut phase = TransferPhase::new();
        let mut handle: Option<TransferHandle> = None;
        let mut progress_open = true;
        let mut confirmed_stamp = 0u64;
        let mut outcome = None;

        loop {
            let event = match events.pop_front() {
                Some(event) => event,
                None => match handle.as_mut() {
                    Some(h) => next_transfer_event(h, &mut progress_open).await,
                    None => break,
                },
            };

            if let TransferEvent::Progress { percent } = event {
                on_progress(percent);
            }

            let (next, actions) = phase.on_event(event);
            phase = next;

            for action in actions {
                match action {
                    TransferAction::RequestHandshake => {
                        events.push_back(self.handshake().await);
                    }
                    TransferAction::BeginTransfer { stamp } => {
                        debug!(locator = %record.locator, stamp, "handshake confirmed");
                        confirmed_stamp = stamp;
                        match self.begin_transfer(path, record, queued).await {
                            Ok(h) => {
                                handle = Some(h);
                                events.push_back(TransferEvent::TransferBegan);
                            }
                            Err(error) => {
                                events.push_back(TransferEvent::TransferErrored { error })
                            }
                        }
                    }
                    TransferAction::MarkDelivered => {
                        debug!(locator = %record.locator, "receiver confirmed receipt");
                        outcome = Some(AttemptOutcome::Delivered {
                            stamp: confirmed_stamp,
                        });
                    }
                    TransferAction::Requeue { reason } => {
                        warn!(locator = %record.locator, %reason, "attempt failed, keeping pending");
                        outcome = Some(AttemptOutcome::Requeue { reason });
                    }
                    TransferAction::Purge { reason } => {
                        warn!(locator = %record.locator, %reason, "content rejected, retiring record");
                        outcome = Some(AttemptOutcome::Purge { reason });
                    }
                }
            }

            if phase.is_terminal() {
                break;
            }
        }

        outcome.unwrap_or(AttemptOutcome::Requeue {
            reason: "attempt ended without a terminal outcome".to_string(),
        })
    }

    fn check_content(&self, path: &Path) -> TransferEvent {
        if !path.exists() {
            return TransferEvent::ContentRejected {
                reason: "content vanished".to_string(),
            };
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !ext.eq_ignore_ascii_case(&self.content_ext) {
            return TransferEvent::ContentRejected {
                reason: format!("unexpected content format .{ext}"),
            };
        }
        TransferEvent::AttemptStarted
    }

    async fn handshake(&self) -> TransferEvent {
        let payload = match Message::DateRequest(DateRequest {}).to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                return TransferEvent::HandshakeErrored {
                    error: e.to_string(),
                }
            }
        };
        match self.transport.request(&payload).await {
            Ok(reply) => match Message::from_bytes(&reply) {
                Ok(Message::DateReply(reply)) => TransferEvent::HandshakeReplied {
                    date: Some(reply.date),
                },
                Ok(_) => TransferEvent::HandshakeReplied { date: None },
                Err(e) => TransferEvent::HandshakeErrored {
                    error: format!("undecodable handshake reply: {e}"),
                },
            },
            Err(e) => TransferEvent::HandshakeErrored {
                error: e.to_string(),
            },
        }
    }

    async fn begin_transfer(
        &self,
        path: &Path,
        record: &ArtifactRecord,
        queued: bool,
    ) -> Result<TransferHandle, String> {
        let content = tokio::fs::read(path).await.map_err(|e| e.to_string())?;
        let metadata = TransferMetadata {
            kind: TransferKind::Recording,
            queued,
            created_at: record.created_at,
            origin: record.origin.clone(),
        };
        self.transport
            .transfer(content, metadata)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Wait for the next progress or completion signal from an in-flight
/// transfer. Once the progress sender is dropped only completion is
/// awaited, so a transport that closes its progress channel early never
/// spins this loop.
async fn next_transfer_event(
    handle: &mut TransferHandle,
    progress_open: &mut bool,
) -> TransferEvent {
    loop {
        tokio::select! {
            // Drain pending progress before completion so the final
            // 100% update is observed even when both are ready.
            biased;
            changed = handle.progress.changed(), if *progress_open => {
                match changed {
                    Ok(()) => {
                        let percent = *handle.progress.borrow_and_update();
                        return TransferEvent::Progress { percent };
                    }
                    Err(_) => *progress_open = false,
                }
            }
            result = &mut handle.completion => {
                return match result {
                    Ok(Ok(())) => TransferEvent::TransferSucceeded,
                    Ok(Err(e)) => TransferEvent::TransferErrored { error: e.to_string() },
                    Err(_) => TransferEvent::TransferErrored {
                        error: "transport dropped the transfer".to_string(),
                    },
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use link_types::{DateReply, Locator, Pong};
    use std::sync::Mutex;

    async fn reachable_mock() -> MockTransport {
        let transport = MockTransport::new();
        transport.activate().await.unwrap();
        transport.set_reachable(true);
        transport
    }

    fn coordinator(transport: &MockTransport) -> TransferCoordinator {
        TransferCoordinator::new(Arc::new(transport.clone()), "m4a".to_string())
    }

    fn write_artifact(dir: &tempfile::TempDir, name: &str) -> ArtifactRecord {
        let path = dir.path().join(name);
        std::fs::write(&path, b"audio bytes").unwrap();
        ArtifactRecord {
            locator: Locator::from(path.to_str().unwrap()),
            created_at: 1756500000,
            origin: "wrist".into(),
            delivered: false,
        }
    }

    fn date_reply(date: u64) -> Vec<u8> {
        Message::DateReply(DateReply { date }).to_bytes().unwrap()
    }

    #[tokio::test]
    async fn successful_attempt_delivers() {
        let dir = tempfile::tempdir().unwrap();
        let record = write_artifact(&dir, "rec.m4a");

        let transport = reachable_mock().await.with_auto_complete();
        transport.queue_reply(date_reply(1756500042));

        let seen = Mutex::new(Vec::new());
        let outcome = coordinator(&transport)
            .attempt(&record, true, true, |p| seen.lock().unwrap().push(p))
            .await;

        assert_eq!(
            outcome,
            AttemptOutcome::Delivered { stamp: 1756500042 }
        );
        assert!(seen.lock().unwrap().contains(&100));

        let started = transport.started_transfers();
        assert_eq!(started.len(), 1);
        assert!(started[0].1.queued);
        assert_eq!(started[0].1.created_at, 1756500000);
        assert_eq!(started[0].1.origin, "wrist");
        assert_eq!(
            transport.transfer_content(started[0].0).unwrap(),
            b"audio bytes"
        );
    }

    #[tokio::test]
    async fn fresh_send_is_not_marked_queued() {
        let dir = tempfile::tempdir().unwrap();
        let record = write_artifact(&dir, "rec.m4a");

        let transport = reachable_mock().await.with_auto_complete();
        transport.queue_reply(date_reply(1));

        coordinator(&transport)
            .attempt(&record, false, true, |_| {})
            .await;

        assert!(!transport.started_transfers()[0].1.queued);
    }

    #[tokio::test]
    async fn unreachable_requeues_without_touching_the_wire() {
        let dir = tempfile::tempdir().unwrap();
        let record = write_artifact(&dir, "rec.m4a");
        let transport = reachable_mock().await;

        let outcome = coordinator(&transport)
            .attempt(&record, true, false, |_| {})
            .await;

        assert!(matches!(outcome, AttemptOutcome::Requeue { .. }));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn vanished_content_is_purged() {
        let dir = tempfile::tempdir().unwrap();
        let record = ArtifactRecord {
            locator: Locator::from(dir.path().join("gone.m4a").to_str().unwrap()),
            created_at: 1,
            origin: "wrist".into(),
            delivered: false,
        };
        let transport = reachable_mock().await;

        let outcome = coordinator(&transport)
            .attempt(&record, true, true, |_| {})
            .await;

        assert!(matches!(outcome, AttemptOutcome::Purge { .. }));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn wrong_extension_is_purged() {
        let dir = tempfile::tempdir().unwrap();
        let record = write_artifact(&dir, "notes.txt");
        let transport = reachable_mock().await;

        let outcome = coordinator(&transport)
            .attempt(&record, true, true, |_| {})
            .await;

        assert!(matches!(outcome, AttemptOutcome::Purge { .. }));
    }

    #[tokio::test]
    async fn handshake_error_requeues() {
        let dir = tempfile::tempdir().unwrap();
        let record = write_artifact(&dir, "rec.m4a");

        let transport = reachable_mock().await;
        transport.fail_next_request("session interrupted");

        let outcome = coordinator(&transport)
            .attempt(&record, true, true, |_| {})
            .await;

        assert!(matches!(outcome, AttemptOutcome::Requeue { .. }));
        assert!(transport.started_transfers().is_empty());
    }

    #[tokio::test]
    async fn dateless_handshake_reply_requeues() {
        let dir = tempfile::tempdir().unwrap();
        let record = write_artifact(&dir, "rec.m4a");

        let transport = reachable_mock().await;
        transport.queue_reply(Message::Pong(Pong {}).to_bytes().unwrap());

        let outcome = coordinator(&transport)
            .attempt(&record, true, true, |_| {})
            .await;

        assert!(matches!(outcome, AttemptOutcome::Requeue { .. }));
        assert!(transport.started_transfers().is_empty());
    }

    #[tokio::test]
    async fn transfer_initiation_failure_requeues() {
        let dir = tempfile::tempdir().unwrap();
        let record = write_artifact(&dir, "rec.m4a");

        let transport = reachable_mock().await;
        transport.queue_reply(date_reply(1));
        transport.fail_next_transfer("link dropped");

        let outcome = coordinator(&transport)
            .attempt(&record, true, true, |_| {})
            .await;

        assert!(matches!(outcome, AttemptOutcome::Requeue { .. }));
    }

    #[tokio::test]
    async fn mid_flight_failure_requeues() {
        let dir = tempfile::tempdir().unwrap();
        let record = write_artifact(&dir, "rec.m4a");

        let transport = reachable_mock().await;
        transport.queue_reply(date_reply(1));

        let coordinator = Arc::new(coordinator(&transport));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let coordinator = Arc::clone(&coordinator);
            let seen = Arc::clone(&seen);
            tokio::spawn(async move {
                coordinator
                    .attempt(&record, true, true, move |p| seen.lock().unwrap().push(p))
                    .await
            })
        };

        // Wait for the transfer to start, then fail it mid-flight.
        let id = loop {
            if let Some((id, _)) = transport.started_transfers().first().cloned() {
                break id;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        };
        transport.progress_transfer(id, 40);
        transport.complete_transfer(
            id,
            Err(crate::transport::TransportError::TransferFailed(
                "peer went away".to_string(),
            )),
        );

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, AttemptOutcome::Requeue { .. }));
        assert!(seen.lock().unwrap().contains(&40));
    }
}
