//! The sync engine controller.
//!
//! Owns every mutable piece of one endpoint (session machine, link
//! health, artifact queue, received-artifact catalog) behind a single
//! mutex, consumes transport events on a spawned loop, and exposes the
//! public operations: commands, fresh sends, drains, and pushes.
//!
//! Nothing here terminates the process. Every failure resolves to an
//! observable status plus, where applicable, a queue-state change.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tracing::{debug, info, warn};

use link_core::{ArtifactRecord, LinkHealth, SessionAction, SessionEvent, SessionState};
use link_types::{
    CommandAck, CommandKind, DateReply, DeliveryAck, Locator, Message, Pong, Status,
    Transcription, TransferKind, TransferMetadata,
};

use crate::commands::{CommandChannel, CommandOutcome};
use crate::config::EngineConfig;
use crate::coordinator::{AttemptOutcome, TransferCoordinator};
use crate::error::EngineError;
use crate::store::{ArtifactQueue, QueueStore};
use crate::transport::{LinkEvent, Transport};

/// Local collaborator that executes start/stop commands from the peer.
///
/// The capture subsystem sits behind this trait; the engine never talks
/// to audio hardware itself.
pub trait RecorderControl: Send + Sync {
    /// Begin recording. Returns false when recording cannot start.
    fn start(&self) -> bool;
    /// Stop recording and persist the result. Idempotent.
    fn stop(&self) -> bool;
}

/// Recorder that accepts every command and does nothing. For endpoints
/// that never record (the companion side) and for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecorder;

impl RecorderControl for NullRecorder {
    fn start(&self) -> bool {
        true
    }

    fn stop(&self) -> bool {
        true
    }
}

/// An artifact received from the peer and written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedArtifact {
    /// Where the content was written locally.
    pub locator: Locator,
    /// Capture timestamp carried in the transfer metadata.
    pub created_at: u64,
    /// Provenance tag carried in the transfer metadata.
    pub origin: String,
}

/// Events broadcast to engine observers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The session state changed.
    StateChanged(SessionState),
    /// A locally produced status line (command outcomes, transfer
    /// completion).
    StatusAnnounced(String),
    /// The peer pushed a status line.
    StatusReceived(String),
    /// The peer pushed transcription text.
    TranscriptionReceived(String),
    /// An inbound artifact was written to the received directory.
    ArtifactStored(ReceivedArtifact),
    /// An outbound artifact was confirmed delivered.
    ArtifactDelivered {
        /// Locator of the delivered artifact.
        locator: Locator,
    },
}

struct Inner {
    session: SessionState,
    health: LinkHealth,
    queue: ArtifactQueue,
    catalog: Vec<ReceivedArtifact>,
}

struct Shared {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    commands: CommandChannel,
    coordinator: TransferCoordinator,
    recorder: Box<dyn RecorderControl>,
    inner: Mutex<Inner>,
    // Single-flight guard: a drain requested while one runs is skipped.
    drain_lock: Mutex<()>,
    state_tx: watch::Sender<SessionState>,
    events: broadcast::Sender<EngineEvent>,
}

/// The sync engine for one endpoint. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncEngine {
    shared: Arc<Shared>,
}

impl SyncEngine {
    /// Create an engine. The transport is not activated and no events
    /// are consumed until [`start`](Self::start).
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        store: Box<dyn QueueStore>,
        recorder: Box<dyn RecorderControl>,
    ) -> Result<Self, EngineError> {
        let queue = ArtifactQueue::load(store)?;
        let (state_tx, _) = watch::channel(SessionState::new());
        let (events, _) = broadcast::channel(64);
        let commands = CommandChannel::new(Arc::clone(&transport));
        let coordinator =
            TransferCoordinator::new(Arc::clone(&transport), config.content_ext.clone());

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                transport,
                commands,
                coordinator,
                recorder,
                inner: Mutex::new(Inner {
                    session: SessionState::new(),
                    health: LinkHealth::new(),
                    queue,
                    catalog: Vec::new(),
                }),
                drain_lock: Mutex::new(()),
                state_tx,
                events,
            }),
        })
    }

    /// Activate the transport and spawn the event loop.
    ///
    /// Activation failure is not fatal: the engine keeps running with
    /// the link marked down and retries nothing itself; the transport
    /// reports recovery through its event stream.
    pub async fn start(&self) {
        // Subscribe before activating so the activation report is not
        // missed.
        let events = self.shared.transport.subscribe();
        let activation_error = match self.shared.transport.activate().await {
            Ok(()) => false,
            Err(e) => {
                warn!(error = %e, "transport activation failed");
                true
            }
        };

        let engine = self.clone();
        tokio::spawn(async move { engine.event_loop(events).await });

        self.handle_reachability(
            self.shared.transport.is_activated(),
            self.shared.transport.is_reachable(),
            activation_error,
        )
        .await;
    }

    /// Current session state.
    pub fn session_state(&self) -> SessionState {
        self.shared.state_tx.borrow().clone()
    }

    /// Watch the session state.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    /// Tell the peer to start recording.
    pub async fn start_recording(&self) -> CommandOutcome {
        self.send_command(CommandKind::Start).await
    }

    /// Tell the peer to stop recording.
    pub async fn stop_recording(&self) -> CommandOutcome {
        self.send_command(CommandKind::Stop).await
    }

    /// Probe peer liveness.
    pub async fn ping(&self) -> CommandOutcome {
        self.send_command(CommandKind::Ping).await
    }

    /// Acknowledge a surfaced error, returning the session to Ready.
    pub async fn acknowledge_error(&self) {
        self.apply_session_event(SessionEvent::ErrorAcknowledged)
            .await;
    }

    /// Hand a freshly captured artifact to the engine.
    ///
    /// When the peer is reachable a fresh transfer starts in the
    /// background; otherwise (and on any later failure) the artifact is
    /// enqueued for the next drain. Either way the artifact is never
    /// dropped.
    pub async fn send_artifact(
        &self,
        locator: Locator,
        created_at: u64,
        origin: String,
    ) -> Result<(), EngineError> {
        let record = ArtifactRecord {
            locator,
            created_at,
            origin,
            delivered: false,
        };

        let reachable = {
            let mut inner = self.shared.inner.lock().await;
            let reachable = inner.health.effective_reachable();
            if !reachable {
                // Straight to the durable queue; drained on the next
                // rising edge.
                inner.queue.enqueue(
                    record.locator.clone(),
                    record.created_at,
                    record.origin.clone(),
                )?;
            }
            reachable
        };

        if !reachable {
            debug!(locator = %record.locator, "peer unreachable, artifact enqueued");
            return Ok(());
        }

        let engine = self.clone();
        tokio::spawn(async move {
            engine.deliver(record, false).await;
        });
        Ok(())
    }

    /// Drain the pending queue now.
    ///
    /// Artifacts are processed strictly sequentially, oldest first. A
    /// transient failure stops the drain (the link is evidently not
    /// ready); a permanent rejection retires the record and continues.
    /// If a drain is already running this call returns immediately.
    pub async fn drain(&self) {
        let _guard = match self.shared.drain_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("drain already in flight, skipping");
                return;
            }
        };

        let pending = {
            let mut inner = self.shared.inner.lock().await;
            match inner.queue.pending_artifacts() {
                Ok(pending) => pending,
                Err(e) => {
                    warn!(error = %e, "cannot read pending artifacts");
                    return;
                }
            }
        };
        if pending.is_empty() {
            debug!("nothing to drain");
            return;
        }
        info!(pending = pending.len(), "draining artifact queue");

        for record in pending {
            let reachable = self.shared.inner.lock().await.health.effective_reachable();
            if !reachable {
                debug!("link went down mid-drain, stopping");
                break;
            }
            let outcome = self.deliver(record, true).await;
            if matches!(outcome, AttemptOutcome::Requeue { .. }) {
                // Transient failure; later attempts would hit the same
                // wall. The records stay pending for the next drain.
                break;
            }
        }
    }

    /// Push a status line to the peer, best effort.
    pub async fn push_status(&self, text: &str) -> Result<(), EngineError> {
        let payload = Message::Status(Status {
            status: text.to_string(),
        })
        .to_bytes()?;
        self.push_payload(&payload).await
    }

    /// Push transcription text to the peer, best effort.
    pub async fn push_transcription(&self, text: &str) -> Result<(), EngineError> {
        let payload = Message::Transcription(Transcription {
            transcription: text.to_string(),
        })
        .to_bytes()?;
        self.push_payload(&payload).await
    }

    /// Number of artifacts awaiting delivery.
    pub async fn pending_count(&self) -> usize {
        self.shared.inner.lock().await.queue.pending_count()
    }

    /// Artifacts received from the peer this run, in arrival order.
    pub async fn received_artifacts(&self) -> Vec<ReceivedArtifact> {
        self.shared.inner.lock().await.catalog.clone()
    }

    async fn push_payload(&self, payload: &[u8]) -> Result<(), EngineError> {
        let reachable = self.shared.inner.lock().await.health.effective_reachable();
        if reachable {
            self.shared.transport.send_now(payload).await?;
        } else {
            self.shared.transport.send_store_and_forward(payload).await?;
        }
        Ok(())
    }

    async fn send_command(&self, kind: CommandKind) -> CommandOutcome {
        let reachable = self.shared.inner.lock().await.health.effective_reachable();
        let outcome = self.shared.commands.send(kind, unix_now(), reachable).await;
        match &outcome {
            CommandOutcome::Delivered => {
                self.apply_session_event(SessionEvent::CommandDelivered(kind))
                    .await;
            }
            CommandOutcome::Queued => {
                self.apply_session_event(SessionEvent::CommandQueued(kind))
                    .await;
            }
            CommandOutcome::Failed(reason) => {
                warn!(command = kind.label(), %reason, "command not delivered");
            }
        }
        outcome
    }

    /// Run one delivery attempt, feeding its lifecycle into the session
    /// machine and folding its outcome into the queue.
    async fn deliver(&self, record: ArtifactRecord, queued: bool) -> AttemptOutcome {
        self.apply_session_event(SessionEvent::TransferStarted { queued })
            .await;

        let reachable = self.shared.inner.lock().await.health.effective_reachable();

        // Bridge the coordinator's synchronous progress callback into
        // session events.
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<u8>();
        let forwarder = {
            let engine = self.clone();
            tokio::spawn(async move {
                while let Some(percent) = progress_rx.recv().await {
                    engine
                        .apply_session_event(SessionEvent::TransferProgress { queued, percent })
                        .await;
                }
            })
        };

        let outcome = self
            .shared
            .coordinator
            .attempt(&record, queued, reachable, move |percent| {
                let _ = progress_tx.send(percent);
            })
            .await;
        let _ = forwarder.await;

        match &outcome {
            AttemptOutcome::Delivered { stamp } => {
                debug!(locator = %record.locator, stamp, "artifact delivered");
                if queued {
                    let mut inner = self.shared.inner.lock().await;
                    if let Err(e) = inner.queue.mark_delivered(&record.locator) {
                        warn!(error = %e, "delivered flag not persisted");
                    }
                }
                self.emit(EngineEvent::ArtifactDelivered {
                    locator: record.locator.clone(),
                });
                self.apply_session_event(SessionEvent::TransferSucceeded)
                    .await;
            }
            AttemptOutcome::Requeue { reason } => {
                {
                    let mut inner = self.shared.inner.lock().await;
                    // Idempotent: a drained record is already present.
                    if let Err(e) = inner.queue.enqueue(
                        record.locator.clone(),
                        record.created_at,
                        record.origin.clone(),
                    ) {
                        warn!(error = %e, "requeue not persisted");
                    }
                }
                self.apply_session_event(SessionEvent::TransferFailed {
                    reason: reason.clone(),
                })
                .await;
            }
            AttemptOutcome::Purge { reason } => {
                if queued {
                    let mut inner = self.shared.inner.lock().await;
                    if let Err(e) = inner.queue.mark_delivered(&record.locator) {
                        warn!(error = %e, "purge not persisted");
                    }
                }
                self.apply_session_event(SessionEvent::TransferFailed {
                    reason: reason.clone(),
                })
                .await;
            }
        }
        outcome
    }

    async fn event_loop(self, mut events: mpsc::UnboundedReceiver<LinkEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                LinkEvent::Reachability {
                    activated,
                    reachable,
                    activation_error,
                } => {
                    self.handle_reachability(activated, reachable, activation_error)
                        .await;
                }
                LinkEvent::Message { payload, reply } => {
                    self.handle_message(payload, reply).await;
                }
                LinkEvent::TransferReceived { content, metadata } => {
                    if let Err(e) = self.handle_transfer_received(content, metadata).await {
                        warn!(error = %e, "received artifact not stored");
                    }
                }
            }
        }
        debug!("transport event stream closed");
    }

    async fn handle_reachability(
        &self,
        activated: bool,
        reachable: bool,
        activation_error: bool,
    ) {
        let edge = {
            let mut inner = self.shared.inner.lock().await;
            inner.health.apply(activated, reachable, activation_error)
        };
        let Some(edge) = edge else { return };

        let up = matches!(edge, link_core::ReachabilityChange::CameUp);
        info!(up, "effective reachability changed");
        self.apply_session_event(SessionEvent::ReachabilityChanged(up))
            .await;
    }

    async fn handle_message(&self, payload: Vec<u8>, reply: Option<oneshot::Sender<Vec<u8>>>) {
        let message = match Message::from_bytes(&payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "undecodable inbound message, ignoring");
                return;
            }
        };

        match message {
            Message::Command(command) => {
                let age = unix_now().saturating_sub(command.issued_at);
                if age > self.shared.config.command_ttl_secs {
                    warn!(
                        command = command.kind.label(),
                        age_secs = age,
                        "stale command, discarding"
                    );
                    if let Some(reply) = reply {
                        self.answer(reply, &Message::CommandAck(CommandAck { ok: false }));
                    }
                    return;
                }
                debug!(command = command.kind.label(), "command received");
                let ok = match command.kind {
                    CommandKind::Start => self.shared.recorder.start(),
                    CommandKind::Stop => self.shared.recorder.stop(),
                    CommandKind::Ping => true,
                };
                if let Some(reply) = reply {
                    let response = if command.kind == CommandKind::Ping {
                        Message::Pong(Pong {})
                    } else {
                        Message::CommandAck(CommandAck { ok })
                    };
                    self.answer(reply, &response);
                }
            }
            Message::DateRequest(_) => {
                if let Some(reply) = reply {
                    self.answer(reply, &Message::DateReply(DateReply { date: unix_now() }));
                } else {
                    debug!("date request without reply channel, ignoring");
                }
            }
            Message::Status(status) => {
                self.emit(EngineEvent::StatusReceived(status.status));
            }
            Message::Transcription(text) => {
                self.emit(EngineEvent::TranscriptionReceived(text.transcription));
            }
            Message::DeliveryAck(ack) => {
                // Informational: the delivered flag is driven by the
                // sender-side completion callback, not by this message.
                debug!(locator = %ack.locator, "peer acknowledged delivery");
            }
            other => {
                debug!(message = ?other, "unexpected inbound message, ignoring");
            }
        }
    }

    async fn handle_transfer_received(
        &self,
        content: Vec<u8>,
        metadata: TransferMetadata,
    ) -> Result<(), EngineError> {
        if metadata.kind != TransferKind::Recording {
            warn!(kind = ?metadata.kind, "unsupported transfer kind, discarding");
            return Ok(());
        }

        let file_name = format!(
            "recording-{}-{}.{}",
            metadata.created_at,
            link_types::TransferId::new(),
            self.shared.config.content_ext
        );
        let path = self.shared.config.received_dir.join(file_name);
        tokio::fs::create_dir_all(&self.shared.config.received_dir).await?;
        tokio::fs::write(&path, &content).await?;

        let locator = match path.to_str() {
            Some(path) => Locator::from(path),
            None => {
                warn!(path = %path.display(), "received path is not valid UTF-8, discarding");
                return Ok(());
            }
        };
        let artifact = ReceivedArtifact {
            locator: locator.clone(),
            created_at: metadata.created_at,
            origin: metadata.origin.clone(),
        };
        info!(locator = %locator, origin = %metadata.origin, "artifact received");

        self.shared
            .inner
            .lock()
            .await
            .catalog
            .push(artifact.clone());
        self.emit(EngineEvent::ArtifactStored(artifact));

        if metadata.queued {
            // Best-effort; the sender does not depend on this.
            let ack = Message::DeliveryAck(DeliveryAck {
                locator: locator.as_str().to_string(),
            });
            match ack.to_bytes() {
                Ok(payload) => {
                    if let Err(e) = self.shared.transport.send_store_and_forward(&payload).await
                    {
                        debug!(error = %e, "delivery ack not sent");
                    }
                }
                Err(e) => debug!(error = %e, "delivery ack not encoded"),
            }
        }
        Ok(())
    }

    // Boxed rather than `async fn`: this method is mutually recursive
    // with the tasks it spawns, so the compiler needs a concrete
    // future type to prove `Send`.
    fn apply_session_event(
        &self,
        event: SessionEvent,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
        let actions = {
            let mut inner = self.shared.inner.lock().await;
            let (next, actions) = inner.session.clone().on_event(event);
            if next != inner.session {
                inner.session = next.clone();
                // `send` drops the update when no receiver exists;
                // `send_replace` keeps the stored value current so
                // `session_state()` can read it.
                let _ = self.shared.state_tx.send_replace(next.clone());
                self.emit(EngineEvent::StateChanged(next));
            }
            actions
        };

        for action in actions {
            match action {
                SessionAction::ScheduleDrain => {
                    let engine = self.clone();
                    let settle = Duration::from_millis(self.shared.config.settle_delay_ms);
                    tokio::spawn(async move {
                        tokio::time::sleep(settle).await;
                        engine.drain().await;
                    });
                }
                SessionAction::AnnounceStatus(text) => {
                    self.emit(EngineEvent::StatusAnnounced(text));
                }
            }
        }
        })
    }

    fn emit(&self, event: EngineEvent) {
        // No receivers is fine; events are observability, not control
        // flow.
        let _ = self.shared.events.send(event);
    }

    fn answer(&self, reply: oneshot::Sender<Vec<u8>>, response: &Message) {
        match response.to_bytes() {
            Ok(payload) => {
                if reply.send(payload).is_err() {
                    debug!("reply channel closed before answer");
                }
            }
            Err(e) => warn!(error = %e, "reply not encoded"),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
