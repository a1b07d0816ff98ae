//! Per-attempt transfer pipeline state machine.
//!
//! One artifact delivery attempt walks the phases
//! `Idle -> HandshakeRequested -> HandshakeConfirmed -> Transferring ->
//! AwaitingAck -> Delivered | Failed`. The machine is pure; link-engine
//! performs the actual handshake request and bulk transfer and feeds the
//! results back as events.
//!
//! Invariant: a `BeginTransfer` action is only ever emitted in response
//! to a handshake reply that carries a date. A missing date or a
//! handshake error routes the artifact back to the queue, never into a
//! transfer and never into the void.

/// The phase of one artifact delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPhase {
    /// Attempt not yet started.
    Idle,
    /// Waiting for the receiver's date reply.
    HandshakeRequested,
    /// Handshake succeeded; receiver time in hand.
    HandshakeConfirmed {
        /// Receiver-side authoritative Unix timestamp.
        stamp: u64,
    },
    /// Bulk transfer in flight.
    Transferring {
        /// Progress, 0-100.
        percent: u8,
    },
    /// Content fully handed to the transport; waiting on the completion
    /// callback.
    AwaitingAck,
    /// The receiver confirmed complete, successful receipt.
    Delivered,
    /// The attempt failed.
    Failed {
        /// What went wrong.
        reason: String,
        /// True when the artifact should be retried on a later drain.
        retry: bool,
    },
}

impl TransferPhase {
    /// Create a machine for a fresh attempt.
    pub fn new() -> Self {
        Self::Idle
    }

    /// True once the attempt has reached Delivered or Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed { .. })
    }

    /// Process an event and return the new phase plus actions to execute.
    pub fn on_event(self, event: TransferEvent) -> (Self, Vec<TransferAction>) {
        match (self, event) {
            (Self::Idle, TransferEvent::AttemptStarted) => (
                Self::HandshakeRequested,
                vec![TransferAction::RequestHandshake],
            ),
            // Precondition failures reject the content before any
            // handshake; the artifact is purged, not retried.
            (Self::Idle, TransferEvent::ContentRejected { reason }) => (
                Self::Failed {
                    reason: reason.clone(),
                    retry: false,
                },
                vec![TransferAction::Purge { reason }],
            ),

            // Handshake outcomes. Only a dated reply opens the gate.
            (
                Self::HandshakeRequested,
                TransferEvent::HandshakeReplied { date: Some(stamp) },
            ) => (
                Self::HandshakeConfirmed { stamp },
                vec![TransferAction::BeginTransfer { stamp }],
            ),
            (Self::HandshakeRequested, TransferEvent::HandshakeReplied { date: None }) => {
                let reason = "handshake reply missing date".to_string();
                (
                    Self::Failed {
                        reason: reason.clone(),
                        retry: true,
                    },
                    vec![TransferAction::Requeue { reason }],
                )
            }
            (Self::HandshakeRequested, TransferEvent::HandshakeErrored { error }) => (
                Self::Failed {
                    reason: error.clone(),
                    retry: true,
                },
                vec![TransferAction::Requeue { reason: error }],
            ),

            (Self::HandshakeConfirmed { .. }, TransferEvent::TransferBegan) => {
                (Self::Transferring { percent: 0 }, vec![])
            }
            // Transfer initiation failed (link flapped between handshake
            // and transfer); retry-eligible.
            (Self::HandshakeConfirmed { .. }, TransferEvent::TransferErrored { error }) => (
                Self::Failed {
                    reason: error.clone(),
                    retry: true,
                },
                vec![TransferAction::Requeue { reason: error }],
            ),

            (Self::Transferring { .. }, TransferEvent::Progress { percent }) => {
                if percent >= 100 {
                    (Self::AwaitingAck, vec![])
                } else {
                    (Self::Transferring { percent }, vec![])
                }
            }
            (
                Self::Transferring { .. } | Self::AwaitingAck,
                TransferEvent::TransferSucceeded,
            ) => (Self::Delivered, vec![TransferAction::MarkDelivered]),
            (
                Self::Transferring { .. } | Self::AwaitingAck,
                TransferEvent::TransferErrored { error },
            ) => (
                Self::Failed {
                    reason: error.clone(),
                    retry: true,
                },
                vec![TransferAction::Requeue { reason: error }],
            ),

            // Invalid transitions - stay in current phase
            (phase, _) => (phase, vec![]),
        }
    }
}

impl Default for TransferPhase {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur during one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// The coordinator began the attempt (preconditions passed).
    AttemptStarted,
    /// A precondition failed permanently (wrong format, vanished file).
    ContentRejected {
        /// Why the content was rejected.
        reason: String,
    },
    /// The handshake reply arrived; `date` is None when the reply lacked
    /// the expected field.
    HandshakeReplied {
        /// Receiver timestamp, when present.
        date: Option<u64>,
    },
    /// The handshake request itself errored.
    HandshakeErrored {
        /// Error description.
        error: String,
    },
    /// The transport accepted the bulk transfer.
    TransferBegan,
    /// The transport reported progress.
    Progress {
        /// Progress, 0-100.
        percent: u8,
    },
    /// The transport's completion callback reported success.
    TransferSucceeded,
    /// The transport's completion callback reported failure.
    TransferErrored {
        /// Error description.
        error: String,
    },
}

/// Actions to be executed by link-engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferAction {
    /// Send the DateRequest handshake over the command channel.
    RequestHandshake,
    /// Begin the bulk transfer, stamping the artifact with receiver time.
    BeginTransfer {
        /// Receiver-side authoritative Unix timestamp.
        stamp: u64,
    },
    /// Mark the queued artifact delivered.
    MarkDelivered,
    /// Route the artifact (back) to the offline queue for a later drain.
    Requeue {
        /// Why this attempt failed.
        reason: String,
    },
    /// Permanently remove the artifact from the pending view.
    Purge {
        /// Why the content can never be delivered.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed() -> TransferPhase {
        let (phase, _) = TransferPhase::new().on_event(TransferEvent::AttemptStarted);
        let (phase, _) = phase.on_event(TransferEvent::HandshakeReplied { date: Some(42) });
        phase
    }

    #[test]
    fn attempt_starts_with_handshake() {
        let (phase, actions) = TransferPhase::new().on_event(TransferEvent::AttemptStarted);

        assert_eq!(phase, TransferPhase::HandshakeRequested);
        assert_eq!(actions, vec![TransferAction::RequestHandshake]);
    }

    #[test]
    fn dated_reply_opens_the_transfer_gate() {
        let (phase, _) = TransferPhase::new().on_event(TransferEvent::AttemptStarted);
        let (phase, actions) = phase.on_event(TransferEvent::HandshakeReplied { date: Some(99) });

        assert_eq!(phase, TransferPhase::HandshakeConfirmed { stamp: 99 });
        assert_eq!(actions, vec![TransferAction::BeginTransfer { stamp: 99 }]);
    }

    #[test]
    fn reply_without_date_requeues() {
        let (phase, _) = TransferPhase::new().on_event(TransferEvent::AttemptStarted);
        let (phase, actions) = phase.on_event(TransferEvent::HandshakeReplied { date: None });

        assert!(matches!(phase, TransferPhase::Failed { retry: true, .. }));
        assert!(actions
            .iter()
            .any(|a| matches!(a, TransferAction::Requeue { .. })));
        assert!(!actions
            .iter()
            .any(|a| matches!(a, TransferAction::BeginTransfer { .. })));
    }

    #[test]
    fn handshake_error_requeues() {
        let (phase, _) = TransferPhase::new().on_event(TransferEvent::AttemptStarted);
        let (phase, actions) = phase.on_event(TransferEvent::HandshakeErrored {
            error: "request timed out".into(),
        });

        assert!(matches!(phase, TransferPhase::Failed { retry: true, .. }));
        assert!(actions
            .iter()
            .any(|a| matches!(a, TransferAction::Requeue { .. })));
    }

    #[test]
    fn no_transfer_before_handshake() {
        // Feeding transfer events before a confirmed handshake never
        // produces a transfer phase.
        let (phase, actions) =
            TransferPhase::HandshakeRequested.on_event(TransferEvent::TransferBegan);
        assert_eq!(phase, TransferPhase::HandshakeRequested);
        assert!(actions.is_empty());
    }

    #[test]
    fn content_rejection_purges_without_retry() {
        let (phase, actions) = TransferPhase::new().on_event(TransferEvent::ContentRejected {
            reason: "unexpected extension".into(),
        });

        assert!(matches!(phase, TransferPhase::Failed { retry: false, .. }));
        assert!(actions
            .iter()
            .any(|a| matches!(a, TransferAction::Purge { .. })));
    }

    #[test]
    fn progress_updates_and_caps_into_awaiting_ack() {
        let (phase, _) = confirmed().on_event(TransferEvent::TransferBegan);
        let (phase, _) = phase.on_event(TransferEvent::Progress { percent: 50 });
        assert_eq!(phase, TransferPhase::Transferring { percent: 50 });

        let (phase, _) = phase.on_event(TransferEvent::Progress { percent: 100 });
        assert_eq!(phase, TransferPhase::AwaitingAck);
    }

    #[test]
    fn completion_success_delivers() {
        let (phase, _) = confirmed().on_event(TransferEvent::TransferBegan);
        let (phase, actions) = phase.on_event(TransferEvent::TransferSucceeded);

        assert_eq!(phase, TransferPhase::Delivered);
        assert_eq!(actions, vec![TransferAction::MarkDelivered]);
        assert!(phase.is_terminal());
    }

    #[test]
    fn mid_flight_failure_is_retry_eligible() {
        let (phase, _) = confirmed().on_event(TransferEvent::TransferBegan);
        let (phase, _) = phase.on_event(TransferEvent::Progress { percent: 60 });
        let (phase, actions) = phase.on_event(TransferEvent::TransferErrored {
            error: "link dropped mid-flight".into(),
        });

        assert!(matches!(phase, TransferPhase::Failed { retry: true, .. }));
        assert!(actions
            .iter()
            .any(|a| matches!(a, TransferAction::Requeue { .. })));
    }

    #[test]
    fn failure_while_awaiting_ack_requeues() {
        let (phase, _) = confirmed().on_event(TransferEvent::TransferBegan);
        let (phase, _) = phase.on_event(TransferEvent::Progress { percent: 100 });
        assert_eq!(phase, TransferPhase::AwaitingAck);

        let (phase, actions) = phase.on_event(TransferEvent::TransferErrored {
            error: "completion reported error".into(),
        });
        assert!(matches!(phase, TransferPhase::Failed { retry: true, .. }));
        assert!(actions
            .iter()
            .any(|a| matches!(a, TransferAction::Requeue { .. })));
    }

    #[test]
    fn terminal_phases_ignore_further_events() {
        let (phase, actions) = TransferPhase::Delivered.on_event(TransferEvent::TransferErrored {
            error: "late".into(),
        });
        assert_eq!(phase, TransferPhase::Delivered);
        assert!(actions.is_empty());
    }
}
