//! Session state machine for one Notelink endpoint.
//!
//! This module provides a pure, side-effect-free state machine for the
//! per-endpoint session status surfaced to observers. The machine takes
//! events as input and produces a new state plus a list of actions to
//! execute.
//!
//! The actual I/O (sending commands, draining the queue) is performed by
//! link-engine, not by this module. This enables instant unit testing
//! without transport mocks.

use link_types::CommandKind;

/// Per-endpoint session status - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Idle, nothing in flight.
    Ready,
    /// A start command was delivered; the primary is recording.
    Recording,
    /// Fresh (real-time) transfer in flight.
    Sending {
        /// Transfer progress, 0-100.
        percent: u8,
    },
    /// Offline, or a command was optimistically queued.
    QueuedOffline {
        /// Human-readable label, e.g. "Queued: Recording" or "Offline".
        label: String,
    },
    /// Backlog drain transfer in flight.
    Syncing {
        /// Transfer progress, 0-100.
        percent: u8,
    },
    /// A reported, non-fatal failure awaiting acknowledgment.
    Error {
        /// What went wrong.
        reason: String,
    },
}

impl SessionState {
    /// Create a new state machine in the Ready state.
    pub fn new() -> Self {
        Self::Ready
    }

    /// True while a transfer is in flight (Sending or Syncing).
    pub fn is_transferring(&self) -> bool {
        matches!(self, Self::Sending { .. } | Self::Syncing { .. })
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (link-engine)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: SessionEvent) -> (Self, Vec<SessionAction>) {
        match (self, event) {
            // Confirmed command deliveries
            (Self::Ready, SessionEvent::CommandDelivered(CommandKind::Start)) => (
                Self::Recording,
                vec![SessionAction::AnnounceStatus("Recording…".into())],
            ),
            (Self::Recording, SessionEvent::CommandDelivered(CommandKind::Stop)) => (
                Self::Ready,
                vec![SessionAction::AnnounceStatus("Stopped".into())],
            ),
            // Stop while already Ready is a safe no-op (idempotent commands)
            (Self::Ready, SessionEvent::CommandDelivered(CommandKind::Stop)) => {
                (Self::Ready, vec![])
            }

            // Optimistically queued commands: tentative state set
            // immediately, without waiting for confirmation.
            (_, SessionEvent::CommandQueued(kind)) => {
                let label = format!("Queued: {}", kind.label());
                (
                    Self::QueuedOffline {
                        label: label.clone(),
                    },
                    vec![SessionAction::AnnounceStatus(label)],
                )
            }

            // Reachability loss is a UI indicator only; it must not
            // interrupt an in-flight transfer.
            (state, SessionEvent::ReachabilityChanged(false)) if state.is_transferring() => {
                (state, vec![])
            }
            (_, SessionEvent::ReachabilityChanged(false)) => (
                Self::QueuedOffline {
                    label: "Offline".into(),
                },
                vec![],
            ),

            // Reachability gain leaves the state untouched; the drain
            // (after the engine's settle delay) produces any further
            // transitions.
            (state, SessionEvent::ReachabilityChanged(true)) => {
                (state, vec![SessionAction::ScheduleDrain])
            }

            // Transfer lifecycle
            (_, SessionEvent::TransferStarted { queued }) => {
                let next = if queued {
                    Self::Syncing { percent: 0 }
                } else {
                    Self::Sending { percent: 0 }
                };
                (next, vec![])
            }
            (_, SessionEvent::TransferProgress { queued, percent }) => {
                let next = if queued {
                    Self::Syncing { percent }
                } else {
                    Self::Sending { percent }
                };
                (next, vec![])
            }
            (_, SessionEvent::TransferSucceeded) => (
                Self::Ready,
                vec![SessionAction::AnnounceStatus("Transfer complete".into())],
            ),
            (_, SessionEvent::TransferFailed { reason }) => (Self::Error { reason }, vec![]),

            // Error -> Ready once the caller acknowledges
            (Self::Error { .. }, SessionEvent::ErrorAcknowledged) => (Self::Ready, vec![]),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur in the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// An immediate-tier command was delivered and confirmed.
    CommandDelivered(CommandKind),
    /// A command was handed to the store-and-forward buffer.
    CommandQueued(CommandKind),
    /// Effective reachability changed.
    ReachabilityChanged(bool),
    /// A bulk transfer began.
    TransferStarted {
        /// True for a backlog drain transfer.
        queued: bool,
    },
    /// A bulk transfer reported progress.
    TransferProgress {
        /// True for a backlog drain transfer.
        queued: bool,
        /// Progress, 0-100.
        percent: u8,
    },
    /// The in-flight transfer completed successfully.
    TransferSucceeded,
    /// The in-flight transfer failed.
    TransferFailed {
        /// Failure reason for the Error state.
        reason: String,
    },
    /// The caller acknowledged an Error state.
    ErrorAcknowledged,
}

/// Actions to be executed by link-engine.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Schedule a queue drain (the engine applies the settle delay).
    ScheduleDrain,
    /// Surface a status line to observers.
    AnnounceStatus(String),
}
