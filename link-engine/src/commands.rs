//! Two-tier control command delivery.
//!
//! Commands are time-sensitive: when the peer is reachable they go out
//! as a reply-expected request and the caller learns the outcome
//! immediately. When it is not, they are handed to the transport's
//! store-and-forward buffer and reported as queued, optimistically. A
//! failed immediate delivery is never auto-requeued; the caller decides
//! whether a stale command is still worth sending.

use std::sync::Arc;

use tracing::{debug, warn};

use link_types::{Command, CommandKind, Message};

use crate::transport::Transport;

/// Result of a command send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The peer received the command and acknowledged it.
    Delivered,
    /// The command was buffered for deferred delivery; no confirmation
    /// will arrive.
    Queued,
    /// Immediate delivery failed. The command was not buffered.
    Failed(String),
}

/// Sends control commands over the appropriate delivery tier.
pub struct CommandChannel {
    transport: Arc<dyn Transport>,
}

impl CommandChannel {
    /// Create a channel over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send a command, choosing the tier from the given effective
    /// reachability.
    pub async fn send(
        &self,
        kind: CommandKind,
        issued_at: u64,
        reachable: bool,
    ) -> CommandOutcome {
        let message = Message::Command(Command { kind, issued_at });
        let payload = match message.to_bytes() {
            Ok(payload) => payload,
            Err(e) => return CommandOutcome::Failed(e.to_string()),
        };

        if reachable {
            self.send_immediate(kind, &payload).await
        } else {
            self.send_deferred(kind, &payload).await
        }
    }

    async fn send_immediate(&self, kind: CommandKind, payload: &[u8]) -> CommandOutcome {
        let reply = match self.transport.request(payload).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(command = kind.label(), error = %e, "immediate command delivery failed");
                return CommandOutcome::Failed(e.to_string());
            }
        };
        match Message::from_bytes(&reply) {
            Ok(Message::CommandAck(ack)) if ack.ok => {
                debug!(command = kind.label(), "command acknowledged");
                CommandOutcome::Delivered
            }
            Ok(Message::CommandAck(_)) => {
                CommandOutcome::Failed("peer rejected command".to_string())
            }
            Ok(Message::Pong(_)) => {
                debug!(command = kind.label(), "pong received");
                CommandOutcome::Delivered
            }
            Ok(other) => {
                warn!(command = kind.label(), reply = ?other, "unexpected command reply");
                CommandOutcome::Failed("unexpected reply".to_string())
            }
            Err(e) => CommandOutcome::Failed(format!("undecodable reply: {e}")),
        }
    }

    async fn send_deferred(&self, kind: CommandKind, payload: &[u8]) -> CommandOutcome {
        match self.transport.send_store_and_forward(payload).await {
            Ok(()) => {
                debug!(command = kind.label(), "command queued for deferred delivery");
                CommandOutcome::Queued
            }
            Err(e) => {
                warn!(command = kind.label(), error = %e, "deferred command delivery failed");
                CommandOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use link_types::{CommandAck, Pong};

    async fn reachable_mock() -> MockTransport {
        let transport = MockTransport::new();
        transport.activate().await.unwrap();
        transport.set_reachable(true);
        transport
    }

    #[tokio::test]
    async fn reachable_start_is_delivered_on_ack() {
        let transport = reachable_mock().await;
        transport.queue_reply(
            Message::CommandAck(CommandAck { ok: true })
                .to_bytes()
                .unwrap(),
        );
        let channel = CommandChannel::new(Arc::new(transport.clone()));

        let outcome = channel.send(CommandKind::Start, 100, true).await;
        assert_eq!(outcome, CommandOutcome::Delivered);

        // The wire payload is a well-formed command message.
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        match Message::from_bytes(&requests[0]).unwrap() {
            Message::Command(command) => {
                assert_eq!(command.kind, CommandKind::Start);
                assert_eq!(command.issued_at, 100);
            }
            other => panic!("expected Command, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn rejected_ack_is_failed() {
        let transport = reachable_mock().await;
        transport.queue_reply(
            Message::CommandAck(CommandAck { ok: false })
                .to_bytes()
                .unwrap(),
        );
        let channel = CommandChannel::new(Arc::new(transport));

        let outcome = channel.send(CommandKind::Stop, 100, true).await;
        assert!(matches!(outcome, CommandOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn ping_is_delivered_on_pong() {
        let transport = reachable_mock().await;
        transport.queue_reply(Message::Pong(Pong {}).to_bytes().unwrap());
        let channel = CommandChannel::new(Arc::new(transport));

        let outcome = channel.send(CommandKind::Ping, 100, true).await;
        assert_eq!(outcome, CommandOutcome::Delivered);
    }

    #[tokio::test]
    async fn unreachable_command_is_queued() {
        let transport = MockTransport::new();
        let channel = CommandChannel::new(Arc::new(transport.clone()));

        let outcome = channel.send(CommandKind::Start, 100, false).await;
        assert_eq!(outcome, CommandOutcome::Queued);
        assert_eq!(transport.forwarded().len(), 1);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn request_failure_is_not_requeued() {
        let transport = reachable_mock().await;
        transport.fail_next_request("session dropped");
        let channel = CommandChannel::new(Arc::new(transport.clone()));

        let outcome = channel.send(CommandKind::Stop, 100, true).await;
        assert!(matches!(outcome, CommandOutcome::Failed(_)));
        assert!(transport.forwarded().is_empty());
    }

    #[tokio::test]
    async fn undecodable_reply_is_failed() {
        let transport = reachable_mock().await;
        transport.queue_reply(b"garbage".to_vec());
        let channel = CommandChannel::new(Arc::new(transport));

        let outcome = channel.send(CommandKind::Ping, 100, true).await;
        assert!(matches!(outcome, CommandOutcome::Failed(_)));
    }
}
