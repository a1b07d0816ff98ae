//! Protocol messages exchanged between the companion and primary
//! endpoints.
//!
//! These are the short, message-level payloads carried by the transport's
//! send-now and store-and-forward primitives. Bulk artifact content is
//! carried separately (see [`TransferMetadata`](crate::TransferMetadata)).

use serde::{Deserialize, Serialize};

use crate::WireError;

/// All possible protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Control directive (start/stop/ping)
    Command(Command),
    /// Reply to an immediate-tier command
    CommandAck(CommandAck),
    /// Reply to a ping; the liveness probe
    Pong(Pong),
    /// Request for receiver-side authoritative time (transfer handshake)
    DateRequest(DateRequest),
    /// Reply carrying receiver-side time
    DateReply(DateReply),
    /// Free-form status line pushed primary -> companion
    Status(Status),
    /// Live transcription text pushed primary -> companion
    Transcription(Transcription),
    /// Best-effort receiver ack for a queued artifact transfer
    DeliveryAck(DeliveryAck),
}

impl Message {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
    }
}

/// The kind of control directive.
///
/// Commands are idempotent at the receiver: issuing `stop` twice is a
/// safe no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Begin recording on the primary
    Start,
    /// Stop recording and persist the result
    Stop,
    /// Liveness probe; always answered with [`Pong`] when possible
    Ping,
}

impl CommandKind {
    /// Human-readable label used in status lines ("Queued: Recording").
    pub fn label(&self) -> &'static str {
        match self {
            CommandKind::Start => "Recording",
            CommandKind::Stop => "Stop",
            CommandKind::Ping => "Ping",
        }
    }
}

/// A short, idempotent control directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// What to do
    pub kind: CommandKind,
    /// Unix timestamp (seconds) when the command was issued
    pub issued_at: u64,
}

/// Reply to an immediate-tier command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    /// Whether the receiver executed the command successfully
    pub ok: bool,
}

/// Reply to a [`CommandKind::Ping`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {}

/// Request for receiver-side authoritative time.
///
/// Used before every bulk transfer to confirm the link is truly
/// round-trip functional and to obtain a trustworthy timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRequest {}

/// Reply to a [`DateRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateReply {
    /// Receiver's current Unix timestamp (seconds)
    pub date: u64,
}

/// Free-form status update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The status text
    pub status: String,
}

/// Live transcription text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcription {
    /// The transcribed text so far
    pub transcription: String,
}

/// Best-effort acknowledgment for a queued artifact transfer.
///
/// Informational only: the sender's delivered flag is driven by its own
/// transfer completion, not by this message, so losing it is harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAck {
    /// Sender-side locator of the delivered artifact
    pub locator: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_roundtrip() {
        let cmd = Command {
            kind: CommandKind::Start,
            issued_at: 1756500000,
        };

        let bytes = rmp_serde::to_vec(&cmd).unwrap();
        let restored: Command = rmp_serde::from_slice(&bytes).unwrap();

        assert_eq!(cmd, restored);
    }

    #[test]
    fn message_enum_roundtrip() {
        let msg = Message::Command(Command {
            kind: CommandKind::Stop,
            issued_at: 1756500000,
        });

        let bytes = msg.to_bytes().unwrap();
        let restored = Message::from_bytes(&bytes).unwrap();

        assert_eq!(msg, restored);
    }

    #[test]
    fn date_reply_roundtrip() {
        let msg = Message::DateReply(DateReply { date: 1756500123 });

        let bytes = msg.to_bytes().unwrap();
        match Message::from_bytes(&bytes).unwrap() {
            Message::DateReply(reply) => assert_eq!(reply.date, 1756500123),
            other => panic!("expected DateReply, got {:?}", other),
        }
    }

    #[test]
    fn status_and_transcription_roundtrip() {
        let status = Message::Status(Status {
            status: "Saved".into(),
        });
        let restored = Message::from_bytes(&status.to_bytes().unwrap()).unwrap();
        assert_eq!(status, restored);

        let text = Message::Transcription(Transcription {
            transcription: "hello world".into(),
        });
        let restored = Message::from_bytes(&text.to_bytes().unwrap()).unwrap();
        assert_eq!(text, restored);
    }

    #[test]
    fn pong_answers_ping_shape() {
        let bytes = Message::Pong(Pong {}).to_bytes().unwrap();
        assert!(matches!(
            Message::from_bytes(&bytes).unwrap(),
            Message::Pong(_)
        ));
    }

    #[test]
    fn delivery_ack_roundtrip() {
        let msg = Message::DeliveryAck(DeliveryAck {
            locator: "/recordings/rec-42.m4a".into(),
        });
        let restored = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(msg, restored);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let result = Message::from_bytes(&[0xFF, 0x00, 0x13, 0x37]);
        assert!(matches!(result, Err(WireError::Deserialization(_))));
    }

    #[test]
    fn command_kind_labels() {
        assert_eq!(CommandKind::Start.label(), "Recording");
        assert_eq!(CommandKind::Stop.label(), "Stop");
    }
}
