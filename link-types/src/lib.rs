//! # link-types
//!
//! Wire format types for the Notelink companion/primary sync protocol.
//!
//! This crate provides the foundational types used across all Notelink
//! crates:
//! - [`Locator`], [`TransferId`] - Identity types
//! - [`Message`] - Protocol messages (Command, DateRequest, Status, etc.)
//! - [`TransferMetadata`] - Metadata attached to bulk artifact transfers
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;
mod metadata;

pub use error::WireError;
pub use ids::{Locator, TransferId};
pub use messages::{
    Command, CommandAck, CommandKind, DateReply, DateRequest, DeliveryAck, Message, Pong,
    Status, Transcription,
};
pub use metadata::{TransferKind, TransferMetadata};
