//! Engine error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::transport::TransportError;
use link_types::WireError;

/// Engine errors.
///
/// Nothing in this taxonomy is fatal: every variant resolves to an
/// observable status and, where applicable, a queue-state change.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Wire encoding/decoding error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Queue persistence error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem error (received-artifact writes, content reads).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
