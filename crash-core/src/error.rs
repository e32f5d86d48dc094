use thiserror::Error;
use uuid::Uuid;

use crate::packet::PacketError;

/// Errors raised while encoding or decoding change records and payloads.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[source] serde_json::Error),

    #[error("Change {0} has no payload")]
    MissingPayload(Uuid),

    #[error("Tick count {0} is outside the representable range")]
    TicksOutOfRange(i64),

    #[error("Invalid transform: {0}")]
    InvalidTransform(String),

    #[error(transparent)]
    Packet(#[from] PacketError),
}
