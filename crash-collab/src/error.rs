use crash_core::{CoreError, PacketError};
use thiserror::Error;
use uuid::Uuid;

use crate::host::HostError;

/// Errors raised by the synchronization engine.
#[derive(Debug, Error)]
pub enum CollabError {
    #[error("Change definition '{0}' is registered twice")]
    DuplicateDefinition(String),

    #[error("No change definition named '{0}'")]
    UnknownDefinition(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error("Host document error: {0}")]
    Host(#[from] HostError),

    #[error("Change {0} is not realised in this document")]
    NotRealised(Uuid),

    #[error("Idle queue is closed")]
    QueueClosed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}
