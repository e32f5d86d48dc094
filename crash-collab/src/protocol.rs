//! Relay wire protocol.
//!
//! One JSON text frame per message, tagged by `Kind` with the content under
//! `Body`:
//!
//! ```text
//! client ──▸ relay   { "Kind": "Join",       "Body": { "Document": "...", "User": "..." } }
//! client ──▸ relay   { "Kind": "Changes",    "Body": [ Change, ... ] }
//! relay  ──▸ client  { "Kind": "Initialize", "Body": [ Change, ... ] }   (once, after Join)
//! relay  ──▸ client  { "Kind": "Changes",    "Body": [ Change, ... ] }   (from other peers)
//! relay  ──▸ client  { "Kind": "UserLeft",   "Body": { "User": "..." } }
//! either             { "Kind": "Ping" } / { "Kind": "Pong" }
//! ```
//!
//! Changes keep their own wire format inside the envelope.

use crash_core::Change;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CollabError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Kind", content = "Body")]
pub enum RelayMessage {
    #[serde(rename_all = "PascalCase")]
    Join { document: String, user: String },
    Changes(Vec<Change>),
    Initialize(Vec<Change>),
    #[serde(rename_all = "PascalCase")]
    UserLeft { user: String },
    Ping,
    Pong,
}

impl RelayMessage {
    pub fn join(document: impl Into<String>, user: impl Into<String>) -> Self {
        RelayMessage::Join {
            document: document.into(),
            user: user.into(),
        }
    }

    pub fn encode(&self) -> Result<String, CollabError> {
        serde_json::to_string(self).map_err(|e| CollabError::Protocol(e.to_string()))
    }

    pub fn decode(raw: &str) -> Result<Self, CollabError> {
        serde_json::from_str(raw).map_err(|e| CollabError::Protocol(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RelayMessage::Join { .. } => "Join",
            RelayMessage::Changes(_) => "Changes",
            RelayMessage::Initialize(_) => "Initialize",
            RelayMessage::UserLeft { .. } => "UserLeft",
            RelayMessage::Ping => "Ping",
            RelayMessage::Pong => "Pong",
        }
    }
}

/// A connected participant as the relay sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub peer_id: Uuid,
    pub user: String,
}

impl PeerInfo {
    pub fn new(user: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), user)
    }

    pub fn with_id(peer_id: Uuid, user: impl Into<String>) -> Self {
        Self {
            peer_id,
            user: user.into(),
        }
    }
}
