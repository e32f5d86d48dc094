//! The change record, the unit of synchronization.
//!
//! Wire format (JSON, one object per change):
//! ```text
//! { "Id": "<uuid>", "Owner": "<string|empty>", "Action": <bitmask>,
//!   "Payload": "<string|null>", "Stamp": "<ISO-8601>", "Type": "<string>" }
//! ```
//!
//! `Id` names the entity a change is about. Follow-up changes for the same
//! entity (transform, remove, release) carry the same `Id`; a fresh entity
//! always gets a fresh v4 id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::action::ChangeAction;
use crate::error::CoreError;

/// One edit, transmitted between clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Change {
    pub id: Uuid,
    /// Authoring user. Empty for a targeted release.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub owner: String,
    pub action: ChangeAction,
    /// Type-specific encoded payload, opaque to the envelope.
    #[serde(default)]
    pub payload: Option<String>,
    pub stamp: DateTime<Utc>,
    /// Name of the definition that owns this change.
    #[serde(rename = "Type")]
    pub change_type: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Change {
    /// Create a change for a new entity.
    pub fn new(
        owner: impl Into<String>,
        action: ChangeAction,
        change_type: impl Into<String>,
        payload: Option<String>,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), owner, action, change_type, payload)
    }

    /// Create a change about an existing entity.
    pub fn with_id(
        id: Uuid,
        owner: impl Into<String>,
        action: ChangeAction,
        change_type: impl Into<String>,
        payload: Option<String>,
    ) -> Self {
        Self {
            id,
            owner: owner.into(),
            action,
            payload,
            stamp: Utc::now(),
            change_type: change_type.into(),
        }
    }

    #[inline]
    pub fn has(&self, flag: ChangeAction) -> bool {
        self.action.contains(flag)
    }

    #[inline]
    pub fn is_temporary(&self) -> bool {
        self.action.is_temporary()
    }

    /// The payload, or an error naming this change.
    pub fn payload_str(&self) -> Result<&str, CoreError> {
        self.payload.as_deref().ok_or(CoreError::MissingPayload(self.id))
    }

    /// Turn a temporary change into the committed `ADD` it stood in for.
    pub fn promoted(mut self) -> Self {
        self.action = self
            .action
            .without(ChangeAction::TEMPORARY)
            .with(ChangeAction::ADD);
        self
    }

    /// Serialize to the JSON wire format.
    pub fn encode(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(CoreError::Serialization)
    }

    /// Deserialize from the JSON wire format.
    pub fn decode(raw: &str) -> Result<Self, CoreError> {
        serde_json::from_str(raw).map_err(CoreError::Deserialization)
    }

    /// Serialize several changes as one JSON array.
    pub fn encode_batch(changes: &[Change]) -> Result<String, CoreError> {
        serde_json::to_string(changes).map_err(CoreError::Serialization)
    }

    pub fn decode_batch(raw: &str) -> Result<Vec<Change>, CoreError> {
        serde_json::from_str(raw).map_err(CoreError::Deserialization)
    }
}
