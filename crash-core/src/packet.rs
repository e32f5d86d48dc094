//! Generic payload envelope.
//!
//! ```text
//! { "Data": "<string>", "Updates": { "<key>": "<string>", ... } }
//! ```
//!
//! Parsing never fails: anything that is not a well-formed packet becomes
//! the packet's `Data`, verbatim.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CoreError;

/// Typed lookup failures for [`PayloadPacket::get_as`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("Packet has no '{0}' entry")]
    Missing(String),

    #[error("Packet entry '{key}' = {value:?} is not a valid {expected}")]
    Mismatch {
        key: String,
        value: String,
        expected: &'static str,
    },
}

/// Free-form data plus a string key/value map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct PayloadPacket {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub updates: HashMap<String, String>,
}

impl PayloadPacket {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            updates: HashMap::new(),
        }
    }

    /// Builder-style insert of one update.
    pub fn with_update(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.updates.insert(key.into(), value.into());
        self
    }

    /// Parse a payload string, falling back to a raw-data packet.
    pub fn parse(raw: &str) -> Self {
        // Only JSON objects are packets; arrays and scalars would otherwise
        // be accepted by serde's sequence form of the struct.
        let parsed = serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .filter(|value| value.is_object())
            .and_then(|value| serde_json::from_value::<PayloadPacket>(value).ok());

        parsed.unwrap_or_else(|| Self::new(raw))
    }

    pub fn encode(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(CoreError::Serialization)
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.updates.get(key).map(String::as_str)
    }

    /// Parse one update into `T`, distinguishing a missing key from a value
    /// of the wrong shape.
    pub fn get_as<T: FromStr>(&self, key: &str) -> Result<T, PacketError> {
        let raw = self
            .get(key)
            .ok_or_else(|| PacketError::Missing(key.to_string()))?;
        raw.parse::<T>().map_err(|_| PacketError::Mismatch {
            key: key.to_string(),
            value: raw.to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.updates.is_empty()
    }
}
