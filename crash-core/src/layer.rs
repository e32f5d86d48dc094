//! Layer payload.
//!
//! A layer change travels as a [`PayloadPacket`]: `Data` holds the layer's
//! full path *before* the change, `Updates` holds the changed properties.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::packet::{PacketError, PayloadPacket};

/// Separator between nested layer names in a full path.
pub const LAYER_SEPARATOR: &str = "::";

pub const KEY_FULL_PATH: &str = "FullPath";
pub const KEY_COLOR: &str = "Color";
pub const KEY_VISIBLE: &str = "Visible";
pub const KEY_LOCKED: &str = "Locked";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CLayer {
    pub full_path: String,
    /// `#RRGGBB`
    pub color: String,
    pub visible: bool,
    pub locked: bool,
}

impl CLayer {
    pub fn new(full_path: impl Into<String>) -> Self {
        Self {
            full_path: full_path.into(),
            color: "#000000".to_string(),
            visible: true,
            locked: false,
        }
    }

    /// Leaf name of the layer.
    pub fn name(&self) -> &str {
        self.full_path
            .rsplit(LAYER_SEPARATOR)
            .next()
            .unwrap_or(&self.full_path)
    }

    /// Parent path, `None` for a top-level layer.
    pub fn parent_path(&self) -> Option<&str> {
        self.full_path
            .rsplit_once(LAYER_SEPARATOR)
            .map(|(parent, _)| parent)
    }

    /// Every property, used when announcing a new layer.
    pub fn all_fields(&self) -> HashMap<String, String> {
        HashMap::from([
            (KEY_FULL_PATH.to_string(), self.full_path.clone()),
            (KEY_COLOR.to_string(), self.color.clone()),
            (KEY_VISIBLE.to_string(), self.visible.to_string()),
            (KEY_LOCKED.to_string(), self.locked.to_string()),
        ])
    }

    /// Properties that differ between `old` and `new`.
    pub fn diff(old: &CLayer, new: &CLayer) -> HashMap<String, String> {
        let mut updates = HashMap::new();
        if old.full_path != new.full_path {
            updates.insert(KEY_FULL_PATH.to_string(), new.full_path.clone());
        }
        if old.color != new.color {
            updates.insert(KEY_COLOR.to_string(), new.color.clone());
        }
        if old.visible != new.visible {
            updates.insert(KEY_VISIBLE.to_string(), new.visible.to_string());
        }
        if old.locked != new.locked {
            updates.insert(KEY_LOCKED.to_string(), new.locked.to_string());
        }
        updates
    }

    /// Apply a set of updates. Nothing is changed if any entry is malformed.
    pub fn apply_updates(&mut self, updates: &HashMap<String, String>) -> Result<(), PacketError> {
        let packet = PayloadPacket {
            data: String::new(),
            updates: updates.clone(),
        };
        let visible = optional(packet.get_as::<bool>(KEY_VISIBLE))?;
        let locked = optional(packet.get_as::<bool>(KEY_LOCKED))?;

        if let Some(path) = packet.get(KEY_FULL_PATH) {
            self.full_path = path.to_string();
        }
        if let Some(color) = packet.get(KEY_COLOR) {
            self.color = color.to_string();
        }
        if let Some(visible) = visible {
            self.visible = visible;
        }
        if let Some(locked) = locked {
            self.locked = locked;
        }
        Ok(())
    }

    /// Build the packet for a change: `Data` = path before the change.
    pub fn to_packet(path_before: &str, updates: HashMap<String, String>) -> PayloadPacket {
        PayloadPacket {
            data: path_before.to_string(),
            updates,
        }
    }

    /// Rebuild a full layer from an add packet.
    pub fn from_packet(packet: &PayloadPacket) -> Result<CLayer, CoreError> {
        let mut layer = CLayer::new(packet.data.clone());
        layer.apply_updates(&packet.updates)?;
        Ok(layer)
    }
}

fn optional<T>(result: Result<T, PacketError>) -> Result<Option<T>, PacketError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(PacketError::Missing(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_parent() {
        let layer = CLayer::new("Site::Walls::Interior");
        assert_eq!(layer.name(), "Interior");
        assert_eq!(layer.parent_path(), Some("Site::Walls"));
        assert_eq!(CLayer::new("Default").parent_path(), None);
    }

    #[test]
    fn test_diff_only_changed_fields() {
        let old = CLayer::new("Walls");
        let mut new = old.clone();
        new.visible = false;

        let diff = CLayer::diff(&old, &new);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.get(KEY_VISIBLE).map(String::as_str), Some("false"));
        assert!(CLayer::diff(&old, &old).is_empty());
    }

    #[test]
    fn test_apply_diff_reproduces_new() {
        let old = CLayer::new("Walls");
        let mut new = CLayer::new("Site::Walls");
        new.color = "#FF0000".into();
        new.locked = true;

        let mut applied = old.clone();
        applied.apply_updates(&CLayer::diff(&old, &new)).unwrap();
        assert_eq!(applied, new);
    }

    #[test]
    fn test_malformed_update_changes_nothing() {
        let mut layer = CLayer::new("Walls");
        let updates = HashMap::from([
            (KEY_COLOR.to_string(), "#00FF00".to_string()),
            (KEY_VISIBLE.to_string(), "sometimes".to_string()),
        ]);
        assert!(layer.apply_updates(&updates).is_err());
        assert_eq!(layer, CLayer::new("Walls"));
    }

    #[test]
    fn test_from_add_packet() {
        let mut layer = CLayer::new("Roof");
        layer.visible = false;
        let packet = CLayer::to_packet(&layer.full_path, layer.all_fields());
        assert_eq!(CLayer::from_packet(&packet).unwrap(), layer);
    }
}
