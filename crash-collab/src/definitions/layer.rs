//! `Crash.LayerChange`: layer table sync.
//!
//! Every layer packet carries the layer's path *before* the change in
//! `Data`; `Updates` hold all fields for an add and only the differing
//! fields for an update.

use std::collections::HashMap;

use crash_core::{CLayer, Change, ChangeAction, PayloadPacket};

use crate::definitions::payload;
use crate::doc::CrashDoc;
use crate::error::CollabError;
use crate::event::HostEvent;
use crate::registry::{CreateAction, Definition, ReceiveAction};

pub const LAYER_CHANGE: &str = "Crash.LayerChange";

pub fn definition() -> Definition {
    Definition::new(LAYER_CHANGE)
        .create(CreateLayer)
        .receive(ReceiveLayerAdd)
        .receive(ReceiveLayerUpdate)
        .receive(ReceiveLayerRemove)
}

/// One create-action covers the three layer events.
pub struct CreateLayer;

impl CreateLayer {
    fn packet(event: &HostEvent) -> Option<(ChangeAction, PayloadPacket)> {
        match event {
            HostEvent::LayerAdded { layer } => Some((
                ChangeAction::ADD,
                CLayer::to_packet(&layer.full_path, layer.all_fields()),
            )),
            HostEvent::LayerModified { old, new } => {
                let updates = CLayer::diff(old, new);
                (!updates.is_empty())
                    .then(|| (ChangeAction::UPDATE, CLayer::to_packet(&old.full_path, updates)))
            }
            HostEvent::LayerDeleted { layer } => Some((
                ChangeAction::REMOVE,
                CLayer::to_packet(&layer.full_path, HashMap::new()),
            )),
            _ => None,
        }
    }
}

impl CreateAction for CreateLayer {
    fn action(&self) -> ChangeAction {
        ChangeAction::ADD | ChangeAction::UPDATE | ChangeAction::REMOVE
    }

    fn can_convert(&self, event: &HostEvent, _doc: &CrashDoc) -> bool {
        matches!(
            event,
            HostEvent::LayerAdded { .. }
                | HostEvent::LayerModified { .. }
                | HostEvent::LayerDeleted { .. }
        )
    }

    fn try_convert(&self, event: &HostEvent, doc: &CrashDoc) -> Option<Vec<Change>> {
        let (action, packet) = Self::packet(event)?;
        let encoded = packet.encode().ok()?;
        Some(vec![Change::new(
            doc.current_user(),
            action,
            LAYER_CHANGE,
            Some(encoded),
        )])
    }
}

pub struct ReceiveLayerAdd;

impl ReceiveAction for ReceiveLayerAdd {
    fn name(&self) -> &str {
        "layer.add"
    }

    fn can_receive(&self, change: &Change) -> bool {
        change.has(ChangeAction::ADD)
    }

    fn apply(&self, doc: &mut CrashDoc, change: &Change) -> Result<(), CollabError> {
        let layer = CLayer::from_packet(&PayloadPacket::parse(payload(change)?))?;
        doc.dispatcher.add_layer(&layer)?;
        Ok(())
    }
}

pub struct ReceiveLayerUpdate;

impl ReceiveAction for ReceiveLayerUpdate {
    fn name(&self) -> &str {
        "layer.update"
    }

    fn can_receive(&self, change: &Change) -> bool {
        change.has(ChangeAction::UPDATE)
    }

    fn apply(&self, doc: &mut CrashDoc, change: &Change) -> Result<(), CollabError> {
        let packet = PayloadPacket::parse(payload(change)?);
        doc.dispatcher.update_layer(&packet.data, &packet.updates)?;
        Ok(())
    }
}

pub struct ReceiveLayerRemove;

impl ReceiveAction for ReceiveLayerRemove {
    fn name(&self) -> &str {
        "layer.remove"
    }

    fn can_receive(&self, change: &Change) -> bool {
        change.has(ChangeAction::REMOVE)
    }

    fn apply(&self, doc: &mut CrashDoc, change: &Change) -> Result<(), CollabError> {
        let packet = PayloadPacket::parse(payload(change)?);
        doc.dispatcher.remove_layer(&packet.data)?;
        Ok(())
    }
}
