use std::collections::HashMap;

use crash_core::{CLayer, CTransform, Camera, ChangeAction, GeometryPayload};
use uuid::Uuid;

use crate::host::ObjectHandle;

/// Something the local user did in the host application.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    ObjectAdded {
        object: ObjectHandle,
        geometry: GeometryPayload,
    },
    ObjectDeleted {
        object: ObjectHandle,
    },
    ObjectModified {
        object: ObjectHandle,
        attributes: HashMap<String, String>,
    },
    ObjectsTransformed {
        objects: Vec<ObjectHandle>,
        transform: CTransform,
    },
    ObjectSelected {
        object: ObjectHandle,
    },
    ObjectDeselected {
        object: ObjectHandle,
    },
    CameraChanged {
        camera: Camera,
    },
    LayerAdded {
        layer: CLayer,
    },
    LayerModified {
        old: CLayer,
        new: CLayer,
    },
    LayerDeleted {
        layer: CLayer,
    },
    /// The local user finished their batch of provisional edits.
    Done,
    /// Release specific provisional changes by Id.
    ReleaseObjects {
        ids: Vec<Uuid>,
    },
    /// Ask the owner of a provisional change to name it.
    Request {
        target: Uuid,
        requested_name: String,
    },
}

impl HostEvent {
    /// The action a create pipeline is asked to produce for this event.
    pub fn requested_action(&self) -> ChangeAction {
        match self {
            HostEvent::ObjectAdded { .. }
            | HostEvent::CameraChanged { .. }
            | HostEvent::LayerAdded { .. }
            | HostEvent::Request { .. } => ChangeAction::ADD,
            HostEvent::ObjectDeleted { .. } | HostEvent::LayerDeleted { .. } => {
                ChangeAction::REMOVE
            }
            HostEvent::ObjectsTransformed { .. } => ChangeAction::TRANSFORM,
            HostEvent::ObjectModified { .. } | HostEvent::LayerModified { .. } => {
                ChangeAction::UPDATE
            }
            HostEvent::ObjectSelected { .. } => ChangeAction::LOCKED,
            HostEvent::ObjectDeselected { .. } => ChangeAction::UNLOCKED,
            HostEvent::Done | HostEvent::ReleaseObjects { .. } => ChangeAction::RELEASE,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HostEvent::ObjectAdded { .. } => "object-added",
            HostEvent::ObjectDeleted { .. } => "object-deleted",
            HostEvent::ObjectModified { .. } => "object-modified",
            HostEvent::ObjectsTransformed { .. } => "objects-transformed",
            HostEvent::ObjectSelected { .. } => "object-selected",
            HostEvent::ObjectDeselected { .. } => "object-deselected",
            HostEvent::CameraChanged { .. } => "camera-changed",
            HostEvent::LayerAdded { .. } => "layer-added",
            HostEvent::LayerModified { .. } => "layer-modified",
            HostEvent::LayerDeleted { .. } => "layer-deleted",
            HostEvent::Done => "done",
            HostEvent::ReleaseObjects { .. } => "release-objects",
            HostEvent::Request { .. } => "request",
        }
    }
}
