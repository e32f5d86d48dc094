//! Host document interface.
//!
//! The host (the CAD application that owns geometry, cameras and layers) is
//! an external collaborator. The engine only ever talks to it through
//! [`HostDocument`], and only from the idle queue's consumer, so
//! implementations never see concurrent calls.
//!
//! [`MemoryHost`] keeps everything in hash maps and counts undo records. It
//! backs the test-suite and any relay-free use of the engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crash_core::{CLayer, CTransform, Camera, GeometryPayload};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque reference to an object living in the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(pub Uuid);

impl ObjectHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObjectHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj:{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("Object {0} does not exist")]
    UnknownObject(ObjectHandle),

    #[error("Layer '{0}' does not exist")]
    UnknownLayer(String),

    #[error("Layer '{0}' already exists")]
    DuplicateLayer(String),

    #[error("Invalid layer update: {0}")]
    InvalidLayerUpdate(String),

    #[error("Host rejected geometry: {0}")]
    InvalidGeometry(String),

    #[error("No undo record is open")]
    NoOpenUndoRecord,
}

/// Mutation surface of the host application.
pub trait HostDocument: Send {
    fn add_object(&mut self, geometry: &GeometryPayload) -> Result<ObjectHandle, HostError>;

    fn remove_object(&mut self, object: ObjectHandle) -> Result<(), HostError>;

    fn update_object(
        &mut self,
        object: ObjectHandle,
        attributes: &HashMap<String, String>,
    ) -> Result<(), HostError>;

    fn transform_object(
        &mut self,
        object: ObjectHandle,
        transform: &CTransform,
    ) -> Result<(), HostError>;

    fn set_active_camera(&mut self, camera: &Camera) -> Result<(), HostError>;

    fn add_layer(&mut self, layer: &CLayer) -> Result<(), HostError>;

    fn update_layer(
        &mut self,
        full_path: &str,
        updates: &HashMap<String, String>,
    ) -> Result<(), HostError>;

    fn remove_layer(&mut self, full_path: &str) -> Result<(), HostError>;

    fn begin_undo_record(&mut self, name: &str) -> Result<(), HostError>;

    fn end_undo_record(&mut self) -> Result<(), HostError>;

    /// Forget every undo record. Called after a promotion so a user cannot
    /// undo someone else's committed work.
    fn clear_undo(&mut self);
}

// ───────────────────────────────────────────────────────────────────
// In-memory host
// ───────────────────────────────────────────────────────────────────

/// Geometry stored by [`MemoryHost`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryObject {
    pub geometry: GeometryPayload,
    pub transform: CTransform,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: HashMap<ObjectHandle, MemoryObject>,
    layers: HashMap<String, CLayer>,
    active_camera: Option<Camera>,
    open_record: Option<String>,
    undo_records: Vec<String>,
    undo_clears: usize,
}

/// In-memory host. Clones share the same document, so a test can hand one
/// clone to the engine and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<MemoryObject> {
        self.state().objects.get(&handle).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    /// Every object whose geometry string equals `geometry`.
    pub fn find_objects(&self, geometry: &str) -> Vec<ObjectHandle> {
        self.state()
            .objects
            .iter()
            .filter(|(_, object)| object.geometry.geometry == geometry)
            .map(|(handle, _)| *handle)
            .collect()
    }

    pub fn layer(&self, full_path: &str) -> Option<CLayer> {
        self.state().layers.get(full_path).cloned()
    }

    pub fn layer_count(&self) -> usize {
        self.state().layers.len()
    }

    pub fn active_camera(&self) -> Option<Camera> {
        self.state().active_camera
    }

    /// Names of the undo records still on the stack.
    pub fn undo_records(&self) -> Vec<String> {
        self.state().undo_records.clone()
    }

    pub fn undo_clears(&self) -> usize {
        self.state().undo_clears
    }
}

impl HostDocument for MemoryHost {
    fn add_object(&mut self, geometry: &GeometryPayload) -> Result<ObjectHandle, HostError> {
        if geometry.geometry.is_empty() {
            return Err(HostError::InvalidGeometry("empty geometry".into()));
        }
        let handle = ObjectHandle::new();
        self.state().objects.insert(
            handle,
            MemoryObject {
                geometry: geometry.clone(),
                transform: geometry.transform.unwrap_or_default(),
            },
        );
        Ok(handle)
    }

    fn remove_object(&mut self, object: ObjectHandle) -> Result<(), HostError> {
        self.state()
            .objects
            .remove(&object)
            .map(|_| ())
            .ok_or(HostError::UnknownObject(object))
    }

    fn update_object(
        &mut self,
        object: ObjectHandle,
        attributes: &HashMap<String, String>,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        let stored = state
            .objects
            .get_mut(&object)
            .ok_or(HostError::UnknownObject(object))?;
        stored
            .geometry
            .attributes
            .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn transform_object(
        &mut self,
        object: ObjectHandle,
        transform: &CTransform,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        let stored = state
            .objects
            .get_mut(&object)
            .ok_or(HostError::UnknownObject(object))?;
        stored.transform = transform.then_after(&stored.transform);
        Ok(())
    }

    fn set_active_camera(&mut self, camera: &Camera) -> Result<(), HostError> {
        self.state().active_camera = Some(*camera);
        Ok(())
    }

    fn add_layer(&mut self, layer: &CLayer) -> Result<(), HostError> {
        let mut state = self.state();
        if state.layers.contains_key(&layer.full_path) {
            return Err(HostError::DuplicateLayer(layer.full_path.clone()));
        }
        state.layers.insert(layer.full_path.clone(), layer.clone());
        Ok(())
    }

    fn update_layer(
        &mut self,
        full_path: &str,
        updates: &HashMap<String, String>,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        let mut layer = state
            .layers
            .get(full_path)
            .cloned()
            .ok_or_else(|| HostError::UnknownLayer(full_path.to_string()))?;
        layer
            .apply_updates(updates)
            .map_err(|e| HostError::InvalidLayerUpdate(e.to_string()))?;
        state.layers.remove(full_path);
        state.layers.insert(layer.full_path.clone(), layer);
        Ok(())
    }

    fn remove_layer(&mut self, full_path: &str) -> Result<(), HostError> {
        self.state()
            .layers
            .remove(full_path)
            .map(|_| ())
            .ok_or_else(|| HostError::UnknownLayer(full_path.to_string()))
    }

    fn begin_undo_record(&mut self, name: &str) -> Result<(), HostError> {
        self.state().open_record = Some(name.to_string());
        Ok(())
    }

    fn end_undo_record(&mut self) -> Result<(), HostError> {
        let mut state = self.state();
        let name = state.open_record.take().ok_or(HostError::NoOpenUndoRecord)?;
        state.undo_records.push(name);
        Ok(())
    }

    fn clear_undo(&mut self) {
        let mut state = self.state();
        state.undo_records.clear();
        state.undo_clears += 1;
    }
}
