//! Dispatcher: the only path from received changes to the host.
//!
//! Every mutation is wrapped in a named undo record so one remote change
//! undoes as one step:
//!
//! ```text
//! receive-action ──▸ Dispatcher::add_object ──▸ begin_undo_record("Crash add")
//!                                          ├──▸ HostDocument::add_object
//!                                          └──▸ end_undo_record
//! ```

use std::collections::HashMap;

use crash_core::{CLayer, CTransform, Camera, GeometryPayload};

use crate::host::{HostDocument, HostError, ObjectHandle};

pub struct Dispatcher {
    host: Box<dyn HostDocument>,
    applied: u64,
}

impl Dispatcher {
    pub fn new(host: Box<dyn HostDocument>) -> Self {
        Self { host, applied: 0 }
    }

    /// Run `apply` inside an undo record named `name`.
    ///
    /// The record is closed even when `apply` fails; the first error wins.
    fn recorded<T>(
        &mut self,
        name: &str,
        apply: impl FnOnce(&mut dyn HostDocument) -> Result<T, HostError>,
    ) -> Result<T, HostError> {
        self.host.begin_undo_record(name)?;
        let result = apply(self.host.as_mut());
        let closed = self.host.end_undo_record();
        let value = result?;
        closed?;
        self.applied += 1;
        Ok(value)
    }

    pub fn add_object(&mut self, geometry: &GeometryPayload) -> Result<ObjectHandle, HostError> {
        self.recorded("Crash add", |host| host.add_object(geometry))
    }

    pub fn remove_object(&mut self, object: ObjectHandle) -> Result<(), HostError> {
        self.recorded("Crash remove", |host| host.remove_object(object))
    }

    pub fn update_object(
        &mut self,
        object: ObjectHandle,
        attributes: &HashMap<String, String>,
    ) -> Result<(), HostError> {
        self.recorded("Crash update", |host| host.update_object(object, attributes))
    }

    pub fn transform_object(
        &mut self,
        object: ObjectHandle,
        transform: &CTransform,
    ) -> Result<(), HostError> {
        self.recorded("Crash transform", |host| {
            host.transform_object(object, transform)
        })
    }

    /// Cameras are view state, not document state, so no undo record.
    pub fn set_active_camera(&mut self, camera: &Camera) -> Result<(), HostError> {
        self.host.set_active_camera(camera)?;
        self.applied += 1;
        Ok(())
    }

    pub fn add_layer(&mut self, layer: &CLayer) -> Result<(), HostError> {
        self.recorded("Crash layer add", |host| host.add_layer(layer))
    }

    pub fn update_layer(
        &mut self,
        full_path: &str,
        updates: &HashMap<String, String>,
    ) -> Result<(), HostError> {
        self.recorded("Crash layer update", |host| {
            host.update_layer(full_path, updates)
        })
    }

    pub fn remove_layer(&mut self, full_path: &str) -> Result<(), HostError> {
        self.recorded("Crash layer remove", |host| host.remove_layer(full_path))
    }

    pub fn clear_undo(&mut self) {
        self.host.clear_undo();
    }

    /// Number of host mutations that succeeded.
    pub fn applied(&self) -> u64 {
        self.applied
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("applied", &self.applied)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;

    #[test]
    fn test_each_mutation_is_one_undo_record() {
        let host = MemoryHost::new();
        let mut dispatcher = Dispatcher::new(Box::new(host.clone()));

        let handle = dispatcher
            .add_object(&GeometryPayload::new("line 0,0 1,1"))
            .unwrap();
        dispatcher
            .transform_object(handle, &CTransform::scale(2.0))
            .unwrap();

        assert_eq!(host.undo_records(), ["Crash add", "Crash transform"]);
        assert_eq!(dispatcher.applied(), 2);
    }

    #[test]
    fn test_failed_mutation_closes_record() {
        let host = MemoryHost::new();
        let mut dispatcher = Dispatcher::new(Box::new(host.clone()));

        let err = dispatcher.remove_object(ObjectHandle::new()).unwrap_err();
        assert!(matches!(err, HostError::UnknownObject(_)));
        assert_eq!(dispatcher.applied(), 0);

        // A later record still opens and closes cleanly.
        dispatcher.add_layer(&CLayer::new("Walls")).unwrap();
        assert_eq!(host.undo_records().last().map(String::as_str), Some("Crash layer add"));
    }

    #[test]
    fn test_clear_undo_reaches_host() {
        let host = MemoryHost::new();
        let mut dispatcher = Dispatcher::new(Box::new(host.clone()));
        dispatcher.add_layer(&CLayer::new("A")).unwrap();
        dispatcher.clear_undo();
        assert!(host.undo_records().is_empty());
        assert_eq!(host.undo_clears(), 1);
    }
}
