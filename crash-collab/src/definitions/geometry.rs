//! `Crash.GeometryChange`: shared objects.
//!
//! ```text
//! local add ──▸ ADD|TEMPORARY ──▸ remote TemporaryChangeTable (preview)
//!                                     │ Done / Release
//!                                     ▼
//!                                 ADD ──▸ host object + RealisedChangeTable
//! ```
//!
//! Follow-up changes (remove, transform, update, lock) carry the Id of the
//! change that announced the object. They apply to the realised host object
//! when there is one and to the stored preview otherwise.

use crash_core::{CTransform, Change, ChangeAction, GeometryPayload, PayloadPacket};
use uuid::Uuid;

use crate::definitions::payload;
use crate::doc::CrashDoc;
use crate::error::CollabError;
use crate::event::HostEvent;
use crate::host::ObjectHandle;
use crate::idle::IdleCallback;
use crate::registry::{CreateAction, Definition, ReceiveAction};

pub const GEOMETRY_CHANGE: &str = "Crash.GeometryChange";

pub fn definition() -> Definition {
    Definition::new(GEOMETRY_CHANGE)
        .create(CreateAdd)
        .create(CreateRemove)
        .create(CreateTransform)
        .create(CreateUpdate)
        .create(CreateLock)
        .create(CreateUnlock)
        .receive(ReceiveAdd)
        .receive(ReceiveTemporary)
        .receive(ReceiveRemove)
        .receive(ReceiveTransform)
        .receive(ReceiveUpdate)
        .receive(ReceiveLock)
}

/// Follow-up change about a realised object, or `None` if the object was
/// never announced.
fn follow_up(
    doc: &CrashDoc,
    object: &ObjectHandle,
    action: ChangeAction,
    payload: Option<String>,
) -> Option<Change> {
    let id = doc.realised.id_of(object)?;
    Some(Change::with_id(
        id,
        doc.current_user(),
        action,
        GEOMETRY_CHANGE,
        payload,
    ))
}

// ───────────────────────────────────────────────────────────────────
// Create
// ───────────────────────────────────────────────────────────────────

pub struct CreateAdd;

impl CreateAction for CreateAdd {
    fn action(&self) -> ChangeAction {
        ChangeAction::ADD | ChangeAction::TEMPORARY
    }

    fn can_convert(&self, event: &HostEvent, doc: &CrashDoc) -> bool {
        matches!(event, HostEvent::ObjectAdded { object, .. } if doc.realised.id_of(object).is_none())
    }

    fn try_convert(&self, event: &HostEvent, doc: &CrashDoc) -> Option<Vec<Change>> {
        let HostEvent::ObjectAdded { geometry, .. } = event else {
            return None;
        };
        let encoded = geometry.encode().ok()?;
        Some(vec![Change::new(
            doc.current_user(),
            ChangeAction::ADD | ChangeAction::TEMPORARY,
            GEOMETRY_CHANGE,
            Some(encoded),
        )])
    }

    fn record_local(&self, event: &HostEvent, changes: &[Change]) -> Option<IdleCallback> {
        let (HostEvent::ObjectAdded { object, .. }, [_]) = (event, changes) else {
            return None;
        };
        let object = *object;
        Some(Box::new(move |doc: &mut CrashDoc, change: &Change| {
            doc.realised.insert(change.clone(), object);
            Ok(())
        }))
    }
}

pub struct CreateRemove;

impl CreateAction for CreateRemove {
    fn action(&self) -> ChangeAction {
        ChangeAction::REMOVE
    }

    fn can_convert(&self, event: &HostEvent, _doc: &CrashDoc) -> bool {
        matches!(event, HostEvent::ObjectDeleted { .. })
    }

    fn try_convert(&self, event: &HostEvent, doc: &CrashDoc) -> Option<Vec<Change>> {
        let HostEvent::ObjectDeleted { object } = event else {
            return None;
        };
        Some(vec![follow_up(doc, object, ChangeAction::REMOVE, None)?])
    }

    fn record_local(&self, _event: &HostEvent, changes: &[Change]) -> Option<IdleCallback> {
        let ids: Vec<Uuid> = changes.iter().map(|c| c.id).collect();
        Some(Box::new(move |doc: &mut CrashDoc, _: &Change| {
            for id in &ids {
                doc.realised.remove(id);
            }
            Ok(())
        }))
    }
}

pub struct CreateTransform;

impl CreateAction for CreateTransform {
    fn action(&self) -> ChangeAction {
        ChangeAction::TRANSFORM
    }

    fn can_convert(&self, event: &HostEvent, _doc: &CrashDoc) -> bool {
        matches!(event, HostEvent::ObjectsTransformed { transform, .. } if transform.is_valid())
    }

    fn try_convert(&self, event: &HostEvent, doc: &CrashDoc) -> Option<Vec<Change>> {
        let HostEvent::ObjectsTransformed { objects, transform } = event else {
            return None;
        };
        let encoded = transform.encode().ok()?;
        let changes: Vec<Change> = objects
            .iter()
            .filter_map(|object| {
                follow_up(doc, object, ChangeAction::TRANSFORM, Some(encoded.clone()))
            })
            .collect();
        (!changes.is_empty()).then_some(changes)
    }
}

pub struct CreateUpdate;

impl CreateAction for CreateUpdate {
    fn action(&self) -> ChangeAction {
        ChangeAction::UPDATE
    }

    fn can_convert(&self, event: &HostEvent, _doc: &CrashDoc) -> bool {
        matches!(event, HostEvent::ObjectModified { attributes, .. } if !attributes.is_empty())
    }

    fn try_convert(&self, event: &HostEvent, doc: &CrashDoc) -> Option<Vec<Change>> {
        let HostEvent::ObjectModified { object, attributes } = event else {
            return None;
        };
        let packet = PayloadPacket {
            data: String::new(),
            updates: attributes.clone(),
        };
        let encoded = packet.encode().ok()?;
        Some(vec![follow_up(doc, object, ChangeAction::UPDATE, Some(encoded))?])
    }
}

pub struct CreateLock;

impl CreateAction for CreateLock {
    fn action(&self) -> ChangeAction {
        ChangeAction::LOCKED
    }

    fn can_convert(&self, event: &HostEvent, _doc: &CrashDoc) -> bool {
        matches!(event, HostEvent::ObjectSelected { .. })
    }

    fn try_convert(&self, event: &HostEvent, doc: &CrashDoc) -> Option<Vec<Change>> {
        let HostEvent::ObjectSelected { object } = event else {
            return None;
        };
        Some(vec![follow_up(doc, object, ChangeAction::LOCKED, None)?])
    }
}

pub struct CreateUnlock;

impl CreateAction for CreateUnlock {
    fn action(&self) -> ChangeAction {
        ChangeAction::UNLOCKED
    }

    fn can_convert(&self, event: &HostEvent, _doc: &CrashDoc) -> bool {
        matches!(event, HostEvent::ObjectDeselected { .. })
    }

    fn try_convert(&self, event: &HostEvent, doc: &CrashDoc) -> Option<Vec<Change>> {
        let HostEvent::ObjectDeselected { object } = event else {
            return None;
        };
        Some(vec![follow_up(doc, object, ChangeAction::UNLOCKED, None)?])
    }
}

// ───────────────────────────────────────────────────────────────────
// Receive
// ───────────────────────────────────────────────────────────────────

/// Committed add: create the host object.
pub struct ReceiveAdd;

impl ReceiveAction for ReceiveAdd {
    fn name(&self) -> &str {
        "geometry.add"
    }

    fn can_receive(&self, change: &Change) -> bool {
        change.has(ChangeAction::ADD) && !change.is_temporary()
    }

    fn apply(&self, doc: &mut CrashDoc, change: &Change) -> Result<(), CollabError> {
        if doc.realised.contains(&change.id) {
            doc.log()
                .trace(format!("Geometry {} already realised", change.id));
            return Ok(());
        }
        let geometry = GeometryPayload::decode(payload(change)?)?;
        let object = doc.dispatcher.add_object(&geometry)?;
        doc.realised.insert(change.clone(), object);
        Ok(())
    }
}

/// Provisional add: keep it as a preview until released.
pub struct ReceiveTemporary;

impl ReceiveAction for ReceiveTemporary {
    fn name(&self) -> &str {
        "geometry.temporary"
    }

    fn can_receive(&self, change: &Change) -> bool {
        change.has(ChangeAction::ADD | ChangeAction::TEMPORARY)
    }

    fn apply(&self, doc: &mut CrashDoc, change: &Change) -> Result<(), CollabError> {
        doc.temporary.insert(change.clone());
        Ok(())
    }
}

pub struct ReceiveRemove;

impl ReceiveAction for ReceiveRemove {
    fn name(&self) -> &str {
        "geometry.remove"
    }

    fn can_receive(&self, change: &Change) -> bool {
        change.has(ChangeAction::REMOVE)
    }

    fn apply(&self, doc: &mut CrashDoc, change: &Change) -> Result<(), CollabError> {
        if doc.temporary.remove(&change.id).is_some() {
            doc.log()
                .debug(format!("Preview {} cancelled by {}", change.id, change.owner));
            return Ok(());
        }
        match doc.realised.remove(&change.id) {
            Some(entry) => Ok(doc.dispatcher.remove_object(entry.object)?),
            None => {
                doc.log()
                    .warn(format!("Remove for unknown geometry {}", change.id));
                Ok(())
            }
        }
    }
}

/// Where a follow-up change should land.
enum Target {
    Host(ObjectHandle),
    Preview(GeometryPayload),
    Missing,
}

fn target(doc: &CrashDoc, id: &Uuid) -> Result<Target, CollabError> {
    if let Some(object) = doc.realised.object_of(id) {
        return Ok(Target::Host(object));
    }
    match doc.temporary.get(id) {
        Some(entry) => Ok(Target::Preview(GeometryPayload::decode(
            payload(&entry.change)?,
        )?)),
        None => Ok(Target::Missing),
    }
}

pub struct ReceiveTransform;

impl ReceiveAction for ReceiveTransform {
    fn name(&self) -> &str {
        "geometry.transform"
    }

    fn can_receive(&self, change: &Change) -> bool {
        change.has(ChangeAction::TRANSFORM)
    }

    fn apply(&self, doc: &mut CrashDoc, change: &Change) -> Result<(), CollabError> {
        let transform = CTransform::decode(payload(change)?)?;
        match target(doc, &change.id)? {
            Target::Host(object) => doc.dispatcher.transform_object(object, &transform)?,
            Target::Preview(mut geometry) => {
                geometry.push_transform(&transform);
                doc.temporary.update_payload(&change.id, geometry.encode()?);
            }
            Target::Missing => doc
                .log()
                .warn(format!("Transform for unknown geometry {}", change.id)),
        }
        Ok(())
    }
}

pub struct ReceiveUpdate;

impl ReceiveAction for ReceiveUpdate {
    fn name(&self) -> &str {
        "geometry.update"
    }

    fn can_receive(&self, change: &Change) -> bool {
        change.has(ChangeAction::UPDATE)
    }

    fn apply(&self, doc: &mut CrashDoc, change: &Change) -> Result<(), CollabError> {
        let packet = PayloadPacket::parse(payload(change)?);
        match target(doc, &change.id)? {
            Target::Host(object) => doc.dispatcher.update_object(object, &packet.updates)?,
            Target::Preview(mut geometry) => {
                geometry.attributes.extend(packet.updates);
                doc.temporary.update_payload(&change.id, geometry.encode()?);
            }
            Target::Missing => doc
                .log()
                .warn(format!("Update for unknown geometry {}", change.id)),
        }
        Ok(())
    }
}

/// Records who holds a selection lock on a realised object.
pub struct ReceiveLock;

impl ReceiveAction for ReceiveLock {
    fn name(&self) -> &str {
        "geometry.lock"
    }

    fn can_receive(&self, change: &Change) -> bool {
        change.action.intersects(ChangeAction::LOCKED | ChangeAction::UNLOCKED)
    }

    fn apply(&self, doc: &mut CrashDoc, change: &Change) -> Result<(), CollabError> {
        let owner = change
            .has(ChangeAction::LOCKED)
            .then(|| change.owner.clone());
        if !doc.realised.set_lock(&change.id, owner) {
            doc.log()
                .debug(format!("Lock change for unrealised geometry {}", change.id));
        }
        Ok(())
    }
}
