//! `Crash.CameraChange`: viewport sharing.
//!
//! Outgoing cameras pass through a [`CameraThrottle`] owned by the single
//! create-action. Incoming cameras are pushed onto the owner's stack and,
//! if the local user follows that owner, become the active viewport.

use std::sync::Mutex;

use crash_core::{Camera, Change, ChangeAction};

use crate::cameras::CameraThrottle;
use crate::config::CameraThrottleConfig;
use crate::definitions::payload;
use crate::doc::CrashDoc;
use crate::error::CollabError;
use crate::event::HostEvent;
use crate::registry::{CreateAction, Definition, ReceiveAction};

pub const CAMERA_CHANGE: &str = "Crash.CameraChange";

pub fn definition(config: &CameraThrottleConfig) -> Definition {
    Definition::new(CAMERA_CHANGE)
        .create(CreateCamera {
            throttle: Mutex::new(CameraThrottle::new(config)),
        })
        .receive(ReceiveCamera)
}

pub struct CreateCamera {
    throttle: Mutex<CameraThrottle>,
}

impl CreateAction for CreateCamera {
    fn action(&self) -> ChangeAction {
        ChangeAction::ADD
    }

    fn can_convert(&self, event: &HostEvent, _doc: &CrashDoc) -> bool {
        let HostEvent::CameraChanged { camera } = event else {
            return false;
        };
        camera.is_valid()
            && self
                .throttle
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .accept(camera)
    }

    fn try_convert(&self, event: &HostEvent, doc: &CrashDoc) -> Option<Vec<Change>> {
        let HostEvent::CameraChanged { camera } = event else {
            return None;
        };
        let encoded = camera.encode().ok()?;
        Some(vec![Change::new(
            doc.current_user(),
            ChangeAction::ADD,
            CAMERA_CHANGE,
            Some(encoded),
        )])
    }
}

pub struct ReceiveCamera;

impl ReceiveAction for ReceiveCamera {
    fn name(&self) -> &str {
        "camera.add"
    }

    fn can_receive(&self, change: &Change) -> bool {
        change.has(ChangeAction::ADD)
    }

    fn apply(&self, doc: &mut CrashDoc, change: &Change) -> Result<(), CollabError> {
        let camera = Camera::decode(payload(change)?)?;
        doc.cameras.push(&change.owner, camera);

        if doc.users.is_followed(&change.owner) {
            doc.dispatcher.set_active_camera(&camera)?;
            doc.log()
                .trace(format!("Following {}'s camera", change.owner));
        }
        Ok(())
    }
}
