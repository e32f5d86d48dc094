//! Built-in change definitions.
//!
//! | Type                  | Creates from                         | Receives                       |
//! |-----------------------|--------------------------------------|--------------------------------|
//! | `Crash.CameraChange`  | viewport moves (throttled)           | camera stack, follow           |
//! | `Crash.GeometryChange`| add/delete/modify/transform/select   | host objects, temporary table  |
//! | `Crash.LayerChange`   | layer add/modify/delete              | host layers                    |
//! | `Crash.DoneChange`    | Done, ReleaseObjects                 | promotion of temporary entries |
//! | `Crash.RequestChange` | Request                              | temporary entry annotation     |
//!
//! [`observer::UserObserver`] sees every change and keeps the user list
//! current.

pub mod camera;
pub mod done;
pub mod geometry;
pub mod layer;
pub mod observer;
pub mod request;

use crash_core::Change;

use crate::error::CollabError;

/// Decode helper shared by receive-actions: the payload or a typed error.
pub(crate) fn payload(change: &Change) -> Result<&str, CollabError> {
    Ok(change.payload_str()?)
}
