//! # crash-core: Change model for Crash collaborative editing
//!
//! Everything a client puts on the wire lives here: the [`Change`] record,
//! its [`ChangeAction`] flags, the generic [`PayloadPacket`] envelope and the
//! typed payload codecs owned by each change type.
//!
//! ## Data flow
//!
//! ```text
//!  host event ──▸ typed payload ──▸ Payload (String) ──▸ Change ──▸ JSON
//!                 (Camera, CLayer,                        │
//!                  GeometryPayload,                       ▼
//!                  Request, CTransform)               transport
//! ```
//!
//! This crate is pure: no I/O, no clocks except `Utc::now()` when a record
//! is created, and no knowledge of which definitions exist.

pub mod action;
pub mod camera;
pub mod change;
pub mod error;
pub mod geometry;
pub mod layer;
pub mod packet;
pub mod request;
pub mod transform;
pub mod user;

pub use action::ChangeAction;
pub use camera::{from_ticks, to_ticks, CPoint, Camera, TICKS_PER_SECOND};
pub use change::Change;
pub use error::CoreError;
pub use geometry::GeometryPayload;
pub use layer::{CLayer, LAYER_SEPARATOR};
pub use packet::{PacketError, PayloadPacket};
pub use request::{Request, REQUESTED_NAME};
pub use transform::CTransform;
pub use user::{same_user, user_key, CameraFollow, User};
