//! # crash-collab: Change synchronization engine for Crash
//!
//! Turns local host events into [`Change`](crash_core::Change) records,
//! sends them to the other participants, and applies what they send back
//! on the host's idle loop.
//!
//! ## Architecture
//!
//! ```text
//!  host event ──▸ ChangeCreator ──▸ Vec<Change> ──▸ ChangeTransport ──┐
//!                  (Registry)                                        │
//!                                                                    ▼
//!                                          LocalTransport / RelayClient ◂──▸ RelayServer
//!                                                                    │         (ChangeLedger)
//!  host idle ──▸ CrashDoc::drain_idle ◂── IdleQueue ◂── ChangeReceiver ◂┘
//!                   │
//!                   ▼
//!               Dispatcher ──▸ HostDocument (undo-grouped)
//! ```
//!
//! ## Modules
//!
//! - [`registry`]: change definitions, create/receive action traits
//! - [`pipeline`]: create and receive pipelines
//! - [`idle`]: FIFO idle queue, at-most-once actions
//! - [`doc`]: per-document session state
//! - [`definitions`]: camera, geometry, layer, done, request
//! - [`host`] / [`dispatch`]: host document seam and undo grouping
//! - [`transport`], [`client`], [`server`], [`broadcast`]: moving changes
//! - [`session`]: one document wired to a transport, plus the async driver

pub mod broadcast;
pub mod cameras;
pub mod client;
pub mod config;
pub mod definitions;
pub mod dispatch;
pub mod doc;
pub mod error;
pub mod event;
pub mod host;
pub mod idle;
pub mod ledger;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod session_log;
pub mod tables;
pub mod transport;
pub mod users;

pub use broadcast::{BroadcastGroup, BroadcastStats, RoomManager};
pub use cameras::{CameraThrottle, Cameras};
pub use client::{ConnectionState, OfflineQueue, RelayClient};
pub use config::{CameraThrottleConfig, SessionConfig};
pub use dispatch::Dispatcher;
pub use doc::CrashDoc;
pub use error::CollabError;
pub use event::HostEvent;
pub use host::{HostDocument, HostError, MemoryHost, ObjectHandle};
pub use idle::{DrainReport, IdleAction, IdleQueue, IdleSender};
pub use ledger::ChangeLedger;
pub use pipeline::{ChangeCreator, ChangeReceiver, Conversion};
pub use protocol::{PeerInfo, RelayMessage};
pub use registry::{
    ChangeDefinition, CreateAction, Definition, ReceiveAction, Registry, RegistryBuilder,
};
pub use server::{RelayServer, ServerConfig, ServerStats};
pub use session::{HostSignal, Session, SessionDriver};
pub use session_log::{LogEntry, SessionLog};
pub use tables::{RealisedChangeTable, RealisedEntry, TemporaryChangeTable, TemporaryEntry};
pub use transport::{ChangeTransport, LocalTransport, TransportEvent};
pub use users::Users;
