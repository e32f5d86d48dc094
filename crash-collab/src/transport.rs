//! Transport seam.
//!
//! A transport moves change batches between peers. Outgoing batches go
//! through [`ChangeTransport::send`]; everything incoming arrives as
//! [`TransportEvent`]s on an `mpsc` receiver handed out at connect time.
//!
//! [`LocalTransport`] rides on an in-process [`BroadcastGroup`]. It is what
//! the tests and single-process setups use; [`RelayClient`] is the
//! WebSocket equivalent.
//!
//! [`RelayClient`]: crate::client::RelayClient

use std::sync::Arc;

use crash_core::Change;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::broadcast::{BroadcastGroup, Routed};
use crate::error::CollabError;
use crate::protocol::{PeerInfo, RelayMessage};

/// Event channel depth between a transport and its session.
pub const EVENT_CHANNEL_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    /// Changes made by another peer.
    Changes(Vec<Change>),
    /// Current document state, sent once after joining.
    Initialize(Vec<Change>),
    UserLeft(String),
}

impl TransportEvent {
    /// Map an incoming relay message. Control messages map to `None`.
    pub fn from_message(message: RelayMessage) -> Option<Self> {
        match message {
            RelayMessage::Changes(changes) => Some(TransportEvent::Changes(changes)),
            RelayMessage::Initialize(changes) => Some(TransportEvent::Initialize(changes)),
            RelayMessage::UserLeft { user } => Some(TransportEvent::UserLeft(user)),
            RelayMessage::Join { .. } | RelayMessage::Ping | RelayMessage::Pong => None,
        }
    }
}

pub trait ChangeTransport: Send {
    fn send(&self, changes: Vec<Change>) -> Result<(), CollabError>;
}

/// Lets the host keep a handle (to disconnect, inspect state) while the
/// session owns the transport.
impl<T: ChangeTransport + Sync + ?Sized> ChangeTransport for Arc<T> {
    fn send(&self, changes: Vec<Change>) -> Result<(), CollabError> {
        (**self).send(changes)
    }
}

/// Transport over an in-process broadcast group.
pub struct LocalTransport {
    peer: PeerInfo,
    room: Arc<BroadcastGroup>,
    forwarder: JoinHandle<()>,
}

impl LocalTransport {
    pub async fn connect(
        room: Arc<BroadcastGroup>,
        user: impl Into<String>,
    ) -> (Self, mpsc::Receiver<TransportEvent>) {
        let peer = PeerInfo::new(user);
        let rx = room.add_peer(peer.clone()).await;
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

        let forwarder = tokio::spawn(forward(peer.peer_id, rx, room.clone(), event_tx));
        log::debug!("{} joined local room", peer.user);

        (
            Self {
                peer,
                room,
                forwarder,
            },
            event_rx,
        )
    }

    pub fn peer(&self) -> &PeerInfo {
        &self.peer
    }

    /// Leave the room and tell the remaining peers.
    pub async fn leave(self) {
        self.room.remove_peer(&self.peer.peer_id).await;
        let left = RelayMessage::UserLeft {
            user: self.peer.user.clone(),
        };
        if let Err(e) = self.room.broadcast(self.peer.peer_id, &left) {
            log::warn!("Could not announce departure of {}: {e}", self.peer.user);
        }
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

impl ChangeTransport for LocalTransport {
    fn send(&self, changes: Vec<Change>) -> Result<(), CollabError> {
        if changes.is_empty() {
            return Ok(());
        }
        self.room
            .broadcast(self.peer.peer_id, &RelayMessage::Changes(changes))?;
        Ok(())
    }
}

async fn forward(
    own_id: Uuid,
    mut rx: broadcast::Receiver<Arc<Routed>>,
    room: Arc<BroadcastGroup>,
    events: mpsc::Sender<TransportEvent>,
) {
    if events.send(TransportEvent::Connected).await.is_err() {
        return;
    }
    loop {
        match rx.recv().await {
            Ok(routed) => {
                if routed.origin == own_id {
                    continue;
                }
                let message = match RelayMessage::decode(&routed.payload) {
                    Ok(message) => message,
                    Err(e) => {
                        log::warn!("Dropping undecodable room message: {e}");
                        continue;
                    }
                };
                if let Some(event) = TransportEvent::from_message(message) {
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                log::warn!("Peer {own_id} lagged by {n} messages");
                room.record_dropped(n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    let _ = events.send(TransportEvent::Disconnected).await;
}
