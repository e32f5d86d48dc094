//! Per-document fan-out.
//!
//! One tokio broadcast channel per document. Messages are encoded once and
//! shared as `Arc<Routed>`, tagged with the sending peer so receivers can
//! skip their own traffic.
//!
//! ```text
//!  peer A ──▸ BroadcastGroup("plan.3dm") ──▸ peer A (skipped: own origin)
//!                                       ├──▸ peer B
//!                                       └──▸ peer C
//! ```
//!
//! Lagging receivers lose the oldest messages (tokio broadcast semantics);
//! the count shows up in `messages_dropped`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crash_core::same_user;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::error::CollabError;
use crate::protocol::{PeerInfo, RelayMessage};

/// A pre-encoded relay message and the peer it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub origin: Uuid,
    pub payload: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_peers: usize,
}

struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

/// All peers editing one document.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Arc<Routed>>,
    peers: RwLock<HashMap<Uuid, PeerInfo>>,
    capacity: usize,
    stats: AtomicBroadcastStats,
}

impl BroadcastGroup {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            peers: RwLock::new(HashMap::new()),
            capacity,
            stats: AtomicBroadcastStats {
                messages_sent: AtomicU64::new(0),
                messages_dropped: AtomicU64::new(0),
            },
        }
    }

    pub async fn add_peer(&self, info: PeerInfo) -> broadcast::Receiver<Arc<Routed>> {
        self.peers.write().await.insert(info.peer_id, info);
        self.sender.subscribe()
    }

    pub async fn remove_peer(&self, peer_id: &Uuid) -> Option<PeerInfo> {
        self.peers.write().await.remove(peer_id)
    }

    /// Encode `message` once and fan it out. Returns the receiver count.
    pub fn broadcast(&self, origin: Uuid, message: &RelayMessage) -> Result<usize, CollabError> {
        let payload = message.encode()?;
        Ok(self.broadcast_raw(Arc::new(Routed { origin, payload })))
    }

    pub fn broadcast_raw(&self, routed: Arc<Routed>) -> usize {
        let count = self.sender.send(routed).unwrap_or(0);
        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    pub fn record_dropped(&self, n: u64) {
        self.stats.messages_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn peers(&self) -> Vec<PeerInfo> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn has_peer(&self, peer_id: &Uuid) -> bool {
        self.peers.read().await.contains_key(peer_id)
    }

    /// Whether any connection in the room belongs to `user`. One user may
    /// hold several connections to the same document.
    pub async fn has_user(&self, user: &str) -> bool {
        self.peers
            .read()
            .await
            .values()
            .any(|p| same_user(&p.user, user))
    }

    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            active_peers: self.peers.read().await.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Routed>> {
        self.sender.subscribe()
    }
}

/// Document name → broadcast group.
pub struct RoomManager {
    rooms: RwLock<HashMap<String, Arc<BroadcastGroup>>>,
    default_capacity: usize,
}

impl RoomManager {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            default_capacity,
        }
    }

    pub async fn get_or_create(&self, document: &str) -> Arc<BroadcastGroup> {
        if let Some(room) = self.rooms.read().await.get(document) {
            return room.clone();
        }

        let mut rooms = self.rooms.write().await;
        rooms
            .entry(document.to_string())
            .or_insert_with(|| Arc::new(BroadcastGroup::new(self.default_capacity)))
            .clone()
    }

    pub async fn get(&self, document: &str) -> Option<Arc<BroadcastGroup>> {
        self.rooms.read().await.get(document).cloned()
    }

    pub async fn remove_if_empty(&self, document: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(document) {
            if room.peer_count().await == 0 {
                rooms.remove(document);
                return true;
            }
        }
        false
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_documents(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crash_core::{Change, ChangeAction};

    fn batch(owner: &str) -> RelayMessage {
        RelayMessage::Changes(vec![Change::new(
            owner,
            ChangeAction::ADD | ChangeAction::TEMPORARY,
            "Crash.GeometryChange",
            None,
        )])
    }

    #[tokio::test]
    async fn test_users_tracked_across_connections() {
        let room = BroadcastGroup::new(8);
        let desk = PeerInfo::new("Anna");
        let laptop = PeerInfo::new("anna");
        let _desk_rx = room.add_peer(desk.clone()).await;
        let _laptop_rx = room.add_peer(laptop.clone()).await;
        assert!(room.has_user("ANNA").await);

        room.remove_peer(&desk.peer_id).await;
        assert!(room.has_user("Anna").await);
        assert!(room.has_peer(&laptop.peer_id).await);

        room.remove_peer(&laptop.peer_id).await;
        assert!(!room.has_user("Anna").await);
    }

    #[tokio::test]
    async fn test_change_batch_reaches_every_subscriber_tagged() {
        let room = BroadcastGroup::new(8);
        let anna = PeerInfo::new("Anna");
        let mut anna_rx = room.add_peer(anna.clone()).await;
        let mut jack_rx = room.add_peer(PeerInfo::new("Jack")).await;

        let sent = batch("Anna");
        assert_eq!(room.broadcast(anna.peer_id, &sent).unwrap(), 2);

        // The sender gets its own batch back; skipping it is up to the reader.
        let echoed = anna_rx.recv().await.unwrap();
        let delivered = jack_rx.recv().await.unwrap();
        assert!(Arc::ptr_eq(&echoed, &delivered));
        assert_eq!(delivered.origin, anna.peer_id);
        assert_eq!(RelayMessage::decode(&delivered.payload).unwrap(), sent);
    }

    #[tokio::test]
    async fn test_lagging_reader_counts_drops() {
        let room = BroadcastGroup::new(2);
        let anna = PeerInfo::new("Anna");
        let mut slow = room.add_peer(PeerInfo::new("Jack")).await;

        for _ in 0..4 {
            room.broadcast(anna.peer_id, &batch("Anna")).unwrap();
        }
        match slow.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => room.record_dropped(n),
            other => panic!("expected lag, got {other:?}"),
        }

        let stats = room.stats().await;
        assert_eq!(stats.messages_sent, 4);
        assert_eq!(stats.messages_dropped, 2);
        assert_eq!(stats.active_peers, 1);
    }

    #[tokio::test]
    async fn test_one_room_per_document() {
        let rooms = RoomManager::new(8);
        let plan = rooms.get_or_create("plan.3dm").await;
        let again = rooms.get_or_create("plan.3dm").await;
        let site = rooms.get_or_create("site.3dm").await;

        assert!(Arc::ptr_eq(&plan, &again));
        assert!(!Arc::ptr_eq(&plan, &site));
        assert!(rooms.get("elevation.3dm").await.is_none());

        let mut documents = rooms.active_documents().await;
        documents.sort();
        assert_eq!(documents, vec!["plan.3dm", "site.3dm"]);
    }

    #[tokio::test]
    async fn test_room_dropped_once_last_peer_leaves() {
        let rooms = RoomManager::new(8);
        let plan = rooms.get_or_create("plan.3dm").await;
        let jack = PeerInfo::new("Jack");
        let _rx = plan.add_peer(jack.clone()).await;

        assert!(!rooms.remove_if_empty("plan.3dm").await);
        plan.remove_peer(&jack.peer_id).await;
        assert!(rooms.remove_if_empty("plan.3dm").await);
        assert_eq!(rooms.room_count().await, 0);
    }
}
