//! WebSocket relay with one room per document.
//!
//! ```text
//! Client A ──┐
//!            ├── Room ("plan.3dm") ── BroadcastGroup ──▸ other peers
//! Client B ──┘        │
//!                     └── ChangeLedger ──▸ Initialize for late joiners
//! ```
//!
//! The first frame on a connection must be `Join`. After that the relay
//! forwards every `Changes` batch to the rest of the room and folds it into
//! the room's ledger. When the last connection of a user goes away, the
//! relay releases that user's previews on their behalf and announces
//! `UserLeft`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crash_core::Change;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use crate::broadcast::{BroadcastGroup, RoomManager, Routed};
use crate::definitions::done::owner_release;
use crate::error::CollabError;
use crate::ledger::ChangeLedger;
use crate::protocol::{PeerInfo, RelayMessage};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_peers_per_room: usize,
    /// Broadcast channel capacity per room.
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            max_peers_per_room: 100,
            broadcast_capacity: 256,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, CollabError> {
        let config: ServerConfig =
            toml::from_str(raw).map_err(|e| CollabError::Config(e.to_string()))?;
        if config.max_peers_per_room == 0 || config.broadcast_capacity == 0 {
            return Err(CollabError::Config(
                "max_peers_per_room and broadcast_capacity must be at least 1".into(),
            ));
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub active_rooms: usize,
    pub rejected_peers: u64,
}

type Ledgers = Arc<RwLock<HashMap<String, Arc<Mutex<ChangeLedger>>>>>;

#[derive(Clone)]
pub struct RelayServer {
    config: ServerConfig,
    rooms: Arc<RoomManager>,
    ledgers: Ledgers,
    stats: Arc<RwLock<ServerStats>>,
}

/// What a connection knows after a successful `Join`.
struct Joined {
    peer: PeerInfo,
    document: String,
    room: Arc<BroadcastGroup>,
    ledger: Arc<Mutex<ChangeLedger>>,
    rx: broadcast::Receiver<Arc<Routed>>,
}

impl Joined {
    /// A peer that fell behind the room lost `missed` batches. The ledger
    /// already holds their effect, so the peer gets the current state again.
    async fn resync(&self, missed: u64) -> RelayMessage {
        self.room.record_dropped(missed);
        RelayMessage::Initialize(self.ledger.lock().await.snapshot())
    }
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            rooms: Arc::new(RoomManager::new(config.broadcast_capacity)),
            ledgers: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(ServerStats::default())),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    pub async fn bind(&self) -> Result<TcpListener, CollabError> {
        TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|e| CollabError::Transport(format!("{}: {e}", self.config.bind_addr)))
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(self) -> Result<(), CollabError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<(), CollabError> {
        if let Ok(addr) = listener.local_addr() {
            log::info!("Crash relay listening on {addr}");
        }

        loop {
            let (stream, addr) = listener
                .accept()
                .await
                .map_err(|e| CollabError::Transport(e.to_string()))?;
            log::debug!("New TCP connection from {addr}");

            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, addr).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        log::info!("WebSocket connection established from {addr}");

        {
            let mut s = self.stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let mut joined: Option<Joined> = None;
        let result = self.pump(ws_stream, addr, &mut joined).await;

        if let Some(state) = joined {
            self.leave(state).await;
        }
        let mut s = self.stats.write().await;
        s.active_connections = s.active_connections.saturating_sub(1);
        s.active_rooms = self.rooms.room_count().await;
        result
    }

    /// Socket loop for one connection. Returns on close or on the first
    /// send failure; the caller cleans up either way.
    async fn pump(
        &self,
        ws_stream: WebSocketStream<TcpStream>,
        addr: SocketAddr,
        joined: &mut Option<Joined>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        loop {
            tokio::select! {
                frame = ws_receiver.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                            continue;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break;
                        }
                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }
                        Some(Ok(_)) => continue,
                    };

                    {
                        let mut s = self.stats.write().await;
                        s.total_messages += 1;
                        s.total_bytes += text.len() as u64;
                    }

                    let message = match RelayMessage::decode(text.as_str()) {
                        Ok(message) => message,
                        Err(e) => {
                            log::warn!("Failed to decode message from {addr}: {e}");
                            continue;
                        }
                    };

                    match message {
                        RelayMessage::Join { document, user } => {
                            if joined.is_some() {
                                log::warn!("{addr} sent a second Join; ignored");
                                continue;
                            }
                            match self.join(document, user).await {
                                Some((state, initial)) => {
                                    let encoded = RelayMessage::Initialize(initial).encode()?;
                                    *joined = Some(state);
                                    ws_sender.send(Message::Text(encoded.into())).await?;
                                }
                                None => break,
                            }
                        }
                        RelayMessage::Changes(changes) => {
                            let Some(state) = joined.as_ref() else {
                                log::warn!("{addr} sent changes before joining");
                                continue;
                            };
                            state.ledger.lock().await.apply_all(&changes);
                            log::trace!(
                                "{} sent {} changes to {}",
                                state.peer.user,
                                changes.len(),
                                state.document
                            );
                            state
                                .room
                                .broadcast(state.peer.peer_id, &RelayMessage::Changes(changes))?;
                        }
                        RelayMessage::Ping => {
                            let pong = RelayMessage::Pong.encode()?;
                            ws_sender.send(Message::Text(pong.into())).await?;
                        }
                        RelayMessage::Pong => {}
                        other => {
                            log::debug!("Unhandled {} from {addr}", other.kind());
                        }
                    }
                }

                routed = async {
                    match joined.as_mut() {
                        Some(state) => state.rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match routed {
                        Ok(routed) => {
                            let own = joined.as_ref().map(|s| s.peer.peer_id);
                            if Some(routed.origin) == own {
                                continue;
                            }
                            ws_sender
                                .send(Message::Text(routed.payload.clone().into()))
                                .await?;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("{addr} lagged by {n} messages; resending document state");
                            if let Some(state) = joined.as_ref() {
                                let encoded = state.resync(n).await.encode()?;
                                ws_sender.send(Message::Text(encoded.into())).await?;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
        Ok(())
    }

    async fn join(&self, document: String, user: String) -> Option<(Joined, Vec<Change>)> {
        let room = self.rooms.get_or_create(&document).await;
        if room.peer_count().await >= self.config.max_peers_per_room {
            log::warn!("Room {document} is full; rejecting {user}");
            self.stats.write().await.rejected_peers += 1;
            return None;
        }

        let ledger = self
            .ledgers
            .write()
            .await
            .entry(document.clone())
            .or_default()
            .clone();

        let peer = PeerInfo::new(user);
        let rx = room.add_peer(peer.clone()).await;
        let initial = ledger.lock().await.snapshot();
        log::info!(
            "{} ({}) joined {document}; sending {} changes",
            peer.user,
            peer.peer_id,
            initial.len()
        );

        self.stats.write().await.active_rooms = self.rooms.room_count().await;
        Some((
            Joined {
                peer,
                document,
                room,
                ledger,
                rx,
            },
            initial,
        ))
    }

    async fn leave(&self, state: Joined) {
        let Joined {
            peer,
            document,
            room,
            ledger,
            ..
        } = state;
        room.remove_peer(&peer.peer_id).await;

        if !room.has_user(&peer.user).await {
            let release = owner_release(peer.user.as_str());
            ledger.lock().await.apply(&release);
            let announce = [
                RelayMessage::Changes(vec![release]),
                RelayMessage::UserLeft {
                    user: peer.user.clone(),
                },
            ];
            for message in &announce {
                if let Err(e) = room.broadcast(Uuid::nil(), message) {
                    log::error!("Could not announce departure of {}: {e}", peer.user);
                }
            }
        }
        log::info!("{} left {document}", peer.user);

        if self.rooms.remove_if_empty(&document).await {
            self.ledgers.write().await.remove(&document);
            log::info!("Room {document} removed (empty)");
        }
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }

    /// Current ledger contents for `document`, if its room is open.
    pub async fn ledger_snapshot(&self, document: &str) -> Option<Vec<Change>> {
        let ledger = self.ledgers.read().await.get(document).cloned()?;
        let snapshot = ledger.lock().await.snapshot();
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crash_core::ChangeAction;

    fn preview(owner: &str) -> Change {
        Change::new(
            owner,
            ChangeAction::ADD | ChangeAction::TEMPORARY,
            "Crash.GeometryChange",
            None,
        )
    }

    #[tokio::test]
    async fn test_full_room_rejects_join() {
        let server = RelayServer::new(ServerConfig {
            max_peers_per_room: 1,
            ..ServerConfig::default()
        });

        let (anna, initial) = server.join("plan.3dm".into(), "Anna".into()).await.unwrap();
        assert!(initial.is_empty());
        assert!(server.join("plan.3dm".into(), "Jack".into()).await.is_none());
        assert!(server.join("site.3dm".into(), "Jack".into()).await.is_some());

        let stats = server.stats().await;
        assert_eq!(stats.rejected_peers, 1);
        assert_eq!(stats.active_rooms, 2);
        assert_eq!(anna.room.peer_count().await, 1);
    }

    #[tokio::test]
    async fn test_last_connection_leaving_releases_previews() {
        let server = RelayServer::with_defaults();
        let (anna, _) = server.join("plan.3dm".into(), "Anna".into()).await.unwrap();
        let (mut jack, _) = server.join("plan.3dm".into(), "Jack".into()).await.unwrap();

        anna.ledger.lock().await.apply(&preview("Anna"));
        server.leave(anna).await;

        let ledger = server.ledger_snapshot("plan.3dm").await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert!(!ledger[0].is_temporary());

        let release = jack.rx.recv().await.unwrap();
        assert_eq!(release.origin, Uuid::nil());
        let RelayMessage::Changes(changes) = RelayMessage::decode(&release.payload).unwrap() else {
            panic!("expected a release batch");
        };
        assert!(changes[0].action.contains(ChangeAction::RELEASE));
        assert_eq!(changes[0].owner, "Anna");
        assert_eq!(
            RelayMessage::decode(&jack.rx.recv().await.unwrap().payload).unwrap(),
            RelayMessage::UserLeft { user: "Anna".into() }
        );
    }

    #[tokio::test]
    async fn test_second_connection_keeps_previews_alive() {
        let server = RelayServer::with_defaults();
        let (desk, _) = server.join("plan.3dm".into(), "Anna".into()).await.unwrap();
        let (_laptop, _) = server.join("plan.3dm".into(), "anna".into()).await.unwrap();

        desk.ledger.lock().await.apply(&preview("Anna"));
        server.leave(desk).await;

        let ledger = server.ledger_snapshot("plan.3dm").await.unwrap();
        assert!(ledger[0].is_temporary());
    }

    #[test]
    fn test_server_config_from_toml() {
        let config = ServerConfig::from_toml_str("bind_addr = \"0.0.0.0:8080\"\n").unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.max_peers_per_room, 100);

        assert!(ServerConfig::from_toml_str("max_peers_per_room = 0\n").is_err());
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = RelayServer::with_defaults();
        assert_eq!(server.stats().await, ServerStats::default());
        assert_eq!(server.rooms().room_count().await, 0);
        assert!(server.ledger_snapshot("plan.3dm").await.is_none());
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = RelayServer::new(ServerConfig {
            bind_addr: "127.0.0.1:0".into(),
            ..ServerConfig::default()
        });
        let listener = server.bind().await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_lagging_peer_is_sent_current_state() {
        let server = RelayServer::new(ServerConfig {
            broadcast_capacity: 2,
            ..ServerConfig::default()
        });
        let (anna, _) = server.join("plan.3dm".into(), "Anna".into()).await.unwrap();
        let (mut jack, _) = server.join("plan.3dm".into(), "Jack".into()).await.unwrap();

        for _ in 0..4 {
            let batch = vec![preview("Anna")];
            anna.ledger.lock().await.apply_all(&batch);
            anna.room
                .broadcast(anna.peer.peer_id, &RelayMessage::Changes(batch))
                .unwrap();
        }

        let missed = match jack.rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => n,
            other => panic!("expected lag, got {other:?}"),
        };
        assert_eq!(missed, 2);

        let RelayMessage::Initialize(state) = jack.resync(missed).await else {
            panic!("expected the document state");
        };
        assert_eq!(state.len(), 4);
        assert_eq!(jack.room.stats().await.messages_dropped, 2);
    }
}
