//! WebSocket relay client.
//!
//! Connects one session to a [`RelayServer`](crate::server::RelayServer):
//! - joins the document room on connect
//! - sends change batches as `Changes` text frames
//! - holds batches in an [`OfflineQueue`] while disconnected and replays
//!   them on the next connect
//! - turns incoming frames into [`TransportEvent`]s
//!
//! ```text
//!   Session ──send()──▸ outgoing mpsc ──▸ writer task ──▸ ws
//!   Session ◂──events── event mpsc   ◂── reader task ◂── ws
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crash_core::Change;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::CollabError;
use crate::protocol::{PeerInfo, RelayMessage};
use crate::transport::{ChangeTransport, TransportEvent, EVENT_CHANNEL_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Change batches made while disconnected.
pub struct OfflineQueue {
    queue: VecDeque<Vec<Change>>,
    max_changes: usize,
    queued_changes: usize,
}

impl OfflineQueue {
    pub fn new(max_changes: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            max_changes,
            queued_changes: 0,
        }
    }

    /// Returns `false` if the batch would overflow the queue.
    pub fn enqueue(&mut self, batch: Vec<Change>) -> bool {
        if self.queued_changes + batch.len() > self.max_changes {
            return false;
        }
        self.queued_changes += batch.len();
        self.queue.push_back(batch);
        true
    }

    pub fn drain(&mut self) -> Vec<Vec<Change>> {
        self.queued_changes = 0;
        self.queue.drain(..).collect()
    }

    /// Queued batches.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn total_changes(&self) -> usize {
        self.queued_changes
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.queued_changes = 0;
    }
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct RelayClient {
    peer: PeerInfo,
    document: String,
    server_url: String,
    state: Arc<Mutex<ConnectionState>>,
    offline: Mutex<OfflineQueue>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<String>>>,
    event_tx: mpsc::Sender<TransportEvent>,
    event_rx: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
}

impl RelayClient {
    pub fn new(
        user: impl Into<String>,
        document: impl Into<String>,
        server_url: impl Into<String>,
        offline_capacity: usize,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        Self {
            peer: PeerInfo::new(user),
            document: document.into(),
            server_url: server_url.into(),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            offline: Mutex::new(OfflineQueue::new(offline_capacity)),
            outgoing: Mutex::new(None),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
        }
    }

    /// Take the event receiver. Only the first call returns `Some`.
    pub fn take_event_rx(&self) -> Option<mpsc::Receiver<TransportEvent>> {
        guard(&self.event_rx).take()
    }

    /// Open the socket, join the room and replay anything queued offline.
    pub async fn connect(&self) -> Result<(), CollabError> {
        *guard(&self.state) = ConnectionState::Connecting;

        let ws_stream = match tokio_tungstenite::connect_async(self.server_url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                *guard(&self.state) = ConnectionState::Disconnected;
                return Err(CollabError::Transport(format!("{}: {e}", self.server_url)));
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_writer.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        let join = RelayMessage::join(self.document.as_str(), self.peer.user.as_str()).encode()?;
        send_text(&out_tx, join)?;

        let queued = guard(&self.offline).drain();
        if !queued.is_empty() {
            log::info!("Replaying {} queued change batches", queued.len());
            for batch in queued {
                send_text(&out_tx, RelayMessage::Changes(batch).encode()?)?;
            }
        }

        let pong_tx = out_tx.downgrade();
        *guard(&self.outgoing) = Some(out_tx);
        *guard(&self.state) = ConnectionState::Connected;
        let _ = self.event_tx.send(TransportEvent::Connected).await;

        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        let user = self.peer.user.clone();
        tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                let message = match RelayMessage::decode(text.as_str()) {
                    Ok(message) => message,
                    Err(e) => {
                        log::warn!("{user}: dropping relay frame: {e}");
                        continue;
                    }
                };
                if message == RelayMessage::Ping {
                    if let (Some(tx), Ok(pong)) = (pong_tx.upgrade(), RelayMessage::Pong.encode()) {
                        let _ = tx.send(pong);
                    }
                    continue;
                }
                if let Some(event) = TransportEvent::from_message(message) {
                    if event_tx.send(event).await.is_err() {
                        break;
                    }
                }
            }

            *guard(&state) = ConnectionState::Disconnected;
            log::info!("{user}: relay connection closed");
            let _ = event_tx.send(TransportEvent::Disconnected).await;
        });

        Ok(())
    }

    /// Close the connection. The relay sees the socket close and releases
    /// this user's previews. Later batches go to the offline queue.
    pub fn disconnect(&self) {
        guard(&self.outgoing).take();
        *guard(&self.state) = ConnectionState::Disconnected;
    }

    pub fn connection_state(&self) -> ConnectionState {
        *guard(&self.state)
    }

    pub fn peer(&self) -> &PeerInfo {
        &self.peer
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn offline_len(&self) -> usize {
        guard(&self.offline).len()
    }

    fn queue_offline(&self, changes: Vec<Change>) -> Result<(), CollabError> {
        if guard(&self.offline).enqueue(changes) {
            Ok(())
        } else {
            Err(CollabError::Transport("offline queue is full".into()))
        }
    }
}

impl ChangeTransport for RelayClient {
    fn send(&self, changes: Vec<Change>) -> Result<(), CollabError> {
        if changes.is_empty() {
            return Ok(());
        }
        if self.connection_state() != ConnectionState::Connected {
            return self.queue_offline(changes);
        }
        let outgoing = guard(&self.outgoing).clone();
        match outgoing {
            Some(tx) => {
                let encoded = RelayMessage::Changes(changes).encode()?;
                send_text(&tx, encoded)
            }
            None => self.queue_offline(changes),
        }
    }
}

fn send_text(tx: &mpsc::UnboundedSender<String>, text: String) -> Result<(), CollabError> {
    tx.send(text)
        .map_err(|_| CollabError::Transport("relay connection closed".into()))
}
