//! Provisional changes, releases and requests across three participants.

use std::sync::Arc;
use std::time::Duration;

use crash_collab::{
    BroadcastGroup, HostEvent, LocalTransport, MemoryHost, ObjectHandle, Session, SessionConfig,
    TransportEvent,
};
use crash_core::{Change, GeometryPayload};
use tokio::sync::mpsc;
use tokio::time::timeout;

struct Peer {
    session: Session,
    host: MemoryHost,
    rx: mpsc::Receiver<TransportEvent>,
}

impl Peer {
    async fn join(room: &Arc<BroadcastGroup>, user: &str) -> Self {
        let (transport, rx) = LocalTransport::connect(room.clone(), user).await;
        let host = MemoryHost::new();
        let session = Session::open(
            "site.3dm",
            user,
            Box::new(host.clone()),
            &SessionConfig::default(),
            Box::new(transport),
        )
        .unwrap();
        Self { session, host, rx }
    }

    /// Take in the next batch of changes and run the idle queue.
    async fn sync(&mut self) {
        loop {
            let event = timeout(Duration::from_secs(5), self.rx.recv())
                .await
                .expect("timed out waiting for changes")
                .expect("transport closed");
            let batch = matches!(event, TransportEvent::Changes(_));
            self.session.on_transport_event(event).unwrap();
            if batch {
                break;
            }
        }
        self.session.on_idle();
    }

    fn preview(&mut self, geometry: &str) -> Change {
        let mut sent = self
            .session
            .on_host_event(HostEvent::ObjectAdded {
                object: ObjectHandle::new(),
                geometry: GeometryPayload::new(geometry),
            })
            .unwrap();
        assert_eq!(sent.len(), 1);
        sent.remove(0)
    }
}

async fn trio() -> (Peer, Peer, Peer) {
    let room = Arc::new(BroadcastGroup::new(64));
    let anna = Peer::join(&room, "Anna").await;
    let jack = Peer::join(&room, "Jack").await;
    let bob = Peer::join(&room, "Bob").await;
    (anna, jack, bob)
}

#[tokio::test]
async fn test_targeted_release_promotes_only_that_change() {
    let (_anna, mut jack, mut bob) = trio().await;

    let wall = jack.preview("wall");
    bob.sync().await;
    let door = jack.preview("door");
    bob.sync().await;
    assert_eq!(bob.session.doc().temporary.len(), 2);

    jack.session
        .on_host_event(HostEvent::ReleaseObjects { ids: vec![wall.id] })
        .unwrap();
    bob.sync().await;

    assert_eq!(bob.host.find_objects("wall").len(), 1);
    assert!(bob.host.find_objects("door").is_empty());
    assert!(bob.session.doc().temporary.contains(&door.id));
    assert!(bob.session.doc().realised.contains(&wall.id));
    assert_eq!(bob.host.undo_clears(), 1);
}

#[tokio::test]
async fn test_done_promotes_only_the_senders_previews() {
    let (mut anna, mut jack, mut bob) = trio().await;

    let sketch = anna.preview("sketch");
    bob.sync().await;
    let beam = jack.preview("beam");
    bob.sync().await;

    anna.session.on_host_event(HostEvent::Done).unwrap();
    bob.sync().await;

    assert_eq!(bob.host.object_count(), 1);
    assert!(bob.session.doc().realised.contains(&sketch.id));
    assert!(bob.session.doc().temporary.contains(&beam.id));

    // A second Done from Anna finds nothing left to promote.
    anna.session.on_host_event(HostEvent::Done).unwrap();
    bob.sync().await;
    assert_eq!(bob.host.object_count(), 1);
}

#[tokio::test]
async fn test_request_annotates_preview_on_every_peer() {
    let (mut anna, mut jack, mut bob) = trio().await;

    let column = jack.preview("column");
    anna.sync().await;
    bob.sync().await;

    bob.session
        .on_host_event(HostEvent::Request {
            target: column.id,
            requested_name: "Column C4".into(),
        })
        .unwrap();
    anna.sync().await;
    jack.sync().await;

    let pending = anna.session.doc().temporary.pending_requests();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].requested_by.as_deref(), Some("Bob"));
    assert_eq!(pending[0].requested_name.as_deref(), Some("Column C4"));

    // Jack holds his own edit as realised, not as a preview.
    assert!(jack.session.doc().temporary.pending_requests().is_empty());
    assert!(jack.session.doc().log().contains("unknown temporary change"));
}
