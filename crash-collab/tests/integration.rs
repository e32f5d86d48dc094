//! End-to-end sessions over an in-process room.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crash_collab::{
    BroadcastGroup, HostEvent, LocalTransport, MemoryHost, ObjectHandle, Session, SessionConfig,
    TransportEvent,
};
use crash_core::{CPoint, CTransform, Camera, GeometryPayload};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn open(user: &str, host: &MemoryHost, transport: LocalTransport) -> Session {
    Session::open(
        "plan.3dm",
        user,
        Box::new(host.clone()),
        &SessionConfig::default(),
        Box::new(transport),
    )
    .unwrap()
}

/// Feed transport events into `session` until one batch of changes has
/// arrived, then run the idle queue.
async fn deliver(session: &mut Session, rx: &mut mpsc::Receiver<TransportEvent>) {
    loop {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for changes")
            .expect("transport closed");
        let batch = matches!(
            event,
            TransportEvent::Changes(_) | TransportEvent::Initialize(_)
        );
        session.on_transport_event(event).unwrap();
        if batch {
            break;
        }
    }
    let report = session.on_idle();
    assert_eq!(report.failed, 0, "{:?}", session.doc().log().entries());
}

struct Pair {
    anna: Session,
    jack: Session,
    jack_host: MemoryHost,
    jack_rx: mpsc::Receiver<TransportEvent>,
    _anna_rx: mpsc::Receiver<TransportEvent>,
}

async fn pair() -> Pair {
    let room = Arc::new(BroadcastGroup::new(64));
    let (anna_transport, anna_rx) = LocalTransport::connect(room.clone(), "Anna").await;
    let (jack_transport, jack_rx) = LocalTransport::connect(room, "Jack").await;
    let jack_host = MemoryHost::new();
    Pair {
        anna: open("Anna", &MemoryHost::new(), anna_transport),
        jack: open("Jack", &jack_host, jack_transport),
        jack_host,
        jack_rx,
        _anna_rx: anna_rx,
    }
}

#[tokio::test]
async fn test_geometry_lifecycle_converges() {
    let Pair {
        mut anna,
        mut jack,
        jack_host,
        mut jack_rx,
        ..
    } = pair().await;

    let object = ObjectHandle::new();
    let sent = anna
        .on_host_event(HostEvent::ObjectAdded {
            object,
            geometry: GeometryPayload::new("box"),
        })
        .unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].is_temporary());
    let id = sent[0].id;
    // Anna's own object is mapped to the change Id on her next idle.
    anna.on_idle();
    assert_eq!(anna.doc().realised.object_of(&id), Some(object));

    // Preview only.
    deliver(&mut jack, &mut jack_rx).await;
    assert_eq!(jack_host.object_count(), 0);
    assert!(jack.doc().temporary.contains(&id));

    // Done promotes it into the host.
    anna.on_host_event(HostEvent::Done).unwrap();
    deliver(&mut jack, &mut jack_rx).await;
    assert!(jack.doc().temporary.is_empty());
    assert_eq!(jack_host.find_objects("box").len(), 1);
    let jack_object = jack.doc().realised.object_of(&id).unwrap();
    assert!(jack.doc().users.get("Anna").is_some());

    // Follow-ups land on the realised object.
    let shift = CTransform::translation(5.0, 0.0, 0.0);
    anna.on_host_event(HostEvent::ObjectsTransformed {
        objects: vec![object],
        transform: shift,
    })
    .unwrap();
    deliver(&mut jack, &mut jack_rx).await;
    assert_eq!(jack_host.object(jack_object).unwrap().transform, shift);

    anna.on_host_event(HostEvent::ObjectModified {
        object,
        attributes: HashMap::from([("Name".to_string(), "North wall".to_string())]),
    })
    .unwrap();
    deliver(&mut jack, &mut jack_rx).await;
    let stored = jack_host.object(jack_object).unwrap();
    assert_eq!(
        stored.geometry.attributes.get("Name").map(String::as_str),
        Some("North wall")
    );

    anna.on_host_event(HostEvent::ObjectDeleted { object }).unwrap();
    deliver(&mut jack, &mut jack_rx).await;
    assert_eq!(jack_host.object_count(), 0);
    assert!(!jack.doc().realised.contains(&id));
}

#[tokio::test]
async fn test_camera_reaches_peer_exactly_once() {
    let Pair {
        mut anna,
        mut jack,
        mut jack_rx,
        ..
    } = pair().await;

    let camera = Camera::new(CPoint::new(120.0, 40.0, 15.0), CPoint::ORIGIN);
    anna.on_host_event(HostEvent::CameraChanged { camera }).unwrap();
    // Same viewpoint again straight away is throttled.
    assert!(anna
        .on_host_event(HostEvent::CameraChanged { camera })
        .unwrap()
        .is_empty());

    deliver(&mut jack, &mut jack_rx).await;
    assert_eq!(jack.doc().cameras.history("Anna"), vec![camera]);
}

#[tokio::test]
async fn test_cancelled_preview_never_reaches_host() {
    let Pair {
        mut anna,
        mut jack,
        jack_host,
        mut jack_rx,
        ..
    } = pair().await;

    let object = ObjectHandle::new();
    let sent = anna
        .on_host_event(HostEvent::ObjectAdded {
            object,
            geometry: GeometryPayload::new("sketch"),
        })
        .unwrap();
    anna.on_idle();
    deliver(&mut jack, &mut jack_rx).await;
    assert!(jack.doc().temporary.contains(&sent[0].id));

    anna.on_host_event(HostEvent::ObjectDeleted { object }).unwrap();
    deliver(&mut jack, &mut jack_rx).await;
    assert!(jack.doc().temporary.is_empty());

    anna.on_host_event(HostEvent::Done).unwrap();
    deliver(&mut jack, &mut jack_rx).await;
    assert_eq!(jack_host.object_count(), 0);
}
