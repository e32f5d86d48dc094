//! One open document wired to a transport.
//!
//! ```text
//!   host ──HostSignal──▸ SessionDriver ◂──TransportEvent── transport
//!                            │
//!                            ▼
//!                         Session
//!          Event ──▸ ChangeCreator ──▸ transport.send
//!          remote ──▸ ChangeReceiver ──▸ idle queue
//!          Idle  ──▸ CrashDoc::drain_idle
//! ```
//!
//! [`Session`] is usable on its own from synchronous host code; the driver
//! is the async loop for hosts that hand over their events on a channel.

use std::sync::Arc;
use std::time::Duration;

use crash_core::Change;
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::doc::CrashDoc;
use crate::error::CollabError;
use crate::event::HostEvent;
use crate::host::HostDocument;
use crate::idle::DrainReport;
use crate::pipeline::{ChangeCreator, ChangeReceiver};
use crate::registry::{Definition, Registry};
use crate::transport::{ChangeTransport, TransportEvent};

pub struct Session {
    doc: CrashDoc,
    creator: ChangeCreator,
    receiver: ChangeReceiver,
    transport: Box<dyn ChangeTransport>,
}

impl Session {
    /// Open a session with the built-in change types.
    pub fn open(
        name: impl Into<String>,
        user: impl Into<String>,
        host: Box<dyn HostDocument>,
        config: &SessionConfig,
        transport: Box<dyn ChangeTransport>,
    ) -> Result<Self, CollabError> {
        Self::open_with(name, user, host, config, transport, Vec::new())
    }

    /// Open a session with the built-in types plus `extra`. Fails if any
    /// name is registered twice.
    pub fn open_with(
        name: impl Into<String>,
        user: impl Into<String>,
        host: Box<dyn HostDocument>,
        config: &SessionConfig,
        transport: Box<dyn ChangeTransport>,
        extra: Vec<Definition>,
    ) -> Result<Self, CollabError> {
        config.validate()?;
        let mut builder = Registry::standard_builder(config)?;
        for definition in extra {
            builder = builder.register(definition)?;
        }
        let registry = Arc::new(builder.build());
        let doc = CrashDoc::new(name, user, host, registry, config);
        Ok(Self::from_doc(doc, transport))
    }

    pub fn from_doc(doc: CrashDoc, transport: Box<dyn ChangeTransport>) -> Self {
        let creator = ChangeCreator::new(doc.registry().clone());
        let receiver = ChangeReceiver::new(doc.registry().clone(), doc.idle_sender());
        Self {
            doc,
            creator,
            receiver,
            transport,
        }
    }

    pub fn doc(&self) -> &CrashDoc {
        &self.doc
    }

    pub fn doc_mut(&mut self) -> &mut CrashDoc {
        &mut self.doc
    }

    pub fn receiver(&self) -> &ChangeReceiver {
        &self.receiver
    }

    /// Turn a local host event into changes and send them. Returns what was
    /// sent.
    ///
    /// Local bookkeeping (object to Id mapping) is queued for the next idle
    /// drain, and only if the send succeeded.
    pub fn on_host_event(&mut self, event: HostEvent) -> Result<Vec<Change>, CollabError> {
        let conversion = self
            .creator
            .convert(event.requested_action(), &event, &self.doc);
        if conversion.is_empty() {
            return Ok(Vec::new());
        }
        self.doc.log().trace(format!(
            "Sending {} changes for {}",
            conversion.changes().len(),
            event.kind()
        ));
        if let Err(e) = self.transport.send(conversion.changes().to_vec()) {
            let dropped = conversion.discard();
            self.doc.log().warn(format!(
                "Dropped {} unsent changes for {}: {e}",
                dropped.len(),
                event.kind()
            ));
            return Err(e);
        }
        conversion.commit(&self.doc)
    }

    /// Queue remote changes. Nothing touches the document until the next
    /// idle drain.
    pub fn receive(&self, changes: &[Change]) -> Result<usize, CollabError> {
        self.receiver.receive_all(changes)
    }

    pub fn on_transport_event(&mut self, event: TransportEvent) -> Result<(), CollabError> {
        match event {
            TransportEvent::Changes(changes) => {
                self.receive(&changes)?;
            }
            TransportEvent::Initialize(changes) => {
                self.doc
                    .log()
                    .info(format!("Initializing from {} changes", changes.len()));
                self.receive(&changes)?;
            }
            TransportEvent::UserLeft(user) => {
                self.doc.cameras.remove_user(&user);
                self.doc.log().info(format!("{user} left"));
            }
            TransportEvent::Connected => self.doc.log().info("Connected"),
            TransportEvent::Disconnected => self.doc.log().warn("Disconnected"),
        }
        Ok(())
    }

    /// Host idle: run everything queued so far.
    pub fn on_idle(&mut self) -> DrainReport {
        self.doc.drain_idle()
    }
}

/// What the host tells a running driver.
#[derive(Debug)]
pub enum HostSignal {
    Idle,
    Event(HostEvent),
    Close,
}

pub struct SessionDriver {
    session: Session,
    signals: mpsc::Receiver<HostSignal>,
    events: mpsc::Receiver<TransportEvent>,
    idle_interval: Option<Duration>,
}

impl SessionDriver {
    pub fn new(
        session: Session,
        events: mpsc::Receiver<TransportEvent>,
    ) -> (Self, mpsc::Sender<HostSignal>) {
        let (signal_tx, signals) = mpsc::channel(256);
        (
            Self {
                session,
                signals,
                events,
                idle_interval: None,
            },
            signal_tx,
        )
    }

    /// Also drain on a timer, for hosts without an idle notification.
    pub fn with_idle_interval(mut self, every: Duration) -> Self {
        self.idle_interval = Some(every);
        self
    }

    /// Run until the host sends `Close` or drops its sender. Remote changes
    /// already delivered are queued and drained before returning, and the
    /// session is handed back.
    pub async fn run(mut self) -> Session {
        let mut ticker = self.idle_interval.map(tokio::time::interval);
        let mut transport_open = true;

        loop {
            tokio::select! {
                signal = self.signals.recv() => match signal {
                    Some(HostSignal::Idle) => {
                        self.session.on_idle();
                    }
                    Some(HostSignal::Event(event)) => {
                        if let Err(e) = self.session.on_host_event(event) {
                            self.session.doc().log().error(format!("Could not send changes: {e}"));
                        }
                    }
                    Some(HostSignal::Close) | None => break,
                },

                event = self.events.recv(), if transport_open => match event {
                    Some(event) => {
                        if let Err(e) = self.session.on_transport_event(event) {
                            self.session.doc().log().error(format!("Could not queue remote changes: {e}"));
                        }
                    }
                    None => {
                        transport_open = false;
                        self.session.doc().log().warn("Transport closed");
                    }
                },

                _ = async {
                    match ticker.as_mut() {
                        Some(ticker) => ticker.tick().await,
                        None => std::future::pending().await,
                    }
                } => {
                    self.session.on_idle();
                }
            }
        }

        while let Ok(event) = self.events.try_recv() {
            if let Err(e) = self.session.on_transport_event(event) {
                self.session.doc().log().error(format!("Could not queue remote changes: {e}"));
            }
        }
        self.session.on_idle();
        self.session
    }
}
