//! Create and receive pipelines.
//!
//! ```text
//! create:  HostEvent ──▸ for each definition (registration order)
//!                          first create-action with action ∩ requested ≠ ∅
//!                          and can_convert ──▸ try_convert ──▸ Vec<Change>
//!
//! receive: Change ──▸ observers (can_receive) ──┐
//!                 └─▸ definition[Type]          ├──▸ IdleSender ──▸ IdleQueue
//!                       receive-actions ────────┘
//! ```

use std::sync::Arc;

use crash_core::{Change, ChangeAction};

use crate::doc::CrashDoc;
use crate::error::CollabError;
use crate::event::HostEvent;
use crate::idle::{IdleAction, IdleSender};
use crate::registry::{CreateAction, ReceiveAction, Registry};

/// Runs create-actions for local events.
#[derive(Debug, Clone)]
pub struct ChangeCreator {
    registry: Arc<Registry>,
}

impl ChangeCreator {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    fn matching<'a>(
        &'a self,
        action: ChangeAction,
        event: &'a HostEvent,
        doc: &'a CrashDoc,
    ) -> impl Iterator<Item = (&'a str, &'a Arc<dyn CreateAction>)> + 'a {
        self.registry.definitions().filter_map(move |definition| {
            definition
                .create_actions()
                .iter()
                .find(|create| create.action().intersects(action) && create.can_convert(event, doc))
                .map(|create| (definition.name(), create))
        })
    }

    /// Changes for `event`, without touching the document.
    pub fn create(&self, action: ChangeAction, event: &HostEvent, doc: &CrashDoc) -> Vec<Change> {
        let mut changes = Vec::new();
        for (definition, create) in self.matching(action, event, doc) {
            match create.try_convert(event, doc) {
                Some(converted) => changes.extend(converted),
                None => doc.log().debug(format!(
                    "{definition} could not convert {} event",
                    event.kind()
                )),
            }
        }
        changes
    }

    /// Like [`create`](Self::create), but also collects the local
    /// bookkeeping each create-action wants for the changes it produced.
    /// Nothing is applied until the result is committed.
    pub fn convert(&self, action: ChangeAction, event: &HostEvent, doc: &CrashDoc) -> Conversion {
        let mut conversion = Conversion::default();
        for (definition, create) in self.matching(action, event, doc) {
            let Some(converted) = create.try_convert(event, doc) else {
                doc.log().debug(format!(
                    "{definition} could not convert {} event",
                    event.kind()
                ));
                continue;
            };
            if let (Some(first), Some(callback)) =
                (converted.first(), create.record_local(event, &converted))
            {
                conversion.bookkeeping.push(IdleAction::new(
                    format!("{definition} local record"),
                    first.clone(),
                    callback,
                ));
            }
            conversion.changes.extend(converted);
        }
        conversion
    }

    /// [`convert`](Self::convert) and commit straight away.
    pub fn create_and_record(
        &self,
        action: ChangeAction,
        event: &HostEvent,
        doc: &CrashDoc,
    ) -> Result<Vec<Change>, CollabError> {
        self.convert(action, event, doc).commit(doc)
    }
}

/// Changes converted from one host event and the local bookkeeping that
/// goes with them.
#[derive(Debug, Default)]
pub struct Conversion {
    changes: Vec<Change>,
    bookkeeping: Vec<IdleAction>,
}

impl Conversion {
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Queue the bookkeeping on the document's idle queue. It takes effect
    /// on the next drain, like any other mutation.
    pub fn commit(self, doc: &CrashDoc) -> Result<Vec<Change>, CollabError> {
        for action in self.bookkeeping {
            doc.enqueue(action)?;
        }
        Ok(self.changes)
    }

    /// Drop the bookkeeping, for changes that never left this client.
    pub fn discard(self) -> Vec<Change> {
        self.changes
    }
}

/// Turns received changes into idle actions. Only holds the queue's sending
/// half, so it can live on a transport task.
#[derive(Debug, Clone)]
pub struct ChangeReceiver {
    registry: Arc<Registry>,
    sender: IdleSender,
}

impl ChangeReceiver {
    pub fn new(registry: Arc<Registry>, sender: IdleSender) -> Self {
        Self { registry, sender }
    }

    fn enqueue(&self, action: &Arc<dyn ReceiveAction>, change: &Change) -> Result<(), CollabError> {
        let receive = action.clone();
        self.sender.enqueue(IdleAction::new(
            action.name(),
            change.clone(),
            Box::new(move |doc, change| receive.apply(doc, change)),
        ))
    }

    /// Queue every action that accepts `change`. Returns how many were queued.
    pub fn receive(&self, change: &Change) -> Result<usize, CollabError> {
        let mut queued = 0;
        for observer in self.registry.observers() {
            if observer.can_receive(change) {
                self.enqueue(observer, change)?;
                queued += 1;
            }
        }

        let Some(definition) = self.registry.definition(&change.change_type) else {
            log::warn!(
                "Ignoring change {} of unknown type '{}'",
                change.id,
                change.change_type
            );
            return Ok(queued);
        };

        for action in definition.receive_actions() {
            if action.can_receive(change) {
                self.enqueue(action, change)?;
                queued += 1;
            }
        }
        if queued == 0 {
            log::trace!("No receive action for {} ({})", change.id, change.action);
        }
        Ok(queued)
    }

    pub fn receive_all(&self, changes: &[Change]) -> Result<usize, CollabError> {
        changes.iter().try_fold(0, |n, change| Ok(n + self.receive(change)?))
    }
}
