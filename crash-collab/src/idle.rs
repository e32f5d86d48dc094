//! Idle queue: deferred, serialized application of received changes.
//!
//! ```text
//!  transport task ─┐                         host idle signal
//!  transport task ─┼─▸ IdleSender ══ mpsc ══▸ IdleQueue ──▸ CrashDoc::drain_idle
//!  local event ────┘   (clone per producer)  (one consumer)   FIFO, one at a time
//! ```
//!
//! Producers never touch document state. Only the consumer, running on the
//! thread that owns the [`CrashDoc`], invokes callbacks, so every mutation
//! of shared state is serialized without locks.

use std::fmt;
use std::time::{Duration, Instant};

use crash_core::Change;
use tokio::sync::mpsc;

use crate::doc::CrashDoc;
use crate::error::CollabError;

/// Deferred mutation of a document.
pub type IdleCallback = Box<dyn FnOnce(&mut CrashDoc, &Change) -> Result<(), CollabError> + Send>;

/// One queued unit of work.
///
/// The callback is stored as an `Option` and taken on first invocation, so
/// an action runs at most once (`Pending → Executed`).
pub struct IdleAction {
    name: String,
    change: Change,
    callback: Option<IdleCallback>,
    enqueued_at: Instant,
}

impl IdleAction {
    pub fn new(name: impl Into<String>, change: Change, callback: IdleCallback) -> Self {
        Self {
            name: name.into(),
            change,
            callback: Some(callback),
            enqueued_at: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn change(&self) -> &Change {
        &self.change
    }

    pub fn is_executed(&self) -> bool {
        self.callback.is_none()
    }

    /// Time spent waiting in the queue so far.
    pub fn age(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Run the callback. Returns `Ok(false)` if it already ran.
    pub fn invoke(&mut self, doc: &mut CrashDoc) -> Result<bool, CollabError> {
        match self.callback.take() {
            Some(callback) => callback(doc, &self.change).map(|()| true),
            None => Ok(false),
        }
    }
}

impl fmt::Debug for IdleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleAction")
            .field("name", &self.name)
            .field("change", &self.change.id)
            .field("executed", &self.is_executed())
            .finish()
    }
}

/// Producer half. Cheap to clone, safe to move to other tasks.
#[derive(Debug, Clone)]
pub struct IdleSender {
    tx: mpsc::UnboundedSender<IdleAction>,
}

impl IdleSender {
    pub fn enqueue(&self, action: IdleAction) -> Result<(), CollabError> {
        self.tx.send(action).map_err(|_| CollabError::QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the document.
#[derive(Debug)]
pub struct IdleQueue {
    tx: mpsc::UnboundedSender<IdleAction>,
    rx: mpsc::UnboundedReceiver<IdleAction>,
}

impl IdleQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> IdleSender {
        IdleSender {
            tx: self.tx.clone(),
        }
    }

    /// Next queued action, if any, without waiting.
    pub fn try_next(&mut self) -> Option<IdleAction> {
        self.rx.try_recv().ok()
    }

    /// Wait until an action is queued. The queue holds a sender itself, so
    /// this does not return `None` while the queue exists.
    pub async fn next(&mut self) -> Option<IdleAction> {
        self.rx.recv().await
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for IdleQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub executed: usize,
    pub failed: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.executed + self.failed
    }
}
