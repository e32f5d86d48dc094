//! Per-document session state.
//!
//! ```text
//! CrashDoc
//!   ├── Users                 participants, one current user
//!   ├── TemporaryChangeTable  provisional changes by Id
//!   ├── RealisedChangeTable   committed changes ⇄ host objects
//!   ├── Cameras               recent cameras per user
//!   ├── Dispatcher            undo-grouped host mutation
//!   ├── Registry (Arc)        shared, immutable
//!   ├── IdleQueue             single consumer
//!   └── SessionLog            per-document diagnostics
//! ```
//!
//! Everything here is created when a session opens and dropped with it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crash_core::Change;

use crate::cameras::Cameras;
use crate::config::SessionConfig;
use crate::dispatch::Dispatcher;
use crate::error::CollabError;
use crate::host::{HostDocument, MemoryHost};
use crate::idle::{DrainReport, IdleAction, IdleQueue, IdleSender};
use crate::registry::Registry;
use crate::session_log::SessionLog;
use crate::tables::{RealisedChangeTable, TemporaryChangeTable};
use crate::users::Users;

pub struct CrashDoc {
    name: String,
    pub users: Users,
    pub temporary: TemporaryChangeTable,
    pub realised: RealisedChangeTable,
    pub cameras: Cameras,
    pub dispatcher: Dispatcher,
    registry: Arc<Registry>,
    queue: IdleQueue,
    log: SessionLog,
}

impl CrashDoc {
    pub fn new(
        name: impl Into<String>,
        current_user: impl Into<String>,
        host: Box<dyn HostDocument>,
        registry: Arc<Registry>,
        config: &SessionConfig,
    ) -> Self {
        let name = name.into();
        let users = Users::new(current_user);
        let log = SessionLog::new(name.clone(), config.log_capacity);
        log.info(format!(
            "Session opened for {} with {} change definitions",
            users.current(),
            registry.len()
        ));
        Self {
            users,
            temporary: TemporaryChangeTable::new(),
            realised: RealisedChangeTable::new(),
            cameras: Cameras::new(config.camera_stack_size),
            dispatcher: Dispatcher::new(host),
            registry,
            queue: IdleQueue::new(),
            log,
            name,
        }
    }

    /// Document backed by a fresh [`MemoryHost`] and the standard registry.
    pub fn in_memory(
        name: impl Into<String>,
        current_user: impl Into<String>,
    ) -> Result<Self, CollabError> {
        let config = SessionConfig::default();
        let registry = Arc::new(Registry::standard(&config)?);
        Ok(Self::new(
            name,
            current_user,
            Box::new(MemoryHost::new()),
            registry,
            &config,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_user(&self) -> &str {
        self.users.current()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn idle_sender(&self) -> IdleSender {
        self.queue.sender()
    }

    pub fn enqueue(&self, action: IdleAction) -> Result<(), CollabError> {
        self.queue.sender().enqueue(action)
    }

    pub fn pending_idle(&self) -> usize {
        self.queue.pending()
    }

    /// Run every queued idle action, oldest first.
    ///
    /// A failing or panicking action is logged and counted; the drain goes
    /// on with the next one.
    pub fn drain_idle(&mut self) -> DrainReport {
        let mut report = DrainReport::default();
        while let Some(action) = self.queue.try_next() {
            if self.run_idle(action) {
                report.executed += 1;
            } else {
                report.failed += 1;
            }
        }
        if report.total() > 0 {
            self.log.trace(format!(
                "Idle drain: {} executed, {} failed",
                report.executed, report.failed
            ));
        }
        report
    }

    /// Wait for the next idle action and run it, returning whether it
    /// succeeded. The document holds a sender of its own, so an empty queue
    /// makes this wait rather than return.
    pub async fn run_next_idle(&mut self) -> bool {
        match self.queue.next().await {
            Some(action) => self.run_idle(action),
            None => false,
        }
    }

    fn run_idle(&mut self, mut action: IdleAction) -> bool {
        self.log.debug(format!(
            "Running idle action '{}' for {} after {:?}",
            action.name(),
            action.change().id,
            action.age()
        ));

        match catch_unwind(AssertUnwindSafe(|| action.invoke(self))) {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                self.log.error(format!(
                    "Idle action '{}' failed for {}: {e}",
                    action.name(),
                    action.change().id
                ));
                false
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                self.log.error(format!(
                    "Idle action '{}' panicked for {}: {reason}",
                    action.name(),
                    action.change().id
                ));
                false
            }
        }
    }

    /// Re-dispatch `change` synchronously through the receive-actions of its
    /// own type. Returns how many actions accepted it.
    pub fn apply_now(&mut self, change: &Change) -> Result<usize, CollabError> {
        let registry = self.registry.clone();
        let definition = registry
            .definition(&change.change_type)
            .ok_or_else(|| CollabError::UnknownDefinition(change.change_type.clone()))?;

        let mut applied = 0;
        for action in definition.receive_actions() {
            if action.can_receive(change) {
                action.apply(self, change)?;
                applied += 1;
            }
        }
        Ok(applied)
    }
}

impl Drop for CrashDoc {
    fn drop(&mut self) {
        log::debug!(
            "Closing session for {} ({} temporary, {} realised)",
            self.name,
            self.temporary.len(),
            self.realised.len()
        );
    }
}

impl std::fmt::Debug for CrashDoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashDoc")
            .field("name", &self.name)
            .field("current_user", &self.users.current())
            .field("temporary", &self.temporary.len())
            .field("realised", &self.realised.len())
            .field("pending_idle", &self.queue.pending())
            .finish()
    }
}
