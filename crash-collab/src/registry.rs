//! Change definition registry.
//!
//! A definition owns one change type (`Change.Type`) and the actions that
//! produce and consume it:
//!
//! ```text
//!                 ┌──────────────── ChangeDefinition ────────────────┐
//!  HostEvent ──▸  │ create actions: filter (action, can_convert)     │ ──▸ Change
//!                 │                 convert (try_convert)            │
//!  Change    ──▸  │ receive actions: filter (can_receive, flags only)│ ──▸ IdleAction
//!                 └──────────────────────────────────────────────────┘
//! ```
//!
//! The table is assembled once by [`RegistryBuilder`], frozen by `build()`
//! and shared behind an `Arc`. Registering two definitions with the same
//! name is a startup error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crash_core::{Change, ChangeAction};

use crate::config::SessionConfig;
use crate::definitions;
use crate::doc::CrashDoc;
use crate::error::CollabError;
use crate::event::HostEvent;
use crate::idle::IdleCallback;

/// Turns a local host event into zero or more changes.
pub trait CreateAction: Send + Sync {
    /// Actions this create-action can produce.
    fn action(&self) -> ChangeAction;

    /// Cheap pre-check. Runs on every matching event.
    fn can_convert(&self, event: &HostEvent, doc: &CrashDoc) -> bool;

    /// Build the changes. `None` means the conversion failed and nothing is
    /// emitted.
    fn try_convert(&self, event: &HostEvent, doc: &CrashDoc) -> Option<Vec<Change>>;

    /// Local bookkeeping for the changes this action produced, such as
    /// mapping a host object to the Id of the change that announced it.
    /// Runs on the idle queue, and only once the changes have been sent.
    fn record_local(&self, _event: &HostEvent, _changes: &[Change]) -> Option<IdleCallback> {
        None
    }
}

/// Applies a received change to the document.
pub trait ReceiveAction: Send + Sync {
    fn name(&self) -> &str;

    /// Decided from the change's flags alone; must not look at document state.
    fn can_receive(&self, change: &Change) -> bool;

    /// Runs on the idle queue's consumer.
    fn apply(&self, doc: &mut CrashDoc, change: &Change) -> Result<(), CollabError>;
}

/// A change type and its actions.
pub trait ChangeDefinition: Send + Sync {
    fn name(&self) -> &str;

    fn create_actions(&self) -> &[Arc<dyn CreateAction>];

    fn receive_actions(&self) -> &[Arc<dyn ReceiveAction>];
}

/// Plain-data definition used by the built-in change types.
pub struct Definition {
    name: String,
    create: Vec<Arc<dyn CreateAction>>,
    receive: Vec<Arc<dyn ReceiveAction>>,
}

impl Definition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            create: Vec::new(),
            receive: Vec::new(),
        }
    }

    pub fn create(mut self, action: impl CreateAction + 'static) -> Self {
        self.create.push(Arc::new(action));
        self
    }

    pub fn receive(mut self, action: impl ReceiveAction + 'static) -> Self {
        self.receive.push(Arc::new(action));
        self
    }
}

impl ChangeDefinition for Definition {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_actions(&self) -> &[Arc<dyn CreateAction>] {
        &self.create
    }

    fn receive_actions(&self) -> &[Arc<dyn ReceiveAction>] {
        &self.receive
    }
}

// ───────────────────────────────────────────────────────────────────
// Builder
// ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RegistryBuilder {
    definitions: Vec<Box<dyn ChangeDefinition>>,
    observers: Vec<Arc<dyn ReceiveAction>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        definition: impl ChangeDefinition + 'static,
    ) -> Result<Self, CollabError> {
        let name = definition.name();
        if self.definitions.iter().any(|d| d.name() == name) {
            return Err(CollabError::DuplicateDefinition(name.to_string()));
        }
        log::debug!(
            "Registered change definition {name} ({} create, {} receive)",
            definition.create_actions().len(),
            definition.receive_actions().len()
        );
        self.definitions.push(Box::new(definition));
        Ok(self)
    }

    /// Add a receive-action that sees every change regardless of type.
    pub fn observe(mut self, action: impl ReceiveAction + 'static) -> Self {
        self.observers.push(Arc::new(action));
        self
    }

    pub fn build(self) -> Registry {
        let index = self
            .definitions
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name().to_string(), i))
            .collect();
        Registry {
            definitions: self.definitions,
            index,
            observers: self.observers,
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Registry
// ───────────────────────────────────────────────────────────────────

pub struct Registry {
    definitions: Vec<Box<dyn ChangeDefinition>>,
    index: HashMap<String, usize>,
    observers: Vec<Arc<dyn ReceiveAction>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// The built-in change types plus the user observer.
    pub fn standard(config: &SessionConfig) -> Result<Self, CollabError> {
        Ok(Self::standard_builder(config)?.build())
    }

    /// Builder preloaded with the built-in types, for hosts that register
    /// their own definitions on top.
    pub fn standard_builder(config: &SessionConfig) -> Result<RegistryBuilder, CollabError> {
        Ok(Self::builder()
            .register(definitions::camera::definition(&config.camera_throttle))?
            .register(definitions::geometry::definition())?
            .register(definitions::layer::definition())?
            .register(definitions::done::definition())?
            .register(definitions::request::definition())?
            .observe(definitions::observer::UserObserver))
    }

    pub fn definition(&self, name: &str) -> Option<&dyn ChangeDefinition> {
        self.index
            .get(name)
            .map(|&i| self.definitions[i].as_ref())
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &dyn ChangeDefinition> {
        self.definitions.iter().map(|d| d.as_ref())
    }

    pub fn observers(&self) -> &[Arc<dyn ReceiveAction>] {
        &self.observers
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field(
                "definitions",
                &self.definitions.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl ReceiveAction for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn can_receive(&self, _change: &Change) -> bool {
            true
        }

        fn apply(&self, _doc: &mut CrashDoc, _change: &Change) -> Result<(), CollabError> {
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let result = Registry::builder()
            .register(Definition::new("Test.Change").receive(Noop))
            .and_then(|b| b.register(Definition::new("Test.Change")));

        match result {
            Err(CollabError::DuplicateDefinition(name)) => assert_eq!(name, "Test.Change"),
            other => panic!("expected duplicate error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let registry = Registry::builder()
            .register(Definition::new("Test.Change"))
            .and_then(|b| b.register(Definition::new("test.change")))
            .unwrap()
            .build();
        assert_eq!(registry.len(), 2);
        assert!(registry.definition("Test.Change").is_some());
        assert!(registry.definition("TEST.CHANGE").is_none());
    }

    #[test]
    fn test_standard_registry() {
        let registry = Registry::standard(&SessionConfig::default()).unwrap();
        let names: Vec<&str> = registry.definitions().map(|d| d.name()).collect();
        assert_eq!(
            names,
            [
                definitions::camera::CAMERA_CHANGE,
                definitions::geometry::GEOMETRY_CHANGE,
                definitions::layer::LAYER_CHANGE,
                definitions::done::DONE_CHANGE,
                definitions::request::REQUEST_CHANGE,
            ]
        );
        assert_eq!(registry.observers().len(), 1);
    }
}
