//! Temporary and realised change tables.
//!
//! ```text
//!  ADD|TEMPORARY ──▸ TemporaryChangeTable ──(Done / Release)──▸ RealisedChangeTable
//!                         │                                         │
//!                         └── REMOVE: discarded                     └── id ⇄ host object
//! ```
//!
//! Both tables are keyed by change `Id`. A change lives in at most one of
//! them; promotion moves it under the same Id.

use std::collections::HashMap;

use crash_core::{same_user, Change};
use uuid::Uuid;

use crate::host::ObjectHandle;

// ───────────────────────────────────────────────────────────────────
// Temporary
// ───────────────────────────────────────────────────────────────────

/// A provisional change plus any pending request against it.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporaryEntry {
    pub change: Change,
    pub requested_by: Option<String>,
    pub requested_name: Option<String>,
}

impl TemporaryEntry {
    pub fn new(change: Change) -> Self {
        Self {
            change,
            requested_by: None,
            requested_name: None,
        }
    }

    pub fn has_request(&self) -> bool {
        self.requested_by.is_some()
    }
}

#[derive(Debug, Default)]
pub struct TemporaryChangeTable {
    entries: HashMap<Uuid, TemporaryEntry>,
}

impl TemporaryChangeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a provisional change. Replaces any entry with the same Id.
    pub fn insert(&mut self, change: Change) -> Option<TemporaryEntry> {
        self.entries.insert(change.id, TemporaryEntry::new(change))
    }

    pub fn get(&self, id: &Uuid) -> Option<&TemporaryEntry> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut TemporaryEntry> {
        self.entries.get_mut(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.entries.contains_key(id)
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<TemporaryEntry> {
        self.entries.remove(id)
    }

    /// Ids of every entry owned by `owner` (case-insensitive), oldest first.
    pub fn ids_owned_by(&self, owner: &str) -> Vec<Uuid> {
        let mut owned: Vec<&TemporaryEntry> = self
            .entries
            .values()
            .filter(|entry| same_user(&entry.change.owner, owner))
            .collect();
        owned.sort_by_key(|entry| entry.change.stamp);
        owned.into_iter().map(|entry| entry.change.id).collect()
    }

    /// Record that `requested_by` asked for the entry `id` to be named
    /// `requested_name`. Returns `false` if there is no such entry.
    pub fn annotate_request(
        &mut self,
        id: &Uuid,
        requested_by: impl Into<String>,
        requested_name: impl Into<String>,
    ) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.requested_by = Some(requested_by.into());
                entry.requested_name = Some(requested_name.into());
                true
            }
            None => false,
        }
    }

    pub fn pending_requests(&self) -> Vec<&TemporaryEntry> {
        self.entries.values().filter(|e| e.has_request()).collect()
    }

    /// Replace the payload of a stored change.
    pub fn update_payload(&mut self, id: &Uuid, payload: String) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.change.payload = Some(payload);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemporaryEntry> {
        self.entries.values()
    }
}

// ───────────────────────────────────────────────────────────────────
// Realised
// ───────────────────────────────────────────────────────────────────

/// A committed change and the host object it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RealisedEntry {
    pub change: Change,
    pub object: ObjectHandle,
    pub locked_by: Option<String>,
}

#[derive(Debug, Default)]
pub struct RealisedChangeTable {
    entries: HashMap<Uuid, RealisedEntry>,
    by_object: HashMap<ObjectHandle, Uuid>,
}

impl RealisedChangeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, change: Change, object: ObjectHandle) {
        if let Some(previous) = self.entries.get(&change.id) {
            self.by_object.remove(&previous.object);
        }
        self.by_object.insert(object, change.id);
        self.entries.insert(
            change.id,
            RealisedEntry {
                change,
                object,
                locked_by: None,
            },
        );
    }

    pub fn get(&self, id: &Uuid) -> Option<&RealisedEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.entries.contains_key(id)
    }

    pub fn object_of(&self, id: &Uuid) -> Option<ObjectHandle> {
        self.entries.get(id).map(|entry| entry.object)
    }

    pub fn id_of(&self, object: &ObjectHandle) -> Option<Uuid> {
        self.by_object.get(object).copied()
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<RealisedEntry> {
        let entry = self.entries.remove(id)?;
        self.by_object.remove(&entry.object);
        Some(entry)
    }

    /// Set or clear the lock owner. Returns `false` for an unknown id.
    pub fn set_lock(&mut self, id: &Uuid, owner: Option<String>) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.locked_by = owner;
                true
            }
            None => false,
        }
    }

    pub fn locked_by(&self, id: &Uuid) -> Option<&str> {
        self.entries.get(id)?.locked_by.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
