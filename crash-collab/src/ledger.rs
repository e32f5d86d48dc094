//! Relay-side document history.
//!
//! The relay does not understand payloads. It keeps just enough of the
//! change stream to bring a late joiner up to the current state:
//!
//! ```text
//! ADD / UPDATE / TRANSFORM          appended in arrival order
//! LOCKED / UNLOCKED                  only the latest per Id is kept
//! REMOVE for a known Id             drops every record with that Id
//! geometry REMOVE, unknown Id        not kept
//! RELEASE (targeted)                clears TEMPORARY on records with that Id
//! RELEASE (owner-range)             clears TEMPORARY on the owner's records
//! camera                            only the latest per owner is kept
//! request                           not kept
//! ```
//!
//! Replaying [`ChangeLedger::snapshot`] through a fresh session yields the
//! same document the live peers have.

use crash_core::{same_user, Change, ChangeAction};
use uuid::Uuid;

use crate::definitions::camera::CAMERA_CHANGE;
use crate::definitions::done::DONE_CHANGE;
use crate::definitions::geometry::GEOMETRY_CHANGE;
use crate::definitions::request::REQUEST_CHANGE;

#[derive(Debug, Default)]
pub struct ChangeLedger {
    records: Vec<Change>,
}

impl ChangeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, change: &Change) {
        match change.change_type.as_str() {
            REQUEST_CHANGE => {}
            CAMERA_CHANGE => {
                self.records.retain(|r| {
                    r.change_type != CAMERA_CHANGE || !same_user(&r.owner, &change.owner)
                });
                self.records.push(change.clone());
            }
            DONE_CHANGE => self.release(change),
            _ if change.has(ChangeAction::REMOVE) && self.contains(&change.id) => {
                self.records.retain(|r| r.id != change.id);
            }
            // Geometry is keyed by Id; layers are keyed by path and keep
            // their removes.
            GEOMETRY_CHANGE if change.has(ChangeAction::REMOVE) => {
                log::trace!("Ledger has no {}; remove not kept", change.id);
            }
            _ if is_lock_toggle(change) => {
                self.records.retain(|r| r.id != change.id || !is_lock_toggle(r));
                self.records.push(change.clone());
            }
            _ => self.records.push(change.clone()),
        }
    }

    pub fn apply_all(&mut self, changes: &[Change]) {
        for change in changes {
            self.apply(change);
        }
    }

    fn release(&mut self, release: &Change) {
        let targeted = release.owner.is_empty();
        for record in self.records.iter_mut().filter(|r| r.is_temporary()) {
            let matches = if targeted {
                record.id == release.id
            } else {
                same_user(&record.owner, &release.owner)
            };
            if matches {
                record.action = record.action.without(ChangeAction::TEMPORARY);
            }
        }
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.records.iter().any(|r| &r.id == id)
    }

    /// Records to replay, oldest first.
    pub fn snapshot(&self) -> Vec<Change> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn is_lock_toggle(change: &Change) -> bool {
    change
        .action
        .intersects(ChangeAction::LOCKED | ChangeAction::UNLOCKED)
        && !change.action.intersects(ChangeAction::ADD | ChangeAction::REMOVE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::done::{owner_release, targeted_release};
    use crate::definitions::layer::LAYER_CHANGE;

    fn geometry(owner: &str, action: ChangeAction) -> Change {
        Change::new(owner, action, GEOMETRY_CHANGE, Some("box".into()))
    }

    #[test]
    fn test_remove_drops_known_id() {
        let mut ledger = ChangeLedger::new();
        let add = geometry("Anna", ChangeAction::ADD);
        let mut transform = geometry("Anna", ChangeAction::TRANSFORM);
        transform.id = add.id;
        let mut remove = geometry("Anna", ChangeAction::REMOVE);
        remove.id = add.id;

        ledger.apply_all(&[add, transform]);
        assert_eq!(ledger.len(), 2);
        ledger.apply(&remove);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_camera_keeps_latest_per_owner() {
        let mut ledger = ChangeLedger::new();
        for owner in ["Anna", "anna", "Jack"] {
            ledger.apply(&Change::new(owner, ChangeAction::ADD, CAMERA_CHANGE, None));
        }
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].owner, "anna");
        assert_eq!(snapshot[1].owner, "Jack");
    }

    #[test]
    fn test_targeted_release_clears_one_preview() {
        let mut ledger = ChangeLedger::new();
        let first = geometry("Jack", ChangeAction::ADD | ChangeAction::TEMPORARY);
        let second = geometry("Jack", ChangeAction::ADD | ChangeAction::TEMPORARY);
        ledger.apply_all(&[first.clone(), second.clone()]);

        ledger.apply(&targeted_release(first.id));

        let snapshot = ledger.snapshot();
        assert!(!snapshot[0].is_temporary());
        assert!(snapshot[1].is_temporary());
    }

    #[test]
    fn test_owner_release_is_case_insensitive() {
        let mut ledger = ChangeLedger::new();
        ledger.apply(&geometry("Jack", ChangeAction::ADD | ChangeAction::TEMPORARY));
        ledger.apply(&geometry("Anna", ChangeAction::ADD | ChangeAction::TEMPORARY));

        ledger.apply(&owner_release("JACK"));

        let snapshot = ledger.snapshot();
        assert!(!snapshot[0].is_temporary());
        assert!(snapshot[1].is_temporary());
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_requests_are_not_kept() {
        let mut ledger = ChangeLedger::new();
        ledger.apply(&Change::new("Anna", ChangeAction::ADD, REQUEST_CHANGE, None));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_owner_release_matches_non_ascii_names() {
        let mut ledger = ChangeLedger::new();
        ledger.apply(&geometry("Émile", ChangeAction::ADD | ChangeAction::TEMPORARY));
        assert!(same_user("Émile", "émile"));

        ledger.apply(&owner_release("émile"));
        assert!(!ledger.snapshot()[0].is_temporary());

        ledger.apply(&Change::new("Émile", ChangeAction::ADD, CAMERA_CHANGE, None));
        ledger.apply(&Change::new("ÉMILE", ChangeAction::ADD, CAMERA_CHANGE, None));
        let cameras = ledger
            .snapshot()
            .into_iter()
            .filter(|r| r.change_type == CAMERA_CHANGE)
            .count();
        assert_eq!(cameras, 1);
    }

    #[test]
    fn test_geometry_remove_for_unknown_id_is_not_kept() {
        let mut ledger = ChangeLedger::new();
        ledger.apply(&geometry("Anna", ChangeAction::REMOVE));
        assert!(ledger.is_empty());

        // Layers are matched by path, so their removes stay.
        ledger.apply(&Change::new("Anna", ChangeAction::REMOVE, LAYER_CHANGE, None));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_lock_toggles_fold_to_latest() {
        let mut ledger = ChangeLedger::new();
        let add = geometry("Anna", ChangeAction::ADD);
        ledger.apply(&add);
        for action in [
            ChangeAction::LOCKED,
            ChangeAction::UNLOCKED,
            ChangeAction::LOCKED,
        ] {
            let mut toggle = geometry("Jack", action);
            toggle.id = add.id;
            ledger.apply(&toggle);
        }

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, add.id);
        assert!(snapshot[1].has(ChangeAction::LOCKED));
    }
}
