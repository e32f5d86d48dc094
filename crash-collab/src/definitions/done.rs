//! `Crash.DoneChange`: committing provisional edits.
//!
//! Two release forms share one change type:
//!
//! ```text
//! targeted     Owner = ""      Id = X   ──▸ promote temporary[X]
//! owner-range  Owner = "Jack"  Id = new ──▸ promote every temporary entry
//!                                          owned by jack (any case)
//! ```
//!
//! Promotion takes the entry out of the temporary table, turns it into a
//! plain `ADD` and runs it through its own type's receive-actions right
//! away, exactly as if the committed change had just arrived. Undo history
//! is cleared afterwards. An entry that cannot be promoted is logged and
//! skipped; the rest of the release still goes through.

use crash_core::{Change, ChangeAction};
use uuid::Uuid;

use crate::doc::CrashDoc;
use crate::error::CollabError;
use crate::event::HostEvent;
use crate::registry::{CreateAction, Definition, ReceiveAction};

pub const DONE_CHANGE: &str = "Crash.DoneChange";

pub fn definition() -> Definition {
    Definition::new(DONE_CHANGE)
        .create(CreateRelease)
        .receive(ReceiveRelease)
}

/// Release exactly the temporary entry `id`.
pub fn targeted_release(id: Uuid) -> Change {
    Change::with_id(id, "", ChangeAction::RELEASE, DONE_CHANGE, None)
}

/// Release every temporary entry owned by `owner`.
pub fn owner_release(owner: impl Into<String>) -> Change {
    Change::new(owner, ChangeAction::RELEASE, DONE_CHANGE, None)
}

pub struct CreateRelease;

impl CreateAction for CreateRelease {
    fn action(&self) -> ChangeAction {
        ChangeAction::RELEASE
    }

    fn can_convert(&self, event: &HostEvent, _doc: &CrashDoc) -> bool {
        match event {
            HostEvent::Done => true,
            HostEvent::ReleaseObjects { ids } => !ids.is_empty(),
            _ => false,
        }
    }

    fn try_convert(&self, event: &HostEvent, doc: &CrashDoc) -> Option<Vec<Change>> {
        match event {
            HostEvent::Done => Some(vec![owner_release(doc.current_user())]),
            HostEvent::ReleaseObjects { ids } => {
                Some(ids.iter().copied().map(targeted_release).collect())
            }
            _ => None,
        }
    }
}

pub struct ReceiveRelease;

/// Result of promoting one temporary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    Promoted,
    Missing,
    Rejected,
}

/// Promote the temporary entry `id`.
pub fn promote(doc: &mut CrashDoc, id: Uuid) -> Promotion {
    let Some(entry) = doc.temporary.remove(&id) else {
        doc.log()
            .debug(format!("Release skipped: {id} is not a temporary change"));
        return Promotion::Missing;
    };

    let promoted = entry.change.promoted();
    match doc.apply_now(&promoted) {
        Ok(0) => {
            doc.log().warn(format!(
                "Release skipped: no receive action of {} accepts {id}",
                promoted.change_type
            ));
            Promotion::Rejected
        }
        Ok(_) => Promotion::Promoted,
        Err(e) => {
            doc.log().warn(format!("Release of {id} failed: {e}"));
            Promotion::Rejected
        }
    }
}

impl ReceiveAction for ReceiveRelease {
    fn name(&self) -> &str {
        "done.release"
    }

    fn can_receive(&self, change: &Change) -> bool {
        change.has(ChangeAction::RELEASE)
    }

    fn apply(&self, doc: &mut CrashDoc, change: &Change) -> Result<(), CollabError> {
        let ids = if change.owner.is_empty() {
            vec![change.id]
        } else {
            doc.temporary.ids_owned_by(&change.owner)
        };

        let promoted = ids
            .into_iter()
            .filter(|&id| promote(doc, id) == Promotion::Promoted)
            .count();

        if promoted > 0 {
            doc.dispatcher.clear_undo();
            doc.log().info(format!(
                "Released {promoted} change(s) for {}",
                if change.owner.is_empty() { "target" } else { change.owner.as_str() }
            ));
        }
        Ok(())
    }
}
