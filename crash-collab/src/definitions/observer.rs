use crash_core::Change;

use crate::doc::CrashDoc;
use crate::error::CollabError;
use crate::registry::ReceiveAction;

/// Sees every change with an owner and adds unseen owners to the
/// document's user list.
pub struct UserObserver;

impl ReceiveAction for UserObserver {
    fn name(&self) -> &str {
        "observe.users"
    }

    fn can_receive(&self, change: &Change) -> bool {
        !change.owner.is_empty()
    }

    fn apply(&self, doc: &mut CrashDoc, change: &Change) -> Result<(), CollabError> {
        if doc.users.add(&change.owner) {
            doc.log().info(format!("{} joined", change.owner));
        }
        doc.log().trace(format!(
            "{} {} {} from {}",
            change.change_type, change.action, change.id, change.owner
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ChangeReceiver;
    use crash_core::ChangeAction;

    #[test]
    fn test_new_owner_becomes_user() {
        let mut doc = CrashDoc::in_memory("doc", "Anna").unwrap();
        let receiver = ChangeReceiver::new(doc.registry().clone(), doc.idle_sender());

        receiver
            .receive(&Change::new("Jack", ChangeAction::UPDATE, "Any.Type", None))
            .unwrap();
        receiver
            .receive(&Change::new("", ChangeAction::RELEASE, "Any.Type", None))
            .unwrap();
        doc.drain_idle();

        assert!(doc.users.get("jack").is_some());
        assert_eq!(doc.users.len(), 2);
    }
}
