//! `Crash.RequestChange`: asking the owner of a preview to name it.
//!
//! A request carries the Id of the provisional change it is about and a
//! packet with `RequestedName`. Receiving it never creates anything; it only
//! annotates the matching temporary entry.

use crash_core::{Change, ChangeAction, PacketError, Request};

use crate::doc::CrashDoc;
use crate::error::CollabError;
use crate::event::HostEvent;
use crate::registry::{CreateAction, Definition, ReceiveAction};

pub const REQUEST_CHANGE: &str = "Crash.RequestChange";

pub fn definition() -> Definition {
    Definition::new(REQUEST_CHANGE)
        .create(CreateRequest)
        .receive(ReceiveRequest)
}

pub struct CreateRequest;

impl CreateAction for CreateRequest {
    fn action(&self) -> ChangeAction {
        ChangeAction::ADD
    }

    fn can_convert(&self, event: &HostEvent, _doc: &CrashDoc) -> bool {
        matches!(event, HostEvent::Request { requested_name, .. } if !requested_name.trim().is_empty())
    }

    fn try_convert(&self, event: &HostEvent, doc: &CrashDoc) -> Option<Vec<Change>> {
        let HostEvent::Request {
            target,
            requested_name,
        } = event
        else {
            return None;
        };
        let encoded = Request::new(requested_name.as_str())
            .to_packet()
            .encode()
            .ok()?;
        Some(vec![Change::with_id(
            *target,
            doc.current_user(),
            ChangeAction::ADD,
            REQUEST_CHANGE,
            Some(encoded),
        )])
    }
}

pub struct ReceiveRequest;

impl ReceiveAction for ReceiveRequest {
    fn name(&self) -> &str {
        "request.annotate"
    }

    fn can_receive(&self, change: &Change) -> bool {
        change.has(ChangeAction::ADD)
    }

    fn apply(&self, doc: &mut CrashDoc, change: &Change) -> Result<(), CollabError> {
        let decoded = change
            .payload
            .as_deref()
            .map(Request::decode)
            .unwrap_or_else(|| Err(PacketError::Missing(crash_core::REQUESTED_NAME.into())));

        let request = match decoded {
            Ok(request) => request,
            Err(PacketError::Missing(key)) => {
                doc.log()
                    .debug(format!("Request {} has no {key}; ignored", change.id));
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if doc
            .temporary
            .annotate_request(&change.id, change.owner.as_str(), request.requested_name.as_str())
        {
            doc.log().info(format!(
                "{} asks to name {} '{}'",
                change.owner, change.id, request.requested_name
            ));
        } else {
            doc.log()
                .debug(format!("Request for unknown temporary change {}", change.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::geometry::GEOMETRY_CHANGE;
    use crate::pipeline::ChangeCreator;
    use crash_core::PayloadPacket;

    fn doc_with_preview() -> (CrashDoc, Change) {
        let mut doc = CrashDoc::in_memory("doc", "Jack").unwrap();
        let preview = Change::new(
            "Jack",
            ChangeAction::ADD | ChangeAction::TEMPORARY,
            GEOMETRY_CHANGE,
            Some("wall".into()),
        );
        doc.apply_now(&preview).unwrap();
        (doc, preview)
    }

    #[test]
    fn test_request_annotates_temporary_entry() {
        let (mut doc, preview) = doc_with_preview();
        let creator = ChangeCreator::new(doc.registry().clone());
        let event = HostEvent::Request {
            target: preview.id,
            requested_name: "North wall".into(),
        };

        let mut changes = creator.create(event.requested_action(), &event, &doc);
        assert_eq!(changes.len(), 1);
        let mut request = changes.remove(0);
        request.owner = "Anna".into();
        doc.apply_now(&request).unwrap();

        let pending = doc.temporary.pending_requests();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].requested_by.as_deref(), Some("Anna"));
        assert_eq!(pending[0].requested_name.as_deref(), Some("North wall"));
    }

    #[test]
    fn test_request_without_key_is_noop() {
        let (mut doc, preview) = doc_with_preview();
        let payload = PayloadPacket::new("").with_update("Other", "x").encode().unwrap();
        let request = Change::with_id(preview.id, "Anna", ChangeAction::ADD, REQUEST_CHANGE, Some(payload));

        doc.apply_now(&request).unwrap();
        assert!(doc.temporary.pending_requests().is_empty());

        let bare = Change::with_id(preview.id, "Anna", ChangeAction::ADD, REQUEST_CHANGE, None);
        doc.apply_now(&bare).unwrap();
        assert!(doc.temporary.pending_requests().is_empty());
    }

    #[test]
    fn test_request_for_missing_entry_is_noop() {
        let mut doc = CrashDoc::in_memory("doc", "Jack").unwrap();
        let payload = Request::new("Door").to_packet().encode().unwrap();
        let request = Change::new("Anna", ChangeAction::ADD, REQUEST_CHANGE, Some(payload));

        doc.apply_now(&request).unwrap();
        assert!(doc.temporary.is_empty());
        assert!(doc.log().contains("unknown temporary change"));
    }
}
