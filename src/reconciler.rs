//! Client-side reconciliation of server-pushed events.
//!
//! One `GroupView` lives per connected session. The server store stays
//! authoritative: events are merged as hints, keyed by stable ids (member
//! name, message id) so redelivery and the echo of the session's own
//! commands collapse into no-ops. On reconnect the view is rebuilt from an
//! authoritative snapshot instead of replaying the stream.

use std::collections::{BTreeMap, HashSet};

use uuid::Uuid;

use crate::models::event::{GroupEvent, GroupSnapshot};
use crate::models::member::MemberOut;
use crate::models::message::MessageOut;

#[derive(Debug, Default)]
pub struct GroupView {
    pub is_open: bool,
    pub is_frozen: bool,
    // Keyed by lowercased name: the server enforces case-insensitive
    // uniqueness, so the key is stable across redeliveries.
    members: BTreeMap<String, MemberOut>,
    messages: Vec<MessageOut>,
    seen_messages: HashSet<Uuid>,
}

impl GroupView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: GroupSnapshot) -> Self {
        let mut view = Self::new();
        view.resync(snapshot);
        view
    }

    /// Replace the whole view with an authoritative snapshot; called on
    /// connect and after every reconnect.
    pub fn resync(&mut self, snapshot: GroupSnapshot) {
        self.is_open = snapshot.is_open;
        self.is_frozen = snapshot.is_frozen;
        self.members = snapshot
            .members
            .into_iter()
            .map(|m| (m.name.to_lowercase(), m))
            .collect();
        self.seen_messages = snapshot.messages.iter().map(|m| m.id).collect();
        self.messages = snapshot.messages;
    }

    /// Append a message this session just sent, before its event echoes
    /// back. The echo then deduplicates by id.
    pub fn record_local_message(&mut self, message: MessageOut) {
        if self.seen_messages.insert(message.id) {
            self.messages.push(message);
        }
    }

    /// Merge one inbound event. Idempotent: applying the same event twice
    /// leaves the view unchanged. Returns whether anything changed.
    pub fn apply(&mut self, event: &GroupEvent) -> bool {
        match event {
            GroupEvent::MemberJoined { name, code_name } => {
                let key = name.to_lowercase();
                if self.members.contains_key(&key) {
                    return false;
                }
                self.members.insert(
                    key,
                    MemberOut {
                        name: name.clone(),
                        code_name: code_name.clone(),
                        joined_at: chrono::Utc::now(),
                    },
                );
                true
            }
            GroupEvent::MemberLeft { name } => self.members.remove(&name.to_lowercase()).is_some(),
            GroupEvent::GroupOpened => !std::mem::replace(&mut self.is_open, true),
            GroupEvent::GroupClosed => std::mem::replace(&mut self.is_open, false),
            GroupEvent::GroupLocked => !std::mem::replace(&mut self.is_frozen, true),
            GroupEvent::GroupUnlocked => std::mem::replace(&mut self.is_frozen, false),
            GroupEvent::NewMessage { message } => {
                if !self.seen_messages.insert(message.id) {
                    return false;
                }
                self.messages.push(message.clone());
                true
            }
            GroupEvent::ReadMessage { ids } => {
                let mut changed = false;
                for message in &mut self.messages {
                    if !message.is_read && ids.contains(&message.id) {
                        message.is_read = true;
                        changed = true;
                    }
                }
                changed
            }
        }
    }

    /// Members in render order: code name when present, else real name.
    pub fn members(&self) -> Vec<&MemberOut> {
        let mut members: Vec<&MemberOut> = self.members.values().collect();
        members.sort_by_key(|m| m.code_name.as_deref().unwrap_or(&m.name).to_lowercase());
        members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn messages(&self) -> &[MessageOut] {
        &self.messages
    }

    pub fn unread_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_read).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn joined(name: &str) -> GroupEvent {
        GroupEvent::MemberJoined {
            name: name.to_string(),
            code_name: None,
        }
    }

    fn msg(id: Uuid, body: &str) -> MessageOut {
        MessageOut {
            id,
            message_type: "santa".to_string(),
            sender_label: "Secret Santa".to_string(),
            recipient_id: None,
            body: body.to_string(),
            is_read: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn duplicate_member_joined_is_dropped() {
        let mut view = GroupView::new();
        assert!(view.apply(&joined("Alice")));
        assert!(!view.apply(&joined("Alice")));
        // Case-insensitive: "alice" is the same member redelivered.
        assert!(!view.apply(&joined("alice")));
        assert_eq!(view.member_count(), 1);
    }

    #[test]
    fn member_left_then_redelivered_is_a_noop() {
        let mut view = GroupView::new();
        view.apply(&joined("Alice"));
        let left = GroupEvent::MemberLeft {
            name: "Alice".to_string(),
        };
        assert!(view.apply(&left));
        assert!(!view.apply(&left));
        assert_eq!(view.member_count(), 0);
    }

    #[test]
    fn own_message_echo_does_not_double_append() {
        let mut view = GroupView::new();
        let id = Uuid::new_v4();
        view.record_local_message(msg(id, "guess who"));

        // The broadcast comes back to the sender over the same channel.
        let echo = GroupEvent::NewMessage {
            message: msg(id, "guess who"),
        };
        assert!(!view.apply(&echo));
        assert_eq!(view.messages().len(), 1);
    }

    #[test]
    fn lifecycle_flags_are_idempotent() {
        let mut view = GroupView::new();
        assert!(view.apply(&GroupEvent::GroupLocked));
        assert!(!view.apply(&GroupEvent::GroupLocked));
        assert!(view.is_frozen);
        assert!(view.apply(&GroupEvent::GroupUnlocked));
        assert!(!view.apply(&GroupEvent::GroupUnlocked));
        assert!(!view.is_frozen);
    }

    #[test]
    fn read_marks_are_idempotent() {
        let mut view = GroupView::new();
        let id = Uuid::new_v4();
        view.apply(&GroupEvent::NewMessage {
            message: msg(id, "hello"),
        });
        assert_eq!(view.unread_count(), 1);

        let read = GroupEvent::ReadMessage { ids: vec![id] };
        assert!(view.apply(&read));
        assert_eq!(view.unread_count(), 0);
        // Second delivery changes nothing.
        assert!(!view.apply(&read));
        assert_eq!(view.unread_count(), 0);
    }

    #[test]
    fn resync_replaces_the_view() {
        let mut view = GroupView::new();
        view.apply(&joined("Ghost"));
        view.apply(&GroupEvent::NewMessage {
            message: msg(Uuid::new_v4(), "stale"),
        });

        let snapshot = GroupSnapshot {
            is_open: false,
            is_frozen: true,
            members: vec![MemberOut {
                name: "Alice".to_string(),
                code_name: Some("Comet".to_string()),
                joined_at: Utc::now(),
            }],
            messages: vec![],
        };
        view.resync(snapshot);

        assert_eq!(view.member_count(), 1);
        assert!(view.messages().is_empty());
        assert!(view.is_frozen);
        assert!(!view.is_open);

        // Events arriving after the resync still dedup correctly.
        assert!(!view.apply(&joined("alice")));
    }
}
