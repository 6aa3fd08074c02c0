use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::member::MemberOut;
use crate::models::message::MessageOut;

/// Delta published after a committed state change. Within one group the
/// publication order matches the commit order; payloads carry the ids a
/// subscriber needs to apply them without a follow-up query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupEvent {
    MemberJoined {
        name: String,
        code_name: Option<String>,
    },
    MemberLeft {
        name: String,
    },
    GroupOpened,
    GroupClosed,
    GroupLocked,
    GroupUnlocked,
    NewMessage {
        message: MessageOut,
    },
    ReadMessage {
        ids: Vec<Uuid>,
    },
}

/// Lifecycle and membership topic, one per group.
pub fn group_channel(group_id: Uuid) -> String {
    format!("group:{group_id}")
}

/// Directed-message topic, one per member.
pub fn inbox_channel(member_id: Uuid) -> String {
    format!("inbox:{member_id}")
}

/// Authoritative snapshot a client fetches on (re)connect before applying
/// live events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub is_open: bool,
    pub is_frozen: bool,
    pub members: Vec<MemberOut>,
    pub messages: Vec<MessageOut>,
}
