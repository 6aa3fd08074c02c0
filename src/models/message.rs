use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Hard limit on message bodies, counted in characters.
pub const MAX_MESSAGE_CHARS: usize = 150;

/// Labels used instead of a sender's name in anonymized threads.
pub const SANTA_LABEL: &str = "Secret Santa";
pub const ADMIN_LABEL: &str = "Admin";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Organizer → whole group.
    Broadcast,
    /// Giver ↔ receiver; the giver side is anonymized.
    Santa,
    /// Member ↔ organizer.
    Admin,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageType::Broadcast => "broadcast",
            MessageType::Santa => "santa",
            MessageType::Admin => "admin",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MessageType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broadcast" => Ok(MessageType::Broadcast),
            "santa" => Ok(MessageType::Santa),
            "admin" => Ok(MessageType::Admin),
            _ => Err(anyhow::anyhow!("Unknown message_type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub group_id: Uuid,
    pub message_type: String,
    pub sender_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Wire shape of a message: what history queries return and what the
/// `new_message` event carries. Deliberately has no `sender_id` — the
/// anonymized label is all a client may learn about the sender.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageOut {
    pub id: Uuid,
    pub message_type: String,
    pub sender_label: String,
    pub recipient_id: Option<Uuid>,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub credential: Uuid,
    pub body: String,
    /// Organizer-only group broadcast.
    #[serde(default)]
    pub is_group_message: bool,
    /// Send to the member who gives to the caller.
    #[serde(default)]
    pub to_secret_santa: bool,
    /// Directed sends by name: organizer → member, or giver → their giftee.
    pub recipient_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub credential: Uuid,
    pub message_ids: Vec<Uuid>,
}

/// Which thread a history query targets, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadKind {
    /// Group-wide broadcasts.
    Group,
    /// Me ↔ the member giving to me.
    Santa,
    /// Me ↔ the member I give to.
    Giftee,
    /// Me ↔ the organizer (the organizer names the member instead).
    Admin,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub credential: Uuid,
    pub thread: ThreadKind,
    /// Organizer-side admin threads are keyed by member name.
    pub member_name: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl HistoryQuery {
    pub fn offset(&self) -> i64 {
        let page = self.page.unwrap_or(1).max(1);
        (page - 1) * self.per_page()
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(50).clamp(1, 100)
    }
}

/// Unread/total accounting for one inbox thread kind.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct ThreadCounts {
    pub unread: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InboxCounts {
    pub santa: ThreadCounts,
    pub giftee: ThreadCounts,
    pub admin: ThreadCounts,
    pub unread_total: i64,
}
