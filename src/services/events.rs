use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::warn;
use uuid::Uuid;

use crate::models::event::{group_channel, inbox_channel, GroupEvent};

/// Fan-out of committed deltas over Redis pub/sub.
///
/// Publishing is best-effort: the store is authoritative and a client that
/// misses an event resyncs on reconnect, so failures are logged and
/// swallowed rather than failing the command that already committed.
#[derive(Clone)]
pub struct EventBroadcaster {
    conn: MultiplexedConnection,
}

impl EventBroadcaster {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    /// Lifecycle/membership delta on the group topic.
    pub async fn publish_group(&self, group_id: Uuid, event: &GroupEvent) {
        self.publish(&group_channel(group_id), event).await;
    }

    /// Directed-message delta on a member's inbox topic.
    pub async fn publish_inbox(&self, member_id: Uuid, event: &GroupEvent) {
        self.publish(&inbox_channel(member_id), event).await;
    }

    async fn publish(&self, channel: &str, event: &GroupEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                warn!("event serialization failed: {e}");
                return;
            }
        };
        let mut conn = self.conn.clone();
        if let Err(e) = conn.publish::<_, _, ()>(channel, payload).await {
            warn!("event publish failed on {channel}: {e}");
        }
    }
}
