use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One giver→receiver edge of a draw. The rows of a group form a
/// fixed-point-free bijection over its member set and exist only while the
/// group is frozen.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assignment {
    pub id: Uuid,
    pub group_id: Uuid,
    pub giver_id: Uuid,
    pub receiver_id: Uuid,
    pub created_at: DateTime<Utc>,
}
