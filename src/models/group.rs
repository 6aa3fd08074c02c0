use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const MIN_CAPACITY: i32 = 2;
pub const MAX_CAPACITY: i32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(skip_serializing)]
    pub organizer_code: Uuid,
    pub capacity: i32,
    pub is_open: bool,
    pub is_frozen: bool,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub use_code_names: bool,
    pub auto_assign_code_names: bool,
    pub use_custom_code_names: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn is_organizer(&self, credential: Uuid) -> bool {
        self.organizer_code == credential
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    /// The organizer's per-browser credential.
    pub credential: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub capacity: i32,
    #[serde(default = "default_true")]
    pub is_open: bool,
    pub password: Option<String>,
    #[serde(default)]
    pub use_code_names: bool,
    #[serde(default)]
    pub auto_assign_code_names: bool,
    #[serde(default)]
    pub use_custom_code_names: bool,
    pub expires_at: Option<DateTime<Utc>>,
    /// Reserved display names, required when code names are auto-assigned.
    #[serde(default)]
    pub code_name_pool: Vec<String>,
    /// The organizer joins as the first member.
    pub organizer_name: String,
    pub organizer_code_name: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Settings update; `None` fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateGroupSettingsRequest {
    pub credential: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub capacity: Option<i32>,
    /// `Some("")` clears the password, `Some(p)` replaces it.
    pub password: Option<String>,
    pub use_code_names: Option<bool>,
    pub auto_assign_code_names: Option<bool>,
    pub use_custom_code_names: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Replaces the unclaimed part of the reserved name pool.
    pub code_name_pool: Option<Vec<String>>,
}

/// Public view of a group, shaped for the client dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct GroupInfo {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub capacity: i32,
    pub is_open: bool,
    pub is_frozen: bool,
    pub has_password: bool,
    pub use_code_names: bool,
    pub auto_assign_code_names: bool,
    pub use_custom_code_names: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub member_count: i64,
    pub created_at: DateTime<Utc>,
    /// Set when the caller presented a credential that matches a member.
    pub you: Option<crate::models::member::MemberOut>,
    pub is_organizer: bool,
}
