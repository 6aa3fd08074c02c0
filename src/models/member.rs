use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id: Uuid,
    pub group_id: Uuid,
    #[serde(skip_serializing)]
    pub member_code: Uuid,
    pub name: String,
    pub code_name: Option<String>,
    pub joined_at: DateTime<Utc>,
}

impl Member {
    /// The identity a member presents during the exchange: their code name
    /// when one is set, their real name otherwise.
    pub fn display_name(&self) -> &str {
        self.code_name.as_deref().unwrap_or(&self.name)
    }
}

/// Public listing entry; never carries the member's credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberOut {
    pub name: String,
    pub code_name: Option<String>,
    pub joined_at: DateTime<Utc>,
}

impl From<&Member> for MemberOut {
    fn from(m: &Member) -> Self {
        MemberOut {
            name: m.name.clone(),
            code_name: m.code_name.clone(),
            joined_at: m.joined_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JoinGroupRequest {
    pub credential: Uuid,
    pub name: String,
    pub password: Option<String>,
    pub code_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct KickMemberRequest {
    pub credential: Uuid,
    pub member_name: String,
}

/// Body of commands that only need the caller's credential.
#[derive(Debug, Deserialize)]
pub struct CredentialRequest {
    pub credential: Uuid,
}

/// Query-string variant for GET endpoints and the WebSocket upgrade.
#[derive(Debug, Deserialize)]
pub struct CredentialQuery {
    pub credential: Option<Uuid>,
}
