use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::group::Group;
use crate::models::member::{JoinGroupRequest, Member};
use crate::services::groups::GroupService;

pub struct MemberService;

impl MemberService {
    /// Join an open, unfrozen group. The capacity check and the insert run
    /// under the group's row lock so two racing joins cannot both squeeze
    /// into the last slot.
    pub async fn join(
        pool: &PgPool,
        group_id: Uuid,
        req: &JoinGroupRequest,
    ) -> Result<Member, ApiError> {
        let mut tx = pool.begin().await?;
        let group = GroupService::fetch_for_update(&mut tx, group_id).await?;

        if group.is_frozen {
            return Err(ApiError::GroupFrozen);
        }
        if !group.is_open {
            return Err(ApiError::GroupClosed);
        }
        if let Some(hash) = &group.password_hash {
            let given = req.password.as_deref().unwrap_or_default();
            if !bcrypt::verify(given, hash).map_err(anyhow::Error::from)? {
                return Err(ApiError::InvalidPassword);
            }
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members WHERE group_id = $1")
            .bind(group_id)
            .fetch_one(&mut *tx)
            .await?;
        ensure_capacity(count, group.capacity)?;

        let already: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM members WHERE group_id = $1 AND member_code = $2)",
        )
        .bind(group_id)
        .bind(req.credential)
        .fetch_one(&mut *tx)
        .await?;
        if already {
            return Err(ApiError::AlreadyMember);
        }

        let member = Self::insert_member(
            &mut tx,
            &group,
            req.credential,
            &req.name,
            req.code_name.as_deref(),
        )
        .await?;

        tx.commit().await?;
        Ok(member)
    }

    /// Organizer removal of a member by name. Deliberately not gated on the
    /// frozen flag; a kick on a frozen group cascades the member's
    /// assignment rows.
    pub async fn kick(
        pool: &PgPool,
        group_id: Uuid,
        credential: Uuid,
        member_name: &str,
    ) -> Result<Member, ApiError> {
        let mut tx = pool.begin().await?;
        let group = GroupService::fetch_for_update(&mut tx, group_id).await?;
        if !group.is_organizer(credential) {
            return Err(ApiError::NotAuthorized);
        }
        let member = sqlx::query_as::<_, Member>(
            "SELECT * FROM members WHERE group_id = $1 AND LOWER(name) = LOWER($2)",
        )
        .bind(group_id)
        .bind(member_name)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ApiError::NotFound)?;

        sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(member.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(member)
    }

    /// A member leaves on their own; refused once the draw locked the group.
    pub async fn leave(
        pool: &PgPool,
        group_id: Uuid,
        credential: Uuid,
    ) -> Result<Member, ApiError> {
        let mut tx = pool.begin().await?;
        let group = GroupService::fetch_for_update(&mut tx, group_id).await?;
        if group.is_frozen {
            return Err(ApiError::GroupFrozen);
        }
        let member = sqlx::query_as::<_, Member>(
            "SELECT * FROM members WHERE group_id = $1 AND member_code = $2",
        )
        .bind(group_id)
        .bind(credential)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ApiError::NotFound)?;

        sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(member.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(member)
    }

    /// Members in render order: code name when present, else real name.
    pub async fn list(pool: &PgPool, group_id: Uuid) -> Result<Vec<Member>, ApiError> {
        let members = sqlx::query_as::<_, Member>(
            "SELECT * FROM members WHERE group_id = $1
             ORDER BY LOWER(COALESCE(code_name, name))",
        )
        .bind(group_id)
        .fetch_all(pool)
        .await?;
        Ok(members)
    }

    pub async fn find_by_credential(
        pool: &PgPool,
        group_id: Uuid,
        credential: Uuid,
    ) -> Result<Option<Member>, ApiError> {
        let member = sqlx::query_as::<_, Member>(
            "SELECT * FROM members WHERE group_id = $1 AND member_code = $2",
        )
        .bind(group_id)
        .bind(credential)
        .fetch_optional(pool)
        .await?;
        Ok(member)
    }

    /// Resolve the caller to a member or refuse the command.
    pub async fn require_member(
        pool: &PgPool,
        group_id: Uuid,
        credential: Uuid,
    ) -> Result<Member, ApiError> {
        Self::find_by_credential(pool, group_id, credential)
            .await?
            .ok_or(ApiError::NotAuthorized)
    }

    /// Shared insert path for joins and for enrolling the organizer at
    /// creation. Resolves the code name according to the group's naming
    /// mode and claims pool names transactionally.
    pub async fn insert_member(
        tx: &mut Transaction<'_, Postgres>,
        group: &Group,
        credential: Uuid,
        name: &str,
        requested_code_name: Option<&str>,
    ) -> Result<Member, ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::validation("a name is required"));
        }

        let name_taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM members WHERE group_id = $1 AND LOWER(name) = LOWER($2))",
        )
        .bind(group.id)
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;
        if name_taken {
            return Err(ApiError::DuplicateName);
        }

        // (pool row id, code name) when the name comes from the pool.
        let mut claimed_pool_row: Option<Uuid> = None;
        let code_name: Option<String> = if !group.use_code_names {
            None
        } else if group.auto_assign_code_names {
            let row: Option<(Uuid, String)> = sqlx::query_as(
                "SELECT id, name FROM code_name_pool
                 WHERE group_id = $1 AND claimed_by IS NULL
                 ORDER BY random() LIMIT 1
                 FOR UPDATE",
            )
            .bind(group.id)
            .fetch_optional(&mut **tx)
            .await?;
            let (row_id, pool_name) = row.ok_or_else(|| {
                ApiError::validation("no code names left in the pool")
            })?;
            claimed_pool_row = Some(row_id);
            Some(pool_name)
        } else {
            let requested = requested_code_name.map(str::trim).filter(|c| !c.is_empty());
            if group.use_custom_code_names && requested.is_none() {
                return Err(ApiError::validation(
                    "a code name is required to join this group",
                ));
            }
            if let Some(code) = requested {
                let taken: bool = sqlx::query_scalar(
                    "SELECT EXISTS(
                         SELECT 1 FROM members
                         WHERE group_id = $1 AND LOWER(code_name) = LOWER($2)
                     )",
                )
                .bind(group.id)
                .bind(code)
                .fetch_one(&mut **tx)
                .await?;
                if taken {
                    return Err(ApiError::DuplicateName);
                }
            }
            requested.map(str::to_string)
        };

        let member = sqlx::query_as::<_, Member>(
            "INSERT INTO members (group_id, member_code, name, code_name)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(group.id)
        .bind(credential)
        .bind(name)
        .bind(&code_name)
        .fetch_one(&mut **tx)
        .await?;

        if let Some(row_id) = claimed_pool_row {
            sqlx::query("UPDATE code_name_pool SET claimed_by = $1 WHERE id = $2")
                .bind(member.id)
                .bind(row_id)
                .execute(&mut **tx)
                .await?;
        }

        Ok(member)
    }
}

fn ensure_capacity(current: i64, capacity: i32) -> Result<(), ApiError> {
    if current >= capacity as i64 {
        return Err(ApiError::CapacityExceeded);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_boundary() {
        // A group of capacity 3 holding 2 members admits one more; at 3 it
        // is full.
        assert!(ensure_capacity(2, 3).is_ok());
        assert!(matches!(
            ensure_capacity(3, 3),
            Err(ApiError::CapacityExceeded)
        ));
        assert!(matches!(
            ensure_capacity(4, 3),
            Err(ApiError::CapacityExceeded)
        ));
    }
}
