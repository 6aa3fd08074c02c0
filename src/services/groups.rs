use std::collections::HashSet;

use chrono::{Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::event::GroupEvent;
use crate::models::group::{
    CreateGroupRequest, Group, GroupInfo, UpdateGroupSettingsRequest, MAX_CAPACITY, MIN_CAPACITY,
};
use crate::models::member::MemberOut;
use crate::services::members::MemberService;

pub struct GroupService;

impl GroupService {
    /// Create a group and enroll the organizer as its first member.
    pub async fn create(pool: &PgPool, req: &CreateGroupRequest) -> Result<Group, ApiError> {
        if req.name.trim().is_empty() {
            return Err(ApiError::validation("the group needs a name"));
        }
        if req.organizer_name.trim().is_empty() {
            return Err(ApiError::validation("the organizer needs a name"));
        }
        validate_capacity(req.capacity)?;
        validate_expiry(req.expires_at)?;
        validate_naming_flags(
            req.use_code_names,
            req.auto_assign_code_names,
            req.use_custom_code_names,
        )?;

        let pool_names = distinct_names(&req.code_name_pool);
        if req.auto_assign_code_names {
            validate_pool_rule(pool_names.len(), req.capacity)?;
        }

        let password_hash = match req.password.as_deref().filter(|p| !p.is_empty()) {
            Some(p) => Some(bcrypt::hash(p, bcrypt::DEFAULT_COST).map_err(anyhow::Error::from)?),
            None => None,
        };

        let mut tx = pool.begin().await?;

        let group = sqlx::query_as::<_, Group>(
            "INSERT INTO groups
                 (name, description, organizer_code, capacity, is_open, password_hash,
                  use_code_names, auto_assign_code_names, use_custom_code_names, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING *",
        )
        .bind(req.name.trim())
        .bind(&req.description)
        .bind(req.credential)
        .bind(req.capacity)
        .bind(req.is_open)
        .bind(&password_hash)
        .bind(req.use_code_names)
        .bind(req.auto_assign_code_names)
        .bind(req.use_custom_code_names)
        .bind(req.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        for name in &pool_names {
            sqlx::query("INSERT INTO code_name_pool (group_id, name) VALUES ($1, $2)")
                .bind(group.id)
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }

        MemberService::insert_member(
            &mut tx,
            &group,
            req.credential,
            &req.organizer_name,
            req.organizer_code_name.as_deref(),
        )
        .await?;

        tx.commit().await?;
        Ok(group)
    }

    pub async fn fetch(pool: &PgPool, id: Uuid) -> Result<Group, ApiError> {
        sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(ApiError::NotFound)
    }

    /// Lock the group row for the rest of the transaction. Every
    /// read-modify-write on group state goes through this.
    pub async fn fetch_for_update(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<Group, ApiError> {
        sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(ApiError::NotFound)
    }

    pub async fn member_count(pool: &PgPool, id: Uuid) -> Result<i64, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members WHERE group_id = $1")
            .bind(id)
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// Public view of a group plus the caller's own membership, if any.
    pub async fn info(
        pool: &PgPool,
        id: Uuid,
        credential: Option<Uuid>,
    ) -> Result<GroupInfo, ApiError> {
        let group = Self::fetch(pool, id).await?;
        let member_count = Self::member_count(pool, id).await?;
        let you = match credential {
            Some(code) => MemberService::find_by_credential(pool, id, code)
                .await?
                .as_ref()
                .map(MemberOut::from),
            None => None,
        };
        let is_organizer = credential.is_some_and(|c| group.is_organizer(c));
        Ok(GroupInfo {
            id: group.id,
            name: group.name,
            description: group.description,
            capacity: group.capacity,
            is_open: group.is_open,
            is_frozen: group.is_frozen,
            has_password: group.password_hash.is_some(),
            use_code_names: group.use_code_names,
            auto_assign_code_names: group.auto_assign_code_names,
            use_custom_code_names: group.use_custom_code_names,
            expires_at: group.expires_at,
            member_count,
            created_at: group.created_at,
            you,
            is_organizer,
        })
    }

    /// Flip the joinability of an unfrozen group.
    pub async fn toggle_open(
        pool: &PgPool,
        id: Uuid,
        credential: Uuid,
    ) -> Result<(Group, GroupEvent), ApiError> {
        let mut tx = pool.begin().await?;
        let group = Self::fetch_for_update(&mut tx, id).await?;
        if !group.is_organizer(credential) {
            return Err(ApiError::NotAuthorized);
        }
        if group.is_frozen {
            return Err(ApiError::GroupFrozen);
        }
        let group = sqlx::query_as::<_, Group>(
            "UPDATE groups SET is_open = NOT is_open, updated_at = now()
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let event = if group.is_open {
            GroupEvent::GroupOpened
        } else {
            GroupEvent::GroupClosed
        };
        Ok((group, event))
    }

    /// Organizer settings update; rejected while frozen. The reserved name
    /// pool must keep covering the capacity whenever auto-assignment is on.
    pub async fn update_settings(
        pool: &PgPool,
        id: Uuid,
        req: &UpdateGroupSettingsRequest,
    ) -> Result<Group, ApiError> {
        let mut tx = pool.begin().await?;
        let group = Self::fetch_for_update(&mut tx, id).await?;
        if !group.is_organizer(req.credential) {
            return Err(ApiError::NotAuthorized);
        }
        if group.is_frozen {
            return Err(ApiError::GroupFrozen);
        }

        let name = match &req.name {
            Some(n) if n.trim().is_empty() => {
                return Err(ApiError::validation("the group needs a name"))
            }
            Some(n) => n.trim().to_string(),
            None => group.name.clone(),
        };
        let capacity = req.capacity.unwrap_or(group.capacity);
        validate_capacity(capacity)?;
        let member_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM members WHERE group_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if (capacity as i64) < member_count {
            return Err(ApiError::validation(
                "capacity cannot drop below the current member count",
            ));
        }

        let expires_at = req.expires_at.or(group.expires_at);
        if req.expires_at.is_some() {
            validate_expiry(expires_at)?;
        }

        let use_code_names = req.use_code_names.unwrap_or(group.use_code_names);
        let auto_assign = req
            .auto_assign_code_names
            .unwrap_or(group.auto_assign_code_names);
        let use_custom = req
            .use_custom_code_names
            .unwrap_or(group.use_custom_code_names);
        validate_naming_flags(use_code_names, auto_assign, use_custom)?;

        let password_hash = match req.password.as_deref() {
            Some("") => None,
            Some(p) => Some(bcrypt::hash(p, bcrypt::DEFAULT_COST).map_err(anyhow::Error::from)?),
            None => group.password_hash.clone(),
        };

        // Replace the unclaimed part of the pool; claimed names stay.
        if let Some(new_pool) = &req.code_name_pool {
            sqlx::query("DELETE FROM code_name_pool WHERE group_id = $1 AND claimed_by IS NULL")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            let claimed: Vec<String> = sqlx::query_scalar(
                "SELECT LOWER(name) FROM code_name_pool WHERE group_id = $1",
            )
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;
            let mut seen: HashSet<String> = claimed.into_iter().collect();
            for name in new_pool {
                let trimmed = name.trim();
                if trimmed.is_empty() || !seen.insert(trimmed.to_lowercase()) {
                    continue;
                }
                sqlx::query("INSERT INTO code_name_pool (group_id, name) VALUES ($1, $2)")
                    .bind(id)
                    .bind(trimmed)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        if auto_assign {
            let pool_size: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM code_name_pool WHERE group_id = $1")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
            validate_pool_rule(pool_size as usize, capacity)?;
        }

        let group = sqlx::query_as::<_, Group>(
            "UPDATE groups SET
                 name = $1, description = COALESCE($2, description), capacity = $3,
                 password_hash = $4, use_code_names = $5, auto_assign_code_names = $6,
                 use_custom_code_names = $7, expires_at = $8, updated_at = now()
             WHERE id = $9 RETURNING *",
        )
        .bind(&name)
        .bind(&req.description)
        .bind(capacity)
        .bind(&password_hash)
        .bind(use_code_names)
        .bind(auto_assign)
        .bind(use_custom)
        .bind(expires_at)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(group)
    }

    /// Hard delete, permitted only once every member is gone.
    pub async fn delete(pool: &PgPool, id: Uuid, credential: Uuid) -> Result<(), ApiError> {
        let mut tx = pool.begin().await?;
        let group = Self::fetch_for_update(&mut tx, id).await?;
        if !group.is_organizer(credential) {
            return Err(ApiError::NotAuthorized);
        }
        let member_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM members WHERE group_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if member_count > 0 {
            return Err(ApiError::validation("the group still has members"));
        }
        sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

fn validate_capacity(capacity: i32) -> Result<(), ApiError> {
    if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
        return Err(ApiError::validation(format!(
            "capacity must be between {MIN_CAPACITY} and {MAX_CAPACITY}"
        )));
    }
    Ok(())
}

fn validate_expiry(expires_at: Option<chrono::DateTime<Utc>>) -> Result<(), ApiError> {
    if let Some(at) = expires_at {
        let horizon = Utc::now() + Duration::days(365);
        if at > horizon {
            return Err(ApiError::validation("expiry must be within one year"));
        }
        if at < Utc::now() {
            return Err(ApiError::validation("expiry is in the past"));
        }
    }
    Ok(())
}

fn validate_naming_flags(
    use_code_names: bool,
    auto_assign: bool,
    use_custom: bool,
) -> Result<(), ApiError> {
    if (auto_assign || use_custom) && !use_code_names {
        return Err(ApiError::validation(
            "code name modes require code names to be enabled",
        ));
    }
    if auto_assign && use_custom {
        return Err(ApiError::validation(
            "auto-assigned and custom code names are mutually exclusive",
        ));
    }
    Ok(())
}

/// Distinct names available must meet or exceed capacity, at every mutation.
fn validate_pool_rule(distinct_names: usize, capacity: i32) -> Result<(), ApiError> {
    if distinct_names < capacity as usize {
        return Err(ApiError::validation(
            "the code name pool must have at least as many names as the capacity",
        ));
    }
    Ok(())
}

fn distinct_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty() && seen.insert(n.to_lowercase()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_bounds() {
        assert!(validate_capacity(1).is_err());
        assert!(validate_capacity(2).is_ok());
        assert!(validate_capacity(100).is_ok());
        assert!(validate_capacity(101).is_err());
    }

    #[test]
    fn expiry_must_be_within_a_year() {
        assert!(validate_expiry(None).is_ok());
        assert!(validate_expiry(Some(Utc::now() + Duration::days(30))).is_ok());
        assert!(validate_expiry(Some(Utc::now() + Duration::days(400))).is_err());
        assert!(validate_expiry(Some(Utc::now() - Duration::days(1))).is_err());
    }

    #[test]
    fn naming_flags_are_exclusive() {
        assert!(validate_naming_flags(true, true, false).is_ok());
        assert!(validate_naming_flags(true, false, true).is_ok());
        assert!(validate_naming_flags(true, true, true).is_err());
        assert!(validate_naming_flags(false, true, false).is_err());
    }

    #[test]
    fn pool_must_cover_capacity() {
        assert!(validate_pool_rule(5, 5).is_ok());
        assert!(validate_pool_rule(4, 5).is_err());
    }

    #[test]
    fn pool_names_dedupe_case_insensitively() {
        let names = vec![
            "Rudolph".to_string(),
            "rudolph ".to_string(),
            "".to_string(),
            "Blitzen".to_string(),
        ];
        assert_eq!(distinct_names(&names), vec!["Rudolph", "Blitzen"]);
    }
}
