use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::assignment::Assignment;
use crate::models::member::Member;
use crate::services::groups::GroupService;

/// Minimum roster for a draw; with two members the pairing is trivially
/// mutual and spoils the secret.
pub const MIN_DRAW_MEMBERS: usize = 3;

pub struct AssignmentService;

impl AssignmentService {
    /// One-shot draw: generate a derangement over the roster, persist all
    /// rows and freeze the group in a single transaction. The group row is
    /// locked for the duration, so a concurrent second draw waits and then
    /// fails with `AlreadyFrozen` instead of overlapping.
    pub async fn assign(
        pool: &PgPool,
        group_id: Uuid,
        credential: Uuid,
    ) -> Result<Vec<Assignment>, ApiError> {
        let mut tx = pool.begin().await?;
        let group = GroupService::fetch_for_update(&mut tx, group_id).await?;
        if !group.is_organizer(credential) {
            return Err(ApiError::NotAuthorized);
        }
        if group.is_frozen {
            return Err(ApiError::AlreadyFrozen);
        }

        let members = sqlx::query_as::<_, Member>(
            "SELECT * FROM members WHERE group_id = $1 ORDER BY joined_at, id",
        )
        .bind(group_id)
        .fetch_all(&mut *tx)
        .await?;
        if members.len() < MIN_DRAW_MEMBERS {
            return Err(ApiError::validation(format!(
                "at least {MIN_DRAW_MEMBERS} members are needed for a draw"
            )));
        }

        let perm = derangement(&mut rand::thread_rng(), members.len());

        let mut rows = Vec::with_capacity(members.len());
        for (i, giver) in members.iter().enumerate() {
            let receiver = &members[perm[i]];
            let row = sqlx::query_as::<_, Assignment>(
                "INSERT INTO assignments (group_id, giver_id, receiver_id)
                 VALUES ($1, $2, $3)
                 RETURNING *",
            )
            .bind(group_id)
            .bind(giver.id)
            .bind(receiver.id)
            .fetch_one(&mut *tx)
            .await?;
            rows.push(row);
        }

        sqlx::query("UPDATE groups SET is_frozen = TRUE, updated_at = now() WHERE id = $1")
            .bind(group_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(rows)
    }

    /// Undo the draw: delete every assignment row and unfreeze, atomically.
    pub async fn reset(pool: &PgPool, group_id: Uuid, credential: Uuid) -> Result<u64, ApiError> {
        let mut tx = pool.begin().await?;
        let group = GroupService::fetch_for_update(&mut tx, group_id).await?;
        if !group.is_organizer(credential) {
            return Err(ApiError::NotAuthorized);
        }
        if !group.is_frozen {
            return Err(ApiError::NotFrozen);
        }

        let deleted = sqlx::query("DELETE FROM assignments WHERE group_id = $1")
            .bind(group_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("UPDATE groups SET is_frozen = FALSE, updated_at = now() WHERE id = $1")
            .bind(group_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted)
    }

    pub async fn list(pool: &PgPool, group_id: Uuid) -> Result<Vec<Assignment>, ApiError> {
        let rows =
            sqlx::query_as::<_, Assignment>("SELECT * FROM assignments WHERE group_id = $1")
                .bind(group_id)
                .fetch_all(pool)
                .await?;
        Ok(rows)
    }

    /// The member this giver was assigned to.
    pub async fn receiver_of(
        pool: &PgPool,
        group_id: Uuid,
        giver_id: Uuid,
    ) -> Result<Option<Member>, ApiError> {
        let member = sqlx::query_as::<_, Member>(
            "SELECT m.* FROM members m
             JOIN assignments a ON a.receiver_id = m.id
             WHERE a.group_id = $1 AND a.giver_id = $2",
        )
        .bind(group_id)
        .bind(giver_id)
        .fetch_optional(pool)
        .await?;
        Ok(member)
    }

    /// The member assigned to give to this receiver.
    pub async fn giver_of(
        pool: &PgPool,
        group_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<Option<Member>, ApiError> {
        let member = sqlx::query_as::<_, Member>(
            "SELECT m.* FROM members m
             JOIN assignments a ON a.giver_id = m.id
             WHERE a.group_id = $1 AND a.receiver_id = $2",
        )
        .bind(group_id)
        .bind(receiver_id)
        .fetch_optional(pool)
        .await?;
        Ok(member)
    }
}

/// Uniformly random derangement of `0..n` by rejection sampling: draw a
/// uniform permutation, accept it iff it has no fixed point. The acceptance
/// probability converges to 1/e, so the expected number of draws is under
/// three regardless of `n`.
pub fn derangement<R: Rng>(rng: &mut R, n: usize) -> Vec<usize> {
    debug_assert!(n >= 2);
    let mut perm: Vec<usize> = (0..n).collect();
    loop {
        perm.shuffle(rng);
        if perm.iter().enumerate().all(|(i, &p)| p != i) {
            return perm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn derangement_has_no_fixed_points() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in 2..=20 {
            for _ in 0..200 {
                let perm = derangement(&mut rng, n);
                assert!(perm.iter().enumerate().all(|(i, &p)| p != i), "n={n}");
            }
        }
    }

    #[test]
    fn derangement_is_a_bijection() {
        let mut rng = StdRng::seed_from_u64(11);
        for n in 2..=20 {
            let mut perm = derangement(&mut rng, n);
            perm.sort_unstable();
            let expected: Vec<usize> = (0..n).collect();
            assert_eq!(perm, expected, "n={n}");
        }
    }

    #[test]
    fn three_member_draw_reaches_both_cycles() {
        // With n=3 the only derangements are the two 3-cycles; a fair
        // generator produces both.
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            seen.insert(derangement(&mut rng, 3));
        }
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&vec![1, 2, 0]));
        assert!(seen.contains(&vec![2, 0, 1]));
    }
}
