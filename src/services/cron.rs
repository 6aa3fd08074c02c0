use sqlx::PgPool;
use tracing::{info, warn};

const SWEEP_INTERVAL_SECS: u64 = 3600;

pub struct CronService;

impl CronService {
    /// Remove expired groups. Groups that still have members are never
    /// hard-deleted, expired or not.
    pub async fn purge_expired_groups(pool: &PgPool) -> anyhow::Result<u64> {
        let deleted = sqlx::query(
            "DELETE FROM groups g
             WHERE g.expires_at IS NOT NULL AND g.expires_at < now()
               AND NOT EXISTS (SELECT 1 FROM members m WHERE m.group_id = g.id)",
        )
        .execute(pool)
        .await?
        .rows_affected();
        Ok(deleted)
    }
}

/// Spawn the hourly expiry sweep.
pub fn start(pool: PgPool) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match CronService::purge_expired_groups(&pool).await {
                Ok(0) => {}
                Ok(n) => info!("purged {n} expired empty groups"),
                Err(e) => warn!("expired-group sweep failed: {e}"),
            }
        }
    });
}
