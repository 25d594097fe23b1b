use kivendi_common::AppError;
use sqlx::{PgExecutor, PgPool};

use super::models::BlockStatus;

/// True when a block exists between `a` and `b` in either direction.
pub async fn pair_is_blocked<'e, E: PgExecutor<'e>>(executor: E, a: i64, b: i64) -> Result<bool, AppError> {
    let blocked = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM blocks
            WHERE (blocker_id = $1 AND blocked_id = $2)
               OR (blocker_id = $2 AND blocked_id = $1)
        )
        "#,
    )
    .bind(a)
    .bind(b)
    .fetch_one(executor)
    .await?;
    Ok(blocked)
}

#[derive(Clone)]
pub struct BlockService {
    pool: PgPool,
}

impl BlockService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent. Existing conversations and messages are kept.
    pub async fn block(&self, blocker_id: i64, blocked_id: i64) -> Result<(), AppError> {
        if blocker_id == blocked_id {
            return Err(AppError::Validation("You cannot block yourself".to_string()));
        }

        let inserted = sqlx::query(
            "INSERT INTO blocks (blocker_id, blocked_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            tracing::info!(blocker_id, blocked_id, "user blocked");
        }
        Ok(())
    }

    /// Removes only the caller's own block; a reverse block keeps the pair blocked.
    pub async fn unblock(&self, blocker_id: i64, blocked_id: i64) -> Result<(), AppError> {
        let removed = sqlx::query("DELETE FROM blocks WHERE blocker_id = $1 AND blocked_id = $2")
            .bind(blocker_id)
            .bind(blocked_id)
            .execute(&self.pool)
            .await?;

        if removed.rows_affected() > 0 {
            tracing::info!(blocker_id, blocked_id, "user unblocked");
        }
        Ok(())
    }

    pub async fn status(&self, user_id: i64, other_id: i64) -> Result<BlockStatus, AppError> {
        let (blocked_by_me, blocked_by_other): (bool, bool) = sqlx::query_as(
            r#"
            SELECT
                EXISTS(SELECT 1 FROM blocks WHERE blocker_id = $1 AND blocked_id = $2),
                EXISTS(SELECT 1 FROM blocks WHERE blocker_id = $2 AND blocked_id = $1)
            "#,
        )
        .bind(user_id)
        .bind(other_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(BlockStatus::new(other_id, blocked_by_me, blocked_by_other))
    }
}
