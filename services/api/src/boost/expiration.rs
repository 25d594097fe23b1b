use kivendi_common::AppError;
use serde::Serialize;
use sqlx::PgPool;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use super::service::{lock_ad, recompute_is_boosted};

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ExpirationSummary {
    /// Boosts past their end date switched off.
    pub deactivated: u64,
    /// Ads that lost their flag.
    pub cleared: u64,
    /// Ads with a live boost whose flag was missing.
    pub repaired: u64,
}

/// Keeps `ads.is_boosted` in line with the live boosts.
#[derive(Clone)]
pub struct ExpirationJob {
    pool: PgPool,
}

impl ExpirationJob {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_once(&self) -> Result<ExpirationSummary, AppError> {
        let mut summary = ExpirationSummary::default();

        let ended = sqlx::query(
            "UPDATE ad_boosts SET is_active = FALSE, updated_at = NOW() WHERE is_active AND end_date <= NOW()",
        )
        .execute(&self.pool)
        .await?;
        summary.deactivated = ended.rows_affected();

        let drifted: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT a.id FROM ads a
            WHERE a.is_boosted <> EXISTS(
                SELECT 1 FROM ad_boosts b
                WHERE b.ad_id = a.id AND b.is_active AND b.end_date > NOW()
            )
            ORDER BY a.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        // Each ad is fixed under its row lock so a purchase in flight is seen.
        for ad_id in drifted {
            let mut tx = self.pool.begin().await?;
            let before = match lock_ad(&mut tx, ad_id).await {
                Ok(ad) => ad.is_boosted,
                Err(AppError::Rejected(_)) => continue,
                Err(e) => return Err(e),
            };
            let after = recompute_is_boosted(&mut *tx, ad_id).await?;
            tx.commit().await?;

            match (before, after) {
                (true, false) => summary.cleared += 1,
                (false, true) => {
                    tracing::warn!(ad_id, "ad had a live boost but no flag");
                    summary.repaired += 1;
                }
                _ => {}
            }
        }

        Ok(summary)
    }

    /// One pass with its outcome logged; used by the scheduler.
    pub async fn run_logged(&self) {
        match self.run_once().await {
            Ok(summary) => tracing::info!(
                deactivated = summary.deactivated,
                cleared = summary.cleared,
                repaired = summary.repaired,
                "boost expiration pass done"
            ),
            Err(e) => tracing::error!(error = %e, "boost expiration pass failed"),
        }
    }

    /// Runs the pass every `every` on a background scheduler.
    pub async fn schedule(self, every: Duration) -> Result<JobScheduler, JobSchedulerError> {
        let scheduler = JobScheduler::new().await?;
        let job = Job::new_repeated_async(every, move |_uuid, _scheduler| {
            let expiration = self.clone();
            Box::pin(async move {
                expiration.run_logged().await;
            })
        })?;
        scheduler.add(job).await?;
        scheduler.start().await?;

        tracing::info!(every_secs = every.as_secs(), "boost expiration job scheduled");
        Ok(scheduler)
    }
}
