use hmac::{Hmac, Mac};
use kivendi_common::{AppError, PaymentStatus};
use sha2::Sha256;
use sqlx::PgPool;

use super::models::{WebhookAck, WebhookEvent, WebhookEventType};
use super::service::{lock_ad, recompute_is_boosted};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-kkiapay-signature";

/// Checks a hex HMAC-SHA-256 of `body` under `secret` in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex signature the gateway is expected to send for `body`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Reconciles payment records and boosts with gateway notifications.
/// Every event is safe to replay.
#[derive(Clone)]
pub struct WebhookService {
    pool: PgPool,
    secret: String,
}

impl WebhookService {
    pub fn new(pool: PgPool, secret: String) -> Self {
        Self { pool, secret }
    }

    pub async fn handle(&self, signature: Option<&str>, body: &[u8]) -> Result<WebhookAck, AppError> {
        if self.secret.is_empty() {
            tracing::warn!("webhook received but no secret is configured");
            return Err(AppError::Authentication("Webhook signature cannot be checked".to_string()));
        }
        let authentic = signature.map_or(false, |sig| verify_signature(&self.secret, body, sig));
        if !authentic {
            tracing::warn!("rejecting webhook with invalid signature");
            return Err(AppError::Authentication("Invalid webhook signature".to_string()));
        }

        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("Invalid webhook payload: {}", e)))?;
        let transaction_id = event.transaction_id.trim();
        if transaction_id.is_empty() {
            return Err(AppError::Validation("transaction_id is required".to_string()));
        }
        let raw: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("Invalid webhook payload: {}", e)))?;

        self.upsert_record(transaction_id, &event, &raw).await?;

        let kind = event.kind();
        let changed = match kind {
            WebhookEventType::PaymentSucceeded => self.confirm(transaction_id).await?,
            WebhookEventType::PaymentFailed => self.end_boost(transaction_id, PaymentStatus::Failed).await?,
            WebhookEventType::Refund => self.end_boost(transaction_id, PaymentStatus::Refunded).await?,
            WebhookEventType::Other => false,
        };

        tracing::info!(
            transaction_id,
            event = %event.event_type,
            changed,
            reason = event.reason.as_deref().unwrap_or(""),
            "webhook handled"
        );
        Ok(WebhookAck { received: true })
    }

    async fn upsert_record(
        &self,
        transaction_id: &str,
        event: &WebhookEvent,
        raw: &serde_json::Value,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO payment_records (
                transaction_id, boost_id, ad_id, user_id, amount, status, state, raw_response, consumed_at
            )
            SELECT $1, b.id, b.ad_id, b.user_id, COALESCE($2, 0), COALESCE($3, ''), COALESCE($4, ''), $5,
                CASE WHEN b.id IS NULL THEN NULL ELSE NOW() END
            FROM (SELECT 1) AS one
            LEFT JOIN ad_boosts b ON b.transaction_id = $1
            ON CONFLICT (transaction_id) DO UPDATE SET
                boost_id = COALESCE(payment_records.boost_id, EXCLUDED.boost_id),
                consumed_at = COALESCE(payment_records.consumed_at, EXCLUDED.consumed_at),
                ad_id = COALESCE(payment_records.ad_id, EXCLUDED.ad_id),
                user_id = COALESCE(payment_records.user_id, EXCLUDED.user_id),
                amount = COALESCE($2, payment_records.amount),
                status = COALESCE($3, payment_records.status),
                state = COALESCE($4, payment_records.state),
                raw_response = EXCLUDED.raw_response,
                updated_at = NOW()
            "#,
        )
        .bind(transaction_id)
        .bind(event.amount)
        .bind(&event.status)
        .bind(&event.state)
        .bind(raw)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Pending boosts for the transaction become completed.
    async fn confirm(&self, transaction_id: &str) -> Result<bool, AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE ad_boosts SET payment_status = $2, updated_at = NOW()
            WHERE transaction_id = $1 AND payment_status = $3
            "#,
        )
        .bind(transaction_id)
        .bind(PaymentStatus::Completed.as_str())
        .bind(PaymentStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    /// Ends the boost bought with `transaction_id` and recomputes its ad flag.
    async fn end_boost(&self, transaction_id: &str, status: PaymentStatus) -> Result<bool, AppError> {
        let ad_id: Option<i64> = sqlx::query_scalar("SELECT ad_id FROM ad_boosts WHERE transaction_id = $1")
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(ad_id) = ad_id else {
            tracing::info!(transaction_id, "webhook for a transaction without boost");
            return Ok(false);
        };

        let mut tx = self.pool.begin().await?;
        lock_ad(&mut tx, ad_id).await?;

        let updated = sqlx::query(
            r#"
            UPDATE ad_boosts SET payment_status = $2, is_active = FALSE, updated_at = NOW()
            WHERE transaction_id = $1 AND payment_status <> $2
            "#,
        )
        .bind(transaction_id)
        .bind(status.as_str())
        .execute(&mut *tx)
        .await?;
        let still_boosted = recompute_is_boosted(&mut *tx, ad_id).await?;
        tx.commit().await?;

        let changed = updated.rows_affected() > 0;
        if changed {
            tracing::info!(transaction_id, ad_id, status = status.as_str(), still_boosted, "boost ended by gateway");
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let body = br#"{"type":"REFUND","transaction_id":"TX-XYZ"}"#;
        let signature = sign("s3cret", body).unwrap();
        assert!(verify_signature("s3cret", body, &signature));
        assert!(verify_signature("s3cret", body, &signature.to_uppercase()));
    }

    #[test]
    fn tampered_body_or_wrong_secret_fails() {
        let body = br#"{"type":"REFUND","transaction_id":"TX-XYZ"}"#;
        let signature = sign("s3cret", body).unwrap();
        assert!(!verify_signature("other", body, &signature));
        assert!(!verify_signature("s3cret", br#"{"type":"REFUND","transaction_id":"TX-ABC"}"#, &signature));
    }

    #[test]
    fn malformed_signature_fails() {
        assert!(!verify_signature("s3cret", b"{}", "not-hex"));
        assert!(!verify_signature("s3cret", b"{}", ""));
    }
}
