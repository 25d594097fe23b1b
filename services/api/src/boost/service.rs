use chrono::{Duration, Utc};
use kivendi_common::{AppError, PaymentStatus, Rejection};
use kivendi_database::{Ad, AdBoost, BoostOffer};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::models::{
    BoostHistoryEntry, BoostStatus, BoostedAd, CreateOfferRequest, PurchaseBoostRequest,
    UpdateOfferRequest,
};
use crate::accounts;
use crate::gateways::{GatewayTransaction, PaymentGateway};
use crate::notifications::{models::NotificationKind, NotificationService};

/// Largest accepted gap between the amount paid and the offer price.
const AMOUNT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Amount to record for a verified payment against `price`.
///
/// In relaxed mode the check is skipped and a zero amount is replaced by the
/// price, which is what sandbox gateways report.
pub fn settle_amount(reported: Decimal, price: Decimal, relaxed: bool) -> Result<Decimal, AppError> {
    if relaxed {
        return Ok(if reported.is_zero() { price } else { reported });
    }
    if (reported - price).abs() <= AMOUNT_TOLERANCE {
        Ok(reported)
    } else {
        Err(Rejection::AmountMismatch.into())
    }
}

/// True when the ad has a boost that is active and not yet ended.
pub async fn has_live_boost<'e, E: PgExecutor<'e>>(executor: E, ad_id: i64) -> Result<bool, AppError> {
    let live = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM ad_boosts WHERE ad_id = $1 AND is_active AND end_date > NOW())",
    )
    .bind(ad_id)
    .fetch_one(executor)
    .await?;
    Ok(live)
}

/// Sets `ads.is_boosted` from the live boosts of the ad and returns the new value.
pub async fn recompute_is_boosted<'e, E: PgExecutor<'e>>(executor: E, ad_id: i64) -> Result<bool, AppError> {
    let boosted: Option<bool> = sqlx::query_scalar(
        r#"
        UPDATE ads SET is_boosted = EXISTS(
            SELECT 1 FROM ad_boosts b
            WHERE b.ad_id = ads.id AND b.is_active AND b.end_date > NOW()
        )
        WHERE id = $1
        RETURNING is_boosted
        "#,
    )
    .bind(ad_id)
    .fetch_optional(executor)
    .await?;
    Ok(boosted.unwrap_or(false))
}

/// Locks the ad row for the rest of the transaction.
pub async fn lock_ad(tx: &mut Transaction<'_, Postgres>, ad_id: i64) -> Result<Ad, AppError> {
    sqlx::query_as::<_, Ad>("SELECT * FROM ads WHERE id = $1 FOR UPDATE")
        .bind(ad_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| Rejection::AdNotFound.into())
}

/// A transaction id is consumed once a boost uses it. The payment record keeps
/// `consumed_at` after the boost row is deleted along with its ad.
async fn transaction_consumed<'e, E: PgExecutor<'e>>(executor: E, transaction_id: &str) -> Result<bool, AppError> {
    let consumed = sqlx::query_scalar(
        r#"
        SELECT EXISTS(SELECT 1 FROM ad_boosts WHERE transaction_id = $1)
            OR EXISTS(
                SELECT 1 FROM payment_records
                WHERE transaction_id = $1 AND (boost_id IS NOT NULL OR consumed_at IS NOT NULL)
            )
        "#,
    )
    .bind(transaction_id)
    .fetch_one(executor)
    .await?;
    Ok(consumed)
}

/// How a boost gets paid for.
struct Activation<'a> {
    transaction_id: String,
    payment_status: PaymentStatus,
    payment_method: &'static str,
    amount_paid: Decimal,
    evidence: Option<(&'a GatewayTransaction, Decimal)>,
}

#[derive(Clone)]
pub struct BoostService {
    pool: PgPool,
    gateway: Arc<dyn PaymentGateway>,
    notifications: NotificationService,
    relaxed_amount_check: bool,
}

impl BoostService {
    pub fn new(
        pool: PgPool,
        gateway: Arc<dyn PaymentGateway>,
        notifications: NotificationService,
        relaxed_amount_check: bool,
    ) -> Self {
        Self {
            pool,
            gateway,
            notifications,
            relaxed_amount_check,
        }
    }

    /// Verifies a gateway payment and activates the offer on an ad the caller owns.
    pub async fn purchase(
        &self,
        owner_id: i64,
        ad_id: i64,
        request: PurchaseBoostRequest,
    ) -> Result<AdBoost, AppError> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let transaction_id = request.transaction_id.trim().to_string();

        let ad = self.load_ad(ad_id).await?;
        if ad.user_id != owner_id {
            return Err(Rejection::NotOwner.into());
        }
        if !ad.is_validated {
            return Err(Rejection::AdNotValidated.into());
        }

        let owner = accounts::load_user(&self.pool, owner_id).await?;
        accounts::ensure_can_transact(&owner)?;

        let offer = self.active_offer(request.boost_offer_id).await?;

        if transaction_consumed(&self.pool, &transaction_id).await? {
            return Err(Rejection::DuplicateTransaction.into());
        }
        if has_live_boost(&self.pool, ad.id).await? {
            return Err(Rejection::AlreadyBoosted.into());
        }

        let verified = self.gateway.verify_transaction(&transaction_id).await?;
        if !verified.is_success() {
            tracing::warn!(ad_id, transaction_id = %transaction_id, status = %verified.status, "payment not confirmed");
            self.record_unattached(&transaction_id, &verified, ad.id, owner_id).await;
            return Err(Rejection::PaymentNotConfirmed.into());
        }
        let settled = match settle_amount(verified.amount, offer.price, self.relaxed_amount_check) {
            Ok(amount) => amount,
            Err(e) => {
                tracing::warn!(ad_id, transaction_id = %transaction_id, reported = %verified.amount, price = %offer.price, "amount mismatch");
                self.record_unattached(&transaction_id, &verified, ad.id, owner_id).await;
                return Err(e);
            }
        };

        let boost = self
            .activate(
                &ad,
                owner_id,
                &offer,
                Activation {
                    transaction_id,
                    payment_status: PaymentStatus::Completed,
                    payment_method: "kkiapay",
                    amount_paid: offer.price,
                    evidence: Some((&verified, settled)),
                },
            )
            .await?;

        tracing::info!(boost_id = boost.id, ad_id, owner_id, offer = %offer.name, "boost purchased");
        Ok(boost)
    }

    /// Activates an offer on any validated ad without a payment.
    pub async fn admin_grant(&self, admin_id: i64, ad_id: i64, boost_offer_id: i64) -> Result<AdBoost, AppError> {
        let ad = self.load_ad(ad_id).await?;
        if !ad.is_validated {
            return Err(Rejection::AdNotValidated.into());
        }
        let offer = self.active_offer(boost_offer_id).await?;
        if has_live_boost(&self.pool, ad.id).await? {
            return Err(Rejection::AlreadyBoosted.into());
        }

        let boost = self
            .activate(
                &ad,
                ad.user_id,
                &offer,
                Activation {
                    transaction_id: format!("ADMIN-{}", Uuid::new_v4()),
                    payment_status: PaymentStatus::AdminGranted,
                    payment_method: "admin",
                    amount_paid: Decimal::ZERO,
                    evidence: None,
                },
            )
            .await?;

        tracing::info!(boost_id = boost.id, ad_id, admin_id, offer = %offer.name, "boost granted by staff");
        Ok(boost)
    }

    /// Ends a boost now and recomputes the ad flag in the same transaction.
    pub async fn deactivate_boost(&self, boost_id: i64) -> Result<AdBoost, AppError> {
        let ad_id: i64 = sqlx::query_scalar("SELECT ad_id FROM ad_boosts WHERE id = $1")
            .bind(boost_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Boost not found".to_string()))?;

        let mut tx = self.pool.begin().await?;
        lock_ad(&mut tx, ad_id).await?;

        let boost = sqlx::query_as::<_, AdBoost>(
            "UPDATE ad_boosts SET is_active = FALSE, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(boost_id)
        .fetch_one(&mut *tx)
        .await?;
        let still_boosted = recompute_is_boosted(&mut *tx, ad_id).await?;
        tx.commit().await?;

        tracing::info!(boost_id, ad_id, still_boosted, "boost deactivated");
        Ok(boost)
    }

    async fn activate(
        &self,
        ad: &Ad,
        owner_id: i64,
        offer: &BoostOffer,
        activation: Activation<'_>,
    ) -> Result<AdBoost, AppError> {
        let mut tx = self.pool.begin().await?;
        lock_ad(&mut tx, ad.id).await?;

        // Both checks again, now that concurrent purchases for this ad wait on the lock.
        if transaction_consumed(&mut *tx, &activation.transaction_id).await? {
            return Err(Rejection::DuplicateTransaction.into());
        }
        if has_live_boost(&mut *tx, ad.id).await? {
            return Err(Rejection::AlreadyBoosted.into());
        }

        let start_date = Utc::now();
        let end_date = start_date + Duration::days(i64::from(offer.duration_days));
        let boost = sqlx::query_as::<_, AdBoost>(
            r#"
            INSERT INTO ad_boosts (
                ad_id, boost_offer_id, user_id, start_date, end_date, is_active,
                payment_status, payment_method, transaction_id, amount_paid
            ) VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(ad.id)
        .bind(offer.id)
        .bind(owner_id)
        .bind(start_date)
        .bind(end_date)
        .bind(activation.payment_status.as_str())
        .bind(activation.payment_method)
        .bind(&activation.transaction_id)
        .bind(activation.amount_paid)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            let err = AppError::from(e);
            if err.is_unique_violation() {
                Rejection::DuplicateTransaction.into()
            } else {
                err
            }
        })?;

        if let Some((verified, settled)) = activation.evidence {
            // Attaches to a record left by a webhook or a failed attempt, never
            // to one that already belongs to another boost.
            let attached = sqlx::query(
                r#"
                INSERT INTO payment_records (
                    transaction_id, boost_id, ad_id, user_id, amount, status, state, raw_response,
                    verified_at, consumed_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
                ON CONFLICT (transaction_id) DO UPDATE SET
                    boost_id = EXCLUDED.boost_id,
                    ad_id = EXCLUDED.ad_id,
                    user_id = EXCLUDED.user_id,
                    amount = EXCLUDED.amount,
                    status = EXCLUDED.status,
                    state = EXCLUDED.state,
                    raw_response = EXCLUDED.raw_response,
                    verified_at = EXCLUDED.verified_at,
                    consumed_at = EXCLUDED.consumed_at,
                    updated_at = NOW()
                WHERE payment_records.boost_id IS NULL AND payment_records.consumed_at IS NULL
                "#,
            )
            .bind(&activation.transaction_id)
            .bind(boost.id)
            .bind(ad.id)
            .bind(owner_id)
            .bind(settled)
            .bind(&verified.status)
            .bind(&verified.state)
            .bind(&verified.raw)
            .execute(&mut *tx)
            .await?;

            if attached.rows_affected() != 1 {
                return Err(Rejection::DuplicateTransaction.into());
            }
        }

        sqlx::query("UPDATE ads SET is_boosted = TRUE WHERE id = $1")
            .bind(ad.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.notifications
            .notify_ad_event(owner_id, NotificationKind::BoostActivated, ad.id, &ad.title, None)
            .await;
        Ok(boost)
    }

    /// Keeps a trace of a verification that did not lead to a boost.
    async fn record_unattached(&self, transaction_id: &str, verified: &GatewayTransaction, ad_id: i64, user_id: i64) {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_records (transaction_id, ad_id, user_id, amount, status, state, raw_response, verified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (transaction_id) DO UPDATE SET
                amount = EXCLUDED.amount,
                status = EXCLUDED.status,
                state = EXCLUDED.state,
                raw_response = EXCLUDED.raw_response,
                verified_at = EXCLUDED.verified_at,
                updated_at = NOW()
            WHERE payment_records.boost_id IS NULL AND payment_records.consumed_at IS NULL
            "#,
        )
        .bind(transaction_id)
        .bind(ad_id)
        .bind(user_id)
        .bind(verified.amount)
        .bind(&verified.status)
        .bind(&verified.state)
        .bind(&verified.raw)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::error!(transaction_id, error = %e, "failed to record payment attempt");
        }
    }

    async fn load_ad(&self, ad_id: i64) -> Result<Ad, AppError> {
        sqlx::query_as::<_, Ad>("SELECT * FROM ads WHERE id = $1")
            .bind(ad_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Rejection::AdNotFound.into())
    }

    async fn active_offer(&self, offer_id: i64) -> Result<BoostOffer, AppError> {
        let offer = sqlx::query_as::<_, BoostOffer>("SELECT * FROM boost_offers WHERE id = $1")
            .bind(offer_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Boost offer not found".to_string()))?;
        if !offer.is_active {
            return Err(Rejection::OfferInactive.into());
        }
        Ok(offer)
    }

    // Offers

    pub async fn list_offers(&self) -> Result<Vec<BoostOffer>, AppError> {
        let offers = sqlx::query_as::<_, BoostOffer>(
            "SELECT * FROM boost_offers WHERE is_active ORDER BY display_order ASC, price ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(offers)
    }

    /// Every offer, including disabled ones.
    pub async fn list_all_offers(&self) -> Result<Vec<BoostOffer>, AppError> {
        let offers = sqlx::query_as::<_, BoostOffer>(
            "SELECT * FROM boost_offers ORDER BY display_order ASC, price ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(offers)
    }

    pub async fn get_offer(&self, offer_id: i64) -> Result<BoostOffer, AppError> {
        sqlx::query_as::<_, BoostOffer>("SELECT * FROM boost_offers WHERE id = $1 AND is_active")
            .bind(offer_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Boost offer not found".to_string()))
    }

    pub async fn create_offer(&self, request: CreateOfferRequest) -> Result<BoostOffer, AppError> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        if request.price < Decimal::ZERO {
            return Err(AppError::Validation("price must not be negative".to_string()));
        }

        let offer = sqlx::query_as::<_, BoostOffer>(
            r#"
            INSERT INTO boost_offers (
                name, description, duration_days, price, position_priority,
                features, color, is_active, display_order
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(request.name.trim())
        .bind(&request.description)
        .bind(request.duration_days)
        .bind(request.price)
        .bind(request.position_priority)
        .bind(&request.features)
        .bind(&request.color)
        .bind(request.is_active)
        .bind(request.display_order)
        .fetch_one(&self.pool)
        .await
        .map_err(offer_name_conflict)?;

        tracing::info!(offer_id = offer.id, name = %offer.name, "boost offer created");
        Ok(offer)
    }

    pub async fn update_offer(&self, offer_id: i64, request: UpdateOfferRequest) -> Result<BoostOffer, AppError> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        if request.price.map_or(false, |price| price < Decimal::ZERO) {
            return Err(AppError::Validation("price must not be negative".to_string()));
        }

        let offer = sqlx::query_as::<_, BoostOffer>(
            r#"
            UPDATE boost_offers SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                duration_days = COALESCE($4, duration_days),
                price = COALESCE($5, price),
                position_priority = COALESCE($6, position_priority),
                features = COALESCE($7, features),
                color = COALESCE($8, color),
                is_active = COALESCE($9, is_active),
                display_order = COALESCE($10, display_order),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(offer_id)
        .bind(request.name.as_deref().map(str::trim))
        .bind(&request.description)
        .bind(request.duration_days)
        .bind(request.price)
        .bind(request.position_priority)
        .bind(&request.features)
        .bind(&request.color)
        .bind(request.is_active)
        .bind(request.display_order)
        .fetch_optional(&self.pool)
        .await
        .map_err(offer_name_conflict)?
        .ok_or_else(|| AppError::NotFound("Boost offer not found".to_string()))?;

        tracing::info!(offer_id, is_active = offer.is_active, "boost offer updated");
        Ok(offer)
    }

    /// Refused while a live boost still uses the offer; past boosts keep their row.
    pub async fn delete_offer(&self, offer_id: i64) -> Result<(), AppError> {
        let in_use: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM ad_boosts
                WHERE boost_offer_id = $1 AND is_active AND end_date > NOW()
            )
            "#,
        )
        .bind(offer_id)
        .fetch_one(&self.pool)
        .await?;
        if in_use {
            return Err(Rejection::OfferInUse.into());
        }

        let deleted = sqlx::query("DELETE FROM boost_offers WHERE id = $1")
            .bind(offer_id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound("Boost offer not found".to_string()));
        }

        tracing::info!(offer_id, "boost offer deleted");
        Ok(())
    }

    // Listings

    /// Visible ads with a live boost, highest offer priority first.
    pub async fn list_boosted_ads(&self) -> Result<Vec<BoostedAd>, AppError> {
        let ads = sqlx::query_as::<_, BoostedAd>(
            r#"
            SELECT a.*,
                   lb.id AS boost_id, lb.end_date AS boost_end_date,
                   o.name AS offer_name, o.color AS offer_color,
                   COALESCE(o.position_priority, 0) AS position_priority
            FROM ads a
            JOIN LATERAL (
                SELECT b.id, b.end_date, b.boost_offer_id
                FROM ad_boosts b
                WHERE b.ad_id = a.id AND b.is_active AND b.end_date > NOW()
                ORDER BY b.created_at DESC, b.id DESC
                LIMIT 1
            ) lb ON TRUE
            LEFT JOIN boost_offers o ON o.id = lb.boost_offer_id
            WHERE a.is_validated AND NOT a.is_rejected AND NOT a.is_deactivated AND NOT a.is_sold
            ORDER BY COALESCE(o.position_priority, 0) DESC, a.created_at DESC, a.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ads)
    }

    pub async fn history(&self, user_id: i64) -> Result<Vec<BoostHistoryEntry>, AppError> {
        let entries = sqlx::query_as::<_, BoostHistoryEntry>(
            r#"
            SELECT b.*, a.title AS ad_title, o.name AS offer_name
            FROM ad_boosts b
            JOIN ads a ON a.id = b.ad_id
            LEFT JOIN boost_offers o ON o.id = b.boost_offer_id
            WHERE b.user_id = $1
            ORDER BY b.created_at DESC, b.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    pub async fn check_ad_boost(&self, ad_id: i64) -> Result<BoostStatus, AppError> {
        self.load_ad(ad_id).await?;

        let status = sqlx::query_as::<_, BoostStatus>(
            r#"
            SELECT TRUE AS is_boosted, b.end_date AS end_date,
                   o.name AS offer_name, o.color AS offer_color, o.position_priority AS priority
            FROM ad_boosts b
            LEFT JOIN boost_offers o ON o.id = b.boost_offer_id
            WHERE b.ad_id = $1 AND b.is_active AND b.end_date > NOW()
            ORDER BY b.created_at DESC, b.id DESC
            LIMIT 1
            "#,
        )
        .bind(ad_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(status.unwrap_or_else(BoostStatus::not_boosted))
    }
}

fn offer_name_conflict(e: sqlx::Error) -> AppError {
    let err = AppError::from(e);
    if err.is_unique_violation() {
        AppError::Conflict("A boost offer with this name already exists".to_string())
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    #[test]
    fn tolerance_is_one_cent() {
        assert_eq!(AMOUNT_TOLERANCE, dec("0.01"));
    }

    #[test]
    fn strict_check_accepts_amounts_within_a_cent() {
        assert_eq!(settle_amount(dec("500"), dec("500.00"), false).unwrap(), dec("500"));
        assert_eq!(settle_amount(dec("499.99"), dec("500"), false).unwrap(), dec("499.99"));
        assert_eq!(settle_amount(dec("500.01"), dec("500"), false).unwrap(), dec("500.01"));
    }

    #[test]
    fn strict_check_rejects_other_amounts() {
        for reported in ["499.98", "0", "1500"] {
            let err = settle_amount(dec(reported), dec("500"), false).unwrap_err();
            assert_eq!(err.error_code(), "AMOUNT_MISMATCH");
        }
    }

    #[test]
    fn relaxed_check_substitutes_price_for_zero() {
        assert_eq!(settle_amount(Decimal::ZERO, dec("1500"), true).unwrap(), dec("1500"));
        assert_eq!(settle_amount(dec("10"), dec("1500"), true).unwrap(), dec("10"));
    }
}
