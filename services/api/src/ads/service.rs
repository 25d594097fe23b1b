use kivendi_common::{AppError, Rejection};
use kivendi_database::Ad;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;
use validator::Validate;

use super::models::{CreateAdRequest, ImagePlan, ModerationAction, UpdateAdRequest};
use crate::accounts;
use crate::notifications::{models::NotificationKind, NotificationService};
use crate::storage::{spawn_delete, ObjectStore};

#[derive(Clone)]
pub struct AdService {
    pool: PgPool,
    store: Arc<dyn ObjectStore>,
    notifications: NotificationService,
}

impl AdService {
    pub fn new(pool: PgPool, store: Arc<dyn ObjectStore>, notifications: NotificationService) -> Self {
        Self {
            pool,
            store,
            notifications,
        }
    }

    /// New ads wait for moderation.
    pub async fn create(&self, owner_id: i64, request: CreateAdRequest) -> Result<Ad, AppError> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        ensure_price(request.price)?;

        let owner = accounts::load_user(&self.pool, owner_id).await?;
        if owner.is_blocked {
            return Err(Rejection::AccountBlocked.into());
        }
        self.ensure_sub_category(request.sub_category_id).await?;

        let images = self.store.upload_base64_images(&request.images).await?;
        let created = sqlx::query_as::<_, Ad>(
            r#"
            INSERT INTO ads (
                user_id, sub_category_id, title, description, price, images,
                form_data, city, phone, show_phone, latitude, longitude
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(owner_id)
        .bind(request.sub_category_id)
        .bind(request.title.trim())
        .bind(&request.description)
        .bind(request.price)
        .bind(&images)
        .bind(&request.form_data)
        .bind(request.city.trim())
        .bind(&request.phone)
        .bind(request.show_phone)
        .bind(request.latitude)
        .bind(request.longitude)
        .fetch_one(&self.pool)
        .await;

        match created {
            Ok(ad) => {
                tracing::info!(ad_id = ad.id, owner_id, images = images.len(), "ad created");
                Ok(ad)
            }
            Err(e) => {
                spawn_delete(self.store.clone(), images);
                Err(e.into())
            }
        }
    }

    /// Owners see their ads in any state; everyone else only sees visible ads
    /// and bumps the view counter.
    pub async fn get(&self, ad_id: i64, viewer_id: Option<i64>) -> Result<Ad, AppError> {
        let ad = self.load(ad_id).await?;
        if viewer_id == Some(ad.user_id) {
            return Ok(ad);
        }
        if !ad.is_publicly_visible() {
            return Err(Rejection::AdNotFound.into());
        }

        let viewed = sqlx::query_as::<_, Ad>("UPDATE ads SET views = views + 1 WHERE id = $1 RETURNING *")
            .bind(ad_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Rejection::AdNotFound)?;
        Ok(viewed)
    }

    pub async fn list_mine(&self, owner_id: i64) -> Result<Vec<Ad>, AppError> {
        let ads = sqlx::query_as::<_, Ad>("SELECT * FROM ads WHERE user_id = $1 ORDER BY created_at DESC, id DESC")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ads)
    }

    /// Owner edit. The ad goes back to moderation.
    pub async fn update_by_owner(&self, owner_id: i64, ad_id: i64, request: UpdateAdRequest) -> Result<Ad, AppError> {
        let ad = self.load(ad_id).await?;
        if ad.user_id != owner_id {
            return Err(Rejection::NotOwner.into());
        }
        self.apply_update(ad, request, true).await
    }

    /// Staff edit. Moderation flags are left as they are.
    pub async fn admin_update(&self, ad_id: i64, request: UpdateAdRequest) -> Result<Ad, AppError> {
        let ad = self.load(ad_id).await?;
        self.apply_update(ad, request, false).await
    }

    async fn apply_update(&self, ad: Ad, request: UpdateAdRequest, reset_moderation: bool) -> Result<Ad, AppError> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        if let Some(price) = request.price {
            ensure_price(price)?;
        }
        if let Some(sub_category_id) = request.sub_category_id {
            self.ensure_sub_category(sub_category_id).await?;
        }

        let plan = ImagePlan::new(&ad.images, request.keep_images.as_deref(), request.new_images.len())?;
        let uploaded = if request.new_images.is_empty() {
            Vec::new()
        } else {
            self.store.upload_base64_images(&request.new_images).await?
        };
        let mut images = plan.kept.clone();
        images.extend(uploaded.iter().cloned());

        let updated = sqlx::query_as::<_, Ad>(
            r#"
            UPDATE ads SET
                sub_category_id = COALESCE($2, sub_category_id),
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                price = COALESCE($5, price),
                images = $6,
                form_data = COALESCE($7, form_data),
                city = COALESCE($8, city),
                phone = COALESCE($9, phone),
                show_phone = COALESCE($10, show_phone),
                latitude = COALESCE($11, latitude),
                longitude = COALESCE($12, longitude),
                is_validated = CASE WHEN $13 THEN FALSE ELSE is_validated END,
                is_rejected = CASE WHEN $13 THEN FALSE ELSE is_rejected END,
                is_deactivated = CASE WHEN $13 THEN FALSE ELSE is_deactivated END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(ad.id)
        .bind(request.sub_category_id)
        .bind(request.title.as_deref().map(str::trim))
        .bind(&request.description)
        .bind(request.price)
        .bind(&images)
        .bind(&request.form_data)
        .bind(request.city.as_deref().map(str::trim))
        .bind(&request.phone)
        .bind(request.show_phone)
        .bind(request.latitude)
        .bind(request.longitude)
        .bind(reset_moderation)
        .fetch_optional(&self.pool)
        .await;

        let updated = match updated {
            Ok(Some(ad)) => ad,
            Ok(None) => {
                spawn_delete(self.store.clone(), uploaded);
                return Err(Rejection::AdNotFound.into());
            }
            Err(e) => {
                spawn_delete(self.store.clone(), uploaded);
                return Err(e.into());
            }
        };

        spawn_delete(self.store.clone(), plan.removed);
        tracing::info!(ad_id = updated.id, reset_moderation, "ad updated");
        Ok(updated)
    }

    pub async fn delete_by_owner(&self, owner_id: i64, ad_id: i64) -> Result<(), AppError> {
        let ad = self.load(ad_id).await?;
        if ad.user_id != owner_id {
            return Err(Rejection::NotOwner.into());
        }
        self.delete(ad).await?;
        Ok(())
    }

    pub async fn admin_delete(&self, ad_id: i64) -> Result<(), AppError> {
        let ad = self.load(ad_id).await?;
        let (owner_id, title) = (ad.user_id, ad.title.clone());
        self.delete(ad).await?;
        self.notifications
            .notify_ad_event(owner_id, NotificationKind::AdDeleted, ad_id, &title, None)
            .await;
        Ok(())
    }

    /// Conversations, messages and boosts go with the ad; images are removed after commit.
    async fn delete(&self, ad: Ad) -> Result<(), AppError> {
        let deleted = sqlx::query("DELETE FROM ads WHERE id = $1")
            .bind(ad.id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(Rejection::AdNotFound.into());
        }
        spawn_delete(self.store.clone(), ad.images);
        tracing::info!(ad_id = ad.id, owner_id = ad.user_id, "ad deleted");
        Ok(())
    }

    pub async fn mark_sold(&self, owner_id: i64, ad_id: i64) -> Result<Ad, AppError> {
        let ad = self.load(ad_id).await?;
        if ad.user_id != owner_id {
            return Err(Rejection::NotOwner.into());
        }
        let sold = sqlx::query_as::<_, Ad>(
            "UPDATE ads SET is_sold = TRUE, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(ad_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Rejection::AdNotFound)?;
        Ok(sold)
    }

    pub async fn moderate(&self, ad_id: i64, action: ModerationAction) -> Result<Ad, AppError> {
        let (validated, rejected, deactivated) = action.flags();
        let ad = sqlx::query_as::<_, Ad>(
            r#"
            UPDATE ads SET is_validated = $2, is_rejected = $3, is_deactivated = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(ad_id)
        .bind(validated)
        .bind(rejected)
        .bind(deactivated)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Rejection::AdNotFound)?;

        let kind = action.notification_kind();
        tracing::info!(ad_id, action = kind.as_str(), "ad moderated");
        self.notifications
            .notify_ad_event(ad.user_id, kind, ad.id, &ad.title, action.reason())
            .await;
        Ok(ad)
    }

    async fn load(&self, ad_id: i64) -> Result<Ad, AppError> {
        let ad = sqlx::query_as::<_, Ad>("SELECT * FROM ads WHERE id = $1")
            .bind(ad_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Rejection::AdNotFound)?;
        Ok(ad)
    }

    async fn ensure_sub_category(&self, sub_category_id: i64) -> Result<(), AppError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sub_categories WHERE id = $1)")
            .bind(sub_category_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(AppError::Validation(format!("Unknown sub category {}", sub_category_id)));
        }
        Ok(())
    }
}

fn ensure_price(price: Decimal) -> Result<(), AppError> {
    if price < Decimal::ZERO {
        return Err(AppError::Validation("price must not be negative".to_string()));
    }
    Ok(())
}
