use kivendi_common::AppError;
use kivendi_database::{DeviceToken, Notification, NotificationPreference};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

use super::models::{NotificationKind, PushSummary, RegisterTokenRequest, UpdatePreferencesRequest};
use super::push::{PushPayload, PushTransport};
use crate::accounts::{self, DisplayName};

#[derive(Clone)]
pub struct NotificationService {
    pool: PgPool,
    push: Arc<dyn PushTransport>,
}

impl NotificationService {
    pub fn new(pool: PgPool, push: Arc<dyn PushTransport>) -> Self {
        Self { pool, push }
    }

    pub async fn create_in_app(
        &self,
        user_id: i64,
        kind: NotificationKind,
        title: &str,
        message: &str,
        data: serde_json::Value,
    ) -> Result<Notification, AppError> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (user_id, notification_type, title, message, data)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(title)
        .bind(message)
        .bind(data)
        .fetch_one(&self.pool)
        .await?;

        Ok(notification)
    }

    /// Pushes to every device of `user_id`. Per-token failures are counted,
    /// never returned; tokens the transport reports as invalid are deleted.
    pub async fn send_push(
        &self,
        user_id: i64,
        kind: NotificationKind,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> PushSummary {
        match self.try_send_push(user_id, kind, title, body, data).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "push fan-out aborted");
                PushSummary::default()
            }
        }
    }

    async fn try_send_push(
        &self,
        user_id: i64,
        kind: NotificationKind,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<PushSummary, AppError> {
        let preferences = self.preferences(user_id).await?;
        if !preferences.allows_push() {
            tracing::debug!(user_id, "push disabled by preferences");
            return Ok(PushSummary::default());
        }

        let tokens: Vec<String> = sqlx::query_scalar(
            "SELECT token FROM device_tokens WHERE user_id = $1 ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let payload = PushPayload::new(kind.as_str(), title, body, data);
        let mut summary = PushSummary::default();

        for token in tokens {
            match self.push.send(&token, &payload).await {
                Ok(()) => summary.sent += 1,
                Err(e) if e.is_invalid_token() => {
                    summary.failed += 1;
                    let removed = sqlx::query("DELETE FROM device_tokens WHERE token = $1 AND user_id = $2")
                        .bind(&token)
                        .bind(user_id)
                        .execute(&self.pool)
                        .await?;
                    summary.purged += removed.rows_affected() as usize;
                    tracing::warn!(user_id, error = %e, "purged invalid device token");
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::debug!(user_id, error = %e, "push delivery failed");
                }
            }
        }

        tracing::debug!(user_id, kind = kind.as_str(), ?summary, "push fan-out done");
        Ok(summary)
    }

    pub fn spawn_push(
        &self,
        user_id: i64,
        kind: NotificationKind,
        title: String,
        body: String,
        data: serde_json::Value,
    ) {
        let service = self.clone();
        tokio::spawn(async move {
            service.send_push(user_id, kind, &title, &body, data).await;
        });
    }

    /// In-app notification plus a detached push carrying the same text.
    pub async fn notify(
        &self,
        user_id: i64,
        kind: NotificationKind,
        title: &str,
        message: &str,
        data: serde_json::Value,
    ) {
        if let Err(e) = self.create_in_app(user_id, kind, title, message, data.clone()).await {
            tracing::error!(user_id, kind = kind.as_str(), error = %e, "failed to store notification");
        }
        self.spawn_push(user_id, kind, title.to_string(), message.to_string(), data);
    }

    pub async fn notify_ad_event(
        &self,
        owner_id: i64,
        kind: NotificationKind,
        ad_id: i64,
        ad_title: &str,
        reason: Option<&str>,
    ) {
        let (title, message) = ad_event_text(kind, ad_title, reason);
        let data = json!({ "ad_id": ad_id, "reason": reason });
        self.notify(owner_id, kind, &title, &message, data).await;
    }

    pub fn spawn_chat_push(
        &self,
        recipient_id: i64,
        sender_id: i64,
        preview: String,
        conversation_id: i64,
        ad_id: i64,
        message_id: i64,
    ) {
        let service = self.clone();
        tokio::spawn(async move {
            let sender_name = match accounts::load_user(&service.pool, sender_id).await {
                Ok(sender) => sender.display_name(),
                Err(e) => {
                    tracing::warn!(sender_id, error = %e, "chat push without sender name");
                    String::new()
                }
            };
            let body = chat_push_body(&sender_name, &preview);
            let data = json!({
                "conversation_id": conversation_id,
                "ad_id": ad_id,
                "message_id": message_id,
                "sender_display_name": sender_name,
            });
            service
                .send_push(recipient_id, NotificationKind::NewMessage, "Nouveau message", &body, data)
                .await;
        });
    }

    pub async fn register_token(
        &self,
        user_id: i64,
        request: RegisterTokenRequest,
    ) -> Result<DeviceToken, AppError> {
        let token = request.token.trim();
        if token.is_empty() {
            return Err(AppError::Validation("token must not be empty".to_string()));
        }

        // A token seen under another user moves to the caller.
        let device = sqlx::query_as::<_, DeviceToken>(
            r#"
            INSERT INTO device_tokens (token, user_id, device_type)
            VALUES ($1, $2, $3)
            ON CONFLICT (token) DO UPDATE
                SET user_id = EXCLUDED.user_id,
                    device_type = EXCLUDED.device_type,
                    updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(token)
        .bind(user_id)
        .bind(request.device_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id, device_type = %device.device_type, "device token registered");
        Ok(device)
    }

    pub async fn unregister_token(&self, user_id: i64, token: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM device_tokens WHERE token = $1 AND user_id = $2")
            .bind(token.trim())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn preferences(&self, user_id: i64) -> Result<NotificationPreference, AppError> {
        let stored = sqlx::query_as::<_, NotificationPreference>(
            "SELECT * FROM notification_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stored.unwrap_or_else(|| NotificationPreference::defaults_for(user_id)))
    }

    pub async fn update_preferences(
        &self,
        user_id: i64,
        request: UpdatePreferencesRequest,
    ) -> Result<NotificationPreference, AppError> {
        let preferences = sqlx::query_as::<_, NotificationPreference>(
            r#"
            INSERT INTO notification_preferences
                (user_id, global_enabled, email_enabled, push_enabled,
                 message_enabled, ad_enabled, favorite_enabled)
            VALUES ($1, COALESCE($2, TRUE), COALESCE($3, TRUE), COALESCE($4, TRUE),
                    COALESCE($5, TRUE), COALESCE($6, TRUE), COALESCE($7, TRUE))
            ON CONFLICT (user_id) DO UPDATE SET
                global_enabled = COALESCE($2, notification_preferences.global_enabled),
                email_enabled = COALESCE($3, notification_preferences.email_enabled),
                push_enabled = COALESCE($4, notification_preferences.push_enabled),
                message_enabled = COALESCE($5, notification_preferences.message_enabled),
                ad_enabled = COALESCE($6, notification_preferences.ad_enabled),
                favorite_enabled = COALESCE($7, notification_preferences.favorite_enabled),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(request.global_enabled)
        .bind(request.email_enabled)
        .bind(request.push_enabled)
        .bind(request.message_enabled)
        .bind(request.ad_enabled)
        .bind(request.favorite_enabled)
        .fetch_one(&self.pool)
        .await?;

        Ok(preferences)
    }

    pub async fn list(&self, user_id: i64, limit: i64, offset: i64) -> Result<Vec<Notification>, AppError> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }

    pub async fn unread_count(&self, user_id: i64) -> Result<i64, AppError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn mark_read(&self, user_id: i64, notification_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2")
            .bind(notification_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Notification not found".to_string()));
        }
        Ok(())
    }

    pub async fn mark_all_read(&self, user_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

pub fn chat_push_body(sender_name: &str, preview: &str) -> String {
    if sender_name.is_empty() {
        preview.to_string()
    } else {
        format!("{}: {}", sender_name, preview)
    }
}

/// Title and body for moderation and boost notifications about one ad.
pub fn ad_event_text(kind: NotificationKind, ad_title: &str, reason: Option<&str>) -> (String, String) {
    match kind {
        NotificationKind::AdValidated => (
            "Annonce validée".to_string(),
            format!("Votre annonce « {} » est maintenant en ligne.", ad_title),
        ),
        NotificationKind::AdRejected => {
            let message = match reason.map(str::trim).filter(|r| !r.is_empty()) {
                Some(reason) => format!("Votre annonce « {} » a été refusée : {}", ad_title, reason),
                None => format!("Votre annonce « {} » a été refusée.", ad_title),
            };
            ("Annonce refusée".to_string(), message)
        }
        NotificationKind::AdDeactivated => (
            "Annonce désactivée".to_string(),
            format!("Votre annonce « {} » a été désactivée.", ad_title),
        ),
        NotificationKind::AdDeleted => (
            "Annonce supprimée".to_string(),
            format!("Votre annonce « {} » a été supprimée.", ad_title),
        ),
        NotificationKind::BoostActivated => (
            "Boost activé".to_string(),
            format!("Votre annonce « {} » est maintenant boostée.", ad_title),
        ),
        NotificationKind::NewMessage => ("Nouveau message".to_string(), ad_title.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_body_prefixes_sender() {
        assert_eq!(chat_push_body("Awa Dossou", "Offre: 500 FCFA"), "Awa Dossou: Offre: 500 FCFA");
        assert_eq!(chat_push_body("", "hi"), "hi");
    }

    #[test]
    fn rejection_text_carries_reason_when_given() {
        let (title, body) = ad_event_text(NotificationKind::AdRejected, "Vélo", Some("Photos floues"));
        assert_eq!(title, "Annonce refusée");
        assert!(body.ends_with("Photos floues"));

        let (_, body) = ad_event_text(NotificationKind::AdRejected, "Vélo", Some("  "));
        assert!(body.ends_with("refusée."));
    }
}
