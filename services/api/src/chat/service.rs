use axum::extract::ws::Message as Frame;
use kivendi_common::{AppError, Rejection};
use kivendi_database::{Conversation, Message};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

use super::hub::ChatHub;
use super::models::{message_preview, ConversationRow, ConversationSummary, InboundFrame, MessageDraft};
use crate::accounts;
use crate::moderation::pair_is_blocked;
use crate::notifications::NotificationService;
use crate::storage::{spawn_delete, ObjectStore};

/// What happened to an inbound chat frame.
#[derive(Debug)]
pub enum SendOutcome {
    Delivered(Message),
    /// The pair is blocked; nothing was stored or broadcast.
    Dropped,
}

#[derive(Clone)]
pub struct ConversationService {
    pool: PgPool,
    hub: ChatHub,
    notifications: NotificationService,
    store: Arc<dyn ObjectStore>,
}

impl ConversationService {
    pub fn new(
        pool: PgPool,
        hub: ChatHub,
        notifications: NotificationService,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            pool,
            hub,
            notifications,
            store,
        }
    }

    /// Returns the conversation between the ad owner and `buyer_id`, creating
    /// it on first contact.
    pub async fn open_conversation(&self, ad_id: i64, buyer_id: i64) -> Result<Conversation, AppError> {
        let owner_id: i64 = sqlx::query_scalar("SELECT user_id FROM ads WHERE id = $1")
            .bind(ad_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Rejection::AdNotFound)?;

        if owner_id == buyer_id {
            return Err(Rejection::SelfChat.into());
        }

        let buyer = accounts::load_user(&self.pool, buyer_id).await?;
        accounts::ensure_can_transact(&buyer)?;

        if pair_is_blocked(&self.pool, buyer_id, owner_id).await? {
            return Err(Rejection::Blocked.into());
        }

        // The unique index on (ad, unordered pair) settles concurrent first contacts.
        let created = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (ad_id, seller_id, buyer_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            RETURNING *
            "#,
        )
        .bind(ad_id)
        .bind(owner_id)
        .bind(buyer_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(conversation) = created {
            tracing::info!(conversation_id = conversation.id, ad_id, buyer_id, "conversation opened");
            return Ok(conversation);
        }

        let existing = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT * FROM conversations
            WHERE ad_id = $1
              AND LEAST(seller_id, buyer_id) = LEAST($2::BIGINT, $3::BIGINT)
              AND GREATEST(seller_id, buyer_id) = GREATEST($2::BIGINT, $3::BIGINT)
            "#,
        )
        .bind(ad_id)
        .bind(owner_id)
        .bind(buyer_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Internal(format!("conversation for ad {} vanished after conflict", ad_id)))?;

        Ok(existing)
    }

    /// Loads a conversation the requester takes part in.
    pub async fn participant_conversation(
        &self,
        conversation_id: i64,
        requester_id: i64,
    ) -> Result<Conversation, AppError> {
        let conversation = sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;

        if !conversation.is_participant(requester_id) {
            return Err(Rejection::Forbidden.into());
        }
        Ok(conversation)
    }

    pub async fn get_history(&self, conversation_id: i64, requester_id: i64) -> Result<Vec<Message>, AppError> {
        let conversation = self.participant_conversation(conversation_id, requester_id).await?;

        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE conversation_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(conversation.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    /// Marks the other participant's messages as read. Returns how many flipped.
    pub async fn mark_read(&self, conversation_id: i64, requester_id: i64) -> Result<u64, AppError> {
        let conversation = self.participant_conversation(conversation_id, requester_id).await?;

        let result = sqlx::query(
            r#"
            UPDATE messages SET is_read = TRUE
            WHERE conversation_id = $1 AND sender_id <> $2 AND NOT is_read
            "#,
        )
        .bind(conversation.id)
        .bind(requester_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Conversations of `user_id`, hiding blocked pairs, most recent activity first.
    pub async fn list_conversations(&self, user_id: i64) -> Result<Vec<ConversationSummary>, AppError> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT c.id, c.ad_id, c.seller_id, c.buyer_id, c.created_at,
                   a.title AS ad_title, a.images[1] AS ad_image,
                   u.id AS other_user_id,
                   u.first_name AS other_first_name, u.last_name AS other_last_name,
                   u.account_type AS other_account_type, u.shop_name AS other_shop_name,
                   u.avatar_url AS other_avatar_url,
                   lm.message_type AS last_message_type, lm.text AS last_message_text,
                   lm.offer_amount AS last_offer_amount, lm.created_at AS last_message_at,
                   (SELECT COUNT(*) FROM messages m
                     WHERE m.conversation_id = c.id AND m.sender_id <> $1 AND NOT m.is_read
                   ) AS unread_count
            FROM conversations c
            JOIN ads a ON a.id = c.ad_id
            JOIN users u ON u.id = CASE WHEN c.seller_id = $1 THEN c.buyer_id ELSE c.seller_id END
            LEFT JOIN LATERAL (
                SELECT m.message_type, m.text, m.offer_amount, m.created_at
                FROM messages m
                WHERE m.conversation_id = c.id
                ORDER BY m.created_at DESC, m.id DESC
                LIMIT 1
            ) lm ON TRUE
            WHERE (c.seller_id = $1 OR c.buyer_id = $1)
              AND NOT EXISTS (
                SELECT 1 FROM blocks b
                WHERE (b.blocker_id = c.seller_id AND b.blocked_id = c.buyer_id)
                   OR (b.blocker_id = c.buyer_id AND b.blocked_id = c.seller_id)
              )
            ORDER BY GREATEST(COALESCE(lm.created_at, c.created_at), c.created_at) DESC, c.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ConversationSummary::from).collect())
    }

    /// Validates, stores and fans out one inbound frame from `sender_id`.
    /// Only validation and storage failures reach the caller; broadcast,
    /// notification and push are best-effort.
    pub async fn send_message(
        &self,
        conversation: &Conversation,
        sender_id: i64,
        frame: InboundFrame,
    ) -> Result<SendOutcome, AppError> {
        if !conversation.is_participant(sender_id) {
            return Err(Rejection::Forbidden.into());
        }
        let recipient_id = conversation.other_participant(sender_id);

        // Checked per frame: a block may land while the socket is open.
        if pair_is_blocked(&self.pool, sender_id, recipient_id).await? {
            tracing::warn!(conversation_id = conversation.id, sender_id, "dropping frame for blocked pair");
            return Ok(SendOutcome::Dropped);
        }

        let draft = MessageDraft::from_frame(frame)?;
        let message_type = draft.message_type();
        let (text, offer_amount, image_urls) = match draft {
            MessageDraft::Text(text) => (Some(text), None, Vec::new()),
            MessageDraft::Offer(amount) => (None, Some(amount), Vec::new()),
            MessageDraft::Image(images) => {
                let urls = self.store.upload_base64_images(&images).await?;
                (None, None, urls)
            }
        };

        let stored = self
            .insert_message(conversation.id, sender_id, message_type.as_str(), text, offer_amount, &image_urls)
            .await;
        let message = match stored {
            Ok(message) => message,
            Err(e) => {
                spawn_delete(self.store.clone(), image_urls);
                return Err(e);
            }
        };

        self.fan_out(conversation, recipient_id, &message).await;
        Ok(SendOutcome::Delivered(message))
    }

    async fn insert_message(
        &self,
        conversation_id: i64,
        sender_id: i64,
        message_type: &str,
        text: Option<String>,
        offer_amount: Option<Decimal>,
        image_urls: &[String],
    ) -> Result<Message, AppError> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (conversation_id, sender_id, message_type, text, offer_amount, image_urls)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(sender_id)
        .bind(message_type)
        .bind(text)
        .bind(offer_amount)
        .bind(image_urls)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    async fn fan_out(&self, conversation: &Conversation, recipient_id: i64, message: &Message) {
        match serde_json::to_string(message) {
            Ok(frame) => {
                let delivered = self.hub.broadcast(conversation.id, Frame::Text(frame)).await;
                tracing::debug!(conversation_id = conversation.id, message_id = message.id, delivered, "message broadcast");
            }
            Err(e) => tracing::error!(message_id = message.id, error = %e, "failed to encode message frame"),
        }

        let signal = json!({
            "type": "new_message_notification",
            "conversation_id": conversation.id,
        });
        self.hub.notify(recipient_id, Frame::Text(signal.to_string())).await;

        let preview = message_preview(&message.message_type, message.text.as_deref(), message.offer_amount);
        self.notifications.spawn_chat_push(
            recipient_id,
            message.sender_id,
            preview,
            conversation.id,
            conversation.ad_id,
            message.id,
        );
    }
}
