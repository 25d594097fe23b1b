use chrono::{DateTime, Utc};
use kivendi_common::{AppError, MessageType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Frame sent by a client on a conversation socket.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub text: Option<String>,
    pub offer_amount: Option<Decimal>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// An inbound frame that passed validation for its type.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageDraft {
    Text(String),
    /// Base64 payloads still to be uploaded.
    Image(Vec<String>),
    Offer(Decimal),
}

impl MessageDraft {
    pub fn from_frame(frame: InboundFrame) -> Result<Self, AppError> {
        match frame.message_type {
            MessageType::Text => {
                let text = frame.text.unwrap_or_default();
                if text.trim().is_empty() {
                    return Err(AppError::Validation("text must not be empty".to_string()));
                }
                Ok(MessageDraft::Text(text))
            }
            MessageType::Image => {
                let images: Vec<String> = frame
                    .images
                    .into_iter()
                    .filter(|image| !image.trim().is_empty())
                    .collect();
                if images.is_empty() {
                    return Err(AppError::Validation("at least one image is required".to_string()));
                }
                Ok(MessageDraft::Image(images))
            }
            MessageType::Offer => match frame.offer_amount {
                Some(amount) if amount >= Decimal::ZERO => Ok(MessageDraft::Offer(amount)),
                Some(_) => Err(AppError::Validation("offer_amount must not be negative".to_string())),
                None => Err(AppError::Validation("offer_amount is required".to_string())),
            },
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            MessageDraft::Text(_) => MessageType::Text,
            MessageDraft::Image(_) => MessageType::Image,
            MessageDraft::Offer(_) => MessageType::Offer,
        }
    }
}

/// Short text shown in conversation lists and chat pushes.
pub fn message_preview(message_type: &str, text: Option<&str>, offer_amount: Option<Decimal>) -> String {
    match message_type.parse::<MessageType>() {
        Ok(MessageType::Image) => "Image partagée".to_string(),
        Ok(MessageType::Offer) => format!(
            "Offre: {} FCFA",
            offer_amount.unwrap_or_default().normalize()
        ),
        _ => text.unwrap_or_default().to_string(),
    }
}

#[derive(Debug, Serialize)]
pub struct OpenConversationResponse {
    pub conversation_id: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: u64,
}

#[derive(Debug, FromRow)]
pub struct ConversationRow {
    pub id: i64,
    pub ad_id: i64,
    pub seller_id: i64,
    pub buyer_id: i64,
    pub created_at: DateTime<Utc>,
    pub ad_title: String,
    pub ad_image: Option<String>,
    pub other_user_id: i64,
    pub other_first_name: String,
    pub other_last_name: String,
    pub other_account_type: String,
    pub other_shop_name: Option<String>,
    pub other_avatar_url: Option<String>,
    pub last_message_type: Option<String>,
    pub last_message_text: Option<String>,
    pub last_offer_amount: Option<Decimal>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: i64,
    pub ad_id: i64,
    pub seller_id: i64,
    pub buyer_id: i64,
    pub created_at: DateTime<Utc>,
    pub ad_title: String,
    pub ad_image: Option<String>,
    pub other_user_id: i64,
    pub other_user_name: String,
    pub other_user_avatar: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
}

impl From<ConversationRow> for ConversationSummary {
    fn from(row: ConversationRow) -> Self {
        let last_message = row.last_message_type.as_deref().map(|kind| {
            message_preview(kind, row.last_message_text.as_deref(), row.last_offer_amount)
        });
        Self {
            other_user_name: crate::accounts::display_name(
                &row.other_account_type,
                &row.other_first_name,
                &row.other_last_name,
                row.other_shop_name.as_deref(),
            ),
            id: row.id,
            ad_id: row.ad_id,
            seller_id: row.seller_id,
            buyer_id: row.buyer_id,
            created_at: row.created_at,
            ad_title: row.ad_title,
            ad_image: row.ad_image,
            other_user_id: row.other_user_id,
            other_user_avatar: row.other_avatar_url,
            last_message,
            last_message_at: row.last_message_at,
            unread_count: row.unread_count,
        }
    }
}
