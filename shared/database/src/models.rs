use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub account_type: String,
    pub shop_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Admin {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubCategory {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ad {
    pub id: i64,
    pub user_id: i64,
    pub sub_category_id: i64,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub images: Vec<String>, // PostgreSQL text array
    pub form_data: Option<serde_json::Value>,
    pub city: String,
    pub phone: Option<String>,
    pub show_phone: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_validated: bool,
    pub is_rejected: bool,
    pub is_deactivated: bool,
    pub is_boosted: bool,
    pub is_sold: bool,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ad {
    pub fn is_publicly_visible(&self) -> bool {
        self.is_validated && !self.is_rejected && !self.is_deactivated && !self.is_sold
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: i64,
    pub ad_id: i64,
    pub seller_id: i64,
    pub buyer_id: i64,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_participant(&self, user_id: i64) -> bool {
        self.seller_id == user_id || self.buyer_id == user_id
    }

    /// The participant that is not `user_id`.
    pub fn other_participant(&self, user_id: i64) -> i64 {
        if self.seller_id == user_id {
            self.buyer_id
        } else {
            self.seller_id
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    #[serde(rename = "type")]
    pub message_type: String,
    pub text: Option<String>,
    pub offer_amount: Option<Decimal>,
    pub image_urls: Vec<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Block {
    pub blocker_id: i64,
    pub blocked_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Report {
    pub id: i64,
    pub reporter_id: i64,
    pub reported_id: i64,
    pub conversation_id: i64,
    pub reason: String,
    pub status: String,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BoostOffer {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub duration_days: i32,
    pub price: Decimal,
    pub position_priority: i32,
    pub features: serde_json::Value,
    pub color: Option<String>,
    pub is_active: bool,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdBoost {
    pub id: i64,
    pub ad_id: i64,
    pub boost_offer_id: Option<i64>,
    pub user_id: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    pub payment_status: String,
    pub payment_method: String,
    pub transaction_id: String,
    pub amount_paid: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdBoost {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.end_date > now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentRecord {
    pub id: i64,
    pub transaction_id: String,
    pub boost_id: Option<i64>,
    pub ad_id: Option<i64>,
    pub user_id: Option<i64>,
    pub amount: Decimal,
    pub status: String,
    pub state: String,
    pub raw_response: serde_json::Value,
    pub verified_at: Option<DateTime<Utc>>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeviceToken {
    pub token: String,
    pub user_id: i64,
    pub device_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationPreference {
    pub user_id: i64,
    pub global_enabled: bool,
    pub email_enabled: bool,
    pub push_enabled: bool,
    pub message_enabled: bool,
    pub ad_enabled: bool,
    pub favorite_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreference {
    /// Preferences of a user without a stored row.
    pub fn defaults_for(user_id: i64) -> Self {
        Self {
            user_id,
            global_enabled: true,
            email_enabled: true,
            push_enabled: true,
            message_enabled: true,
            ad_enabled: true,
            favorite_enabled: true,
            updated_at: Utc::now(),
        }
    }

    pub fn allows_push(&self) -> bool {
        self.global_enabled && self.push_enabled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
