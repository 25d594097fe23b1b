use chrono::{DateTime, Utc};
use kivendi_database::{Ad, AdBoost};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct PurchaseBoostRequest {
    pub boost_offer_id: i64,
    #[validate(length(min = 1, max = 255))]
    pub transaction_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GrantBoostRequest {
    pub boost_offer_id: i64,
}

fn default_features() -> serde_json::Value {
    serde_json::Value::Array(Vec::new())
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOfferRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 1, max = 365))]
    pub duration_days: i32,
    pub price: Decimal,
    #[serde(default)]
    pub position_priority: i32,
    #[serde(default = "default_features")]
    pub features: serde_json::Value,
    pub color: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub display_order: i32,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateOfferRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 1, max = 365))]
    pub duration_days: Option<i32>,
    pub price: Option<Decimal>,
    pub position_priority: Option<i32>,
    pub features: Option<serde_json::Value>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
    pub display_order: Option<i32>,
}

/// Boost state of one ad, taken from its newest live boost.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
pub struct BoostStatus {
    pub is_boosted: bool,
    pub end_date: Option<DateTime<Utc>>,
    pub offer_name: Option<String>,
    pub offer_color: Option<String>,
    pub priority: Option<i32>,
}

impl BoostStatus {
    pub fn not_boosted() -> Self {
        Self {
            is_boosted: false,
            end_date: None,
            offer_name: None,
            offer_color: None,
            priority: None,
        }
    }
}

#[derive(Debug, Serialize, FromRow)]
pub struct BoostedAd {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub ad: Ad,
    pub boost_id: i64,
    pub boost_end_date: DateTime<Utc>,
    pub offer_name: Option<String>,
    pub offer_color: Option<String>,
    pub position_priority: i32,
}

#[derive(Debug, Serialize, FromRow)]
pub struct BoostHistoryEntry {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub boost: AdBoost,
    pub ad_title: String,
    pub offer_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventType {
    PaymentSucceeded,
    PaymentFailed,
    Refund,
    Other,
}

impl WebhookEventType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PAYMENT_SUCCEEDED" => WebhookEventType::PaymentSucceeded,
            "PAYMENT_FAILED" => WebhookEventType::PaymentFailed,
            "REFUND" => WebhookEventType::Refund,
            _ => WebhookEventType::Other,
        }
    }
}

/// Body posted by the gateway on payment state changes.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(alias = "transactionId")]
    pub transaction_id: String,
    pub amount: Option<Decimal>,
    pub status: Option<String>,
    pub state: Option<String>,
    pub reason: Option<String>,
}

impl WebhookEvent {
    pub fn kind(&self) -> WebhookEventType {
        WebhookEventType::parse(&self.event_type)
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}
