pub mod kkiapay;

use async_trait::async_trait;
use kivendi_common::{AppError, Rejection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::kkiapay::KkiapayGateway;

/// Outcome of a transaction lookup as reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayTransaction {
    pub transaction_id: String,
    pub status: String,
    pub state: String,
    pub amount: Decimal,
    /// Full gateway response kept for the payment audit trail.
    pub raw: serde_json::Value,
}

impl GatewayTransaction {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("SUCCESS")
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transaction not found")]
    NotFound,

    #[error("gateway rejected the request: {0}")]
    Rejected(String),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound | GatewayError::Rejected(_) => {
                Rejection::InvalidTransaction.into()
            }
            GatewayError::Unavailable(msg) => AppError::ExternalService(msg),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn verify_transaction(&self, transaction_id: &str) -> Result<GatewayTransaction, GatewayError>;
}
