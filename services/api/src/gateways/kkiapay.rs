use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{GatewayError, GatewayTransaction, PaymentGateway};
use crate::config::GatewayConfig;

#[derive(Clone)]
pub struct KkiapayGateway {
    client: Client,
    config: GatewayConfig,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    amount: Decimal,
}

impl KkiapayGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn status_url(&self) -> String {
        format!(
            "{}/api/v1/transactions/status",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl PaymentGateway for KkiapayGateway {
    async fn verify_transaction(&self, transaction_id: &str) -> Result<GatewayTransaction, GatewayError> {
        let response = self
            .client
            .post(self.status_url())
            .header("x-api-key", &self.config.public_key)
            .header("x-private-key", &self.config.private_key)
            .header("x-secret-key", &self.config.secret_key)
            .json(&json!({ "transactionId": transaction_id }))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound);
        }
        if status.is_server_error() {
            return Err(GatewayError::Unavailable(format!("gateway returned {}", status)));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("unreadable response: {}", e)))?;

        if status.is_client_error() {
            tracing::warn!(transaction_id, %status, "gateway refused transaction lookup");
            return Err(GatewayError::Rejected(format!("gateway returned {}", status)));
        }

        let parsed: StatusResponse = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::Unavailable(format!("unexpected response: {}", e)))?;

        tracing::debug!(transaction_id, status = %parsed.status, amount = %parsed.amount, "transaction verified");

        Ok(GatewayTransaction {
            transaction_id: transaction_id.to_string(),
            status: parsed.status,
            state: parsed.state.unwrap_or_default(),
            amount: parsed.amount,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn gateway(base_url: String) -> KkiapayGateway {
        KkiapayGateway::new(&GatewayConfig {
            public_key: "pub".to_string(),
            private_key: "priv".to_string(),
            secret_key: "sec".to_string(),
            base_url,
            sandbox: true,
            webhook_secret: "hook".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn successful_lookup_sends_keys_and_parses_amount() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/transactions/status")
            .match_header("x-api-key", "pub")
            .match_header("x-private-key", "priv")
            .match_header("x-secret-key", "sec")
            .match_body(Matcher::Json(json!({ "transactionId": "TX-ABC" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"SUCCESS","state":"RECEIVED","amount":500,"source":"MOBILE_MONEY"}"#)
            .create_async()
            .await;

        let tx = gateway(server.url()).verify_transaction("TX-ABC").await.unwrap();

        mock.assert_async().await;
        assert!(tx.is_success());
        assert_eq!(tx.state, "RECEIVED");
        assert_eq!(tx.amount, Decimal::from(500));
        assert_eq!(tx.raw["source"], "MOBILE_MONEY");
    }

    #[tokio::test]
    async fn unknown_transaction_maps_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/transactions/status")
            .with_status(404)
            .with_body(r#"{"status":"TRANSACTION_NOT_FOUND"}"#)
            .create_async()
            .await;

        let err = gateway(server.url()).verify_transaction("nope").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound));
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/transactions/status")
            .with_status(503)
            .create_async()
            .await;

        let err = gateway(server.url()).verify_transaction("TX").await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }

    #[tokio::test]
    async fn failed_payment_is_reported_not_raised() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/transactions/status")
            .with_status(200)
            .with_body(r#"{"status":"FAILED","amount":0}"#)
            .create_async()
            .await;

        let tx = gateway(server.url()).verify_transaction("TX").await.unwrap();
        assert!(!tx.is_success());
        assert_eq!(tx.state, "");
    }
}
