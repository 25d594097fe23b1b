use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::config::PushConfig;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("device token is invalid or unregistered: {0}")]
    InvalidToken(String),

    #[error("push transport failure: {0}")]
    Transport(String),
}

impl PushError {
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, PushError::InvalidToken(_))
    }
}

/// Payload delivered both as a data message and as a visible alert. Every
/// data value is a string, as FCM requires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}

impl PushPayload {
    pub fn new(kind: &str, title: &str, body: &str, extra: serde_json::Value) -> Self {
        let mut data = HashMap::new();
        if let serde_json::Value::Object(fields) = extra {
            for (key, value) in fields {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => continue,
                    other => other.to_string(),
                };
                data.insert(key, value);
            }
        }
        data.insert("type".to_string(), kind.to_string());
        data.insert("title".to_string(), title.to_string());
        data.insert("body".to_string(), body.to_string());

        Self {
            title: title.to_string(),
            body: body.to_string(),
            data,
        }
    }
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, token: &str, payload: &PushPayload) -> Result<(), PushError>;
}

/// Firebase Cloud Messaging over the legacy HTTP endpoint, which reports
/// per-token errors in its `results` array.
pub struct FcmTransport {
    client: Client,
    endpoint: String,
    server_key: String,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    results: Vec<FcmResult>,
}

#[derive(Debug, Deserialize)]
struct FcmResult {
    error: Option<String>,
}

const INVALID_TOKEN_ERRORS: &[&str] = &["NotRegistered", "InvalidRegistration", "MissingRegistration"];

impl FcmTransport {
    pub fn new(config: &PushConfig, server_key: String) -> Result<Self, PushError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PushError::Transport(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.fcm_endpoint.clone(),
            server_key,
        })
    }
}

#[async_trait]
impl PushTransport for FcmTransport {
    async fn send(&self, token: &str, payload: &PushPayload) -> Result<(), PushError> {
        let body = json!({
            "to": token,
            "priority": "high",
            "content_available": true,
            "notification": {
                "title": payload.title,
                "body": payload.body,
                "sound": "default",
            },
            "data": payload.data,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Transport(format!("fcm returned {}", status)));
        }

        let parsed: FcmResponse = response
            .json()
            .await
            .map_err(|e| PushError::Transport(format!("unreadable fcm response: {}", e)))?;

        match parsed.results.into_iter().find_map(|result| result.error) {
            Some(error) if INVALID_TOKEN_ERRORS.contains(&error.as_str()) => {
                Err(PushError::InvalidToken(error))
            }
            Some(error) => Err(PushError::Transport(error)),
            None => Ok(()),
        }
    }
}

/// Used when push delivery is disabled; records what would have been sent.
pub struct LogOnlyTransport;

#[async_trait]
impl PushTransport for LogOnlyTransport {
    async fn send(&self, token: &str, payload: &PushPayload) -> Result<(), PushError> {
        tracing::debug!(
            token_suffix = %token.chars().rev().take(6).collect::<String>(),
            title = %payload.title,
            "push disabled, not delivering"
        );
        Ok(())
    }
}
