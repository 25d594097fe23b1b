#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use tower::ServiceExt;
use uuid::Uuid;

use kivendi_api::{
    app,
    config::ApiConfig,
    gateways::{GatewayError, GatewayTransaction, PaymentGateway},
    notifications::{PushError, PushPayload, PushTransport},
    storage::LocalObjectStore,
    AppState,
};
use kivendi_database::{connect, run_migrations, DbPool};

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Gateway answering from a table filled by the test.
#[derive(Default)]
pub struct FakeGateway {
    transactions: Mutex<HashMap<String, GatewayTransaction>>,
    calls: AtomicUsize,
}

impl FakeGateway {
    pub fn succeed(&self, transaction_id: &str, amount: i64) {
        self.set(transaction_id, "SUCCESS", amount);
    }

    pub fn set(&self, transaction_id: &str, status: &str, amount: i64) {
        let transaction = GatewayTransaction {
            transaction_id: transaction_id.to_string(),
            status: status.to_string(),
            state: "RECEIVED".to_string(),
            amount: Decimal::from(amount),
            raw: serde_json::json!({ "transactionId": transaction_id, "status": status, "amount": amount }),
        };
        self.transactions
            .lock()
            .unwrap()
            .insert(transaction_id.to_string(), transaction);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn verify_transaction(&self, transaction_id: &str) -> Result<GatewayTransaction, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.transactions
            .lock()
            .unwrap()
            .get(transaction_id)
            .cloned()
            .ok_or(GatewayError::NotFound)
    }
}

/// Push transport that keeps every delivery in memory.
#[derive(Default)]
pub struct RecordingPush {
    sent: Mutex<Vec<(String, String, String)>>,
    unregistered: Mutex<HashSet<String>>,
}

impl RecordingPush {
    /// Makes later sends to `token` fail as an unregistered device.
    pub fn unregister(&self, token: &str) {
        self.unregistered.lock().unwrap().insert(token.to_string());
    }

    /// `(token, title, body)` for every push sent so far.
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.sent().into_iter().map(|(token, _, _)| token).collect()
    }
}

#[async_trait]
impl PushTransport for RecordingPush {
    async fn send(&self, token: &str, payload: &PushPayload) -> Result<(), PushError> {
        if self.unregistered.lock().unwrap().contains(token) {
            return Err(PushError::InvalidToken(token.to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((token.to_string(), payload.title.clone(), payload.body.clone()));
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub pool: DbPool,
    pub gateway: Arc<FakeGateway>,
    pub push: Arc<RecordingPush>,
}

/// Builds the app against `DATABASE_URL`, or returns `None` so the test can skip.
pub async fn test_app() -> Option<TestApp> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping database test");
        return None;
    };

    let pool = connect(&url, 5).await.expect("database should be reachable");
    run_migrations(&pool).await.expect("migrations should apply");

    let mut config = ApiConfig::from_env();
    config.jwt.secret = "integration-test-secret".to_string();
    config.gateway.webhook_secret = WEBHOOK_SECRET.to_string();
    config.boost.relaxed_amount_check = false;
    config.storage.root_dir = std::env::temp_dir()
        .join(format!("kivendi-media-{}", Uuid::new_v4()))
        .to_string_lossy()
        .into_owned();

    let gateway = Arc::new(FakeGateway::default());
    let push = Arc::new(RecordingPush::default());
    let store = Arc::new(LocalObjectStore::new(&config.storage));

    let state = AppState::new(config, pool.clone(), gateway.clone(), push.clone(), store);
    let router = app(state.clone());

    Some(TestApp {
        state,
        router,
        pool,
        gateway,
        push,
    })
}

impl TestApp {
    pub fn user_token(&self, user_id: i64) -> String {
        self.state.jwt_service.issue_user_token(user_id).unwrap()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        send(&self.router, request).await
    }

    pub async fn create_user(&self) -> i64 {
        create_user(&self.pool, true, false).await
    }

    pub async fn create_ad(&self, owner_id: i64, validated: bool) -> i64 {
        create_ad(&self.pool, owner_id, validated).await
    }

    pub async fn create_offer(&self, price: i64, duration_days: i32) -> i64 {
        create_offer(&self.pool, price, duration_days).await
    }

    pub async fn ad_is_boosted(&self, ad_id: i64) -> bool {
        sqlx::query_scalar("SELECT is_boosted FROM ads WHERE id = $1")
            .bind(ad_id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

pub async fn create_user(pool: &DbPool, verified: bool, blocked: bool) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO users (first_name, last_name, email, password_hash, is_verified, is_blocked)
        VALUES ('Test', 'User', $1, 'not-a-hash', $2, $3)
        RETURNING id
        "#,
    )
    .bind(format!("user-{}@example.com", Uuid::new_v4()))
    .bind(verified)
    .bind(blocked)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn create_sub_category(pool: &DbPool) -> i64 {
    let category_id: i64 = sqlx::query_scalar("INSERT INTO categories (name) VALUES ($1) RETURNING id")
        .bind(format!("category-{}", Uuid::new_v4()))
        .fetch_one(pool)
        .await
        .unwrap();
    sqlx::query_scalar("INSERT INTO sub_categories (category_id, name) VALUES ($1, 'General') RETURNING id")
        .bind(category_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn create_ad(pool: &DbPool, owner_id: i64, validated: bool) -> i64 {
    let sub_category_id = create_sub_category(pool).await;
    sqlx::query_scalar(
        r#"
        INSERT INTO ads (user_id, sub_category_id, title, price, images, city, is_validated)
        VALUES ($1, $2, 'Vélo de ville', 25000, ARRAY['http://localhost/media/bike.jpg'], 'Cotonou', $3)
        RETURNING id
        "#,
    )
    .bind(owner_id)
    .bind(sub_category_id)
    .bind(validated)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn create_offer(pool: &DbPool, price: i64, duration_days: i32) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO boost_offers (name, duration_days, price) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(format!("offer-{}", Uuid::new_v4()))
    .bind(duration_days)
    .bind(Decimal::from(price))
    .fetch_one(pool)
    .await
    .unwrap()
}
