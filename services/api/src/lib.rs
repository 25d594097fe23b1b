pub mod accounts;
pub mod ads;
pub mod boost;
pub mod chat;
pub mod config;
pub mod gateways;
pub mod handlers;
pub mod moderation;
pub mod notifications;
pub mod routes;
pub mod storage;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    response::Json,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use kivendi_auth::JwtService;
use kivendi_common::ApiResponse;
use kivendi_database::DbPool;

use crate::ads::AdService;
use crate::boost::{BoostService, ExpirationJob, WebhookService};
use crate::chat::{ChatHub, ConversationService};
use crate::config::ApiConfig;
use crate::gateways::PaymentGateway;
use crate::moderation::{BlockService, ReportService};
use crate::notifications::{NotificationService, PushTransport};
use crate::storage::ObjectStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub db_pool: DbPool,
    pub jwt_service: JwtService,
    pub hub: ChatHub,
    pub conversations: ConversationService,
    pub blocks: BlockService,
    pub reports: ReportService,
    pub ads: AdService,
    pub boosts: BoostService,
    pub webhooks: WebhookService,
    pub expiration: ExpirationJob,
    pub notifications: NotificationService,
    pub store: Arc<dyn ObjectStore>,
}

impl AppState {
    /// Wires the services over one pool and the given collaborators.
    pub fn new(
        config: ApiConfig,
        db_pool: DbPool,
        gateway: Arc<dyn PaymentGateway>,
        push: Arc<dyn PushTransport>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let jwt_service = JwtService::new(config.jwt.clone());
        let hub = ChatHub::new(config.websocket.outbound_buffer);
        let notifications = NotificationService::new(db_pool.clone(), push);
        let conversations =
            ConversationService::new(db_pool.clone(), hub.clone(), notifications.clone(), store.clone());
        let boosts = BoostService::new(
            db_pool.clone(),
            gateway,
            notifications.clone(),
            config.boost.relaxed_amount_check,
        );

        Self {
            blocks: BlockService::new(db_pool.clone()),
            reports: ReportService::new(db_pool.clone()),
            ads: AdService::new(db_pool.clone(), store.clone(), notifications.clone()),
            webhooks: WebhookService::new(db_pool.clone(), config.gateway.webhook_secret.clone()),
            expiration: ExpirationJob::new(db_pool.clone()),
            config: Arc::new(config),
            db_pool,
            jwt_service,
            hub,
            conversations,
            boosts,
            notifications,
            store,
        }
    }
}

/// The full HTTP and WebSocket surface, ready to serve.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let media = ServeDir::new(&state.config.storage.root_dir);

    routes::create_routes(state.jwt_service.clone())
        .nest_service("/media", media)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(state.config.storage.max_body_bytes)),
        )
        .fallback(handler_404)
        .with_state(state)
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.server.allows_any_origin() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

async fn handler_404() -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error("Endpoint not found".to_string())),
    )
}
