use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kivendi_api::{
    app,
    config::ApiConfig,
    gateways::{KkiapayGateway, PaymentGateway},
    notifications::{FcmTransport, LogOnlyTransport, PushTransport},
    storage::{LocalObjectStore, ObjectStore},
    AppState,
};
use kivendi_database::{create_pool, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kivendi_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = ApiConfig::from_env();

    // Database
    let db_pool = create_pool(&config.database)
        .await
        .context("failed to connect to the database")?;
    run_migrations(&db_pool).await.context("failed to run migrations")?;

    // Collaborators
    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(KkiapayGateway::new(&config.gateway).context("failed to build the payment gateway")?);
    if config.gateway.sandbox {
        tracing::warn!(base_url = %config.gateway.base_url, "payment gateway in sandbox mode");
    }

    let push: Arc<dyn PushTransport> = match (config.push.enabled, config.push.fcm_server_key.clone()) {
        (true, Some(server_key)) => Arc::new(
            FcmTransport::new(&config.push, server_key).context("failed to build the push transport")?,
        ),
        (true, None) => {
            tracing::warn!("push enabled without FCM_SERVER_KEY, pushes are only logged");
            Arc::new(LogOnlyTransport)
        }
        (false, _) => Arc::new(LogOnlyTransport),
    };

    let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(&config.storage));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let every = config.boost.expiration_interval();
    let state = AppState::new(config, db_pool, gateway, push, store);

    // Background jobs
    let _scheduler = state
        .expiration
        .clone()
        .schedule(every)
        .await
        .context("failed to start the boost expiration job")?;

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Kivendi API listening on {}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
