use kivendi_common::{AppError, DatabaseConfig};
use sqlx::{migrate::MigrateDatabase, postgres::PgPoolOptions, PgPool, Postgres};

pub type DbPool = PgPool;

pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool, AppError> {
    connect(&config.connection_string(), config.max_connections).await
}

/// Connects to `url`, creating the database first when it does not exist.
pub async fn connect(url: &str, max_connections: u32) -> Result<DbPool, AppError> {
    if !Postgres::database_exists(url).await.unwrap_or(false) {
        tracing::info!("Creating database");
        Postgres::create_database(url).await?;
    }

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;

    tracing::info!(max_connections, "Database connection established");
    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::Internal(format!("migration failed: {}", e)))?;

    tracing::info!("Database migrations completed");
    Ok(())
}
