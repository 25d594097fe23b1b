use axum::{extract::State, response::Json};
use kivendi_common::{ApiResponse, AppError};
use serde::Serialize;

use crate::accounts::{self, StaffLoginRequest, StaffLoginResponse};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub database: bool,
}

pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<Health>> {
    let database = sqlx::query("SELECT 1").execute(&state.db_pool).await.is_ok();
    if !database {
        tracing::warn!("health check could not reach the database");
    }
    Json(ApiResponse::success(Health {
        status: if database { "ok" } else { "degraded" },
        database,
    }))
}

pub async fn staff_login(
    State(state): State<AppState>,
    Json(request): Json<StaffLoginRequest>,
) -> Result<Json<ApiResponse<StaffLoginResponse>>, AppError> {
    let response = accounts::staff_login(&state.db_pool, &state.jwt_service, request).await?;
    Ok(Json(ApiResponse::success(response)))
}
