use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use kivendi_auth::{Capability, CurrentStaff, CurrentUser};
use kivendi_common::{ApiResponse, AppError};
use kivendi_database::Ad;

use super::models::{CreateAdRequest, ModerationAction, RejectAdRequest, UpdateAdRequest};
use crate::accounts::require_capability;
use crate::AppState;

pub async fn create_ad(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateAdRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Ad>>), AppError> {
    let ad = state.ads.create(user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(ad))))
}

/// Signed-in owners also see their ads before validation.
pub async fn get_ad(
    State(state): State<AppState>,
    user: Option<CurrentUser>,
    Path(ad_id): Path<i64>,
) -> Result<Json<ApiResponse<Ad>>, AppError> {
    let ad = state.ads.get(ad_id, user.map(|u| u.user_id)).await?;
    Ok(Json(ApiResponse::success(ad)))
}

pub async fn update_ad(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(ad_id): Path<i64>,
    Json(request): Json<UpdateAdRequest>,
) -> Result<Json<ApiResponse<Ad>>, AppError> {
    let ad = state.ads.update_by_owner(user.user_id, ad_id, request).await?;
    Ok(Json(ApiResponse::success(ad)))
}

pub async fn delete_ad(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(ad_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.ads.delete_by_owner(user.user_id, ad_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_sold(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(ad_id): Path<i64>,
) -> Result<Json<ApiResponse<Ad>>, AppError> {
    let ad = state.ads.mark_sold(user.user_id, ad_id).await?;
    Ok(Json(ApiResponse::success(ad)))
}

pub async fn my_ads(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<Vec<Ad>>>, AppError> {
    let ads = state.ads.list_mine(user.user_id).await?;
    Ok(Json(ApiResponse::success(ads)))
}

// Staff

pub async fn validate_ad(
    State(state): State<AppState>,
    staff: CurrentStaff,
    Path(ad_id): Path<i64>,
) -> Result<Json<ApiResponse<Ad>>, AppError> {
    require_capability(&state.db_pool, staff, Capability::ModerateContent).await?;
    let ad = state.ads.moderate(ad_id, ModerationAction::Validate).await?;
    Ok(Json(ApiResponse::success(ad)))
}

pub async fn reject_ad(
    State(state): State<AppState>,
    staff: CurrentStaff,
    Path(ad_id): Path<i64>,
    request: Option<Json<RejectAdRequest>>,
) -> Result<Json<ApiResponse<Ad>>, AppError> {
    require_capability(&state.db_pool, staff, Capability::ModerateContent).await?;
    let reason = request.and_then(|Json(body)| body.reason);
    let ad = state.ads.moderate(ad_id, ModerationAction::Reject { reason }).await?;
    Ok(Json(ApiResponse::success(ad)))
}

pub async fn deactivate_ad(
    State(state): State<AppState>,
    staff: CurrentStaff,
    Path(ad_id): Path<i64>,
) -> Result<Json<ApiResponse<Ad>>, AppError> {
    require_capability(&state.db_pool, staff, Capability::ModerateContent).await?;
    let ad = state.ads.moderate(ad_id, ModerationAction::Deactivate).await?;
    Ok(Json(ApiResponse::success(ad)))
}

pub async fn admin_update_ad(
    State(state): State<AppState>,
    staff: CurrentStaff,
    Path(ad_id): Path<i64>,
    Json(request): Json<UpdateAdRequest>,
) -> Result<Json<ApiResponse<Ad>>, AppError> {
    require_capability(&state.db_pool, staff, Capability::ModerateContent).await?;
    let ad = state.ads.admin_update(ad_id, request).await?;
    Ok(Json(ApiResponse::success(ad)))
}

pub async fn admin_delete_ad(
    State(state): State<AppState>,
    staff: CurrentStaff,
    Path(ad_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let admin = require_capability(&state.db_pool, staff, Capability::ModerateContent).await?;
    state.ads.admin_delete(ad_id).await?;
    tracing::info!(ad_id, admin_id = admin.id, "ad removed by staff");
    Ok(StatusCode::NO_CONTENT)
}
