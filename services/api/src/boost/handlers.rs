use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use kivendi_auth::{Capability, CurrentStaff, CurrentUser};
use kivendi_common::{ApiResponse, AppError};
use kivendi_database::{AdBoost, BoostOffer};

use super::models::{
    BoostHistoryEntry, BoostStatus, BoostedAd, CreateOfferRequest, GrantBoostRequest,
    PurchaseBoostRequest, UpdateOfferRequest, WebhookAck,
};
use super::webhooks::SIGNATURE_HEADER;
use crate::accounts::require_capability;
use crate::AppState;

pub async fn list_offers(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<BoostOffer>>>, AppError> {
    let offers = state.boosts.list_offers().await?;
    Ok(Json(ApiResponse::success(offers)))
}

pub async fn get_offer(
    State(state): State<AppState>,
    Path(offer_id): Path<i64>,
) -> Result<Json<ApiResponse<BoostOffer>>, AppError> {
    let offer = state.boosts.get_offer(offer_id).await?;
    Ok(Json(ApiResponse::success(offer)))
}

pub async fn purchase_boost(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(ad_id): Path<i64>,
    Json(request): Json<PurchaseBoostRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AdBoost>>), AppError> {
    let boost = state.boosts.purchase(user.user_id, ad_id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(boost))))
}

pub async fn list_boosted_ads(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<BoostedAd>>>, AppError> {
    let ads = state.boosts.list_boosted_ads().await?;
    Ok(Json(ApiResponse::success(ads)))
}

pub async fn boost_status(
    State(state): State<AppState>,
    Path(ad_id): Path<i64>,
) -> Result<Json<ApiResponse<BoostStatus>>, AppError> {
    let status = state.boosts.check_ad_boost(ad_id).await?;
    Ok(Json(ApiResponse::success(status)))
}

pub async fn my_boosts(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<Vec<BoostHistoryEntry>>>, AppError> {
    let history = state.boosts.history(user.user_id).await?;
    Ok(Json(ApiResponse::success(history)))
}

/// Signature is checked over the raw body, so it is read as bytes.
pub async fn kkiapay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let ack = state.webhooks.handle(signature, &body).await?;
    Ok(Json(ack))
}

// Staff

pub async fn admin_list_offers(
    State(state): State<AppState>,
    staff: CurrentStaff,
) -> Result<Json<ApiResponse<Vec<BoostOffer>>>, AppError> {
    require_capability(&state.db_pool, staff, Capability::ManageBoostOffers).await?;
    let offers = state.boosts.list_all_offers().await?;
    Ok(Json(ApiResponse::success(offers)))
}

pub async fn admin_create_offer(
    State(state): State<AppState>,
    staff: CurrentStaff,
    Json(request): Json<CreateOfferRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BoostOffer>>), AppError> {
    require_capability(&state.db_pool, staff, Capability::ManageBoostOffers).await?;
    let offer = state.boosts.create_offer(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(offer))))
}

pub async fn admin_update_offer(
    State(state): State<AppState>,
    staff: CurrentStaff,
    Path(offer_id): Path<i64>,
    Json(request): Json<UpdateOfferRequest>,
) -> Result<Json<ApiResponse<BoostOffer>>, AppError> {
    require_capability(&state.db_pool, staff, Capability::ManageBoostOffers).await?;
    let offer = state.boosts.update_offer(offer_id, request).await?;
    Ok(Json(ApiResponse::success(offer)))
}

pub async fn admin_delete_offer(
    State(state): State<AppState>,
    staff: CurrentStaff,
    Path(offer_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    require_capability(&state.db_pool, staff, Capability::ManageBoostOffers).await?;
    state.boosts.delete_offer(offer_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn admin_grant_boost(
    State(state): State<AppState>,
    staff: CurrentStaff,
    Path(ad_id): Path<i64>,
    Json(request): Json<GrantBoostRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AdBoost>>), AppError> {
    let admin = require_capability(&state.db_pool, staff, Capability::GrantBoost).await?;
    let boost = state.boosts.admin_grant(admin.id, ad_id, request.boost_offer_id).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(boost))))
}

pub async fn admin_deactivate_boost(
    State(state): State<AppState>,
    staff: CurrentStaff,
    Path(boost_id): Path<i64>,
) -> Result<Json<ApiResponse<AdBoost>>, AppError> {
    require_capability(&state.db_pool, staff, Capability::GrantBoost).await?;
    let boost = state.boosts.deactivate_boost(boost_id).await?;
    Ok(Json(ApiResponse::success(boost)))
}
