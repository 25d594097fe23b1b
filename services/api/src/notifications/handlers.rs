use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use kivendi_auth::CurrentUser;
use kivendi_common::{ApiResponse, AppError};
use kivendi_database::{DeviceToken, Notification, NotificationPreference};

use super::models::{
    Affected, ListNotificationsQuery, RegisterTokenRequest, RemoveTokenRequest, UnreadCount,
    UpdatePreferencesRequest,
};
use crate::AppState;

pub async fn register_device_token(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<RegisterTokenRequest>,
) -> Result<(StatusCode, Json<ApiResponse<DeviceToken>>), AppError> {
    let device = state.notifications.register_token(user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(device))))
}

pub async fn remove_device_token(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<RemoveTokenRequest>,
) -> Result<StatusCode, AppError> {
    if state.notifications.unregister_token(user.user_id, &request.token).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Device token not found".to_string()))
    }
}

pub async fn list_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<ApiResponse<Vec<Notification>>>, AppError> {
    let (limit, offset) = query.bounds();
    let notifications = state.notifications.list(user.user_id, limit, offset).await?;
    Ok(Json(ApiResponse::success(notifications)))
}

pub async fn unread_count(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<UnreadCount>>, AppError> {
    let unread = state.notifications.unread_count(user.user_id).await?;
    Ok(Json(ApiResponse::success(UnreadCount { unread })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(notification_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.notifications.mark_read(user.user_id, notification_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<Affected>>, AppError> {
    let updated = state.notifications.mark_all_read(user.user_id).await?;
    Ok(Json(ApiResponse::success(Affected { updated })))
}

pub async fn get_preferences(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<NotificationPreference>>, AppError> {
    let preferences = state.notifications.preferences(user.user_id).await?;
    Ok(Json(ApiResponse::success(preferences)))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<UpdatePreferencesRequest>,
) -> Result<Json<ApiResponse<NotificationPreference>>, AppError> {
    let preferences = state.notifications.update_preferences(user.user_id, request).await?;
    Ok(Json(ApiResponse::success(preferences)))
}
