use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use kivendi_auth::{Capability, CurrentStaff, CurrentUser};
use kivendi_common::{ApiResponse, AppError};
use kivendi_database::Report;

use super::models::{BlockStatus, CreateReportRequest, ReportFilter, ReportView, UpdateReportRequest};
use crate::accounts::require_capability;
use crate::AppState;

/// Blocks the other participant of the conversation.
pub async fn block(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(conversation_id): Path<i64>,
) -> Result<Json<ApiResponse<BlockStatus>>, AppError> {
    let conversation = state
        .conversations
        .participant_conversation(conversation_id, user.user_id)
        .await?;
    let other_id = conversation.other_participant(user.user_id);

    state.blocks.block(user.user_id, other_id).await?;
    let status = state.blocks.status(user.user_id, other_id).await?;
    Ok(Json(ApiResponse::success(status)))
}

pub async fn unblock(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(conversation_id): Path<i64>,
) -> Result<Json<ApiResponse<BlockStatus>>, AppError> {
    let conversation = state
        .conversations
        .participant_conversation(conversation_id, user.user_id)
        .await?;
    let other_id = conversation.other_participant(user.user_id);

    state.blocks.unblock(user.user_id, other_id).await?;
    let status = state.blocks.status(user.user_id, other_id).await?;
    Ok(Json(ApiResponse::success(status)))
}

pub async fn block_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(conversation_id): Path<i64>,
) -> Result<Json<ApiResponse<BlockStatus>>, AppError> {
    let conversation = state
        .conversations
        .participant_conversation(conversation_id, user.user_id)
        .await?;
    let status = state
        .blocks
        .status(user.user_id, conversation.other_participant(user.user_id))
        .await?;
    Ok(Json(ApiResponse::success(status)))
}

pub async fn report(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(conversation_id): Path<i64>,
    Json(request): Json<CreateReportRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Report>>), AppError> {
    let conversation = state
        .conversations
        .participant_conversation(conversation_id, user.user_id)
        .await?;
    let report = state.reports.create(&conversation, user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(report))))
}

pub async fn list_reports(
    State(state): State<AppState>,
    staff: CurrentStaff,
    Query(filter): Query<ReportFilter>,
) -> Result<Json<ApiResponse<Vec<ReportView>>>, AppError> {
    require_capability(&state.db_pool, staff, Capability::ManageReports).await?;
    let reports = state.reports.list(filter.status).await?;
    Ok(Json(ApiResponse::success(reports)))
}

pub async fn update_report(
    State(state): State<AppState>,
    staff: CurrentStaff,
    Path(report_id): Path<i64>,
    Json(request): Json<UpdateReportRequest>,
) -> Result<Json<ApiResponse<Report>>, AppError> {
    let admin = require_capability(&state.db_pool, staff, Capability::ManageReports).await?;
    let report = state.reports.update(report_id, request).await?;
    tracing::info!(report_id, admin_id = admin.id, "report reviewed by staff");
    Ok(Json(ApiResponse::success(report)))
}
