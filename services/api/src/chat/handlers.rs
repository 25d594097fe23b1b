use axum::{
    extract::{Path, State},
    response::Json,
};
use kivendi_auth::CurrentUser;
use kivendi_common::{ApiResponse, AppError};
use kivendi_database::Message;

use super::models::{ConversationSummary, MarkReadResponse, OpenConversationResponse};
use crate::AppState;

pub async fn open_conversation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(ad_id): Path<i64>,
) -> Result<Json<ApiResponse<OpenConversationResponse>>, AppError> {
    let conversation = state.conversations.open_conversation(ad_id, user.user_id).await?;
    Ok(Json(ApiResponse::success(OpenConversationResponse {
        conversation_id: conversation.id,
    })))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<Vec<ConversationSummary>>>, AppError> {
    let conversations = state.conversations.list_conversations(user.user_id).await?;
    Ok(Json(ApiResponse::success(conversations)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(conversation_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<Message>>>, AppError> {
    let messages = state.conversations.get_history(conversation_id, user.user_id).await?;
    Ok(Json(ApiResponse::success(messages)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(conversation_id): Path<i64>,
) -> Result<Json<ApiResponse<MarkReadResponse>>, AppError> {
    let updated = state.conversations.mark_read(conversation_id, user.user_id).await?;
    Ok(Json(ApiResponse::success(MarkReadResponse { updated })))
}
