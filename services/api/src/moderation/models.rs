use chrono::{DateTime, Utc};
use kivendi_common::ReportStatus;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BlockStatus {
    pub other_user_id: i64,
    pub blocked_by_me: bool,
    pub blocked_by_other: bool,
    pub is_blocked: bool,
}

impl BlockStatus {
    pub fn new(other_user_id: i64, blocked_by_me: bool, blocked_by_other: bool) -> Self {
        Self {
            other_user_id,
            blocked_by_me,
            blocked_by_other,
            is_blocked: blocked_by_me || blocked_by_other,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReportRequest {
    #[validate(length(min = 1, max = 2000))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateReportRequest {
    pub status: Option<ReportStatus>,
    /// An empty string clears the notes.
    pub admin_notes: Option<String>,
}

impl UpdateReportRequest {
    /// Notes update: `None` keeps the current notes, `Some(None)` clears them.
    pub fn notes_change(&self) -> Option<Option<String>> {
        self.admin_notes.as_ref().map(|notes| {
            let trimmed = notes.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
    }
}

#[derive(Debug, Serialize, FromRow)]
pub struct ReportView {
    pub id: i64,
    pub conversation_id: i64,
    pub reason: String,
    pub status: String,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reporter_id: i64,
    pub reporter_first_name: String,
    pub reporter_last_name: String,
    pub reporter_email: String,
    pub reported_id: i64,
    pub reported_first_name: String,
    pub reported_last_name: String,
    pub reported_email: String,
}
