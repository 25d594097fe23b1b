use kivendi_common::{AppError, Rejection, ReportStatus};
use kivendi_database::{Conversation, Report};
use sqlx::PgPool;
use validator::Validate;

use super::models::{CreateReportRequest, ReportView, UpdateReportRequest};

#[derive(Clone)]
pub struct ReportService {
    pool: PgPool,
}

impl ReportService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Files a pending report against the other participant of `conversation`.
    pub async fn create(
        &self,
        conversation: &Conversation,
        reporter_id: i64,
        request: CreateReportRequest,
    ) -> Result<Report, AppError> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        if !conversation.is_participant(reporter_id) {
            return Err(Rejection::Forbidden.into());
        }
        let reported_id = conversation.other_participant(reporter_id);
        if reported_id == reporter_id {
            return Err(AppError::Validation("You cannot report yourself".to_string()));
        }

        let report = sqlx::query_as::<_, Report>(
            r#"
            INSERT INTO reports (reporter_id, reported_id, conversation_id, reason, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(reporter_id)
        .bind(reported_id)
        .bind(conversation.id)
        .bind(request.reason.trim())
        .bind(ReportStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(report_id = report.id, reporter_id, reported_id, "report filed");
        Ok(report)
    }

    /// Pending reports first, then newest.
    pub async fn list(&self, status: Option<ReportStatus>) -> Result<Vec<ReportView>, AppError> {
        let reports = sqlx::query_as::<_, ReportView>(
            r#"
            SELECT r.id, r.conversation_id, r.reason, r.status, r.admin_notes,
                   r.created_at, r.updated_at,
                   r.reporter_id, reporter.first_name AS reporter_first_name,
                   reporter.last_name AS reporter_last_name, reporter.email AS reporter_email,
                   r.reported_id, reported.first_name AS reported_first_name,
                   reported.last_name AS reported_last_name, reported.email AS reported_email
            FROM reports r
            JOIN users reporter ON reporter.id = r.reporter_id
            JOIN users reported ON reported.id = r.reported_id
            WHERE $1::TEXT IS NULL OR r.status = $1
            ORDER BY (r.status = 'pending') DESC, r.created_at DESC, r.id DESC
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(reports)
    }

    pub async fn update(&self, report_id: i64, request: UpdateReportRequest) -> Result<Report, AppError> {
        let notes = request.notes_change();

        let report = sqlx::query_as::<_, Report>(
            r#"
            UPDATE reports SET
                status = COALESCE($2, status),
                admin_notes = CASE WHEN $3 THEN $4 ELSE admin_notes END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(report_id)
        .bind(request.status.map(|s| s.as_str()))
        .bind(notes.is_some())
        .bind(notes.flatten())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Report not found".to_string()))?;

        tracing::info!(report_id, status = %report.status, "report updated");
        Ok(report)
    }
}
