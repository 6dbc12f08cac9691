//! HTTP delivery – `GET /reports/pdf` plus a health probe.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::appender::StdLog;
use crate::error::ReportError;
use crate::report::{assemble_report, ReportOptions};

/// Attachment name of the delivered report.
pub const REPORT_FILENAME: &str = "ReporteFinal.pdf";

/// Read-only state shared by every request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub options: Arc<ReportOptions>,
}

impl AppState {
    pub fn new(options: ReportOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("report generation failed: {0}")]
    Report(#[from] ReportError),

    #[error("report task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        // Details stay in the log; clients get a generic failure.
        log::error!("{self}");
        let body = Json(json!({
            "error": "ReportFailed",
            "message": "Report generation failed",
        }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Optional overrides for a single request.
#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub title: Option<String>,
}

/// Generate the configured report on a blocking thread and return it as an
/// attachment.
pub async fn get_report_pdf(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let mut options = ReportOptions::clone(&state.options);
    if let Some(title) = query.title.filter(|t| !t.trim().is_empty()) {
        options.title = title;
    }
    log::info!("Report request (title {:?})", options.title);

    let pdf_bytes = tokio::task::spawn_blocking(move || assemble_report(&options, &StdLog)).await??;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{REPORT_FILENAME}\""),
            ),
        ],
        pdf_bytes,
    ))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/reports/pdf", get(get_report_pdf))
        .route("/health", get(health))
        .with_state(state)
}
