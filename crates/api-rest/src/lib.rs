//! # API REST
//!
//! REST API for the medical scribe.
//!
//! Handles:
//! - HTTP endpoints with axum over a shared [`ScribeSession`]
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialisation, status codes, CORS)
//!
//! Uses `api-shared` for wire types. The process that owns the session builds the router with
//! [`router`] and serves it.

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Path as AxumPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use api_shared::{
    ClearHistoryRes, GenerateReportReq, GenerateReportRes, HealthRes, HealthService,
    HistoryDetailRes, HistoryEntry, ListHistoryRes, MedicalReportBody, ReportRes,
    UpdateReportReq, UpdateReportRes,
};
use scribe_core::{
    constants::PDF_FILENAME_PREFIX, pdf::render_report_pdf, DisplayedReport, MedicalReport,
    NonEmptyText, ReportEdit, ScribeError, ScribeSession,
};

/// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<ScribeSession>,
}

impl AppState {
    pub fn new(session: Arc<ScribeSession>) -> Self {
        Self { session }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        generate_report,
        current_report,
        current_report_pdf,
        list_history,
        clear_history,
        get_history,
        open_history,
        update_history,
        history_pdf,
    ),
    components(schemas(
        HealthRes,
        GenerateReportReq,
        GenerateReportRes,
        MedicalReportBody,
        ReportRes,
        HistoryEntry,
        HistoryDetailRes,
        ListHistoryRes,
        ClearHistoryRes,
        UpdateReportReq,
        UpdateReportRes,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router, including Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/reports/generate", post(generate_report))
        .route("/reports/current", get(current_report))
        .route("/reports/current/pdf", get(current_report_pdf))
        .route("/history", get(list_history).delete(clear_history))
        .route("/history/:id", get(get_history).put(update_history))
        .route("/history/:id/open", post(open_history))
        .route("/history/:id/pdf", get(history_pdf))
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Maps a core error to the status code and message returned to clients.
fn error_response(e: &ScribeError) -> (StatusCode, &'static str) {
    match e {
        ScribeError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "Bad request"),
        ScribeError::HistoryNotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
        ScribeError::GenerationInProgress => {
            (StatusCode::CONFLICT, "A report is already being generated")
        }
        ScribeError::ModelNotFound(_) | ScribeError::EngineUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "Model not loaded")
        }
        ScribeError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "Shutting down"),
        ScribeError::EngineRequest(_) | ScribeError::EngineResponse(_) => {
            (StatusCode::BAD_GATEWAY, "Inference engine error")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint.
///
/// The message says whether the model has finished loading; `ok` only reflects liveness.
#[axum::debug_handler]
async fn health(State(state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_readiness(state.session.engine_ready()))
}

#[utoipa::path(
    post,
    path = "/reports/generate",
    request_body = GenerateReportReq,
    responses(
        (status = 200, description = "Report generated (check `parsed`)", body = GenerateReportRes),
        (status = 400, description = "Blank dictation or language"),
        (status = 409, description = "A report is already being generated"),
        (status = 502, description = "Inference engine error"),
        (status = 503, description = "Model not loaded")
    )
)]
/// Generate a report from a dictation
///
/// Runs the dictation through the model and publishes the result as the current report.
/// Parsed reports are saved to history; unparseable output comes back as the fallback record
/// with `parsed: false` and is not saved.
///
/// # Arguments
/// * `req` - Dictation text and an optional target language for this and later generations
///
/// # Errors
/// Returns `400 Bad Request` if the dictation or language is blank, `409 Conflict` while another
/// generation runs, `503 Service Unavailable` before the model has loaded and `502 Bad Gateway`
/// if the inference server fails.
#[axum::debug_handler]
async fn generate_report(
    State(state): State<AppState>,
    Json(req): Json<GenerateReportReq>,
) -> Result<Json<GenerateReportRes>, (StatusCode, &'static str)> {
    if let Some(language) = req.language {
        let language = NonEmptyText::new(language)
            .map_err(|_| (StatusCode::BAD_REQUEST, "language cannot be empty"))?;
        state.session.set_language(language);
    }

    match state.session.generate_report(&req.dictation).await {
        Ok(outcome) => Ok(Json(outcome.into())),
        Err(e) => {
            tracing::error!("Generate report error: {:?}", e);
            Err(error_response(&e))
        }
    }
}

#[utoipa::path(
    get,
    path = "/reports/current",
    responses(
        (status = 200, description = "Currently displayed report", body = ReportRes),
        (status = 404, description = "No report displayed yet")
    )
)]
/// The report currently on display, with its history link.
#[axum::debug_handler]
async fn current_report(
    State(state): State<AppState>,
) -> Result<Json<ReportRes>, (StatusCode, &'static str)> {
    state
        .session
        .current_report()
        .map(|d| Json(d.into()))
        .ok_or((StatusCode::NOT_FOUND, "No report displayed"))
}

#[utoipa::path(
    get,
    path = "/history",
    responses(
        (status = 200, description = "History rows, newest first", body = ListHistoryRes),
        (status = 500, description = "Internal server error")
    )
)]
/// List history
///
/// Reloads history from the store and returns every row, newest first, without payloads.
///
/// # Errors
/// Returns `500 Internal Server Error` if the store cannot be read.
#[axum::debug_handler]
async fn list_history(
    State(state): State<AppState>,
) -> Result<Json<ListHistoryRes>, (StatusCode, &'static str)> {
    match state.session.refresh_history().await {
        Ok(items) => Ok(Json(ListHistoryRes {
            items: items.iter().map(HistoryEntry::from).collect(),
        })),
        Err(e) => {
            tracing::error!("List history error: {:?}", e);
            Err(error_response(&e))
        }
    }
}

#[utoipa::path(
    delete,
    path = "/history",
    responses(
        (status = 200, description = "History cleared", body = ClearHistoryRes),
        (status = 500, description = "Internal server error")
    )
)]
/// Delete every history row.
#[axum::debug_handler]
async fn clear_history(
    State(state): State<AppState>,
) -> Result<Json<ClearHistoryRes>, (StatusCode, &'static str)> {
    match state.session.clear_history().await {
        Ok(removed) => Ok(Json(ClearHistoryRes { removed })),
        Err(e) => {
            tracing::error!("Clear history error: {:?}", e);
            Err(error_response(&e))
        }
    }
}

#[utoipa::path(
    get,
    path = "/history/{id}",
    params(("id" = i64, Path, description = "History row id")),
    responses(
        (status = 200, description = "History row with its report", body = HistoryDetailRes),
        (status = 404, description = "Row not found"),
        (status = 500, description = "Internal server error")
    )
)]
/// Read one history row and decode its stored report.
///
/// # Errors
/// Returns `404 Not Found` if the row does not exist and `500 Internal Server Error` if the stored
/// payload cannot be decoded.
#[axum::debug_handler]
async fn get_history(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<HistoryDetailRes>, (StatusCode, &'static str)> {
    let item = state.session.history_item(id).await.map_err(|e| {
        tracing::error!("Get history error: {:?}", e);
        error_response(&e)
    })?;
    let report = item.report().map_err(|e| {
        tracing::error!("Decode history row {} error: {:?}", id, e);
        error_response(&e)
    })?;

    Ok(Json(HistoryDetailRes {
        entry: HistoryEntry::from(&item),
        report: report.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/history/{id}/open",
    params(("id" = i64, Path, description = "History row id")),
    responses(
        (status = 200, description = "Row is now the current report", body = ReportRes),
        (status = 404, description = "Row not found")
    )
)]
/// Make a stored report the current report.
#[axum::debug_handler]
async fn open_history(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<ReportRes>, (StatusCode, &'static str)> {
    match state.session.open_history(id).await {
        Ok(displayed) => Ok(Json(displayed.into())),
        Err(e) => {
            tracing::error!("Open history error: {:?}", e);
            Err(error_response(&e))
        }
    }
}

#[utoipa::path(
    put,
    path = "/history/{id}",
    params(("id" = i64, Path, description = "History row id")),
    request_body = UpdateReportReq,
    responses(
        (status = 200, description = "Edit applied", body = UpdateReportRes),
        (status = 404, description = "Row not found")
    )
)]
/// Edit a stored report
///
/// Applies the clinician's edit to the report in row `id`. The row is rewritten and, if that
/// report is the one currently displayed, the displayed report is replaced too.
///
/// # Arguments
/// * `id` - History row id
/// * `req` - Patient name, diagnosis and newline-separated plan
///
/// # Errors
/// Returns `404 Not Found` if the row does not exist.
#[axum::debug_handler]
async fn update_history(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
    Json(req): Json<UpdateReportReq>,
) -> Result<Json<UpdateReportRes>, (StatusCode, &'static str)> {
    let item = state.session.history_item(id).await.map_err(|e| {
        tracing::error!("Update history error: {:?}", e);
        error_response(&e)
    })?;
    let report = item.report().map_err(|e| {
        tracing::error!("Decode history row {} error: {:?}", id, e);
        error_response(&e)
    })?;

    let original = DisplayedReport {
        report,
        history_id: Some(item.id),
    };
    let outcome = state
        .session
        .update_report(&original, &ReportEdit::from(req))
        .await;

    Ok(Json(UpdateReportRes {
        report: outcome.report.into(),
        saved_to_history: outcome.saved_to_history,
    }))
}

#[utoipa::path(
    get,
    path = "/history/{id}/pdf",
    params(("id" = i64, Path, description = "History row id")),
    responses(
        (status = 200, description = "PDF document", content_type = "application/pdf", body = Vec<u8>),
        (status = 404, description = "Row not found"),
        (status = 500, description = "Internal server error")
    )
)]
/// Render a stored report as a PDF download.
#[axum::debug_handler]
async fn history_pdf(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Response, (StatusCode, &'static str)> {
    let item = state.session.history_item(id).await.map_err(|e| {
        tracing::error!("PDF history error: {:?}", e);
        error_response(&e)
    })?;
    let report = item.report().map_err(|e| {
        tracing::error!("Decode history row {} error: {:?}", id, e);
        error_response(&e)
    })?;

    pdf_response(report, &item.timestamp.to_string()).await
}

#[utoipa::path(
    get,
    path = "/reports/current/pdf",
    responses(
        (status = 200, description = "PDF document", content_type = "application/pdf", body = Vec<u8>),
        (status = 404, description = "No report displayed yet"),
        (status = 500, description = "Internal server error")
    )
)]
/// Render the report currently on display as a PDF download.
///
/// Works for reports without a history row, including the fallback record.
#[axum::debug_handler]
async fn current_report_pdf(
    State(state): State<AppState>,
) -> Result<Response, (StatusCode, &'static str)> {
    let displayed = state
        .session
        .current_report()
        .ok_or((StatusCode::NOT_FOUND, "No report displayed"))?;
    let stem = displayed
        .history_id
        .map_or_else(|| "current".to_string(), |id| id.to_string());
    pdf_response(displayed.report, &stem).await
}

/// Renders `report` off the async runtime and wraps it as a `MedicalReport_<stem>.pdf` download.
async fn pdf_response(
    report: MedicalReport,
    stem: &str,
) -> Result<Response, (StatusCode, &'static str)> {
    let bytes = tokio::task::spawn_blocking(move || render_report_pdf(&report))
        .await
        .map_err(ScribeError::from)
        .and_then(|r| r)
        .map_err(|e| {
            tracing::error!("Render PDF error: {:?}", e);
            error_response(&e)
        })?;

    let disposition = format!("attachment; filename=\"{}{}.pdf\"", PDF_FILENAME_PREFIX, stem);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
