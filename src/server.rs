//! HTTP transport for the import engine.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/import/start` | Upload an archive (multipart) and create a run |
//! | `POST` | `/import/continue` | Process the next batch |
//! | `GET`  | `/import/resume` | Is there an incomplete run? |
//! | `POST` | `/import/resume` | Reconstitute the incomplete run |
//! | `DELETE` | `/import` | Abandon the run |
//! | `GET`  | `/backups` | List backup snapshots |
//! | `POST` | `/backups/{id}/restore` | Restore one snapshot |
//! | `DELETE` | `/backups/{id}` | Delete one snapshot |
//! | `POST` | `/backups/restore-all` | Restore every snapshot |
//! | `DELETE` | `/backups` | Delete every snapshot |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Every route except `/health` identifies the caller by the `x-caller-id`
//! header. Start, continue and resume count against the caller's rate limit.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_session", "message": "session expired or file not found; please start over" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `no_session` (409), `archive_unreadable` (422), `throttled` (429),
//! `internal` (500). A `throttled` response also carries a `Retry-After`
//! header in seconds.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use zip_content_replacer_core::backup::{parse_record_id, BulkReport};
use zip_content_replacer_core::error::ImportError;
use zip_content_replacer_core::models::MatchMethod;

use crate::config::Config;
use crate::db;
use crate::engine::{
    ImportEngine, NoopObserver, ResumeStatus, ResumedRun, StartRequest, StartResponse,
};
use crate::rate_limit::RateLimiter;

/// Header carrying the caller identity.
pub const CALLER_HEADER: &str = "x-caller-id";

/// Room for multipart framing on top of the upload cap.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<ImportEngine>,
    limiter: RateLimiter,
    default_batch_size: usize,
}

impl AppState {
    pub fn new(engine: ImportEngine, limiter: RateLimiter, default_batch_size: usize) -> Self {
        Self {
            engine: Arc::new(engine),
            limiter,
            default_batch_size,
        }
    }
}

/// All routes with CORS and the upload body limit applied.
pub fn router(state: AppState) -> Router {
    let body_limit = state.engine.settings().max_upload_bytes as usize + MULTIPART_OVERHEAD;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/import/start", post(handle_start))
        .route("/import/continue", post(handle_continue))
        .route("/import/resume", get(handle_resume_status).post(handle_resume))
        .route("/import", delete(handle_abandon))
        .route("/backups", get(handle_list_backups).delete(handle_delete_all))
        .route("/backups/restore-all", post(handle_restore_all))
        .route("/backups/{id}/restore", post(handle_restore))
        .route("/backups/{id}", delete(handle_delete_backup))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`, backed by the SQLite stores.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = db::open_engine(config).await?;
    let limiter = RateLimiter::new(config.rate_limit.max_requests, config.rate_window());
    let app = router(AppState::new(
        engine,
        limiter,
        config.import.default_batch_size,
    ));

    let bind_addr = config.server.bind.clone();
    println!("Import server listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    /// Seconds for the `Retry-After` header of a 429.
    retry_after: Option<u64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        let code = err.code();
        let status = match code {
            "bad_request" => StatusCode::BAD_REQUEST,
            "not_found" => StatusCode::NOT_FOUND,
            "no_session" => StatusCode::CONFLICT,
            "archive_unreadable" => StatusCode::UNPROCESSABLE_ENTITY,
            "throttled" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let retry_after = match &err {
            ImportError::Throttled { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
            retry_after,
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
        retry_after: None,
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: message.into(),
        retry_after: None,
    }
}

/// Caller identity from `x-caller-id`: 1 to 128 of `[A-Za-z0-9._@:-]`.
fn caller_id(headers: &HeaderMap) -> Result<String, AppError> {
    let raw = headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    if raw.is_empty() {
        return Err(unauthorized(format!("missing {} header", CALLER_HEADER)));
    }
    let valid = raw.len() <= 128
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | ':' | '-'));
    if !valid {
        return Err(unauthorized(format!("invalid {} header", CALLER_HEADER)));
    }
    Ok(raw.to_string())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /import ============

/// Form flags arrive as checkbox values.
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

async fn handle_start(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<StartResponse>, AppError> {
    let caller = caller_id(&headers)?;
    state
        .limiter
        .check(state.engine.sessions(), &caller)
        .await?;

    let mut archive: Option<Bytes> = None;
    let mut scope_id: Option<i64> = None;
    let mut batch_size = state.default_batch_size;
    let mut dry_run = false;
    let mut match_method = MatchMethod::Title;
    let mut backup = false;
    let mut preview = false;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(ImportError::UploadRejected(e.body_text()).into());
            }
        };
        let name = field.name().unwrap_or_default().to_string();
        if name == "archive" {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ImportError::UploadRejected(e.body_text()))?;
            archive = Some(bytes);
            continue;
        }
        let value = field
            .text()
            .await
            .map_err(|e| bad_request(format!("field '{}': {}", name, e.body_text())))?;
        match name.as_str() {
            "scope_id" => {
                scope_id = Some(value.trim().parse().map_err(|_| {
                    ImportError::InvalidScope(format!("'{}' is not a valid id", value.trim()))
                })?)
            }
            "batch_size" => {
                batch_size = value
                    .trim()
                    .parse()
                    .map_err(|_| bad_request(format!("invalid batch_size '{}'", value.trim())))?
            }
            "dry_run" => dry_run = parse_flag(&value),
            "match_method" => match_method = value.parse().map_err(bad_request)?,
            "backup" => backup = parse_flag(&value),
            "preview" => preview = parse_flag(&value),
            _ => {}
        }
    }

    let archive =
        archive.ok_or_else(|| ImportError::UploadRejected("no file uploaded".to_string()))?;
    let scope_id = scope_id
        .ok_or_else(|| ImportError::InvalidScope("scope_id is required".to_string()))?;

    let response = state
        .engine
        .start(
            &caller,
            StartRequest {
                archive: archive.to_vec(),
                scope_id,
                batch_size,
                dry_run,
                match_method,
                backup,
                preview,
            },
        )
        .await?;
    Ok(Json(response))
}

#[derive(Deserialize, Default)]
struct ContinueRequest {
    #[serde(default)]
    offset: Option<usize>,
}

async fn handle_continue(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let caller = caller_id(&headers)?;
    let req: ContinueRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ContinueRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| bad_request(format!("invalid JSON: {}", e)))?
    };
    state
        .limiter
        .check(state.engine.sessions(), &caller)
        .await?;
    let response = state
        .engine
        .continue_batch(&caller, req.offset, &NoopObserver)
        .await?;
    Ok(Json(response).into_response())
}

async fn handle_resume_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ResumeStatus>, AppError> {
    let caller = caller_id(&headers)?;
    Ok(Json(state.engine.resume_status(&caller).await?))
}

async fn handle_resume(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ResumedRun>, AppError> {
    let caller = caller_id(&headers)?;
    state
        .limiter
        .check(state.engine.sessions(), &caller)
        .await?;
    Ok(Json(state.engine.resume(&caller).await?))
}

#[derive(Serialize)]
struct AbandonResponse {
    abandoned: bool,
}

async fn handle_abandon(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AbandonResponse>, AppError> {
    let caller = caller_id(&headers)?;
    let abandoned = state.engine.abandon(&caller).await?;
    Ok(Json(AbandonResponse { abandoned }))
}

// ============ /backups ============

#[derive(Serialize)]
struct BackupInfo {
    record_id: i64,
    title: Option<String>,
    source_filename: String,
    captured_at: DateTime<Utc>,
    previous_body_bytes: usize,
}

#[derive(Serialize)]
struct BackupListResponse {
    backups: Vec<BackupInfo>,
}

async fn handle_list_backups(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BackupListResponse>, AppError> {
    caller_id(&headers)?;
    let snapshots = state.engine.backups().list_backups().await?;
    let mut backups = Vec::with_capacity(snapshots.len());
    for (record_id, snapshot) in snapshots {
        let title = state
            .engine
            .store()
            .get_record(record_id)
            .await
            .map_err(ImportError::from)?
            .map(|r| r.title);
        backups.push(BackupInfo {
            record_id,
            title,
            source_filename: snapshot.source_filename,
            captured_at: snapshot.captured_at,
            previous_body_bytes: snapshot.previous_body.len(),
        });
    }
    Ok(Json(BackupListResponse { backups }))
}

#[derive(Serialize)]
struct BackupActionResponse {
    record_id: i64,
    message: String,
}

async fn handle_restore(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BackupActionResponse>, AppError> {
    caller_id(&headers)?;
    let record_id = parse_record_id(&id)?;
    let snapshot = state.engine.backups().restore(record_id).await?;
    Ok(Json(BackupActionResponse {
        record_id,
        message: format!(
            "restored content saved from '{}' at {}",
            snapshot.source_filename, snapshot.captured_at
        ),
    }))
}

async fn handle_delete_backup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BackupActionResponse>, AppError> {
    caller_id(&headers)?;
    let record_id = parse_record_id(&id)?;
    state.engine.backups().delete_backup(record_id).await?;
    Ok(Json(BackupActionResponse {
        record_id,
        message: "backup deleted".to_string(),
    }))
}

async fn handle_restore_all(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BulkReport>, AppError> {
    caller_id(&headers)?;
    Ok(Json(state.engine.backups().restore_all().await?))
}

async fn handle_delete_all(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BulkReport>, AppError> {
    caller_id(&headers)?;
    Ok(Json(state.engine.backups().delete_all().await?))
}
