use crate::config::ApiConfig;
use crate::error::{RegistrationError, RegistrationResult};
use crate::models::{BanStatus, EntryView, RegistrationOutcome, Visitor, VisitorFilter};
use crate::photo_pipeline::{display_url, RawImage};
use crate::refresh::FeedSnapshot;
use crate::registration::{EntranceRequest, EntranceWorkflow, QuickEntryRequest};
use crate::store::VisitorStore;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Shortest accepted national ID (a CPF has 11 digits)
pub const MIN_NATIONAL_ID_LEN: usize = 11;

const MAX_LIST_LIMIT: usize = 500;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<EntranceWorkflow>,
    pub visitors: Arc<dyn VisitorStore>,
    pub feed: watch::Receiver<Arc<FeedSnapshot>>,
    /// Startup bucket check failure, if any
    pub photo_bucket_error: Option<String>,
}

/// Full registration submitted by the front desk
#[derive(Debug, Deserialize)]
pub struct RegisterEntryBody {
    pub national_id: String,
    #[serde(default)]
    pub name: String,
    pub apartment: String,
    pub authorized_by: String,
    #[serde(default)]
    pub collaborator: Option<String>,
    /// Captured photo as a `data:image/...;base64,...` URL
    #[serde(default)]
    pub photo: Option<String>,
}

impl RegisterEntryBody {
    pub fn into_request(self) -> RegistrationResult<EntranceRequest> {
        let national_id = validate_national_id(&self.national_id)?;
        let photo = match self.photo.as_deref().map(str::trim) {
            Some(data_url) if !data_url.is_empty() => Some(RawImage::from_data_url(data_url)?),
            _ => None,
        };

        Ok(EntranceRequest {
            national_id,
            name: self.name,
            apartment: self.apartment,
            authorized_by: self.authorized_by,
            collaborator: self.collaborator,
            photo,
        })
    }
}

/// Entry for a visitor already on file
#[derive(Debug, Deserialize)]
pub struct QuickEntryBody {
    pub apartment: String,
    pub authorized_by: String,
    #[serde(default)]
    pub collaborator: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetBanBody {
    pub banned: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EntryListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct EntryListResponse {
    pub entries: Vec<EntryView>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VisitorListQuery {
    pub banned: Option<bool>,
    /// Name or national ID fragment
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VisitorListResponse {
    pub visitors: Vec<VisitorResponse>,
}

/// Visitor with its photo resolved for display
#[derive(Debug, Serialize)]
pub struct VisitorResponse {
    #[serde(flatten)]
    pub visitor: Visitor,
    pub photo_url: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Status code a workflow error is reported with
pub fn status_for(err: &RegistrationError) -> StatusCode {
    match err {
        RegistrationError::InvalidRequest(_)
        | RegistrationError::ReasonRequired
        | RegistrationError::PhotoRequired => StatusCode::BAD_REQUEST,
        RegistrationError::VisitorNotFound(_) => StatusCode::NOT_FOUND,
        RegistrationError::BannedVisitor { .. } => StatusCode::FORBIDDEN,
        RegistrationError::LookupFailed(_)
        | RegistrationError::VisitorCreationFailed(_)
        | RegistrationError::LogWriteFailed(_)
        | RegistrationError::BanUpdateFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn api_error(err: RegistrationError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(error = %err, code = err.code(), "Request failed");
    } else {
        debug!(error = %err, code = err.code(), "Request rejected");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        }),
    )
}

fn validate_national_id(raw: &str) -> RegistrationResult<String> {
    let national_id = raw.trim();
    if national_id.chars().count() < MIN_NATIONAL_ID_LEN {
        return Err(RegistrationError::InvalidRequest(format!(
            "national ID must have at least {MIN_NATIONAL_ID_LEN} characters"
        )));
    }
    Ok(national_id.to_string())
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/v1/entries", post(register_entry).get(list_entries))
        .route("/api/v1/entries/feed", get(entry_feed))
        .route("/api/v1/visitors", get(list_visitors))
        .route("/api/v1/visitors/:visitor_id/entries", post(quick_entry))
        .route("/api/v1/visitors/:visitor_id/ban", put(set_ban))
        .route(
            "/api/v1/visitors/by-national-id/:national_id",
            get(lookup_visitor),
        )
        .route(
            "/api/v1/visitors/by-national-id/:national_id/ban",
            get(check_ban).put(set_ban_by_national_id),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "entrance-registry"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let photos = match state.photo_bucket_error {
        None => serde_json::json!({ "status": "ready" }),
        Some(ref e) => serde_json::json!({ "status": "degraded", "error": e }),
    };

    match state.visitors.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "store": state.visitors.backend_name(),
                "photos": photos
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "store": state.visitors.backend_name(),
                "error": e.to_string(),
                "photos": photos
            })),
        ),
    }
}

/// Run the full registration workflow
#[instrument(skip(state, body))]
async fn register_entry(
    State(state): State<AppState>,
    Json(body): Json<RegisterEntryBody>,
) -> Result<(StatusCode, Json<RegistrationOutcome>), ApiError> {
    let request = body.into_request().map_err(api_error)?;
    let outcome = state.workflow.register(request).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Record an entry for a known visitor
#[instrument(skip(state, body))]
async fn quick_entry(
    State(state): State<AppState>,
    Path(visitor_id): Path<Uuid>,
    Json(body): Json<QuickEntryBody>,
) -> Result<(StatusCode, Json<RegistrationOutcome>), ApiError> {
    let outcome = state
        .workflow
        .register_quick_entry(QuickEntryRequest {
            visitor_id,
            apartment: body.apartment,
            authorized_by: body.authorized_by,
            collaborator: body.collaborator,
        })
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Recent entries, newest first
#[instrument(skip(state))]
async fn list_entries(
    State(state): State<AppState>,
    Query(params): Query<EntryListQuery>,
) -> Result<Json<EntryListResponse>, ApiError> {
    let limit = params.limit.clamp(1, MAX_LIST_LIMIT);
    let entries = state.workflow.list_recent(limit).await.map_err(api_error)?;
    Ok(Json(EntryListResponse { entries }))
}

/// Latest snapshot published by the background feed
async fn entry_feed(State(state): State<AppState>) -> Json<FeedSnapshot> {
    let snapshot = state.feed.borrow().clone();
    Json((*snapshot).clone())
}

/// Identity lookup by national ID
#[instrument(skip(state))]
async fn lookup_visitor(
    State(state): State<AppState>,
    Path(national_id): Path<String>,
) -> Result<Json<VisitorResponse>, ApiError> {
    let national_id = validate_national_id(&national_id).map_err(api_error)?;
    let visitor = state
        .workflow
        .lookup(&national_id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| api_error(RegistrationError::VisitorNotFound(national_id)))?;

    let photo_url = display_url(state.workflow.storage(), &visitor.photo_ref);
    Ok(Json(VisitorResponse { visitor, photo_url }))
}

/// Visitor directory for ban management, newest first
#[instrument(skip(state))]
async fn list_visitors(
    State(state): State<AppState>,
    Query(params): Query<VisitorListQuery>,
) -> Result<Json<VisitorListResponse>, ApiError> {
    let filter = VisitorFilter::new(params.banned, params.q.as_deref());
    let visitors = state
        .workflow
        .bans()
        .list_visitors(filter)
        .await
        .map_err(api_error)?;

    let storage = state.workflow.storage();
    let visitors = visitors
        .into_iter()
        .map(|visitor| VisitorResponse {
            photo_url: display_url(storage, &visitor.photo_ref),
            visitor,
        })
        .collect();
    Ok(Json(VisitorListResponse { visitors }))
}

/// Advisory ban check for early feedback
#[instrument(skip(state))]
async fn check_ban(
    State(state): State<AppState>,
    Path(national_id): Path<String>,
) -> Result<Json<BanStatus>, ApiError> {
    let national_id = validate_national_id(&national_id).map_err(api_error)?;
    let status = state
        .workflow
        .precheck_ban(&national_id)
        .await
        .map_err(api_error)?;
    Ok(Json(status))
}

#[instrument(skip(state, body))]
async fn set_ban(
    State(state): State<AppState>,
    Path(visitor_id): Path<Uuid>,
    Json(body): Json<SetBanBody>,
) -> Result<Json<Visitor>, ApiError> {
    let visitor = state
        .workflow
        .bans()
        .set_banned(visitor_id, body.banned, body.reason.as_deref())
        .await
        .map_err(api_error)?;
    Ok(Json(visitor))
}

#[instrument(skip(state, body))]
async fn set_ban_by_national_id(
    State(state): State<AppState>,
    Path(national_id): Path<String>,
    Json(body): Json<SetBanBody>,
) -> Result<Json<Visitor>, ApiError> {
    let visitor = state
        .workflow
        .bans()
        .set_banned_by_national_id(&national_id, body.banned, body.reason.as_deref())
        .await
        .map_err(api_error)?;
    Ok(Json(visitor))
}

/// Start the API server, returning once `cancel` fires and in-flight requests finish
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting entrance registry API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("API server error")?;

    Ok(())
}
