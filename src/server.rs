//! HTTP query, CRUD and import surface.
//!
//! ## Routes
//!
//! - `GET /health`
//! - `GET /professors?department=&keyword=&page=`, `POST /professors`
//! - `GET|PUT|DELETE /professors/{id}` (GET adds a best-effort `live` block)
//! - `GET|POST /departments`, `GET|PUT|DELETE /departments/{id}`
//! - `GET|POST /papers`, `GET|PUT|DELETE /papers/{id}`
//! - `POST /import` (persisting requires the admin bearer token)

use crate::config::ServerConfig;
use crate::error::ProfilesError;
use crate::import::{DepartmentSource, ImportOptions, ImportReport, Importer};
use crate::models::{Department, NewPaper, NewProfessor, Paper, Professor, ProfessorListing, ProfessorWithPapers};
use crate::normalize::{self, AuthorProfile, PublicationCandidate};
use crate::person_filter::FilterConfig;
use crate::repository::{Page, ProfessorQuery, Store};
use crate::serpapi::SerpApiClient;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Live publications shown on the detail view
const LIVE_PUBLICATION_LIMIT: usize = 5;

/// Shared state for all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Store,
    /// Without a client, live enrichment and imports are unavailable
    pub client: Option<SerpApiClient>,
    pub filter: FilterConfig,
    pub config: ServerConfig,
}

type SharedState = Arc<AppState>;

/// Error response: `{ "error": { "code": ..., "message": ... } }`
#[derive(Debug)]
pub enum ApiError {
    Profiles(ProfilesError),
    Unauthorized(String),
}

impl From<ProfilesError> for ApiError {
    fn from(err: ProfilesError) -> Self {
        ApiError::Profiles(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Profiles(e) => match e {
                ProfilesError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                ProfilesError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                ProfilesError::PersistenceConflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
                e if e.is_transport() => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            ApiError::Unauthorized(msg) => msg.clone(),
            ApiError::Profiles(e) => e.to_string(),
        };
        if status.is_server_error() {
            error!(%status, %message, "Request failed");
        }
        (status, Json(json!({ "error": { "code": code, "message": message } }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Build the router with tracing and CORS layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/departments", get(list_departments).post(create_department))
        .route(
            "/departments/{id}",
            get(get_department).put(update_department).delete(delete_department),
        )
        .route("/professors", get(list_professors).post(create_professor))
        .route(
            "/professors/{id}",
            get(professor_detail).put(update_professor).delete(delete_professor),
        )
        .route("/papers", get(list_papers).post(create_paper))
        .route("/papers/{id}", get(get_paper).put(update_paper).delete(delete_paper))
        .route("/import", post(import_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

// ---- departments ----

#[derive(Debug, Deserialize)]
struct DepartmentBody {
    name: String,
    #[serde(default)]
    description: String,
}

async fn list_departments(State(state): State<SharedState>) -> ApiResult<Vec<Department>> {
    Ok(Json(state.store.list_departments().await?))
}

async fn create_department(
    State(state): State<SharedState>,
    Json(body): Json<DepartmentBody>,
) -> std::result::Result<(StatusCode, Json<Department>), ApiError> {
    let dept = state.store.create_department(&body.name, &body.description).await?;
    Ok((StatusCode::CREATED, Json(dept)))
}

async fn get_department(State(state): State<SharedState>, Path(id): Path<i64>) -> ApiResult<Department> {
    Ok(Json(state.store.get_department(id).await?))
}

async fn update_department(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(body): Json<DepartmentBody>,
) -> ApiResult<Department> {
    Ok(Json(
        state.store.update_department(id, &body.name, &body.description).await?,
    ))
}

async fn delete_department(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> std::result::Result<StatusCode, ApiError> {
    state.store.delete_department(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- professors ----

#[derive(Debug, Deserialize)]
struct ListParams {
    department: Option<String>,
    keyword: Option<String>,
    page: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ProfessorBody {
    department_id: i64,
    #[serde(flatten)]
    professor: NewProfessor,
}

/// Live data fetched from the search service on the detail view
#[derive(Debug, Default, Serialize)]
struct LiveBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<AuthorProfile>,
    publications: Vec<LivePublication>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct LivePublication {
    title: Option<String>,
    year: Option<i32>,
    link: Option<String>,
    snippet: Option<String>,
}

impl From<PublicationCandidate> for LivePublication {
    fn from(p: PublicationCandidate) -> Self {
        Self {
            title: p.title,
            year: p.year,
            link: p.link,
            snippet: p.snippet,
        }
    }
}

#[derive(Debug, Serialize)]
struct ProfessorDetail {
    #[serde(flatten)]
    detail: ProfessorWithPapers,
    #[serde(skip_serializing_if = "Option::is_none")]
    live: Option<LiveBlock>,
}

async fn list_professors(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Page<ProfessorListing>> {
    let query = ProfessorQuery {
        department: params.department,
        keyword: params.keyword,
        page: params.page.unwrap_or(1),
        page_size: state.config.page_size,
    };
    Ok(Json(state.store.search_professors(&query).await?))
}

async fn create_professor(
    State(state): State<SharedState>,
    Json(body): Json<ProfessorBody>,
) -> std::result::Result<(StatusCode, Json<Professor>), ApiError> {
    let professor = state.store.create_professor(body.department_id, body.professor).await?;
    Ok((StatusCode::CREATED, Json(professor)))
}

async fn professor_detail(State(state): State<SharedState>, Path(id): Path<i64>) -> ApiResult<ProfessorDetail> {
    let detail = state.store.professor_detail(id).await?;

    let live = match (&state.client, detail.professor.profile_ref.as_deref()) {
        (Some(client), Some(profile_ref)) => Some(fetch_live(client, profile_ref).await),
        _ => None,
    };

    Ok(Json(ProfessorDetail { detail, live }))
}

/// Never fails: a lookup error is reported inside the block.
async fn fetch_live(client: &SerpApiClient, profile_ref: &str) -> LiveBlock {
    match client.fetch_author_profile(profile_ref).await {
        Ok(doc) => LiveBlock {
            profile: normalize::extract_profile(&doc),
            publications: normalize::extract_publications(&doc)
                .into_iter()
                .take(LIVE_PUBLICATION_LIMIT)
                .map(LivePublication::from)
                .collect(),
            error: None,
        },
        Err(e) => {
            warn!(profile_ref, error = %e, "Live profile lookup failed");
            LiveBlock {
                error: Some(e.to_string()),
                ..Default::default()
            }
        }
    }
}

async fn update_professor(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(body): Json<ProfessorBody>,
) -> ApiResult<Professor> {
    Ok(Json(
        state.store.update_professor(id, body.department_id, body.professor).await?,
    ))
}

async fn delete_professor(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> std::result::Result<StatusCode, ApiError> {
    state.store.delete_professor(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- papers ----

#[derive(Debug, Deserialize)]
struct PaperParams {
    professor: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PaperBody {
    professor_id: i64,
    #[serde(flatten)]
    paper: NewPaper,
}

async fn list_papers(State(state): State<SharedState>, Query(params): Query<PaperParams>) -> ApiResult<Vec<Paper>> {
    Ok(Json(state.store.list_papers(params.professor).await?))
}

async fn create_paper(
    State(state): State<SharedState>,
    Json(body): Json<PaperBody>,
) -> std::result::Result<(StatusCode, Json<Paper>), ApiError> {
    let paper = state.store.create_paper(body.professor_id, body.paper).await?;
    Ok((StatusCode::CREATED, Json(paper)))
}

async fn get_paper(State(state): State<SharedState>, Path(id): Path<i64>) -> ApiResult<Paper> {
    Ok(Json(state.store.get_paper(id).await?))
}

async fn update_paper(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(body): Json<PaperBody>,
) -> ApiResult<Paper> {
    Ok(Json(state.store.update_paper(id, body.professor_id, body.paper).await?))
}

async fn delete_paper(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> std::result::Result<StatusCode, ApiError> {
    state.store.delete_paper(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- import ----

#[derive(Debug, Deserialize)]
struct ImportRequest {
    department: String,
    #[serde(default = "default_import_limit")]
    limit: usize,
    #[serde(default)]
    dry_run: bool,
}

fn default_import_limit() -> usize {
    20
}

/// Dry runs are open; persisting requires `Authorization: Bearer <admin token>`.
fn authorize_persist(config: &ServerConfig, headers: &HeaderMap) -> std::result::Result<(), ApiError> {
    let Some(expected) = config.admin_token.as_deref() else {
        return Err(ApiError::Unauthorized(
            "persisting imports is disabled on this server".to_string(),
        ));
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(ApiError::Unauthorized("admin token required".to_string())),
    }
}

async fn import_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<ImportRequest>,
) -> ApiResult<ImportReport> {
    if !req.dry_run {
        authorize_persist(&state.config, &headers)?;
    }

    let department = req.department.trim();
    if department.is_empty() {
        return Err(ProfilesError::Validation("department is required".to_string()).into());
    }

    let client = state
        .client
        .clone()
        .ok_or_else(|| ProfilesError::Config("search client is not configured".to_string()))?;

    info!(department, limit = req.limit, dry_run = req.dry_run, "Import requested");

    let options = ImportOptions {
        department: DepartmentSource::Named(department.to_string()),
        limit: req.limit,
        dry_run: req.dry_run,
        delay: state.config.import_delay,
        ..Default::default()
    };
    let importer = Importer::new(client, state.store.clone(), state.filter.clone());
    Ok(Json(importer.run(&options).await?))
}
