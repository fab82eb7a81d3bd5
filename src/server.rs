// 🌐 HTTP API - REST endpoints, query documents, CSV export, dashboard
//
// Every handler goes through `Database::with_conn`, so the shared connection
// is held for one storage round-trip and released before the response is sent.

use crate::db::{create_bank, create_branch, Database};
use crate::entities::{validate_ifsc, NewBank, NewBranch};
use crate::error::CatalogError;
use crate::export::ExportStream;
use crate::pagination::{window, Paginated};
use crate::query::{
    catalog_stats, count_banks, count_branches, get_bank, get_branch, list_banks,
    list_branches, BankFilters, BranchFilters,
};
use crate::query_api::CatalogQuery;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::error;

pub const EXPORT_FILENAME: &str = "bank_branches.csv";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub app_name: Arc<str>,
}

impl AppState {
    pub fn new(db: Database, app_name: &str) -> Self {
        Self {
            db,
            app_name: Arc::from(app_name),
        }
    }
}

// ============================================================================
// Response envelope
// ============================================================================

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Handler error: a catalog error plus its HTTP status
#[derive(Debug)]
pub struct ApiError(CatalogError);

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::Validation(_) | CatalogError::Csv(_) => StatusCode::BAD_REQUEST,
            CatalogError::Conflict(_) => StatusCode::CONFLICT,
            CatalogError::Storage(_) | CatalogError::Io(_) | CatalogError::LockPoisoned => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        (status, Json(ApiResponse::<()>::err(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct BankListParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BranchListParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub bank_name: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub search: Option<String>,
}

impl BranchListParams {
    fn filters(&self) -> BranchFilters {
        BranchFilters {
            bank_id: None,
            bank_name: self.bank_name.clone(),
            city: self.city.clone(),
            district: self.district.clone(),
            state: self.state.clone(),
            search: self.search.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BankBranchParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub city: Option<String>,
    pub state: Option<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET / - API info
async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "name": &*state.app_name,
        "version": crate::VERSION,
        "endpoints": {
            "health": "/health",
            "banks": "/api/banks",
            "bank": "/api/banks/{id}",
            "bank_branches": "/api/banks/{id}/branches",
            "branches": "/api/branches",
            "branch": "/api/branches/{ifsc}",
            "export": "/api/branches/export",
            "stats": "/api/stats",
            "query": "/query",
            "dashboard": "/ui"
        }
    }))
}

/// GET /health - Health check
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "version": crate::VERSION }))
}

/// GET /api/banks
async fn handle_list_banks(
    State(state): State<AppState>,
    Query(params): Query<BankListParams>,
) -> ApiResult<Paginated<crate::entities::Bank>> {
    let win = window(params.page, params.page_size)?;
    let filters = BankFilters {
        search: params.search,
    };

    let page = state.db.with_conn(|conn| {
        let total = count_banks(conn, &filters)?;
        let items = list_banks(conn, &filters, win.skip, win.limit)?;
        Ok(Paginated::new(&win, total, items))
    })?;

    Ok(Json(ApiResponse::ok(page)))
}

/// POST /api/banks
async fn handle_create_bank(
    State(state): State<AppState>,
    Json(new_bank): Json<NewBank>,
) -> Result<impl IntoResponse, ApiError> {
    let bank = state.db.with_conn(|conn| create_bank(conn, &new_bank))?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(bank))))
}

/// GET /api/banks/:id
async fn handle_get_bank(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<crate::entities::Bank> {
    let bank = state
        .db
        .with_conn(|conn| get_bank(conn, id))?
        .ok_or_else(|| CatalogError::not_found("Bank"))?;

    Ok(Json(ApiResponse::ok(bank)))
}

/// GET /api/banks/:id/branches
async fn handle_bank_branches(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<BankBranchParams>,
) -> ApiResult<Paginated<crate::entities::BranchWithBank>> {
    let win = window(params.page, params.page_size)?;
    let filters = BranchFilters {
        bank_id: Some(id),
        city: params.city,
        state: params.state,
        ..Default::default()
    };

    let page = state.db.with_conn(|conn| {
        if get_bank(conn, id)?.is_none() {
            return Err(CatalogError::not_found("Bank"));
        }
        let total = count_branches(conn, &filters)?;
        let items = list_branches(conn, &filters, win.skip, win.limit)?;
        Ok(Paginated::new(&win, total, items))
    })?;

    Ok(Json(ApiResponse::ok(page)))
}

/// GET /api/branches
async fn handle_list_branches(
    State(state): State<AppState>,
    Query(params): Query<BranchListParams>,
) -> ApiResult<Paginated<crate::entities::BranchWithBank>> {
    let win = window(params.page, params.page_size)?;
    let filters = params.filters();

    let page = state.db.with_conn(|conn| {
        let total = count_branches(conn, &filters)?;
        let items = list_branches(conn, &filters, win.skip, win.limit)?;
        Ok(Paginated::new(&win, total, items))
    })?;

    Ok(Json(ApiResponse::ok(page)))
}

/// POST /api/branches
async fn handle_create_branch(
    State(state): State<AppState>,
    Json(new_branch): Json<NewBranch>,
) -> Result<impl IntoResponse, ApiError> {
    let branch = state.db.with_conn(|conn| create_branch(conn, &new_branch))?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(branch))))
}

/// GET /api/branches/:ifsc
async fn handle_get_branch(
    State(state): State<AppState>,
    Path(ifsc): Path<String>,
) -> ApiResult<crate::entities::BranchWithBank> {
    validate_ifsc(ifsc.trim())?;

    let branch = state
        .db
        .with_conn(|conn| get_branch(conn, &ifsc))?
        .ok_or_else(|| CatalogError::not_found("Branch"))?;

    Ok(Json(ApiResponse::ok(branch)))
}

/// GET /api/branches/export - streamed CSV, one storage batch per chunk
async fn handle_export(
    State(state): State<AppState>,
    Query(params): Query<BranchListParams>,
) -> Response {
    let mut export = ExportStream::new(state.db.clone(), params.filters());

    let body = async_stream::stream! {
        loop {
            // SQLite reads block; run each batch off the async workers
            let fetched = tokio::task::spawn_blocking(move || {
                let batch = export.next_batch();
                (batch, export)
            })
            .await;

            let batch = match fetched {
                Ok((batch, stream)) => {
                    export = stream;
                    batch
                }
                Err(e) => {
                    error!("Export task failed: {}", e);
                    yield Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
                    break;
                }
            };

            match batch {
                Ok(Some(lines)) => {
                    yield Ok::<String, std::io::Error>(lines.concat());
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Export aborted: {}", e);
                    yield Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
                    break;
                }
            }
        }
    };

    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILENAME),
            ),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

/// GET /api/stats
async fn handle_stats(State(state): State<AppState>) -> ApiResult<crate::query::CatalogStats> {
    let stats = state.db.with_conn(|conn| catalog_stats(conn))?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// POST /query - JSON query document
async fn handle_query(
    State(state): State<AppState>,
    Json(query): Json<CatalogQuery>,
) -> ApiResult<serde_json::Value> {
    let value = state.db.with_conn(|conn| query.execute(conn))?;
    Ok(Json(ApiResponse::ok(value)))
}

/// GET /ui - Dashboard
async fn serve_dashboard() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

// ============================================================================
// Router
// ============================================================================

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/banks", get(handle_list_banks).post(handle_create_bank))
        .route("/banks/:id", get(handle_get_bank))
        .route("/banks/:id/branches", get(handle_bank_branches))
        .route("/branches", get(handle_list_branches).post(handle_create_branch))
        .route("/branches/export", get(handle_export))
        .route("/branches/:ifsc", get(handle_get_branch))
        .route("/stats", get(handle_stats));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/query", post(handle_query))
        .route("/ui", get(serve_dashboard))
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new("web"))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
