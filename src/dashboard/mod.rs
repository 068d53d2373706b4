use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ColumnSpec;
use crate::error::LookoutError;
use crate::model::JobOrder;
use crate::query::translate::ColumnFilter;
use crate::table::{JobsTable, Pagination, PassOutcome, PassStart};
use crate::tree::{RowId, VisibleRow};

/// Upper bound on passes per request; each intent needs one, a root rebuild
/// with a kept expansion needs two.
const MAX_PASSES_PER_REQUEST: usize = 8;

#[derive(Clone)]
pub struct DashboardState {
    pub table: Arc<Mutex<JobsTable>>,
}

impl DashboardState {
    pub fn new(table: JobsTable) -> Self {
        Self {
            table: Arc::new(Mutex::new(table)),
        }
    }
}

/// Everything a renderer needs to draw the table.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub loading: bool,
    pub error: Option<String>,
    pub total_row_count: usize,
    pub page_count: usize,
    pub pagination: Pagination,
    pub grouping: Vec<String>,
    pub expanded: Vec<RowId>,
    pub selected_rows: Vec<RowId>,
    pub selected_jobs: Vec<String>,
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<VisibleRow>,
}

impl TableSnapshot {
    pub fn of(table: &JobsTable) -> Self {
        Self {
            loading: table.is_loading(),
            error: table.last_error().map(str::to_string),
            total_row_count: table.total_row_count(),
            page_count: table.page_count(),
            pagination: table.pagination(),
            grouping: table.grouping().to_vec(),
            expanded: table.expanded().iter().cloned().collect(),
            selected_rows: table.selection().iter().cloned().collect(),
            selected_jobs: table.selected_jobs(),
            columns: table.visible_columns().into_iter().cloned().collect(),
            rows: table.visible_rows(),
        }
    }
}

#[derive(Deserialize)]
struct GroupingRequest {
    grouping: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RowRequest {
    row_id: String,
}

#[derive(Deserialize)]
struct FiltersRequest {
    filters: Vec<ColumnFilter>,
}

#[derive(Deserialize)]
struct ColumnRequest {
    key: String,
    displayed: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiResult = Result<Json<TableSnapshot>, (StatusCode, Json<ErrorResponse>)>;

fn bad_request(error: LookoutError) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn parse_row_id(raw: &str) -> Result<RowId, (StatusCode, Json<ErrorResponse>)> {
    RowId::parse(raw).map_err(bad_request)
}

pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/table", get(table_handler))
        .route("/api/forest", get(forest_handler))
        .route("/api/grouping", post(grouping_handler))
        .route("/api/expanded/toggle", post(toggle_expanded_handler))
        .route("/api/pagination", post(pagination_handler))
        .route("/api/filters", post(filters_handler))
        .route("/api/sort", post(sort_handler))
        .route("/api/load-more", post(load_more_handler))
        .route("/api/selection/toggle", post(toggle_selected_handler))
        .route("/api/columns", post(columns_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

/// Run passes until the table has nothing left to fetch. The lock is released
/// while a request is in flight, so other intents can land meanwhile; their
/// effect is picked up by the next pass and stale answers are dropped.
pub async fn synchronize(table: &Mutex<JobsTable>) {
    for _ in 0..MAX_PASSES_PER_REQUEST {
        let pending = match table.lock().await.begin_pass() {
            PassStart::Fetch(pending) => pending,
            PassStart::Done(_) => return,
        };
        let done = pending.run().await;
        if let PassOutcome::Failed(e) = table.lock().await.complete(done) {
            tracing::warn!(error = %e, "Dashboard pass failed");
        }
    }
}

async fn snapshot(state: &DashboardState) -> Json<TableSnapshot> {
    synchronize(&state.table).await;
    Json(TableSnapshot::of(&*state.table.lock().await))
}

async fn table_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    snapshot(&state).await
}

async fn forest_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    synchronize(&state.table).await;
    let forest = state.table.lock().await.forest().clone();
    Json(forest)
}

async fn grouping_handler(
    State(state): State<DashboardState>,
    Json(payload): Json<GroupingRequest>,
) -> ApiResult {
    state.table.lock().await.set_grouping(payload.grouping);
    Ok(snapshot(&state).await)
}

async fn toggle_expanded_handler(
    State(state): State<DashboardState>,
    Json(payload): Json<RowRequest>,
) -> ApiResult {
    let row_id = parse_row_id(&payload.row_id)?;
    state.table.lock().await.toggle_expanded(&row_id);
    Ok(snapshot(&state).await)
}

async fn pagination_handler(
    State(state): State<DashboardState>,
    Json(payload): Json<Pagination>,
) -> ApiResult {
    state
        .table
        .lock()
        .await
        .set_pagination(payload)
        .map_err(bad_request)?;
    Ok(snapshot(&state).await)
}

async fn filters_handler(
    State(state): State<DashboardState>,
    Json(payload): Json<FiltersRequest>,
) -> ApiResult {
    state.table.lock().await.set_column_filters(payload.filters);
    Ok(snapshot(&state).await)
}

async fn sort_handler(
    State(state): State<DashboardState>,
    Json(payload): Json<JobOrder>,
) -> ApiResult {
    state.table.lock().await.set_sort(payload);
    Ok(snapshot(&state).await)
}

async fn load_more_handler(
    State(state): State<DashboardState>,
    Json(payload): Json<RowRequest>,
) -> ApiResult {
    let row_id = parse_row_id(&payload.row_id)?;
    state
        .table
        .lock()
        .await
        .load_more(&row_id)
        .map_err(bad_request)?;
    Ok(snapshot(&state).await)
}

async fn toggle_selected_handler(
    State(state): State<DashboardState>,
    Json(payload): Json<RowRequest>,
) -> ApiResult {
    let row_id = parse_row_id(&payload.row_id)?;
    state.table.lock().await.toggle_selected(&row_id);
    Ok(snapshot(&state).await)
}

async fn columns_handler(
    State(state): State<DashboardState>,
    Json(payload): Json<ColumnRequest>,
) -> ApiResult {
    state
        .table
        .lock()
        .await
        .set_column_displayed(&payload.key, payload.displayed)
        .map_err(bad_request)?;
    Ok(snapshot(&state).await)
}
