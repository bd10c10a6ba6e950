//! Read-only HTTP dashboard.
//!
//! JSON views of users, groups, tasks and statistics, plus a small HTML
//! summary page. Nothing here writes to the store.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::lifecycle::TaskStatus;
use crate::reply::escape_html;
use crate::store::{Assignee, HistoryEntry, Store, StoreError, Task, TaskFilter};

/// Default and maximum page size for `/api/tasks`.
const MAX_TASKS: usize = 500;

/// Error returned by dashboard routes.
#[derive(Debug)]
pub enum DashboardError {
    /// 400 with a reason.
    BadRequest(String),
    /// 404 for a missing entity.
    NotFound(String),
    /// 500; the cause is logged, not shown.
    Internal(StoreError),
}

impl From<StoreError> for DashboardError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} {id} not found")),
            other => Self::Internal(other),
        }
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Internal(e) => {
                warn!(error = %e, "dashboard query failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_owned())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, DashboardError>;

/// Query string of `GET /api/tasks`.
#[derive(Debug, Default, Deserialize)]
pub struct TasksQuery {
    /// Only this status.
    pub status: Option<String>,
    /// Only this group.
    pub group_id: Option<i64>,
    /// Page size, capped.
    pub limit: Option<usize>,
}

/// Body of `GET /api/tasks/{id}`.
#[derive(Debug, Serialize)]
pub struct TaskDetail {
    /// The task row.
    pub task: Task,
    /// Assignees with their personal status.
    pub assignees: Vec<Assignee>,
    /// Audit trail, oldest first.
    pub history: Vec<HistoryEntry>,
}

/// Build the dashboard router.
pub fn router(store: Store) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/users", get(users))
        .route("/api/groups", get(groups))
        .route("/api/tasks", get(tasks))
        .route("/api/tasks/{id}", get(task))
        .route("/api/stats", get(overall_stats))
        .route("/api/stats/{user_id}", get(worker_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

/// Serve the dashboard on `bind` until `shutdown_rx` flips to true.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(
    store: Store,
    bind: &str,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind dashboard on {bind}: {e}"))?;
    info!(bind, "dashboard listening");

    axum::serve(listener, router(store))
        .with_graceful_shutdown(async move {
            while shutdown_rx.changed().await.is_ok() {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        })
        .await?;

    info!("dashboard stopped");
    Ok(())
}

/// GET /api/users
async fn users(State(store): State<Store>) -> ApiResult<Vec<crate::store::User>> {
    Ok(Json(store.list_users(false).await?))
}

/// GET /api/groups
async fn groups(State(store): State<Store>) -> ApiResult<Vec<crate::store::GroupOverview>> {
    Ok(Json(store.group_overviews().await?))
}

/// GET /api/tasks?status=&group_id=&limit=
async fn tasks(State(store): State<Store>, Query(query): Query<TasksQuery>) -> ApiResult<Vec<Task>> {
    let statuses = match query.status.as_deref() {
        Some(s) => vec![TaskStatus::parse(s)
            .map_err(|_| DashboardError::BadRequest(format!("unknown status '{s}'")))?],
        None => Vec::new(),
    };
    let filter = TaskFilter {
        group_id: query.group_id,
        statuses,
        limit: query.limit.unwrap_or(MAX_TASKS).min(MAX_TASKS),
        ..TaskFilter::default()
    };
    Ok(Json(store.list_tasks(&filter).await?))
}

/// GET /api/tasks/{id}
async fn task(State(store): State<Store>, Path(id): Path<i64>) -> ApiResult<TaskDetail> {
    let task = store.require_task(id).await?;
    let assignees = store.task_assignees(id).await?;
    let history = store.task_history(id).await?;
    Ok(Json(TaskDetail {
        task,
        assignees,
        history,
    }))
}

/// GET /api/stats
async fn overall_stats(State(store): State<Store>) -> ApiResult<crate::store::OverallStats> {
    Ok(Json(store.overall_stats().await?))
}

/// GET /api/stats/{user_id}
async fn worker_stats(
    State(store): State<Store>,
    Path(user_id): Path<i64>,
) -> ApiResult<crate::store::WorkerStats> {
    store
        .worker_stats(user_id)
        .await?
        .map(Json)
        .ok_or_else(|| DashboardError::NotFound(format!("user {user_id} not found")))
}

/// GET /
async fn index(State(store): State<Store>) -> Result<Html<String>, DashboardError> {
    let stats = store.overall_stats().await?;
    let active = store.list_tasks(&TaskFilter::active(50)).await?;

    let mut rows = String::new();
    for t in &active {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{} {}</td><td>{}</td></tr>\n",
            t.task_id,
            escape_html(&t.title),
            escape_html(&t.due_date),
            escape_html(&t.due_time),
            t.status.label()
        ));
    }

    Ok(Html(format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>taskdesk</title></head>\n\
         <body>\n<h1>taskdesk</h1>\n\
         <p>Tasks: {} &middot; pending {} &middot; in progress {} &middot; completed {} &middot; cancelled {}</p>\n\
         <p>Active users: {} &middot; groups: {}</p>\n\
         <h2>Active tasks</h2>\n\
         <table>\n<tr><th>#</th><th>Title</th><th>Due</th><th>Status</th></tr>\n{rows}</table>\n\
         </body></html>\n",
        stats.total_tasks,
        stats.pending,
        stats.in_progress,
        stats.completed,
        stats.cancelled,
        stats.users,
        stats.groups,
    )))
}
