//! HTTP API over the merge-request pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/`, `/health` | Health check (version, configured providers) |
//! | `GET`  | `/open_merge_requests` | Open merge requests of the project |
//! | `GET`  | `/merge_request_changes?mr_id=N` | Filter + persist changes, schedule the index |
//! | `POST` | `/setup` | Load the documentation corpus, schedule its index |
//! | `GET`  | `/index_tasks/{key}` | State of an index task (`mr-N` or `docs`) |
//! | `POST` | `/prompt` | Render a prompt (`documentation` or `summary`) for a merge request |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "conflict", "message": "index task 'mr-7' is already Running" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `upstream_error` (GitLab's own status, or 502 when GitLab was unreachable),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mrdoc_core::models::Change;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::gitlab::{GitLabError, MergeRequestSummary};
use crate::pipeline::{PipelineError, Services};
use crate::prompts::PromptKind;
use crate::tasks::TaskRecord;

/// Build the application router. Exposed separately from [`run_server`] so
/// it can be driven in-process.
pub fn router(services: Services) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_health))
        .route("/health", get(handle_health))
        .route("/open_merge_requests", get(handle_open_merge_requests))
        .route("/merge_request_changes", get(handle_merge_request_changes))
        .route("/setup", post(handle_setup))
        .route("/index_tasks/{key}", get(handle_index_task))
        .route("/prompt", post(handle_prompt))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(services)
}

/// Bind `[server].bind` and serve until the process is terminated.
pub async fn run_server(services: Services) -> anyhow::Result<()> {
    let bind_addr = services.config.server.bind.clone();
    let app = router(services);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("mrdoc server listening on http://{}", bind_addr);
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

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<GitLabError> for AppError {
    fn from(err: GitLabError) -> Self {
        let status = match &err {
            GitLabError::Status { status, .. } => {
                StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GitLabError::Transport(_) | GitLabError::Decode(_) => StatusCode::BAD_GATEWAY,
        };
        AppError::new(status, "upstream_error", err.to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Conflict(conflict) => {
                AppError::new(StatusCode::CONFLICT, "conflict", conflict.to_string())
            }
            PipelineError::GitLab(e) => e.into(),
            PipelineError::NotFound(message) => {
                AppError::new(StatusCode::NOT_FOUND, "not_found", message)
            }
            PipelineError::Internal(e) => {
                tracing::error!(error = %format!("{:#}", e), "request failed");
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", format!("{:#}", e))
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct ProviderInfo {
    provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    embedding: ProviderInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    llm: Option<ProviderInfo>,
}

async fn handle_health(State(services): State<Services>) -> Json<HealthResponse> {
    let config = &services.config;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        embedding: ProviderInfo {
            provider: config.embedding.provider.to_string(),
            model: config.embedding.model.clone(),
        },
        llm: config.llm.as_ref().map(|llm| ProviderInfo {
            provider: llm.provider.to_string(),
            model: Some(llm.model.clone()),
        }),
    })
}

// ============ GET /open_merge_requests ============

#[derive(Serialize)]
struct OpenMergeRequestsResponse {
    merge_requests: Vec<MergeRequestSummary>,
}

async fn handle_open_merge_requests(
    State(services): State<Services>,
) -> Result<Json<OpenMergeRequestsResponse>, AppError> {
    let merge_requests = services.gitlab.list_open_merge_requests().await?;
    Ok(Json(OpenMergeRequestsResponse { merge_requests }))
}

// ============ GET /merge_request_changes ============

#[derive(Deserialize)]
struct MergeRequestQuery {
    mr_id: u64,
}

/// A retained change as reported to the caller. Every change that reaches
/// the response passed the filter, so `exclude` is always `false`.
#[derive(Serialize)]
struct ChangeEntry {
    #[serde(flatten)]
    change: Change,
    exclude: bool,
}

#[derive(Serialize)]
struct MergeRequestChangesResponse {
    mr_id: u64,
    fetched: usize,
    changes: Vec<ChangeEntry>,
    task: TaskRecord,
}

async fn handle_merge_request_changes(
    State(services): State<Services>,
    query: Result<Query<MergeRequestQuery>, QueryRejection>,
) -> Result<Json<MergeRequestChangesResponse>, AppError> {
    let Query(query) = query?;
    let (prepared, task) = services.start_merge_request(query.mr_id).await?;

    Ok(Json(MergeRequestChangesResponse {
        mr_id: prepared.mr_id,
        fetched: prepared.fetched,
        changes: prepared
            .changes
            .into_iter()
            .map(|change| ChangeEntry {
                change,
                exclude: false,
            })
            .collect(),
        task,
    }))
}

// ============ POST /setup ============

#[derive(Serialize)]
struct SetupResponse {
    documents: usize,
    task: TaskRecord,
}

async fn handle_setup(
    State(services): State<Services>,
) -> Result<(StatusCode, Json<SetupResponse>), AppError> {
    let (task, documents) = services.start_docs_index()?;
    Ok((StatusCode::ACCEPTED, Json(SetupResponse { documents, task })))
}

// ============ GET /index_tasks/{key} ============

async fn handle_index_task(
    State(services): State<Services>,
    Path(key): Path<String>,
) -> Result<Json<TaskRecord>, AppError> {
    services
        .tasks
        .get(&key)
        .map(Json)
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "not_found", format!("no index task: {}", key)))
}

// ============ POST /prompt ============

#[derive(Deserialize)]
struct PromptRequest {
    mr_id: u64,
    #[serde(default)]
    kind: PromptKind,
    #[serde(default)]
    prompt_text: Option<String>,
}

#[derive(Serialize)]
struct PromptResponse {
    prompt: String,
}

async fn handle_prompt(
    State(services): State<Services>,
    req: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<PromptResponse>, AppError> {
    let Json(req) = req?;
    let prompt = services.render_prompt(req.mr_id, req.kind, req.prompt_text.as_deref())?;
    Ok(Json(PromptResponse { prompt }))
}
