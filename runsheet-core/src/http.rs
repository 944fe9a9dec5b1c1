//! REST layer. Every route lives under `/api`; uploaded files are served
//! back from `/uploads`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, patch, post};
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::{self, TraceLayer};
use tracing::{debug, info, Level};
use uuid::Uuid;

use crate::config::{RunsheetConfig, StorageBackend};
use crate::db::{init_database_with_config, Database};
use crate::error::{RunsheetError, RunsheetResult};
use crate::models::{
    BatchStepUpdate, Execution, ExecutionUpdate, NewExecution, NewRunbook, Runbook,
    RunbookUpdate, StepPatch,
};
use crate::repo::{
    ExecutionRepository, MemoryExecutionRepository, MemoryRunbookRepository,
    PgExecutionRepository, PgRunbookRepository, RunbookRepository,
};
use crate::services::{ExecutionService, RunbookService};
use crate::uploads::{UploadStore, UPLOADS_ROUTE};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    runbooks: RunbookService,
    executions: ExecutionService,
    uploads: UploadStore,
    storage: StorageBackend,
    database: Option<Database>,
}

impl AppState {
    pub fn new(
        runbooks: Arc<dyn RunbookRepository>,
        executions: Arc<dyn ExecutionRepository>,
        uploads: UploadStore,
        storage: StorageBackend,
    ) -> Self {
        Self {
            runbooks: RunbookService::new(runbooks.clone()),
            executions: ExecutionService::new(runbooks, executions),
            uploads,
            storage,
            database: None,
        }
    }

    pub fn in_memory(uploads: UploadStore) -> Self {
        Self::new(
            Arc::new(MemoryRunbookRepository::new()),
            Arc::new(MemoryExecutionRepository::new()),
            uploads,
            StorageBackend::Memory,
        )
    }

    pub fn with_database(db: Database, uploads: UploadStore) -> Self {
        let pool = db.pool().clone();
        let mut state = Self::new(
            Arc::new(PgRunbookRepository::new(pool.clone())),
            Arc::new(PgExecutionRepository::new(pool)),
            uploads,
            StorageBackend::Postgres,
        );
        state.database = Some(db);
        state
    }

    /// Builds the state for the configured backend. For PostgreSQL this
    /// connects and runs pending migrations, so a bad URL fails here.
    pub async fn from_config(config: &RunsheetConfig) -> RunsheetResult<Self> {
        let uploads = UploadStore::new(&config.server.upload_dir);
        match config.server.storage {
            StorageBackend::Memory => Ok(Self::in_memory(uploads)),
            StorageBackend::Postgres => {
                let db = init_database_with_config(&config.database).await?;
                Ok(Self::with_database(db, uploads))
            }
        }
    }

    pub fn storage(&self) -> StorageBackend {
        self.storage
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }
}

/// Handler error carrying the status mapping of the error taxonomy.
pub struct ApiError(RunsheetError);

impl From<RunsheetError> for ApiError {
    fn from(err: RunsheetError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            RunsheetError::NoFileUploaded
            | RunsheetError::UploadFailed(_)
            | RunsheetError::ValidationError(_) => StatusCode::BAD_REQUEST,
            e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match &self.0 {
            RunsheetError::NoFileUploaded => "No file uploaded".to_string(),
            RunsheetError::RunbookNotFound(_) => "Runbook not found".to_string(),
            RunsheetError::ExecutionNotFound(_) => "Execution not found".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            self.0.log();
        }
        let body = json!({
            "error": self.message(),
            "code": self.0.error_code(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Ids that do not parse cannot name a stored document.
fn parse_id(raw: &str, not_found: fn(String) -> RunsheetError) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError(not_found(raw.to_string())))
}

/// Malformed bodies get the same `{error, code}` shape as every other
/// failure.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|e| ApiError(RunsheetError::ValidationError(e.body_text())))
}

async fn api_health(State(state): State<AppState>) -> Response {
    let storage = state.storage.to_string();
    match &state.database {
        Some(db) => match db.health_check().await {
            Ok(()) => Json(json!({"status": "ok", "storage": storage})).into_response(),
            Err(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable", "storage": storage, "error": e.to_string()})),
            )
                .into_response(),
        },
        None => Json(json!({"status": "ok", "storage": storage})).into_response(),
    }
}

async fn api_runbooks_list(State(state): State<AppState>) -> ApiResult<Json<Vec<Runbook>>> {
    Ok(Json(state.runbooks.list().await?))
}

async fn api_runbooks_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Runbook>> {
    let id = parse_id(&id, RunsheetError::RunbookNotFound)?;
    Ok(Json(state.runbooks.get(id).await?))
}

async fn api_runbooks_create(
    State(state): State<AppState>,
    body: Result<Json<NewRunbook>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Runbook>)> {
    let body = json_body(body)?;
    let runbook = state.runbooks.create(body).await?;
    Ok((StatusCode::CREATED, Json(runbook)))
}

async fn api_runbooks_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<RunbookUpdate>, JsonRejection>,
) -> ApiResult<Json<Runbook>> {
    let body = json_body(body)?;
    let id = parse_id(&id, RunsheetError::RunbookNotFound)?;
    Ok(Json(state.runbooks.update(id, body).await?))
}

async fn api_runbooks_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Ok(id) = Uuid::parse_str(&id) {
        state.runbooks.delete(id).await?;
    }
    Ok(Json(json!({"success": true})))
}

async fn api_executions_list(State(state): State<AppState>) -> ApiResult<Json<Vec<Execution>>> {
    Ok(Json(state.executions.list().await?))
}

async fn api_executions_create(
    State(state): State<AppState>,
    body: Result<Json<NewExecution>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Execution>)> {
    let body = json_body(body)?;
    let execution = state.executions.start(body).await?;
    Ok((StatusCode::CREATED, Json(execution)))
}

async fn api_executions_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Execution>> {
    let id = parse_id(&id, RunsheetError::ExecutionNotFound)?;
    Ok(Json(state.executions.get(id).await?))
}

async fn api_executions_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ExecutionUpdate>, JsonRejection>,
) -> ApiResult<Json<Execution>> {
    let body = json_body(body)?;
    let id = parse_id(&id, RunsheetError::ExecutionNotFound)?;
    Ok(Json(state.executions.update(id, body).await?))
}

async fn api_executions_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Ok(id) = Uuid::parse_str(&id) {
        state.executions.delete(id).await?;
    }
    Ok(Json(json!({"success": true})))
}

async fn api_executions_patch_step(
    State(state): State<AppState>,
    Path((id, step_idx)): Path<(String, String)>,
    patch: Result<Json<StepPatch>, JsonRejection>,
) -> ApiResult<Json<Execution>> {
    let patch = json_body(patch)?;
    let id = parse_id(&id, RunsheetError::ExecutionNotFound)?;
    match step_idx.parse::<usize>() {
        Ok(step_idx) => Ok(Json(state.executions.patch_step(id, step_idx, &patch).await?)),
        Err(_) => {
            // Negative or non-numeric indices name no step.
            debug!(execution_id = %id, step_idx = %step_idx, "Step index out of range, patch ignored");
            Ok(Json(state.executions.get(id).await?))
        }
    }
}

async fn api_executions_patch_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<BatchStepUpdate>, JsonRejection>,
) -> ApiResult<Json<Execution>> {
    let body = json_body(body)?;
    let id = parse_id(&id, RunsheetError::ExecutionNotFound)?;
    Ok(Json(
        state.executions.patch_steps_batch(id, &body.updates).await?,
    ))
}

async fn api_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut multipart = multipart.map_err(|_| RunsheetError::NoFileUploaded)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RunsheetError::UploadFailed(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| RunsheetError::UploadFailed(e.body_text()))?;

        let url = state.uploads.store(&file_name, &bytes).await?;
        return Ok(Json(json!({ "url": url })));
    }

    Err(RunsheetError::NoFileUploaded.into())
}

pub fn router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.uploads.dir());

    Router::new()
        .route("/api/health", get(api_health))
        .route(
            "/api/runbooks",
            get(api_runbooks_list).post(api_runbooks_create),
        )
        .route(
            "/api/runbooks/{id}",
            get(api_runbooks_get)
                .put(api_runbooks_update)
                .delete(api_runbooks_delete),
        )
        .route(
            "/api/executions",
            get(api_executions_list).post(api_executions_create),
        )
        .route(
            "/api/executions/{id}",
            get(api_executions_get)
                .put(api_executions_update)
                .delete(api_executions_delete),
        )
        .route(
            "/api/executions/{id}/step/{step_idx}",
            patch(api_executions_patch_step),
        )
        .route(
            "/api/executions/{id}/steps/batch",
            patch(api_executions_patch_batch),
        )
        .route(
            "/api/upload",
            post(api_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .nest_service(UPLOADS_ROUTE, uploads)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves on an already bound listener until `shutdown` resolves.
pub async fn serve_with_listener<F>(
    listener: TcpListener,
    state: AppState,
    shutdown: F,
) -> RunsheetResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    state.uploads.ensure_dir().await?;
    let app = router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Binds `server.host:server.port` and serves until Ctrl-C.
pub async fn serve(config: &RunsheetConfig, state: AppState) -> RunsheetResult<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    let local: SocketAddr = listener.local_addr()?;

    info!(
        addr = %local,
        storage = %state.storage,
        upload_dir = %state.uploads.dir().display(),
        "Runsheet API listening"
    );

    serve_with_listener(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    })
    .await
}
