use crate::config::Config;
use axum::{
    Json, Router,
    body::Body,
    extract::{
        DefaultBodyLimit, Multipart, Path, Query, State,
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use filerelay_core::{
    ApiResponse, BlobRelay, ChunkAck, ErrorBody, FetchBlobOperationRequest, FileChunk,
    ListFilesOperation, ListFilesOperationRequest, RelayBlobOperation, RelayBlobOperationRequest,
    RelayError, Result, StagingStore, WriteChunkOperation, WriteChunkOperationRequest,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

/// Multipart field carrying the file in whole-file uploads.
const UPLOAD_FIELD: &str = "fileContent";

pub struct ServerState {
    pub staging: Arc<StagingStore>,
    pub write_chunk: WriteChunkOperation,
    pub list_files: ListFilesOperation,
    pub relay_blob: Option<RelayBlobOperation>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub config: Config,
}

impl ServerState {
    pub fn new(config: Config, relay: Option<Arc<BlobRelay>>) -> Result<Self> {
        let staging = Arc::new(StagingStore::new(
            config.staging.dir.clone(),
            Duration::from_secs(config.staging.lease_timeout_secs),
        )?);

        Ok(Self {
            write_chunk: WriteChunkOperation::new(staging.clone()),
            list_files: ListFilesOperation::new(staging.clone(), relay.clone()),
            relay_blob: relay.map(|relay| RelayBlobOperation::new(staging.clone(), relay)),
            staging,
            started_at: chrono::Utc::now(),
            config,
        })
    }

    fn relay_blob(&self) -> Result<&RelayBlobOperation> {
        self.relay_blob
            .as_ref()
            .ok_or(RelayError::StorageNotConfigured)
    }
}

/// Builds the cloud relay described by the storage section, if any.
pub fn build_relay(config: &Config) -> Result<Option<Arc<BlobRelay>>> {
    let Some(storage) = config.storage.as_ref() else {
        return Ok(None);
    };

    let store = storage.blob_store_builder()?.build()?;
    Ok(Some(Arc::new(BlobRelay::new(
        store,
        &storage.base_url,
        storage.transfer_unit_bytes,
    ))))
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    let body_limit = state.config.limits.max_body_bytes;

    Router::new()
        .route("/health", get(health_handler))
        .route("/files", get(list_staged_files).post(upload_chunk))
        .route("/files/:name", get(get_staged_file))
        .route("/files/:name/blobs", get(list_container_blobs))
        .route("/files/:name/delete", get(delete_staged_file))
        .route("/files/:name/:container/copy", get(copy_to_container))
        .route("/files/:name/:container/download", get(fetch_from_container))
        .route("/uploadFile", axum::routing::post(upload_whole_file))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: Config) -> Result<()> {
    let relay = build_relay(&config)?;
    if relay.is_none() {
        tracing::warn!("No storage section configured; cloud relay endpoints are disabled");
    }

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(ServerState::new(config, relay)?);
    tracing::info!("Staging directory: {:?}", state.staging.root());

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Error wrapper that renders a `RelayError` as a status code plus the JSON envelope.
pub struct ApiError(RelayError);

impl From<RelayError> for ApiError {
    fn from(error: RelayError) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            RelayError::InvalidRequest(_) | RelayError::InvalidName(_) => StatusCode::BAD_REQUEST,
            RelayError::StagedFileNotFound(_) | RelayError::BlobNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            RelayError::NameInUse(_) | RelayError::BlobAlreadyExists(_) => StatusCode::CONFLICT,
            RelayError::OffsetMismatch { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            RelayError::Storage(_) => StatusCode::BAD_GATEWAY,
            RelayError::StorageNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Io(_)
            | RelayError::Config(_)
            | RelayError::Serialization(_)
            | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::warn!("Request rejected: {}", self.0);
        }

        let body = ApiResponse::<()>::failed(ErrorBody::from(&self.0));
        (status, Json(body)).into_response()
    }
}

macro_rules! rejection_as_invalid_request {
    ($($rejection:ty),+) => {
        $(
            impl From<$rejection> for ApiError {
                fn from(rejection: $rejection) -> Self {
                    Self(RelayError::InvalidRequest(rejection.body_text()))
                }
            }
        )+
    };
}

rejection_as_invalid_request!(JsonRejection, PathRejection, QueryRejection, MultipartRejection);

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Deserialize)]
struct CopyQuery {
    #[serde(default = "default_overwrite")]
    overwrite: bool,
    #[serde(default)]
    remove_staged: bool,
}

fn default_overwrite() -> bool {
    true
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "started_at": state.started_at.to_rfc3339(),
        "staging_dir": state.staging.root().display().to_string(),
        "cloud_relay": state.relay_blob.is_some(),
    });

    (StatusCode::OK, Json(response))
}

async fn list_staged_files(State(state): State<Arc<ServerState>>) -> ApiResult<Vec<String>> {
    let result = state
        .list_files
        .run(ListFilesOperationRequest::Staged)
        .await?;
    Ok(Json(ApiResponse::ok(result.urls)))
}

async fn list_container_blobs(
    State(state): State<Arc<ServerState>>,
    container: std::result::Result<Path<String>, PathRejection>,
) -> ApiResult<Vec<String>> {
    let Path(container) = container?;
    let result = state
        .list_files
        .run(ListFilesOperationRequest::Container(container))
        .await?;
    Ok(Json(ApiResponse::ok(result.urls)))
}

async fn get_staged_file(
    State(state): State<Arc<ServerState>>,
    name: std::result::Result<Path<String>, PathRejection>,
) -> std::result::Result<Response, ApiError> {
    let Path(name) = name?;
    let path = state.staging.staged_path(&name).await?;
    let file = tokio::fs::File::open(&path).await.map_err(RelayError::from)?;
    let content_length = file.metadata().await.map_err(RelayError::from)?.len();
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, content_length.to_string()),
        ],
        body,
    )
        .into_response())
}

async fn delete_staged_file(
    State(state): State<Arc<ServerState>>,
    name: std::result::Result<Path<String>, PathRejection>,
) -> ApiResult<bool> {
    let Path(name) = name?;
    let existed = state.staging.delete(&name).await?;
    tracing::info!("Deleted staged file {} (existed={})", name, existed);
    Ok(Json(ApiResponse::ok(true)))
}

async fn copy_to_container(
    State(state): State<Arc<ServerState>>,
    names: std::result::Result<Path<(String, String)>, PathRejection>,
    query: std::result::Result<Query<CopyQuery>, QueryRejection>,
) -> ApiResult<String> {
    let Path((name, container)) = names?;
    let Query(query) = query?;
    let result = state
        .relay_blob()?
        .run(RelayBlobOperationRequest {
            file_name: name,
            container,
            overwrite: query.overwrite,
            remove_staged: query.remove_staged,
        })
        .await?;
    Ok(Json(ApiResponse::ok(result.url)))
}

async fn fetch_from_container(
    State(state): State<Arc<ServerState>>,
    names: std::result::Result<Path<(String, String)>, PathRejection>,
) -> ApiResult<String> {
    let Path((name, container)) = names?;
    let result = state
        .relay_blob()?
        .run_fetch(FetchBlobOperationRequest {
            file_name: name,
            container,
        })
        .await?;
    Ok(Json(ApiResponse::ok(result.staged_url)))
}

async fn upload_chunk(
    State(state): State<Arc<ServerState>>,
    chunk: std::result::Result<Json<FileChunk>, JsonRejection>,
) -> ApiResult<ChunkAck> {
    let Json(chunk) = chunk?;
    let result = state
        .write_chunk
        .run(WriteChunkOperationRequest { chunk })
        .await?;
    Ok(Json(ApiResponse::ok(ChunkAck {
        file_name: result.file_name,
        staged_size: result.staged_size,
    })))
}

async fn upload_whole_file(
    State(state): State<Arc<ServerState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<StatusCode, ApiError> {
    let mut multipart = multipart?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RelayError::InvalidRequest(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| RelayError::InvalidRequest("missing file name".to_string()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| RelayError::InvalidRequest(e.to_string()))?;

        if data.is_empty() {
            return Err(RelayError::InvalidRequest(format!("{} is empty", UPLOAD_FIELD)).into());
        }

        let size = state.staging.write_whole(&file_name, data).await?;
        tracing::info!("Stored whole-file upload {} ({} bytes)", file_name, size);
        return Ok(StatusCode::NO_CONTENT);
    }

    Err(RelayError::InvalidRequest(format!("missing form field {}", UPLOAD_FIELD)).into())
}
