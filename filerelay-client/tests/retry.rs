use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use filerelay_client::{ChunkUploader, ClientError, RelayClient, RetryPolicy, UploadOptions};
use filerelay_core::{ApiResponse, ChunkAck, ErrorBody, FileChunk};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;

/// How the fake relay answers each chunk request.
#[derive(Clone, Copy)]
enum Behavior {
    /// First request gets a 503, later ones succeed.
    FailOnce,
    /// First request is written but answered with a 503; the retry sees the offset already staged.
    LoseFirstAck,
    /// Every request is rejected as malformed.
    Reject,
    /// Chunks succeed; the first copy into a container hits a storage error.
    FlakyCopy,
}

struct FakeRelay {
    behavior: Behavior,
    calls: AtomicU32,
    copy_calls: AtomicU32,
    delete_calls: AtomicU32,
}

fn error_response(
    status: StatusCode,
    code: &str,
    current_size: Option<u64>,
) -> axum::response::Response {
    let body = ApiResponse::<()>::failed(ErrorBody {
        code: code.to_string(),
        message: format!("{} from fake relay", code),
        current_size,
    });
    (status, Json(body)).into_response()
}

async fn handle_chunk(
    State(relay): State<Arc<FakeRelay>>,
    Json(chunk): Json<FileChunk>,
) -> axum::response::Response {
    let call = relay.calls.fetch_add(1, Ordering::SeqCst) + 1;
    let ack = || {
        Json(ApiResponse::ok(ChunkAck {
            file_name: chunk.file_name_no_path.clone(),
            staged_size: chunk.end_offset(),
        }))
        .into_response()
    };

    match relay.behavior {
        Behavior::FailOnce if call == 1 => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "storage_error", None)
        }
        Behavior::FailOnce => ack(),
        Behavior::LoseFirstAck if call == 1 => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "storage_error", None)
        }
        Behavior::LoseFirstAck if call == 2 => error_response(
            StatusCode::RANGE_NOT_SATISFIABLE,
            "offset_mismatch",
            Some(chunk.end_offset()),
        ),
        Behavior::LoseFirstAck => ack(),
        Behavior::Reject => error_response(StatusCode::BAD_REQUEST, "invalid_request", None),
        Behavior::FlakyCopy => ack(),
    }
}

async fn handle_copy(
    State(relay): State<Arc<FakeRelay>>,
    Path((name, container)): Path<(String, String)>,
) -> axum::response::Response {
    let call = relay.copy_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if matches!(relay.behavior, Behavior::FlakyCopy) && call == 1 {
        return error_response(StatusCode::BAD_GATEWAY, "storage_error", None);
    }

    let url = format!("https://blobs.example.net/{}/{}", container, name);
    Json(ApiResponse::ok(url)).into_response()
}

async fn handle_delete(
    State(relay): State<Arc<FakeRelay>>,
    Path(_name): Path<String>,
) -> axum::response::Response {
    relay.delete_calls.fetch_add(1, Ordering::SeqCst);
    Json(ApiResponse::ok(true)).into_response()
}

async fn spawn_fake_relay(behavior: Behavior) -> (String, Arc<FakeRelay>) {
    let relay = Arc::new(FakeRelay {
        behavior,
        calls: AtomicU32::new(0),
        copy_calls: AtomicU32::new(0),
        delete_calls: AtomicU32::new(0),
    });
    let app = Router::new()
        .route("/files", post(handle_chunk))
        .route("/files/:name/delete", get(handle_delete))
        .route("/files/:name/:container/copy", get(handle_copy))
        .with_state(relay.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), relay)
}

fn uploader(base_url: &str) -> ChunkUploader {
    relaying_uploader(base_url, None)
}

fn relaying_uploader(base_url: &str, container: Option<&str>) -> ChunkUploader {
    let client = RelayClient::new(base_url, Duration::from_secs(10)).unwrap();
    ChunkUploader::new(
        client,
        UploadOptions {
            chunk_size: 4,
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
            relay_container: container.map(str::to_string),
            ..UploadOptions::default()
        },
    )
}

fn source_file(dir: &tempfile::TempDir, data: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join("source.bin");
    std::fs::write(&path, data).unwrap();
    path
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let path = source_file(&dir, b"0123456789");
    let (base_url, relay) = spawn_fake_relay(Behavior::FailOnce).await;

    let uploader = uploader(&base_url);
    let progress = uploader.progress();
    let report = uploader.upload_large_file(&path).await.unwrap();

    assert_eq!(report.chunk_sizes, vec![4, 4, 2]);
    assert_eq!(report.total_bytes, 10);
    assert!(report.destination_name.starts_with("source-"));
    assert!(report.destination_name.ends_with(".bin"));
    assert_eq!(relay.calls.load(Ordering::SeqCst), 4);

    let last = *progress.borrow();
    assert_eq!(last.uploaded_bytes, 10);
    assert_eq!(last.total_bytes, 10);
}

#[tokio::test]
async fn landed_chunk_with_lost_reply_counts_as_acknowledged() {
    let dir = tempfile::tempdir().unwrap();
    let path = source_file(&dir, b"abcdef");
    let (base_url, relay) = spawn_fake_relay(Behavior::LoseFirstAck).await;

    let report = uploader(&base_url).upload_large_file(&path).await.unwrap();

    assert_eq!(report.chunk_sizes, vec![4, 2]);
    assert_eq!(relay.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn client_error_aborts_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    let path = source_file(&dir, b"0123456789");
    let (base_url, relay) = spawn_fake_relay(Behavior::Reject).await;

    let error = uploader(&base_url)
        .upload_large_file(&path)
        .await
        .unwrap_err();

    match error {
        ClientError::ChunkFailed {
            offset,
            attempts,
            source,
        } => {
            assert_eq!(offset, 0);
            assert_eq!(attempts, 1);
            assert!(matches!(
                *source,
                ClientError::Remote { status, .. } if status == StatusCode::BAD_REQUEST
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(relay.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreachable_relay_exhausts_retries() {
    let dir = tempfile::tempdir().unwrap();
    let path = source_file(&dir, b"0123");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let error = uploader(&format!("http://{}", addr))
        .upload_large_file(&path)
        .await
        .unwrap_err();

    assert!(matches!(error, ClientError::ChunkFailed { attempts: 3, .. }));
}

#[tokio::test]
async fn transient_copy_failure_is_retried_then_staged_file_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let path = source_file(&dir, b"012345");
    let (base_url, relay) = spawn_fake_relay(Behavior::FlakyCopy).await;

    let report = relaying_uploader(&base_url, Some("uploads"))
        .upload_large_file(&path)
        .await
        .unwrap();

    assert_eq!(report.chunk_sizes, vec![4, 2]);
    assert_eq!(
        report.blob_url,
        Some(format!(
            "https://blobs.example.net/uploads/{}",
            report.destination_name
        ))
    );
    assert_eq!(relay.copy_calls.load(Ordering::SeqCst), 2);
    assert_eq!(relay.delete_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn default_options_use_the_standard_chunk_size() {
    assert_eq!(
        UploadOptions::default().chunk_size,
        filerelay_core::DEFAULT_CHUNK_SIZE
    );
    assert_eq!(UploadOptions::default().chunk_size, 400_000);
}
