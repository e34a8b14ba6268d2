//! Filerelay Client - chunked uploads to a Filerelay server
//!
//! - `RelayClient` wraps the HTTP endpoints
//! - `ChunkUploader` drives one upload session with retries and progress reporting

pub mod client;
pub mod error;
pub mod retry;
pub mod session;
pub mod uploader;

pub use client::{DEFAULT_TIMEOUT, RelayClient};
pub use error::{ClientError, Result};
pub use retry::RetryPolicy;
pub use session::{UploadProgress, UploadSession, unique_destination_name};
pub use uploader::{ChunkUploader, UploadOptions, UploadReport};
