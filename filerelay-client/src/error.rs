use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Relay returned {status} ({code}): {message}")]
    Remote {
        status: StatusCode,
        code: String,
        message: String,
        current_size: Option<u64>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Source file ended early: expected {expected} bytes, read {read}")]
    SourceTruncated { expected: u64, read: u64 },

    #[error("Chunk at offset {offset} failed after {attempts} attempt(s): {source}")]
    ChunkFailed {
        offset: u64,
        attempts: u32,
        #[source]
        source: Box<ClientError>,
    },

    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

impl ClientError {
    /// Transport failures, timeouts, 5xx replies and remote storage errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(error) => !error.is_builder() && !error.is_decode(),
            Self::Remote { status, code, .. } => {
                status.is_server_error() || code == "storage_error"
            }
            Self::Io(_)
            | Self::InvalidResponse(_)
            | Self::SourceTruncated { .. }
            | Self::ChunkFailed { .. }
            | Self::InvalidOptions(_) => false,
        }
    }

    /// Error code reported by the relay, if the failure came from it.
    pub fn remote_code(&self) -> Option<&str> {
        match self {
            Self::Remote { code, .. } => Some(code),
            Self::ChunkFailed { source, .. } => source.remote_code(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(status: StatusCode, code: &str) -> ClientError {
        ClientError::Remote {
            status,
            code: code.to_string(),
            message: "test".to_string(),
            current_size: None,
        }
    }

    #[test]
    fn server_errors_are_retryable() {
        assert!(remote(StatusCode::SERVICE_UNAVAILABLE, "storage_not_configured").is_retryable());
        assert!(remote(StatusCode::BAD_GATEWAY, "storage_error").is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(!remote(StatusCode::BAD_REQUEST, "invalid_name").is_retryable());
        assert!(!remote(StatusCode::RANGE_NOT_SATISFIABLE, "offset_mismatch").is_retryable());
        assert!(!ClientError::SourceTruncated { expected: 10, read: 4 }.is_retryable());
    }

    #[test]
    fn chunk_failure_exposes_remote_code() {
        let error = ClientError::ChunkFailed {
            offset: 400,
            attempts: 1,
            source: Box::new(remote(StatusCode::CONFLICT, "name_in_use")),
        };
        assert_eq!(error.remote_code(), Some("name_in_use"));
        assert!(!error.is_retryable());
    }
}
