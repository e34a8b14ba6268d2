use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

/// Coarse classification used by callers to decide between retrying and giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Protocol,
    NotFound,
    Conflict,
    RemoteService,
    Config,
    Internal,
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Offset mismatch for {name}: expected {expected}, got {actual}")]
    OffsetMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("Name is leased to another upload: {0}")]
    NameInUse(String),

    #[error("Staged file not found: {0}")]
    StagedFileNotFound(String),

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Blob already exists: {0}")]
    BlobAlreadyExists(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cloud storage is not configured")]
    StorageNotConfigured,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::InvalidRequest(_) | Self::InvalidName(_) => ErrorKind::Protocol,
            Self::StagedFileNotFound(_) | Self::BlobNotFound(_) => ErrorKind::NotFound,
            Self::OffsetMismatch { .. } | Self::NameInUse(_) | Self::BlobAlreadyExists(_) => {
                ErrorKind::Conflict
            }
            Self::Storage(_) => ErrorKind::RemoteService,
            Self::StorageNotConfigured | Self::Config(_) => ErrorKind::Config,
            Self::Serialization(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code carried in error responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidName(_) => "invalid_name",
            Self::OffsetMismatch { .. } => "offset_mismatch",
            Self::NameInUse(_) => "name_in_use",
            Self::StagedFileNotFound(_) => "staged_file_not_found",
            Self::BlobNotFound(_) => "blob_not_found",
            Self::BlobAlreadyExists(_) => "blob_already_exists",
            Self::Storage(_) => "storage_error",
            Self::StorageNotConfigured => "storage_not_configured",
            Self::Config(_) => "config_error",
            Self::Serialization(_) | Self::Internal(_) => "internal_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::RemoteService
    }

    /// Staged size to report back to the client, when the error carries one.
    pub fn current_size(&self) -> Option<u64> {
        match self {
            Self::OffsetMismatch { expected, .. } => Some(*expected),
            _ => None,
        }
    }
}

impl From<object_store::Error> for RelayError {
    fn from(error: object_store::Error) -> Self {
        match error {
            object_store::Error::NotFound { path, .. } => Self::BlobNotFound(path),
            object_store::Error::AlreadyExists { path, .. } => Self::BlobAlreadyExists(path),
            other => Self::Storage(other.to_string()),
        }
    }
}
