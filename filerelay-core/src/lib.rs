//! Filerelay Core - chunked upload reassembly and cloud blob relay
//!
//! - Clients send a file as strictly sequential byte-range chunks
//! - Chunks are reassembled in a flat local staging directory
//! - Finished files are relayed into an `object_store` backend and addressed by URL

pub mod error;
pub mod operations;
pub mod protocol;
pub mod storage;

pub use error::{ErrorKind, RelayError, Result};
pub use operations::{
    FetchBlobOperationRequest, FetchBlobOperationResult, ListFilesOperation,
    ListFilesOperationRequest, ListFilesOperationResult, RelayBlobOperation,
    RelayBlobOperationRequest, RelayBlobOperationResult, WriteChunkOperation,
    WriteChunkOperationRequest, WriteChunkOperationResult,
};
pub use protocol::{
    ApiResponse, ChunkAck, DEFAULT_CHUNK_SIZE, ErrorBody, FileChunk, STAGED_URL_PREFIX, staged_url,
};
pub use storage::{
    BlobRelay, BlobStoreBuilder, ChunkWriteResult, DEFAULT_TRANSFER_UNIT, NameLease, NameLocks,
    StagingStore, validate_container_name, validate_file_name,
};
