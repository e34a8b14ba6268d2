pub mod list_files;
pub mod relay_blob;
pub mod write_chunk;

pub use list_files::{ListFilesOperation, ListFilesOperationRequest, ListFilesOperationResult};
pub use relay_blob::{
    FetchBlobOperationRequest, FetchBlobOperationResult, RelayBlobOperation,
    RelayBlobOperationRequest, RelayBlobOperationResult,
};
pub use write_chunk::{WriteChunkOperation, WriteChunkOperationRequest, WriteChunkOperationResult};
