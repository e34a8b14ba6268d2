use crate::{FileChunk, Result, StagingStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct WriteChunkOperation {
    staging: Arc<StagingStore>,
}

#[derive(Debug, Clone)]
pub struct WriteChunkOperationRequest {
    pub chunk: FileChunk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteChunkOperationResult {
    pub file_name: String,
    pub staged_size: u64,
}

impl WriteChunkOperation {
    pub fn new(staging: Arc<StagingStore>) -> Self {
        Self { staging }
    }

    pub async fn run(&self, request: WriteChunkOperationRequest) -> Result<WriteChunkOperationResult> {
        let WriteChunkOperationRequest { chunk } = request;

        if chunk.first_chunk {
            tracing::info!(
                "Starting staged upload of {} (upload_id={})",
                chunk.file_name_no_path,
                chunk.upload_id.as_deref().unwrap_or("-")
            );
        }

        let written = self.staging.write_chunk(&chunk).await?;

        Ok(WriteChunkOperationResult {
            file_name: chunk.file_name_no_path,
            staged_size: written.staged_size,
        })
    }
}
