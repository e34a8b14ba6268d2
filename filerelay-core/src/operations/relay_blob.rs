use crate::{BlobRelay, RelayError, Result, StagingStore, staged_url};
use std::sync::Arc;

#[derive(Clone)]
pub struct RelayBlobOperation {
    staging: Arc<StagingStore>,
    relay: Arc<BlobRelay>,
}

#[derive(Debug, Clone)]
pub struct RelayBlobOperationRequest {
    pub file_name: String,
    pub container: String,
    pub overwrite: bool,
    pub remove_staged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayBlobOperationResult {
    pub url: String,
    pub removed_staged: bool,
}

#[derive(Debug, Clone)]
pub struct FetchBlobOperationRequest {
    pub file_name: String,
    pub container: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchBlobOperationResult {
    pub staged_url: String,
    pub size_bytes: u64,
}

impl RelayBlobOperation {
    pub fn new(staging: Arc<StagingStore>, relay: Arc<BlobRelay>) -> Self {
        Self { staging, relay }
    }

    /// Copies a staged file into `container`, optionally removing the staged copy afterwards.
    pub async fn run(&self, request: RelayBlobOperationRequest) -> Result<RelayBlobOperationResult> {
        let RelayBlobOperationRequest {
            file_name,
            container,
            overwrite,
            remove_staged,
        } = request;

        // The name stays locked through the copy and the removal, so no chunk lands in between.
        let mut lease = self.staging.locks().lock(&file_name).await;
        let source = self.staging.staged_path(&file_name).await?;
        let url = self
            .relay
            .copy(&container, &source, &file_name, overwrite)
            .await?;

        let removed_staged = if remove_staged {
            self.staging.remove_held(&source, &mut lease).await?
        } else {
            false
        };
        drop(lease);

        Ok(RelayBlobOperationResult {
            url,
            removed_staged,
        })
    }

    /// Pulls `<container>/<file_name>` from cloud storage into the staging area.
    pub async fn run_fetch(&self, request: FetchBlobOperationRequest) -> Result<FetchBlobOperationResult> {
        let FetchBlobOperationRequest {
            file_name,
            container,
        } = request;

        let dest = self.staging.resolve(&file_name)?;
        let _lease = self.staging.locks().lock(&file_name).await;

        let size_bytes = match self.relay.download(&container, &file_name, &dest).await {
            Ok(size) => size,
            Err(error) => {
                if !matches!(error, RelayError::BlobNotFound(_) | RelayError::InvalidName(_)) {
                    let _ = tokio::fs::remove_file(&dest).await;
                }
                return Err(error);
            }
        };

        Ok(FetchBlobOperationResult {
            staged_url: staged_url(&file_name),
            size_bytes,
        })
    }
}
