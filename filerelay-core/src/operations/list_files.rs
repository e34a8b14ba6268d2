use crate::{BlobRelay, RelayError, Result, StagingStore, staged_url};
use std::sync::Arc;

#[derive(Clone)]
pub struct ListFilesOperation {
    staging: Arc<StagingStore>,
    relay: Option<Arc<BlobRelay>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListFilesOperationRequest {
    Staged,
    Container(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilesOperationResult {
    pub urls: Vec<String>,
}

impl ListFilesOperation {
    pub fn new(staging: Arc<StagingStore>, relay: Option<Arc<BlobRelay>>) -> Self {
        Self { staging, relay }
    }

    pub async fn run(&self, request: ListFilesOperationRequest) -> Result<ListFilesOperationResult> {
        let urls = match request {
            ListFilesOperationRequest::Staged => self
                .staging
                .list()
                .await?
                .iter()
                .map(|name| staged_url(name))
                .collect(),
            ListFilesOperationRequest::Container(container) => {
                let relay = self.relay.as_ref().ok_or(RelayError::StorageNotConfigured)?;
                relay.list(&container).await?
            }
        };

        Ok(ListFilesOperationResult { urls })
    }
}
