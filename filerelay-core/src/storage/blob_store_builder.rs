use crate::{RelayError, Result};
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct BlobStoreBuilder {
    backend: Option<String>,
    local_root: Option<PathBuf>,
    s3_bucket: Option<String>,
    s3_region: Option<String>,
    s3_endpoint: Option<String>,
    s3_access_key_id: Option<String>,
    s3_secret_access_key: Option<String>,
}

impl BlobStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_root = Some(root.into());
        self
    }

    pub fn s3_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.s3_bucket = Some(bucket.into());
        self
    }

    pub fn s3_region(mut self, region: impl Into<String>) -> Self {
        self.s3_region = Some(region.into());
        self
    }

    pub fn s3_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.s3_endpoint = Some(endpoint.into());
        self
    }

    pub fn s3_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.s3_access_key_id = Some(access_key_id.into());
        self.s3_secret_access_key = Some(secret_access_key.into());
        self
    }

    fn resolve_backend(&self) -> Result<String> {
        let backend = self
            .backend
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if backend.is_empty() {
            return Err(RelayError::Config(
                "storage backend cannot be empty".to_string(),
            ));
        }

        Ok(backend)
    }

    pub fn build(&self) -> Result<Arc<dyn ObjectStore>> {
        let backend = self.resolve_backend()?;

        match backend.as_str() {
            "memory" => Ok(Arc::new(InMemory::new())),
            "local" => {
                let root = self.local_root.clone().ok_or_else(|| {
                    RelayError::Config("local root is required for local backend".to_string())
                })?;

                std::fs::create_dir_all(&root)?;
                let store = LocalFileSystem::new_with_prefix(&root)
                    .map_err(|e| RelayError::Config(e.to_string()))?;
                Ok(Arc::new(store))
            }
            "s3" => {
                let bucket = self.s3_bucket.as_deref().unwrap_or_default().trim();
                if bucket.is_empty() {
                    return Err(RelayError::Config(
                        "s3 bucket is required for s3 backend".to_string(),
                    ));
                }

                let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
                if let Some(region) = self.s3_region.as_deref() {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = self.s3_endpoint.as_deref() {
                    builder = builder.with_endpoint(endpoint).with_allow_http(true);
                }
                if let (Some(key), Some(secret)) = (
                    self.s3_access_key_id.as_deref(),
                    self.s3_secret_access_key.as_deref(),
                ) {
                    builder = builder
                        .with_access_key_id(key)
                        .with_secret_access_key(secret);
                }

                let store = builder
                    .build()
                    .map_err(|e| RelayError::Config(e.to_string()))?;
                Ok(Arc::new(store))
            }
            other => Err(RelayError::Config(format!(
                "unsupported storage backend: {}",
                other
            ))),
        }
    }
}
