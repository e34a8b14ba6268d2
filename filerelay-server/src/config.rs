use filerelay_core::{BlobStoreBuilder, DEFAULT_TRANSFER_UNIT, RelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            staging: StagingConfig::default(),
            limits: LimitsConfig::default(),
            storage: None,
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:7094".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    #[serde(default = "default_staging_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_lease_timeout_secs")]
    pub lease_timeout_secs: u64,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: default_staging_dir(),
            lease_timeout_secs: default_lease_timeout_secs(),
        }
    }
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("Files")
}

fn default_lease_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

/// Cloud storage the relay copies finished uploads into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub base_url: String,
    pub backend: StorageBackend,
    #[serde(default)]
    pub local: Option<LocalStorageConfig>,
    #[serde(default)]
    pub s3: Option<S3Config>,
    #[serde(default = "default_transfer_unit_bytes")]
    pub transfer_unit_bytes: usize,
}

fn default_transfer_unit_bytes() -> usize {
    DEFAULT_TRANSFER_UNIT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Local,
    S3,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Local => "local",
            Self::S3 => "s3",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub credentials: Option<S3Credentials>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Config {
    /// Loads the optional config file, then `FILERELAY_*` environment overrides
    /// (nested keys separated by `__`, e.g. `FILERELAY_STAGING__DIR`).
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path).required(false))
            .add_source(
                ::config::Environment::with_prefix("FILERELAY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| RelayError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| RelayError::Config(e.to_string()))?;

        Ok(config)
    }
}

impl StorageConfig {
    pub fn blob_store_builder(&self) -> Result<BlobStoreBuilder> {
        if self.base_url.trim().is_empty() {
            return Err(RelayError::Config(
                "storage base_url cannot be empty".to_string(),
            ));
        }

        let mut builder = BlobStoreBuilder::new().backend(self.backend.as_str());

        match self.backend {
            StorageBackend::Memory => {}
            StorageBackend::Local => {
                let local = self.local.as_ref().ok_or_else(|| {
                    RelayError::Config(
                        "local configuration is required for local backend".to_string(),
                    )
                })?;
                builder = builder.local_root(local.root.clone());
            }
            StorageBackend::S3 => {
                let s3 = self.s3.as_ref().ok_or_else(|| {
                    RelayError::Config("s3 configuration is required for s3 backend".to_string())
                })?;
                builder = builder.s3_bucket(s3.bucket.clone());
                if let Some(region) = &s3.region {
                    builder = builder.s3_region(region.clone());
                }
                if let Some(endpoint) = &s3.endpoint {
                    builder = builder.s3_endpoint(endpoint.clone());
                }
                if let Some(credentials) = &s3.credentials {
                    builder = builder.s3_credentials(
                        credentials.access_key_id.clone(),
                        credentials.secret_access_key.clone(),
                    );
                }
            }
        }

        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let config = Config::from_file(path.to_str().unwrap()).unwrap();

        assert_eq!(config.staging.dir, PathBuf::from("Files"));
        assert_eq!(config.staging.lease_timeout_secs, 300);
        assert!(config.storage.is_none());
    }

    #[test]
    fn yaml_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.yaml");
        std::fs::write(
            &path,
            r#"
bind_addr: "0.0.0.0:8080"
staging:
  dir: /var/lib/filerelay/files
storage:
  base_url: https://blobs.example.net/
  backend: local
  local:
    root: /var/lib/filerelay/blobs
  transfer_unit_bytes: 1048576
"#,
        )
        .unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.staging.dir, PathBuf::from("/var/lib/filerelay/files"));

        let storage = config.storage.unwrap();
        assert_eq!(storage.backend, StorageBackend::Local);
        assert_eq!(storage.transfer_unit_bytes, 1_048_576);
        assert!(storage.blob_store_builder().is_ok());
    }

    #[test]
    fn s3_backend_requires_s3_section() {
        let storage = StorageConfig {
            base_url: "https://blobs.example.net/".to_string(),
            backend: StorageBackend::S3,
            local: None,
            s3: None,
            transfer_unit_bytes: DEFAULT_TRANSFER_UNIT,
        };
        assert!(matches!(
            storage.blob_store_builder(),
            Err(RelayError::Config(_))
        ));
    }
}
