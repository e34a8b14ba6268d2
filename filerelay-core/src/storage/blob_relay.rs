use crate::{RelayError, Result};
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutMode, PutPayload, WriteMultipart};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// Default transfer unit for uploads into cloud storage: 50 MiB.
pub const DEFAULT_TRANSFER_UNIT: usize = 50 * 1024 * 1024;

const MULTIPART_CONCURRENCY: usize = 4;

/// Copies staged files into an object store, addressed as `<container>/<name>`.
pub struct BlobRelay {
    store: Arc<dyn ObjectStore>,
    base_url: String,
    transfer_unit: usize,
}

impl BlobRelay {
    pub fn new(store: Arc<dyn ObjectStore>, base_url: &str, transfer_unit: usize) -> Self {
        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Self {
            store,
            base_url,
            transfer_unit: transfer_unit.max(1),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn blob_url(&self, container: &str, name: &str) -> String {
        format!("{}{}/{}", self.base_url, container, name)
    }

    /// Uploads `source` as `<container>/<dest_name>` and returns its public URL.
    ///
    /// With `overwrite` any existing object is removed first (failures are only logged);
    /// without it an existing object is left untouched and `BlobAlreadyExists` is returned.
    pub async fn copy(
        &self,
        container: &str,
        source: &Path,
        dest_name: &str,
        overwrite: bool,
    ) -> Result<String> {
        validate_container_name(container)?;
        let location = object_path(container, dest_name)?;

        if overwrite {
            match self.store.delete(&location).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(error) => {
                    tracing::warn!(
                        "Failed to delete existing blob before overwrite. location={} error={}",
                        location,
                        error
                    );
                }
            }
        }

        let size = fs::metadata(source).await?.len();
        if size <= self.transfer_unit as u64 {
            let data = fs::read(source).await?;
            let mode = if overwrite {
                PutMode::Overwrite
            } else {
                PutMode::Create
            };
            self.store
                .put_opts(&location, PutPayload::from(Bytes::from(data)), mode.into())
                .await?;
        } else {
            if !overwrite {
                self.ensure_absent(&location).await?;
            }
            self.put_multipart(&location, source).await?;
        }

        tracing::info!(
            "Relayed {} ({} bytes) to {}",
            source.display(),
            size,
            location
        );

        Ok(self.blob_url(container, dest_name))
    }

    /// Streams `<container>/<src_name>` into `dest`, returning the bytes written.
    pub async fn download(&self, container: &str, src_name: &str, dest: &Path) -> Result<u64> {
        validate_container_name(container)?;
        let location = object_path(container, src_name)?;

        let result = self.store.get(&location).await?;
        let mut stream = result.into_stream();

        let mut file = fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(bytes) = stream.next().await {
            let bytes = bytes?;
            file.write_all(&bytes).await?;
            written += bytes.len() as u64;
        }
        file.sync_all().await?;

        tracing::debug!("Downloaded {} ({} bytes) to {}", location, written, dest.display());
        Ok(written)
    }

    /// URLs of every object in `container`.
    ///
    /// An empty container yields an empty list; backend failures are errors.
    pub async fn list(&self, container: &str) -> Result<Vec<String>> {
        validate_container_name(container)?;
        let prefix = ObjectPath::from(container);

        let objects: Vec<_> = self.store.list(Some(&prefix)).try_collect().await?;

        let container_prefix = format!("{}/", prefix.as_ref());
        let mut urls: Vec<String> = objects
            .into_iter()
            .filter_map(|meta| {
                meta.location
                    .as_ref()
                    .strip_prefix(&container_prefix)
                    .map(|name| self.blob_url(container, name))
            })
            .collect();
        urls.sort();

        Ok(urls)
    }

    async fn ensure_absent(&self, location: &ObjectPath) -> Result<()> {
        match self.store.head(location).await {
            Ok(_) => Err(RelayError::BlobAlreadyExists(location.to_string())),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn put_multipart(&self, location: &ObjectPath, source: &Path) -> Result<()> {
        let upload = self.store.put_multipart(location).await?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, self.transfer_unit);

        let mut file = fs::File::open(source).await?;
        let mut buffer = vec![0u8; self.transfer_unit];
        let result = async {
            loop {
                let n = read_full(&mut file, &mut buffer).await?;
                if n == 0 {
                    break;
                }
                writer.wait_for_capacity(MULTIPART_CONCURRENCY).await?;
                writer.write(&buffer[..n]);
            }
            Ok::<_, RelayError>(())
        }
        .await;

        match result {
            Ok(()) => {
                writer.finish().await?;
                Ok(())
            }
            Err(error) => {
                if let Err(abort_error) = writer.abort().await {
                    tracing::warn!(
                        "Failed to abort multipart upload. location={} error={}",
                        location,
                        abort_error
                    );
                }
                Err(error)
            }
        }
    }
}

/// Reads until `buffer` is full or EOF; returns the number of bytes read.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buffer: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = reader.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn object_path(container: &str, name: &str) -> Result<ObjectPath> {
    crate::storage::validate_file_name(name)?;
    Ok(ObjectPath::from_iter([container, name]))
}

/// Container names: ASCII letters, digits, `-`, `_` and `.`, not `.` or `..`.
pub fn validate_container_name(container: &str) -> Result<()> {
    if container.is_empty() || container == "." || container == ".." {
        return Err(RelayError::InvalidName(format!(
            "invalid container name: {:?}",
            container
        )));
    }

    if !container
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(RelayError::InvalidName(format!(
            "invalid container name: {}",
            container
        )));
    }

    Ok(())
}
