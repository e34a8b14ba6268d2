use crate::storage::name_locks::{NameLease, NameLocks};
use crate::{FileChunk, RelayError, Result};
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWriteResult {
    pub staged_size: u64,
}

/// StagingStore reassembles chunked uploads in a flat local directory.
pub struct StagingStore {
    root: PathBuf,
    locks: NameLocks,
}

impl StagingStore {
    pub fn new(root: PathBuf, lease_timeout: Duration) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: NameLocks::new(lease_timeout),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn locks(&self) -> &NameLocks {
        &self.locks
    }

    /// Writes one chunk at its offset.
    ///
    /// The first chunk must start at 0 and replaces any file of the same name.
    /// Later chunks must start exactly at the current staged length.
    pub async fn write_chunk(&self, chunk: &FileChunk) -> Result<ChunkWriteResult> {
        let name = chunk.file_name_no_path.as_str();
        let path = self.resolve(name)?;

        if chunk.first_chunk && chunk.offset != 0 {
            return Err(RelayError::InvalidRequest(format!(
                "first chunk of {} must start at offset 0, got {}",
                name, chunk.offset
            )));
        }
        if !chunk.first_chunk && chunk.is_empty() {
            return Err(RelayError::InvalidRequest(format!(
                "empty chunk for {} at offset {}",
                name, chunk.offset
            )));
        }

        let mut lease = self.locks.lock(name).await;
        lease.claim(name, chunk.upload_id.as_deref(), self.locks.lease_timeout())?;

        if chunk.first_chunk {
            remove_if_exists(&path).await?;
        } else {
            let current = match fs::metadata(&path).await {
                Ok(meta) => meta.len(),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                    return Err(RelayError::StagedFileNotFound(name.to_string()));
                }
                Err(error) => return Err(error.into()),
            };

            if current != chunk.offset {
                return Err(RelayError::OffsetMismatch {
                    name: name.to_string(),
                    expected: current,
                    actual: chunk.offset,
                });
            }
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .await?;
        file.seek(SeekFrom::Start(chunk.offset)).await?;
        file.write_all(&chunk.data).await?;
        file.sync_data().await?;
        drop(file);

        let staged_size = chunk.end_offset();
        tracing::debug!(
            "Staged chunk for {} offset={} len={} first={} staged_size={}",
            name,
            chunk.offset,
            chunk.len(),
            chunk.first_chunk,
            staged_size
        );

        Ok(ChunkWriteResult { staged_size })
    }

    /// Stores a complete file in one go, replacing any staged file of that name.
    ///
    /// Refused with `NameInUse` while a chunked upload holds a fresh lease on the name.
    pub async fn write_whole(&self, name: &str, data: Bytes) -> Result<u64> {
        let path = self.resolve(name)?;
        let mut lease = self.locks.lock(name).await;
        lease.ensure_unclaimed(name, self.locks.lease_timeout())?;

        let temp_path = self.root.join(format!(".{}.tmp", name));
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &path).await?;
        lease.release();

        tracing::debug!("Staged whole file {} ({} bytes)", name, data.len());
        Ok(data.len() as u64)
    }

    /// Path of an existing staged file.
    pub async fn staged_path(&self, name: &str) -> Result<PathBuf> {
        let path = self.resolve(name)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(RelayError::StagedFileNotFound(name.to_string())),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(RelayError::StagedFileNotFound(name.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Deletes a staged file and releases its lease.
    ///
    /// Returns whether a file was present.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let path = self.resolve(name)?;
        let mut lease = self.locks.lock(name).await;
        self.remove_held(&path, &mut lease).await
    }

    /// Removes a staged file whose name guard the caller already holds, releasing its lease.
    pub(crate) async fn remove_held(&self, path: &Path, lease: &mut NameLease) -> Result<bool> {
        let existed = remove_if_exists(path).await?;
        lease.release();
        Ok(existed)
    }

    /// Names of all staged files, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with('.') && name.ends_with(".tmp") {
                    continue;
                }
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        validate_file_name(name)?;
        Ok(self.root.join(name))
    }
}

/// Accepts only a bare file name: one normal path component.
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RelayError::InvalidName("empty name".to_string()));
    }

    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(RelayError::InvalidName(format!(
            "path separators not allowed: {}",
            name
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(RelayError::InvalidName(format!(
            "not a plain file name: {}",
            name
        ))),
    }
}

async fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error.into()),
    }
}
