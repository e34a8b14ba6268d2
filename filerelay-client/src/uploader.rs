use crate::{ClientError, RelayClient, Result, RetryPolicy, UploadProgress, UploadSession};
use crate::session::unique_destination_name;
use filerelay_core::{DEFAULT_CHUNK_SIZE, FileChunk};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub chunk_size: usize,
    pub retry: RetryPolicy,
    /// Container to relay the finished upload into; `None` leaves it staged.
    pub relay_container: Option<String>,
    pub overwrite: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
            relay_container: None,
            overwrite: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub upload_id: String,
    pub destination_name: String,
    pub total_bytes: u64,
    pub chunk_sizes: Vec<usize>,
    pub blob_url: Option<String>,
}

/// Sends a local file to the relay as sequential chunks, one round trip at a time.
pub struct ChunkUploader {
    client: RelayClient,
    options: UploadOptions,
    progress: watch::Sender<UploadProgress>,
}

impl ChunkUploader {
    pub fn new(client: RelayClient, options: UploadOptions) -> Self {
        let (progress, _) = watch::channel(UploadProgress::default());
        Self {
            client,
            options,
            progress,
        }
    }

    pub fn progress(&self) -> watch::Receiver<UploadProgress> {
        self.progress.subscribe()
    }

    pub async fn upload_large_file(&self, path: &Path) -> Result<UploadReport> {
        let total_bytes = tokio::fs::metadata(path).await?.len();
        let destination_name = unique_destination_name(path, chrono::Utc::now())?;
        let mut session =
            UploadSession::new(path, destination_name, total_bytes, self.options.chunk_size)?;

        tracing::info!(
            "Uploading {} as {} ({} bytes, upload_id={})",
            path.display(),
            session.destination_name,
            total_bytes,
            session.upload_id
        );
        self.progress.send_replace(session.progress());

        let mut file = File::open(path).await?;
        let mut chunk_sizes = Vec::new();

        while let Some(window) = session.next_window() {
            let mut data = vec![0u8; window];
            let read = read_window(&mut file, &mut data).await?;
            if read < window {
                return Err(ClientError::SourceTruncated {
                    expected: session.total_bytes,
                    read: session.uploaded_bytes + read as u64,
                });
            }

            let chunk = FileChunk {
                file_name_no_path: session.destination_name.clone(),
                offset: session.uploaded_bytes,
                data,
                first_chunk: session.is_first_chunk(),
                upload_id: Some(session.upload_id.clone()),
            };
            self.send_chunk(&chunk).await?;

            session.advance(read);
            chunk_sizes.push(read);
            self.progress.send_replace(session.progress());
            tracing::debug!(
                "Chunk acknowledged for {}: {}%",
                session.destination_name,
                session.progress().percent()
            );
        }

        let blob_url = match self.options.relay_container.as_deref() {
            Some(container) => Some(self.relay(&session.destination_name, container).await?),
            None => None,
        };

        Ok(UploadReport {
            upload_id: session.upload_id,
            destination_name: session.destination_name,
            total_bytes,
            chunk_sizes,
            blob_url,
        })
    }

    async fn send_chunk(&self, chunk: &FileChunk) -> Result<()> {
        let policy = self.options.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.client.upload_chunk(chunk).await {
                Ok(ack) if ack.staged_size == chunk.end_offset() => return Ok(()),
                Ok(ack) => {
                    return Err(ClientError::ChunkFailed {
                        offset: chunk.offset,
                        attempts: attempt,
                        source: Box::new(ClientError::InvalidResponse(format!(
                            "staged size {} after chunk ending at {}",
                            ack.staged_size,
                            chunk.end_offset()
                        ))),
                    });
                }
                // An earlier attempt landed but its reply was lost.
                Err(ClientError::Remote {
                    ref code,
                    current_size: Some(size),
                    ..
                }) if attempt > 1 && code == "offset_mismatch" && size == chunk.end_offset() => {
                    tracing::debug!("Chunk at offset {} was already staged", chunk.offset);
                    return Ok(());
                }
                Err(error) if error.is_retryable() && policy.should_retry(attempt) => {
                    let delay = policy.backoff(attempt);
                    tracing::warn!(
                        "Chunk at offset {} failed (attempt {}), retrying in {:?}: {}",
                        chunk.offset,
                        attempt,
                        delay,
                        error
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    return Err(ClientError::ChunkFailed {
                        offset: chunk.offset,
                        attempts: attempt,
                        source: Box::new(error),
                    });
                }
            }
        }
    }

    /// Copies the staged upload into `container`, then removes the staged copy.
    async fn relay(&self, file_name: &str, container: &str) -> Result<String> {
        let policy = self.options.retry;
        let mut attempt = 0;

        let url = loop {
            attempt += 1;
            match self
                .client
                .copy_to_container(file_name, container, self.options.overwrite, false)
                .await
            {
                Ok(url) => break url,
                Err(error) if error.is_retryable() && policy.should_retry(attempt) => {
                    let delay = policy.backoff(attempt);
                    tracing::warn!(
                        "Relay of {} failed (attempt {}), retrying in {:?}: {}",
                        file_name,
                        attempt,
                        delay,
                        error
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        };

        tracing::info!("Relayed {} to {}", file_name, url);

        if let Err(error) = self.client.delete_staged(file_name).await {
            tracing::warn!("Failed to delete staged file {}: {}", file_name, error);
        }

        Ok(url)
    }
}

/// Fills `buf` unless the file ends first; returns the bytes read.
async fn read_window(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = file.read(&mut buf[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}
