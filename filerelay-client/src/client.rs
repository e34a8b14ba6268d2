use crate::{ClientError, Result};
use filerelay_core::{ApiResponse, ChunkAck, FileChunk};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Thin typed wrapper over the relay's HTTP endpoints.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RelayClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            ClientError::InvalidOptions(format!("bad server URL {}: {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidOptions(format!(
                "server URL cannot carry a path: {}",
                base_url
            )));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Appends each segment percent-encoded, so names may carry `#`, `?`, `%` or spaces.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn upload_chunk(&self, chunk: &FileChunk) -> Result<ChunkAck> {
        let response = self
            .http
            .post(self.url(&["files"]))
            .json(chunk)
            .send()
            .await?;
        decode(response).await
    }

    /// Sends a whole file as the `fileContent` field of a multipart form.
    pub async fn upload_file(&self, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ClientError::InvalidOptions(format!("{} has no usable file name", path.display()))
            })?
            .to_string();
        let data = tokio::fs::read(path).await?;

        let form = Form::new().part("fileContent", Part::bytes(data).file_name(file_name));
        let response = self
            .http
            .post(self.url(&["uploadFile"]))
            .multipart(form)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }
        Err(remote_error(response).await)
    }

    pub async fn list_staged(&self) -> Result<Vec<String>> {
        let response = self.http.get(self.url(&["files"])).send().await?;
        decode(response).await
    }

    pub async fn list_blobs(&self, container: &str) -> Result<Vec<String>> {
        let response = self
            .http
            .get(self.url(&["files", container, "blobs"]))
            .send()
            .await?;
        decode(response).await
    }

    /// Relays a staged file into `container` and returns the blob URL.
    pub async fn copy_to_container(
        &self,
        file_name: &str,
        container: &str,
        overwrite: bool,
        remove_staged: bool,
    ) -> Result<String> {
        let response = self
            .http
            .get(self.url(&["files", file_name, container, "copy"]))
            .query(&[("overwrite", overwrite), ("remove_staged", remove_staged)])
            .send()
            .await?;
        decode(response).await
    }

    /// Pulls `<container>/<file_name>` into the relay's staging area.
    pub async fn fetch(&self, file_name: &str, container: &str) -> Result<String> {
        let response = self
            .http
            .get(self.url(&["files", file_name, container, "download"]))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn delete_staged(&self, file_name: &str) -> Result<bool> {
        let response = self
            .http
            .get(self.url(&["files", file_name, "delete"]))
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(remote_error(response).await);
    }

    let envelope: ApiResponse<T> = response
        .json()
        .await
        .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

    if !envelope.success {
        return Err(ClientError::InvalidResponse(
            "success status with a failed envelope".to_string(),
        ));
    }
    envelope
        .data
        .ok_or_else(|| ClientError::InvalidResponse("response carried no data".to_string()))
}

async fn remote_error(response: Response) -> ClientError {
    let status = response.status();
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(error) => return ClientError::Http(error),
    };

    match serde_json::from_slice::<ApiResponse<serde_json::Value>>(&body) {
        Ok(ApiResponse {
            error: Some(error), ..
        }) => ClientError::Remote {
            status,
            code: error.code,
            message: error.message,
            current_size: error.current_size,
        },
        _ => ClientError::Remote {
            status,
            code: "http_error".to_string(),
            message: String::from_utf8_lossy(&body).into_owned(),
            current_size: None,
        },
    }
}
