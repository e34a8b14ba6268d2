//! Wire types shared by the relay server and its clients.

use crate::RelayError;
use serde::{Deserialize, Serialize};

/// Default size of a chunk window on the client side.
pub const DEFAULT_CHUNK_SIZE: usize = 400_000;

/// Prefix of the relative URLs returned for staged files.
pub const STAGED_URL_PREFIX: &str = "files/";

/// One contiguous byte range of a file being uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChunk {
    pub file_name_no_path: String,
    pub offset: u64,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub first_chunk: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
}

impl FileChunk {
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset one past the last byte this chunk covers.
    pub fn end_offset(&self) -> u64 {
        self.offset + self.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAck {
    pub file_name: String,
    pub staged_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: ErrorBody) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_size: Option<u64>,
}

impl From<&RelayError> for ErrorBody {
    fn from(error: &RelayError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            current_size: error.current_size(),
        }
    }
}

pub fn staged_url(name: &str) -> String {
    format!("{}{}", STAGED_URL_PREFIX, name)
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_uses_camel_case_and_base64_payload() {
        let chunk = FileChunk {
            file_name_no_path: "report-1.pdf".to_string(),
            offset: 400_000,
            data: b"hello".to_vec(),
            first_chunk: false,
            upload_id: None,
        };

        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["fileNameNoPath"], "report-1.pdf");
        assert_eq!(value["offset"], 400_000);
        assert_eq!(value["data"], "aGVsbG8=");
        assert_eq!(value["firstChunk"], false);
        assert!(value.get("uploadId").is_none());
    }

    #[test]
    fn chunk_without_upload_id_deserializes() {
        let raw = r#"{"fileNameNoPath":"a.bin","offset":0,"data":"AAEC","firstChunk":true}"#;
        let chunk: FileChunk = serde_json::from_str(raw).unwrap();
        assert_eq!(chunk.data, vec![0, 1, 2]);
        assert!(chunk.first_chunk);
        assert_eq!(chunk.upload_id, None);
        assert_eq!(chunk.end_offset(), 3);
    }

    #[test]
    fn negative_offset_is_rejected() {
        let raw = r#"{"fileNameNoPath":"a.bin","offset":-1,"data":"","firstChunk":true}"#;
        assert!(serde_json::from_str::<FileChunk>(raw).is_err());
    }

    #[test]
    fn error_body_carries_current_size() {
        let error = RelayError::OffsetMismatch {
            name: "a.bin".to_string(),
            expected: 10,
            actual: 4,
        };
        let body = ErrorBody::from(&error);
        assert_eq!(body.code, "offset_mismatch");
        assert_eq!(body.current_size, Some(10));
    }
}
