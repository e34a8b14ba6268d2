use crate::{ClientError, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Seconds between 0001-01-01 and the Unix epoch.
const TICKS_EPOCH_OFFSET_SECS: i64 = 62_135_596_800;
const TICKS_PER_SECOND: i64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadProgress {
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    pub fn percent(&self) -> u64 {
        if self.total_bytes == 0 {
            return 100;
        }
        self.uploaded_bytes * 100 / self.total_bytes
    }
}

/// State of one chunked upload, advanced once per acknowledged chunk.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub upload_id: String,
    pub source: PathBuf,
    pub destination_name: String,
    pub total_bytes: u64,
    pub uploaded_bytes: u64,
    pub chunk_size: usize,
    chunks_sent: u64,
}

impl UploadSession {
    pub fn new(
        source: &Path,
        destination_name: String,
        total_bytes: u64,
        chunk_size: usize,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ClientError::InvalidOptions(
                "chunk size must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            upload_id: ulid::Ulid::new().to_string(),
            source: source.to_path_buf(),
            destination_name,
            total_bytes,
            uploaded_bytes: 0,
            chunk_size,
            chunks_sent: 0,
        })
    }

    /// Size of the next chunk to read, or `None` once the upload is complete.
    ///
    /// An empty source yields a single zero-length window so the staged file gets created.
    pub fn next_window(&self) -> Option<usize> {
        if self.total_bytes == 0 {
            return (self.chunks_sent == 0).then_some(0);
        }

        let remaining = self.total_bytes.saturating_sub(self.uploaded_bytes);
        if remaining == 0 {
            return None;
        }
        Some(remaining.min(self.chunk_size as u64) as usize)
    }

    pub fn is_first_chunk(&self) -> bool {
        self.chunks_sent == 0
    }

    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent
    }

    pub fn advance(&mut self, bytes: usize) {
        self.uploaded_bytes += bytes as u64;
        self.chunks_sent += 1;
    }

    pub fn is_complete(&self) -> bool {
        self.next_window().is_none()
    }

    pub fn progress(&self) -> UploadProgress {
        UploadProgress {
            uploaded_bytes: self.uploaded_bytes,
            total_bytes: self.total_bytes,
        }
    }
}

/// Builds `<stem>-<ticks><ext>`, where ticks count 100ns intervals since 0001-01-01 UTC.
pub fn unique_destination_name(source: &Path, now: DateTime<Utc>) -> Result<String> {
    let stem = source
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| {
            ClientError::InvalidOptions(format!("{} has no usable file name", source.display()))
        })?;
    let extension = source
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();

    let ticks = (now.timestamp() + TICKS_EPOCH_OFFSET_SECS) * TICKS_PER_SECOND
        + i64::from(now.timestamp_subsec_nanos() / 100);

    Ok(format!("{}-{}{}", stem, ticks, extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session(total: u64, chunk: usize) -> UploadSession {
        UploadSession::new(Path::new("/tmp/a.bin"), "a-1.bin".to_string(), total, chunk).unwrap()
    }

    fn windows(mut session: UploadSession) -> Vec<usize> {
        let mut sizes = Vec::new();
        while let Some(size) = session.next_window() {
            sizes.push(size);
            session.advance(size);
        }
        sizes
    }

    #[test]
    fn windows_cover_the_file_with_a_short_tail() {
        assert_eq!(
            windows(session(1_000_000, 400_000)),
            vec![400_000, 400_000, 200_000]
        );
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        assert_eq!(windows(session(800_000, 400_000)), vec![400_000, 400_000]);
    }

    #[test]
    fn small_file_is_one_chunk() {
        let session = session(10, 400_000);
        assert!(session.is_first_chunk());
        assert_eq!(windows(session), vec![10]);
    }

    #[test]
    fn empty_file_sends_one_empty_chunk() {
        let mut session = session(0, 400_000);
        assert_eq!(session.next_window(), Some(0));
        session.advance(0);
        assert!(session.is_complete());
        assert_eq!(session.progress().percent(), 100);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let result = UploadSession::new(Path::new("a.bin"), "a.bin".to_string(), 10, 0);
        assert!(matches!(result, Err(ClientError::InvalidOptions(_))));
    }

    #[test]
    fn destination_name_keeps_stem_and_extension() {
        let now = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        let name = unique_destination_name(Path::new("/data/report.final.pdf"), now).unwrap();
        assert_eq!(name, "report.final-621355968000000000.pdf");

        let name = unique_destination_name(Path::new("README"), now).unwrap();
        assert_eq!(name, "README-621355968000000000");
    }
}
