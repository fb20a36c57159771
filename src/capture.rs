//! Image acquisition
//!
//! Sources hand back the raw encoded bytes of one image. Failures here are
//! transient: they abort the current capture cycle and leave storage alone.

use bytes::Bytes;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("Request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Failed to read {}: {source}", path.display())]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Empty image from {0}")]
    Empty(String),
}

/// Something that can produce one encoded image per call
pub trait ImageSource {
    /// Human-readable origin, used in logs
    fn describe(&self) -> String;

    fn fetch(&self) -> impl Future<Output = Result<Bytes, AcquireError>> + Send;
}

/// Snapshot URL of a network camera
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
    credentials: Option<(String, Option<String>)>,
}

impl HttpSource {
    pub fn new(
        url: impl Into<String>,
        credentials: Option<(String, Option<String>)>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            url: url.into(),
            credentials,
        })
    }
}

impl ImageSource for HttpSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<Bytes, AcquireError> {
        let mut request = self.client.get(&self.url);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, password.as_deref());
        }

        let request_error = |source| AcquireError::Request {
            url: self.url.clone(),
            source,
        };
        let response = request.send().await.map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquireError::Status {
                url: self.url.clone(),
                status,
            });
        }

        let body = response.bytes().await.map_err(request_error)?;
        if body.is_empty() {
            return Err(AcquireError::Empty(self.url.clone()));
        }

        debug!(url = %self.url, size_bytes = body.len(), "Image downloaded");
        Ok(body)
    }
}

/// Image file on local disk
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ImageSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> Result<Bytes, AcquireError> {
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|source| AcquireError::File {
                path: self.path.clone(),
                source,
            })?;

        if data.is_empty() {
            return Err(AcquireError::Empty(self.describe()));
        }
        Ok(Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_source() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("frame.jpg");
        std::fs::write(&path, b"not really a jpeg").unwrap();

        let data = FileSource::new(&path).fetch().await.unwrap();
        assert_eq!(&data[..], b"not really a jpeg");
    }

    #[tokio::test]
    async fn test_file_source_missing() {
        let err = FileSource::new("/nonexistent/frame.jpg")
            .fetch()
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::File { .. }));
    }

    #[tokio::test]
    async fn test_file_source_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.jpg");
        std::fs::write(&path, b"").unwrap();

        let err = FileSource::new(&path).fetch().await.unwrap_err();
        assert!(matches!(err, AcquireError::Empty(_)));
    }

    #[tokio::test]
    async fn test_http_source_unreachable() {
        // Port 9 (discard) on localhost is not expected to serve HTTP
        let source =
            HttpSource::new("http://127.0.0.1:9/snapshot.jpg", None, Duration::from_secs(2))
                .unwrap();
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, AcquireError::Request { .. }));
    }
}
