//! Unit runner - processes individual UnitRequest messages

use async_trait::async_trait;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use super::http::{DownloadError, HttpClient};
use super::transcode::{self, TranscodeError};
use super::{UnitExecutor, UnitRequest, UnitResponse};
use crate::completion::{self, PARTIAL_SUFFIX};
use crate::model::Stage;
use crate::observability::Metrics;

#[derive(Debug, Error)]
pub enum UnitError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] DownloadError),

    #[error("Transcode failed: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Write to {path} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Transcode task failed: {0}")]
    TaskFailed(String),
}

impl UnitError {
    pub fn stage(&self) -> Stage {
        match self {
            UnitError::Fetch(_) => Stage::Fetch,
            UnitError::Transcode(_) | UnitError::TaskFailed(_) => Stage::Transcode,
            UnitError::Write { .. } => Stage::Write,
        }
    }

    /// Failures no retry can fix
    pub fn is_permanent(&self) -> bool {
        matches!(self, UnitError::Fetch(DownloadError::InvalidUrl(_)))
    }
}

pub type Result<T> = std::result::Result<T, UnitError>;

enum Completed {
    Written(String),
    AlreadyPresent(String),
}

/// Download, transcode and write one image
pub struct FetchTranscodeUnit {
    http: HttpClient,
    metrics: Arc<Metrics>,
}

impl FetchTranscodeUnit {
    pub fn new(http: HttpClient, metrics: Arc<Metrics>) -> Self {
        Self { http, metrics }
    }

    async fn process(&self, request: &UnitRequest) -> Result<Completed> {
        let reference = &request.image_reference;
        let filename = reference.file_name(&request.format_config);
        let path = reference.destination(&request.destination_dir, &request.format_config);

        if completion::output_exists(&path).await {
            debug!(filename = %filename, "Output already present, skipping fetch");
            self.metrics.unit_skipped();
            return Ok(Completed::AlreadyPresent(filename));
        }

        self.metrics.fetch_attempted();
        let source = self.http.fetch(&reference.url).await?;

        let format = request.format_config.clone();
        let encoded = tokio::task::spawn_blocking(move || transcode::transcode(&source, &format))
            .await
            .map_err(|e| UnitError::TaskFailed(e.to_string()))??;

        write_atomic(&path, &encoded).await?;

        info!(
            filename = %filename,
            ordinal = reference.ordinal,
            size = encoded.len(),
            "Image saved"
        );

        Ok(Completed::Written(filename))
    }
}

#[async_trait]
impl UnitExecutor for FetchTranscodeUnit {
    async fn execute(&self, request: UnitRequest) -> UnitResponse {
        match self.process(&request).await {
            Ok(Completed::Written(filename)) => UnitResponse::success(filename),
            Ok(Completed::AlreadyPresent(filename)) => UnitResponse::skipped(filename),
            Err(e) if e.is_permanent() => UnitResponse::permanent_failure(e.stage(), e.to_string()),
            Err(e) => UnitResponse::failure(e.stage(), e.to_string()),
        }
    }
}

/// Write to `{path}.part`, then rename over `path`.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let write_err = |source: io::Error| UnitError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut partial = OsString::from(path.as_os_str());
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    fs::write(&partial, data).await.map_err(write_err)?;
    if let Err(e) = fs::rename(&partial, path).await {
        let _ = fs::remove_file(&partial).await;
        return Err(write_err(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{Encoder, FormatConfig};
    use crate::model::ImageReference;
    use crate::worker::http::HttpConfig;
    use tempfile::TempDir;

    fn unit(metrics: Arc<Metrics>) -> FetchTranscodeUnit {
        FetchTranscodeUnit::new(HttpClient::new(&HttpConfig::default()).unwrap(), metrics)
    }

    #[tokio::test]
    async fn test_existing_output_skips_network() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("page-004.png"), b"done").unwrap();

        let metrics = Arc::new(Metrics::new());
        let request = UnitRequest {
            // unroutable on purpose: touching the network would fail the unit
            image_reference: ImageReference::new("http://127.0.0.1:9/never", 4),
            destination_dir: temp_dir.path().to_path_buf(),
            format_config: FormatConfig::new(Encoder::Png, 100),
        };

        let response = unit(metrics.clone()).execute(request).await;
        assert!(response.success);
        assert!(response.skipped);
        assert_eq!(response.filename.as_deref(), Some("page-004.png"));
        assert_eq!(metrics.snapshot().fetch_attempts, 0);
        assert_eq!(metrics.snapshot().units_skipped, 1);
    }

    #[tokio::test]
    async fn test_connection_failure_reports_fetch_stage() {
        let temp_dir = TempDir::new().unwrap();
        let metrics = Arc::new(Metrics::new());
        let request = UnitRequest {
            image_reference: ImageReference::new("http://127.0.0.1:9/refused.png", 0),
            destination_dir: temp_dir.path().to_path_buf(),
            format_config: FormatConfig::default(),
        };

        let response = unit(metrics.clone()).execute(request).await;
        assert!(!response.success);
        assert_eq!(response.stage, Some(Stage::Fetch));
        assert!(response.error.unwrap().starts_with("Fetch failed"));
        assert_eq!(metrics.snapshot().fetch_attempts, 1);
        assert!(!temp_dir.path().join("page-000.webp").exists());
    }

    #[tokio::test]
    async fn test_unparseable_url_is_permanent() {
        let temp_dir = TempDir::new().unwrap();
        let metrics = Arc::new(Metrics::new());
        let request = UnitRequest {
            image_reference: ImageReference::new("http://", 0),
            destination_dir: temp_dir.path().to_path_buf(),
            format_config: FormatConfig::default(),
        };

        let response = unit(metrics).execute(request).await;
        assert!(!response.success);
        assert!(response.permanent);
        assert_eq!(response.stage, Some(Stage::Fetch));
    }

    #[tokio::test]
    async fn test_write_atomic_creates_parents_and_leaves_no_partial() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("series/chapter-1/page-000.webp");

        write_atomic(&path, b"bytes").await.unwrap();
        // second write over an existing directory tree is fine
        write_atomic(&path, b"bytes2").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"bytes2");
        assert!(!temp_dir
            .path()
            .join("series/chapter-1/page-000.webp.part")
            .exists());
    }

    #[test]
    fn test_error_stage_mapping() {
        assert_eq!(UnitError::Fetch(DownloadError::Timeout).stage(), Stage::Fetch);
        assert_eq!(
            UnitError::Transcode(TranscodeError::Decode("bad".into())).stage(),
            Stage::Transcode
        );
        let write = UnitError::Write {
            path: PathBuf::from("/x"),
            source: io::Error::other("disk full"),
        };
        assert_eq!(write.stage(), Stage::Write);
        assert!(!write.is_permanent());
        assert!(UnitError::Fetch(DownloadError::InvalidUrl("http://".into())).is_permanent());
        assert!(!UnitError::Fetch(DownloadError::Timeout).is_permanent());
    }
}
