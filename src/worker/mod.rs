//! Fetch-transcode units
//!
//! A unit takes one [`UnitRequest`], downloads the source image, transcodes it
//! and writes the result, answering with a [`UnitResponse`]. The request and
//! response messages are the only coupling between the scheduler and a unit.

pub mod http;
pub mod runner;
pub mod transcode;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::task::AbortOnDropHandle;

use crate::format::FormatConfig;
use crate::model::{ImageReference, Stage};

pub use runner::FetchTranscodeUnit;

/// Work order for one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRequest {
    pub image_reference: ImageReference,
    pub destination_dir: PathBuf,
    pub format_config: FormatConfig,
}

/// Unit answer: `{"success": true, "filename": ..}` or `{"success": false, "error": ..}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    /// Retrying cannot help; the scheduler settles the reference at once
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub permanent: bool,
}

impl UnitResponse {
    pub fn success(filename: impl Into<String>) -> Self {
        Self {
            success: true,
            filename: Some(filename.into()),
            error: None,
            stage: None,
            skipped: false,
            permanent: false,
        }
    }

    /// Output was already on disk; nothing was fetched
    pub fn skipped(filename: impl Into<String>) -> Self {
        Self {
            skipped: true,
            ..Self::success(filename)
        }
    }

    pub fn failure(stage: Stage, error: impl Into<String>) -> Self {
        Self {
            success: false,
            filename: None,
            error: Some(error.into()),
            stage: Some(stage),
            skipped: false,
            permanent: false,
        }
    }

    pub fn permanent_failure(stage: Stage, error: impl Into<String>) -> Self {
        Self {
            permanent: true,
            ..Self::failure(stage, error)
        }
    }
}

/// Executes units. The scheduler only ever talks to this seam.
#[async_trait]
pub trait UnitExecutor: Send + Sync + 'static {
    /// Must never fail: every error becomes a failed [`UnitResponse`].
    async fn execute(&self, request: UnitRequest) -> UnitResponse;
}

/// Run one unit on its own task so a panic or abort stays inside the unit.
///
/// Dropping the returned future aborts the unit task.
pub async fn run_isolated(executor: Arc<dyn UnitExecutor>, request: UnitRequest) -> UnitResponse {
    let handle = AbortOnDropHandle::new(tokio::spawn(async move {
        executor.execute(request).await
    }));

    match handle.await {
        Ok(response) => response,
        Err(e) if e.is_panic() => UnitResponse::failure(Stage::Unit, "unit task panicked"),
        Err(e) => UnitResponse::failure(Stage::Unit, e.to_string()),
    }
}
