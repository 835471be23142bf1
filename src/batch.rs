//! Batch runner: one chapter in, one report out

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::completion;
use crate::format::{FormatConfig, FormatError};
use crate::model::{ChapterManifest, Failure, ImageReference, Success};
use crate::observability::{Metrics, MetricsSnapshot};
use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerError};
use crate::worker::UnitExecutor;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Batch has no image references")]
    EmptyBatch,

    #[error("Ordinal {0} appears more than once in the batch")]
    DuplicateOrdinal(usize),

    #[error("Invalid output format: {0}")]
    InvalidFormat(#[from] FormatError),

    #[error("Destination {path} is unusable: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Scheduler failed: {0}")]
    Scheduler(#[from] SchedulerError),
}

pub type Result<T> = std::result::Result<T, BatchError>;

/// One chapter's references, destination and output format
#[derive(Debug, Clone)]
pub struct Batch {
    pub chapter: Option<String>,
    pub references: Vec<ImageReference>,
    pub destination: PathBuf,
    pub format: FormatConfig,
}

impl Batch {
    pub fn new(
        references: Vec<ImageReference>,
        destination: impl Into<PathBuf>,
        format: FormatConfig,
    ) -> Self {
        Self {
            chapter: None,
            references,
            destination: destination.into(),
            format,
        }
    }

    pub fn from_manifest(
        manifest: &ChapterManifest,
        destination: impl Into<PathBuf>,
        format: FormatConfig,
    ) -> Self {
        Self {
            chapter: manifest.chapter.clone(),
            ..Self::new(manifest.references(), destination, format)
        }
    }

    /// Split into fetchable references and those with a non-http(s) scheme.
    fn partition(self) -> (Vec<ImageReference>, Vec<ImageReference>) {
        self.references
            .into_iter()
            .partition(ImageReference::has_http_scheme)
    }

    fn check_ordinals(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.references.len());
        for reference in &self.references {
            if !seen.insert(reference.ordinal) {
                return Err(BatchError::DuplicateOrdinal(reference.ordinal));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every fetchable reference was materialized
    Complete,
    /// Directory already held the expected file count; nothing was scheduled
    Skipped,
    /// Some references failed, at least one succeeded
    Partial,
    /// Nothing succeeded
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub chapter: Option<String>,
    pub destination: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: BatchStatus,
    pub succeeded: Vec<Success>,
    pub failed: Vec<Failure>,
    pub cancelled: Vec<ImageReference>,
    /// Non-http(s) references dropped before scheduling
    pub excluded: Vec<ImageReference>,
    pub metrics: MetricsSnapshot,
}

impl BatchReport {
    /// Exit-status view: individual failures are fine as long as something landed.
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            BatchStatus::Complete | BatchStatus::Skipped | BatchStatus::Partial
        )
    }
}

/// Entry point for running one batch through the scheduler
pub struct BatchRunner {
    scheduler: Scheduler,
    metrics: Arc<Metrics>,
}

impl BatchRunner {
    pub fn new(
        executor: Arc<dyn UnitExecutor>,
        config: SchedulerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(executor, config, Arc::clone(&metrics)),
            metrics,
        }
    }

    /// Run one batch. Only batch-level problems are errors; per-reference
    /// failures land in the report.
    pub async fn run(&self, batch: Batch, cancel: &CancellationToken) -> Result<BatchReport> {
        let batch_id = Uuid::now_v7();
        let span = info_span!("batch", %batch_id, destination = %batch.destination.display());
        self.run_inner(batch_id, batch, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        batch_id: Uuid,
        batch: Batch,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        let started_at = Utc::now();
        let metrics_before = self.metrics.snapshot();

        if batch.references.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        batch.format.validate()?;
        batch.check_ordinals()?;

        let destination = batch.destination.clone();
        ensure_destination(&destination).await?;

        let chapter = batch.chapter.clone();
        let format = batch.format.clone();
        let (fetchable, excluded) = batch.partition();
        for reference in &excluded {
            warn!(url = %reference.url, ordinal = reference.ordinal, "Skipping non-http image URL");
        }

        let report = |status, outcome: Option<crate::scheduler::SchedulerOutcome>| {
            let outcome = outcome.unwrap_or_default();
            BatchReport {
                batch_id,
                chapter: chapter.clone(),
                destination: destination.clone(),
                started_at,
                finished_at: Utc::now(),
                status,
                succeeded: outcome.succeeded,
                failed: outcome.failed,
                cancelled: outcome.cancelled,
                excluded: excluded.clone(),
                metrics: self.metrics.snapshot().since(&metrics_before),
            }
        };

        if fetchable.is_empty() {
            warn!("No fetchable image references in batch");
            return Ok(report(BatchStatus::Failed, None));
        }

        let complete = completion::is_batch_complete(&destination, fetchable.len())
            .await
            .map_err(|source| BatchError::Destination {
                path: destination.clone(),
                source,
            })?;
        if complete {
            info!(files = fetchable.len(), "Chapter already completely downloaded");
            return Ok(report(BatchStatus::Skipped, None));
        }

        info!(images = fetchable.len(), "Downloading chapter");
        let outcome = self
            .scheduler
            .run(fetchable, &destination, &format, cancel)
            .await?;

        let status = if outcome.was_cancelled() {
            BatchStatus::Cancelled
        } else if outcome.failed.is_empty() {
            BatchStatus::Complete
        } else if outcome.succeeded.is_empty() {
            BatchStatus::Failed
        } else {
            BatchStatus::Partial
        };

        let report = report(status, Some(outcome));
        info!(
            status = ?report.status,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled.len(),
            excluded = report.excluded.len(),
            "Batch finished"
        );
        Ok(report)
    }
}

/// Number of finished files already in the batch destination, and how many
/// the batch expects. Never touches the network.
pub async fn completion_status(batch: &Batch) -> io::Result<(usize, usize)> {
    let expected = batch
        .references
        .iter()
        .filter(|r| r.has_http_scheme())
        .count();
    let existing = completion::count_existing_files(&batch.destination).await?;
    Ok((existing, expected))
}

async fn ensure_destination(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| BatchError::Destination {
            path: path.to_path_buf(),
            source,
        })
}
