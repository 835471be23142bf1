//! Bounded scheduler
//!
//! Keeps at most `max_concurrent` units in flight, feeding them from a FIFO
//! queue. Failed references go to a retry queue that is merged back only once
//! the primary queue has drained and the retry delay has elapsed, so every
//! first attempt runs before any retry round.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::format::FormatConfig;
use crate::model::{Failure, ImageReference, Stage, Success};
use crate::observability::Metrics;
use crate::worker::{UnitExecutor, UnitRequest, UnitResponse, run_isolated};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Waiting for an in-flight unit failed: {0}")]
    Join(#[from] JoinError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Upper bound used when no explicit concurrency is configured
pub const DEFAULT_CONCURRENCY_CAP: usize = 4;

/// Hardware lanes minus one, at least one, at most `cap`.
pub fn default_max_concurrent(cap: usize) -> usize {
    let lanes = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    lanes.saturating_sub(1).max(1).min(cap.max(1))
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_concurrent: usize,
    pub max_retries: u32,
    /// Pause before a retry round is merged back into the queue
    pub retry_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(DEFAULT_CONCURRENCY_CAP),
            max_retries: 3,
            retry_delay: Duration::from_millis(777),
        }
    }
}

/// Terminal outcome of every reference handed to [`Scheduler::run`]
#[derive(Debug, Default)]
pub struct SchedulerOutcome {
    pub succeeded: Vec<Success>,
    pub failed: Vec<Failure>,
    /// Queued or in-flight when the run was cancelled; not failures
    pub cancelled: Vec<ImageReference>,
}

impl SchedulerOutcome {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.cancelled.len()
    }

    pub fn was_cancelled(&self) -> bool {
        !self.cancelled.is_empty()
    }
}

/// Concurrency-limited dispatcher with deferred retries
pub struct Scheduler {
    executor: Arc<dyn UnitExecutor>,
    config: SchedulerConfig,
    metrics: Arc<Metrics>,
}

/// Admission state for one run; only touched from the scheduling loop
struct RunState {
    queue: VecDeque<ImageReference>,
    retry_queue: VecDeque<ImageReference>,
    in_flight: JoinSet<(ImageReference, UnitResponse)>,
    /// In-flight references by ordinal, so aborted units can be accounted for
    pending: HashMap<usize, ImageReference>,
    retry_round: Option<Instant>,
    outcome: SchedulerOutcome,
}

impl Scheduler {
    pub fn new(
        executor: Arc<dyn UnitExecutor>,
        config: SchedulerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            executor,
            config,
            metrics,
        }
    }

    /// Drive every reference to a terminal outcome.
    ///
    /// Ordinals must be unique. Cancelling `cancel` aborts in-flight units and
    /// reports everything unfinished as cancelled.
    pub async fn run(
        &self,
        references: Vec<ImageReference>,
        destination: &Path,
        format: &FormatConfig,
        cancel: &CancellationToken,
    ) -> Result<SchedulerOutcome> {
        let max_concurrent = self.config.max_concurrent.max(1);
        let mut state = RunState {
            queue: references.into(),
            retry_queue: VecDeque::new(),
            in_flight: JoinSet::new(),
            pending: HashMap::new(),
            retry_round: None,
            outcome: SchedulerOutcome::default(),
        };

        info!(
            queued = state.queue.len(),
            max_concurrent,
            max_retries = self.config.max_retries,
            "Scheduler started"
        );

        loop {
            if state.queue.is_empty() && !state.retry_queue.is_empty() {
                let due = *state
                    .retry_round
                    .get_or_insert_with(|| Instant::now() + self.config.retry_delay);
                if Instant::now() >= due {
                    debug!(retries = state.retry_queue.len(), "Starting retry round");
                    let retries = std::mem::take(&mut state.retry_queue);
                    state.queue.extend(retries);
                    state.retry_round = None;
                }
            }

            while state.in_flight.len() < max_concurrent {
                let Some(reference) = state.queue.pop_front() else {
                    break;
                };
                self.dispatch(&mut state, reference, destination, format);
            }

            if state.in_flight.is_empty() && state.queue.is_empty() && state.retry_queue.is_empty()
            {
                break;
            }

            let retry_due = state.retry_round;
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    return Ok(self.cancel(state).await);
                }

                joined = state.in_flight.join_next(), if !state.in_flight.is_empty() => {
                    match joined {
                        Some(Ok((reference, response))) => {
                            state.pending.remove(&reference.ordinal);
                            self.settle(&mut state, reference, response);
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {}
                    }
                }

                _ = sleep_until(retry_due.unwrap_or_else(Instant::now)), if retry_due.is_some() => {}
            }
        }

        info!(
            succeeded = state.outcome.succeeded.len(),
            failed = state.outcome.failed.len(),
            "Scheduler drained"
        );

        Ok(state.outcome)
    }

    fn dispatch(
        &self,
        state: &mut RunState,
        reference: ImageReference,
        destination: &Path,
        format: &FormatConfig,
    ) {
        debug!(
            url = %reference.url,
            ordinal = reference.ordinal,
            attempt = reference.retry_count + 1,
            "Dispatching unit"
        );

        let request = UnitRequest {
            image_reference: reference.clone(),
            destination_dir: PathBuf::from(destination),
            format_config: format.clone(),
        };
        let executor = Arc::clone(&self.executor);

        state.pending.insert(reference.ordinal, reference.clone());
        state.in_flight.spawn(async move {
            let response = run_isolated(executor, request).await;
            (reference, response)
        });
    }

    fn settle(&self, state: &mut RunState, mut reference: ImageReference, response: UnitResponse) {
        if response.success {
            self.metrics.unit_succeeded();
            let filename = response.filename.unwrap_or_default();
            info!(filename = %filename, ordinal = reference.ordinal, "Downloaded");
            state.outcome.succeeded.push(Success {
                reference,
                filename,
                skipped: response.skipped,
            });
            return;
        }

        self.metrics.unit_failed();
        let error = response
            .error
            .unwrap_or_else(|| "unit reported failure without a reason".to_string());
        let stage = response.stage.unwrap_or(Stage::Unit);

        if !response.permanent && reference.retry_count < self.config.max_retries {
            reference.retry_count += 1;
            self.metrics.retry_scheduled();
            warn!(
                url = %reference.url,
                ordinal = reference.ordinal,
                attempt = reference.retry_count,
                %stage,
                error = %error,
                "Unit failed, queued for retry"
            );
            state.retry_queue.push_back(reference);
        } else {
            error!(
                url = %reference.url,
                ordinal = reference.ordinal,
                attempts = reference.retry_count + 1,
                %stage,
                error = %error,
                "Unit failed after retries"
            );
            state.outcome.failed.push(Failure {
                reference,
                stage,
                error,
            });
        }
    }

    /// Abort in-flight units and move all unfinished work to `cancelled`.
    async fn cancel(&self, mut state: RunState) -> SchedulerOutcome {
        warn!(
            in_flight = state.in_flight.len(),
            queued = state.queue.len() + state.retry_queue.len(),
            "Batch cancelled"
        );

        state.in_flight.abort_all();
        while let Some(joined) = state.in_flight.join_next().await {
            // a unit may have finished between the signal and the abort
            if let Ok((reference, response)) = joined {
                state.pending.remove(&reference.ordinal);
                if response.success {
                    self.settle(&mut state, reference, response);
                } else {
                    state.outcome.cancelled.push(reference);
                }
            }
        }

        let RunState {
            queue,
            retry_queue,
            pending,
            mut outcome,
            ..
        } = state;
        outcome.cancelled.extend(pending.into_values());
        outcome.cancelled.extend(queue);
        outcome.cancelled.extend(retry_queue);
        outcome.cancelled.sort_by_key(|r| r.ordinal);
        outcome
    }
}
