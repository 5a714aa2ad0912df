//! Fixed-size batch executor for per-record units of work.
//!
//! Records run with bounded parallelism inside a batch; a pause request is
//! honored at every batch boundary. Every record outcome is written to the
//! progress store before the record counts as done, so a crash mid-batch
//! loses at most the advisory "currently processing" marker.

use std::future::Future;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use log::warn;
use tracing::Instrument;

use crate::error::StoreError;
use crate::progress::phase::MigrationPhase;
use crate::progress::tracker::ProgressTracker;

/// Delay between batches; bounds pressure on downstream collaborators.
const INTER_BATCH_DELAY: Duration = Duration::from_millis(50);

/// Retry budget for individual store writes before the job halts.
const STORE_RETRY_ATTEMPTS: u32 = 3;
const STORE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Tally of one pipeline run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub processed: u64,
    pub completed: u64,
    pub failed: u64,
    /// True when the run stopped early because the job was paused or
    /// cancelled; the untouched records remain pending.
    pub interrupted: bool,
}

/// Executes record identifiers in fixed-size batches against a unit of work.
#[derive(Clone)]
pub struct BatchPipeline {
    tracker: ProgressTracker,
    inter_batch_delay: Duration,
}

impl BatchPipeline {
    pub fn new(tracker: ProgressTracker) -> Self {
        Self {
            tracker,
            inter_batch_delay: INTER_BATCH_DELAY,
        }
    }

    /// Overrides the inter-batch delay (tests use zero).
    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.inter_batch_delay = delay;
        self
    }

    /// Runs `unit` for every record, `batch_size` records at a time.
    ///
    /// Per-record failures are recorded and never abort the run; only a
    /// pause/cancel request (checked before each batch) or a store outage
    /// that survives its retry budget stops it early.
    pub async fn run<F, Fut>(
        &self,
        job_id: &str,
        batch_size: usize,
        records: &[String],
        unit: F,
    ) -> Result<BatchOutcome, StoreError>
    where
        F: Fn(String) -> Fut + Send + Sync,
        Fut: Future<Output = std::result::Result<(), String>> + Send,
    {
        let batch_size = batch_size.max(1);
        let mut outcome = BatchOutcome::default();

        for (batch_index, batch) in records.chunks(batch_size).enumerate() {
            let progress = with_retry(|| self.tracker.get_progress(job_id)).await?;
            if matches!(
                progress.phase,
                MigrationPhase::Paused | MigrationPhase::Cancelled
            ) {
                log::info!(
                    "Job {} is {}, stopping after {} processed records",
                    job_id,
                    progress.phase,
                    outcome.processed
                );
                outcome.interrupted = true;
                return Ok(outcome);
            }

            if let Err(e) = self
                .tracker
                .set_current_batch(job_id, batch_index as u64 + 1)
                .await
            {
                warn!("Failed to record current batch for job {}: {}", job_id, e);
            }

            let results: Vec<Result<bool, StoreError>> = stream::iter(batch.iter().cloned())
                .map(|record_id| self.process_record(job_id, record_id, &unit))
                .buffer_unordered(batch_size)
                .collect()
                .await;

            for result in results {
                if result? {
                    outcome.completed += 1;
                } else {
                    outcome.failed += 1;
                }
                outcome.processed += 1;
            }

            if (batch_index + 1) * batch_size < records.len() {
                tokio::time::sleep(self.inter_batch_delay).await;
            }
        }

        Ok(outcome)
    }

    /// Runs one record: advisory processing marker, unit of work, durable
    /// outcome. Returns whether the record completed.
    async fn process_record<F, Fut>(
        &self,
        job_id: &str,
        record_id: String,
        unit: &F,
    ) -> Result<bool, StoreError>
    where
        F: Fn(String) -> Fut + Send + Sync,
        Fut: Future<Output = std::result::Result<(), String>> + Send,
    {
        let span = tracing::info_span!("process_record", job_id = %job_id, record_id = %record_id);
        async {
            // Advisory only; a lost marker is harmless.
            if let Err(e) = self.tracker.mark_processing(job_id, &record_id).await {
                warn!(
                    "Failed to mark record {} as processing on job {}: {}",
                    record_id, job_id, e
                );
            }

            match unit(record_id.clone()).await {
                Ok(()) => {
                    with_retry(|| self.tracker.mark_completed(job_id, &record_id)).await?;
                    Ok(true)
                }
                Err(error) => {
                    with_retry(|| self.tracker.mark_failed(job_id, &record_id, &error)).await?;
                    Ok(false)
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Retries a store call on `Unavailable`; all other errors pass through.
/// Store writes must succeed before the pipeline advances, so after the
/// retry budget the error propagates and halts the job.
async fn with_retry<T, F, Fut>(op: F) -> Result<T, StoreError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(StoreError::Unavailable(reason)) if attempt + 1 < STORE_RETRY_ATTEMPTS => {
                attempt += 1;
                warn!(
                    "Progress store unavailable ({}), retry {}/{}",
                    reason, attempt, STORE_RETRY_ATTEMPTS
                );
                tokio::time::sleep(STORE_RETRY_DELAY).await;
            }
            other => return other,
        }
    }
}
