//! Control surface for migration jobs.
//!
//! One detached driver task per started job; everything a caller can
//! observe goes through the progress store, so any process holding a
//! tracker can answer status queries for jobs driven elsewhere.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BibsyncError, StoreError};
use crate::migration::orchestrator::MigrationOrchestrator;
use crate::progress::store::ProgressStore;
use crate::progress::tracker::ProgressTracker;
use crate::progress::types::{JobSummary, MigrationJobConfig, MigrationProgress};

/// Caller-facing request to start a migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRequest {
    pub user_id: String,
    pub archive_name: String,
    pub collection_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtree: Option<String>,
    #[serde(default)]
    pub force_resync: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

/// Owns the orchestrator and spawns one driver task per active job.
#[derive(Clone)]
pub struct MigrationService {
    orchestrator: Arc<MigrationOrchestrator>,
    tracker: ProgressTracker,
}

impl MigrationService {
    pub fn new(orchestrator: MigrationOrchestrator) -> Self {
        let tracker = orchestrator.tracker().clone();
        Self {
            orchestrator: Arc::new(orchestrator),
            tracker,
        }
    }

    /// Creates the job and spawns its driver. Returns the fresh job id.
    pub async fn start(&self, request: MigrationRequest) -> Result<String, BibsyncError> {
        let job_id = format!("mig-{}", Uuid::new_v4());
        let mut config = MigrationJobConfig::new(
            &job_id,
            &request.user_id,
            &request.archive_name,
            &request.collection_id,
        );
        config.subtree = request.subtree;
        config.force_resync = request.force_resync;
        if let Some(batch_size) = request.batch_size {
            config = config.with_batch_size(batch_size);
        }

        self.tracker.create_job(&config).await?;
        info!(
            "Started migration job {} for user {} from archive {}",
            job_id, config.user_id, config.archive_name
        );

        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            drive(&orchestrator, config).await;
        });
        Ok(job_id)
    }

    /// Requests a pause; honored at the next batch boundary.
    pub async fn pause(&self, job_id: &str) -> Result<(), BibsyncError> {
        self.tracker.pause(job_id).await?;
        Ok(())
    }

    /// Resumes a paused or failed job with exactly its pending records.
    /// Returns `false` when the job is not in a resumable phase.
    pub async fn resume(&self, job_id: &str) -> Result<bool, BibsyncError> {
        match self.tracker.resume(job_id).await {
            Ok(_) => {}
            Err(StoreError::InvalidTransition { .. }) => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run_from_pending(&job_id).await {
                error!("Resumed job {} failed: {}", job_id, e);
            }
        });
        Ok(true)
    }

    /// Re-submits the failed subset. Returns `false` when nothing failed.
    pub async fn retry_failed(&self, job_id: &str) -> Result<bool, BibsyncError> {
        let Some(ids) = self.orchestrator.begin_retry(job_id).await? else {
            return Ok(false);
        };

        let orchestrator = Arc::clone(&self.orchestrator);
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run_retry(&job_id, ids).await {
                error!("Retry on job {} failed: {}", job_id, e);
            }
        });
        Ok(true)
    }

    /// Cancels the job. Terminal; not resumable.
    pub async fn cancel(&self, job_id: &str) -> Result<(), BibsyncError> {
        self.tracker.cancel(job_id).await?;
        Ok(())
    }

    pub async fn status(&self, job_id: &str) -> Result<MigrationProgress, BibsyncError> {
        Ok(self.tracker.get_progress(job_id).await?)
    }

    /// Jobs belonging to a user, newest first.
    pub async fn list_jobs(&self, user_id: &str) -> Result<Vec<JobSummary>, BibsyncError> {
        let mut summaries = Vec::new();
        for job_id in self.tracker.store().job_ids().await? {
            let config = match self.tracker.get_config(&job_id).await {
                Ok(config) => config,
                Err(StoreError::NotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            };
            if config.user_id != user_id {
                continue;
            }
            match self.tracker.get_progress(&job_id).await {
                Ok(progress) => summaries.push(JobSummary::from_parts(&config, &progress)),
                Err(StoreError::NotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(summaries)
    }
}

/// Runs one job to its terminal state, enforcing the configured timeout.
async fn drive(orchestrator: &MigrationOrchestrator, config: MigrationJobConfig) {
    let job_id = config.job_id.clone();
    let timeout = Duration::from_secs(config.timeout_secs.max(1));

    match tokio::time::timeout(timeout, orchestrator.run(&config)).await {
        Ok(Ok(progress)) => {
            info!("Job {} finished in phase {}", job_id, progress.phase);
        }
        Ok(Err(e)) => {
            error!("Job {} driver failed: {}", job_id, e);
            if let Err(fail_err) = orchestrator.tracker().fail(&job_id, &e.to_string()).await {
                error!("Failed to mark job {} as failed: {}", job_id, fail_err);
            }
        }
        Err(_) => {
            error!("Job {} exceeded its {}s timeout", job_id, config.timeout_secs);
            let reason = format!("Job timed out after {}s", config.timeout_secs);
            if let Err(fail_err) = orchestrator.tracker().fail(&job_id, &reason).await {
                error!("Failed to mark job {} as failed: {}", job_id, fail_err);
            }
        }
    }
}
