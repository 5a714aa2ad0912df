//! Typed job lifecycle API over the progress store.
//!
//! Record outcomes mutate only the store's atomic sets and hashes; the
//! progress blob is written exclusively by job-level operations (phase
//! transitions, totals). `get_progress` re-derives every volatile field
//! from the authoritative sets on read, so parallel workers marking
//! records concurrently can never clobber a phase transition or surface
//! stale counts, and a crash never skews the numbers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::warn;

use crate::error::StoreError;
use crate::progress::phase::MigrationPhase;
use crate::progress::store::ProgressStore;
use crate::progress::types::{FailedRecord, LiveMarker, MigrationJobConfig, MigrationProgress};

/// Tracks the lifecycle, phase transitions and per-record outcomes of
/// migration jobs. Cheap to clone; all state lives in the store.
#[derive(Clone)]
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn ProgressStore> {
        Arc::clone(&self.store)
    }

    /// Persists the job config and an initial snapshot at `Initializing`.
    ///
    /// Fails with `AlreadyExists` when the job identifier is reused.
    pub async fn create_job(
        &self,
        config: &MigrationJobConfig,
    ) -> Result<MigrationProgress, StoreError> {
        let config_json = serde_json::to_string(config)?;
        self.store
            .create_config(&config.job_id, &config_json)
            .await?;

        let progress = MigrationProgress::new(&config.job_id);
        self.persist(&progress).await?;
        Ok(progress)
    }

    pub async fn get_config(&self, job_id: &str) -> Result<MigrationJobConfig, StoreError> {
        let json = self
            .store
            .get_config(job_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                job_id: job_id.to_string(),
            })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Returns the snapshot with every derived field repaired from the
    /// authoritative sets: counters and throughput from set cardinalities,
    /// record-level error detail from the failed hash, and the advisory
    /// liveness marker from its own volatile key.
    pub async fn get_progress(&self, job_id: &str) -> Result<MigrationProgress, StoreError> {
        let json = self
            .store
            .get_progress(job_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                job_id: job_id.to_string(),
            })?;
        let mut progress: MigrationProgress = serde_json::from_str(&json)?;

        let completed = self.store.completed_count(job_id).await?;
        let failed = self.store.failed_count(job_id).await?;
        progress.refresh_derived(completed, failed, Utc::now());

        // A job-level failure reason (set by `fail`) outranks record-level
        // detail; otherwise the newest failed entry is the last error.
        if failed > 0 && progress.phase != MigrationPhase::Failed {
            if let Some(latest) = self.latest_failure(job_id).await? {
                progress.last_error = Some(latest.error);
            }
            progress.error_count = failed;
        }

        if let Some(live_json) = self.store.get_live(job_id).await? {
            if let Ok(live) = serde_json::from_str::<LiveMarker>(&live_json) {
                progress.current_record = live.current_record;
                progress.current_batch = live.current_batch;
            }
        }
        Ok(progress)
    }

    /// Transitions the phase and merges metadata into the snapshot.
    ///
    /// Re-entering the current phase is a no-op transition (the metadata is
    /// still merged), which makes phase updates safe to repeat on resume.
    pub async fn update_phase(
        &self,
        job_id: &str,
        phase: MigrationPhase,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<MigrationProgress, StoreError> {
        let mut progress = self.get_progress(job_id).await?;
        validate_transition(progress.phase, phase)?;

        progress.phase = phase;
        if let Some(metadata) = metadata {
            progress.metadata.extend(metadata);
        }
        progress.updated_at = Utc::now();
        self.persist(&progress).await?;
        Ok(progress)
    }

    /// Populates the *all* set and the total counter after discovery.
    ///
    /// Calling it again replaces the set (force-resync re-discovery).
    pub async fn set_total_records(
        &self,
        job_id: &str,
        ids: &[String],
    ) -> Result<MigrationProgress, StoreError> {
        let mut progress = self.get_progress(job_id).await?;
        self.store.replace_all_set(job_id, ids).await?;

        progress.total_records = ids.len() as u64;
        progress.updated_at = Utc::now();
        self.persist(&progress).await?;
        Ok(progress)
    }

    /// Records how many discovered records were skipped as already synced.
    pub async fn record_skipped(&self, job_id: &str, skipped: u64) -> Result<(), StoreError> {
        let mut progress = self.get_progress(job_id).await?;
        progress.skipped_records = skipped;
        progress.updated_at = Utc::now();
        self.persist(&progress).await
    }

    /// Advisory "currently working on" marker. Writes only the volatile
    /// liveness key; no durability guarantee, and never touches job state.
    pub async fn mark_processing(&self, job_id: &str, record_id: &str) -> Result<(), StoreError> {
        let mut live = self.get_live(job_id).await?;
        live.current_record = Some(record_id.to_string());
        self.put_live(job_id, &live).await
    }

    /// Records the batch currently being executed (advisory, like
    /// `mark_processing`).
    pub async fn set_current_batch(&self, job_id: &str, batch: u64) -> Result<(), StoreError> {
        let mut live = self.get_live(job_id).await?;
        live.current_batch = batch;
        self.put_live(job_id, &live).await
    }

    /// Adds the record to the *completed* set. Idempotent; also clears any
    /// stale *failed* entry so a successful retry moves the record between
    /// the sets. Counters are derived, so no snapshot write is needed.
    pub async fn mark_completed(&self, job_id: &str, record_id: &str) -> Result<(), StoreError> {
        self.ensure_exists(job_id).await?;
        self.store.add_completed(job_id, record_id).await?;
        self.store.remove_failed(job_id, record_id).await
    }

    /// Records the failure for the record in the *failed* hash.
    /// Idempotent. A record that already completed stays completed.
    pub async fn mark_failed(
        &self,
        job_id: &str,
        record_id: &str,
        error: &str,
    ) -> Result<(), StoreError> {
        self.ensure_exists(job_id).await?;
        if self.store.is_completed(job_id, record_id).await? {
            warn!(
                "mark_failed for already-completed record {} on job {}, keeping completion",
                record_id, job_id
            );
            return Ok(());
        }

        let entry = serde_json::to_string(&FailedRecord::new(error))?;
        self.store.put_failed(job_id, record_id, &entry).await
    }

    /// Pending = all − completed − failed, recomputed on every call.
    /// Sorted for deterministic batching on resume.
    pub async fn get_pending(&self, job_id: &str) -> Result<Vec<String>, StoreError> {
        let all = self.store.all_records(job_id).await?;
        let completed = self.store.completed_records(job_id).await?;
        let failed = self.store.failed_records(job_id).await?;

        let mut pending: Vec<String> = all
            .into_iter()
            .filter(|id| !completed.contains(id) && !failed.contains_key(id))
            .collect();
        pending.sort();
        Ok(pending)
    }

    /// The failed map with error detail. Entries that fail to parse are
    /// skipped with a warning rather than poisoning the whole view.
    pub async fn get_failed(
        &self,
        job_id: &str,
    ) -> Result<HashMap<String, FailedRecord>, StoreError> {
        let raw = self.store.failed_records(job_id).await?;
        let mut failed = HashMap::with_capacity(raw.len());
        for (record_id, entry) in raw {
            match serde_json::from_str::<FailedRecord>(&entry) {
                Ok(record) => {
                    failed.insert(record_id, record);
                }
                Err(e) => {
                    warn!(
                        "Skipping unparseable failure entry for record {} on job {}: {}",
                        record_id, job_id, e
                    );
                }
            }
        }
        Ok(failed)
    }

    /// Removes the given identifiers from the *failed* map. This is the
    /// only path that shrinks the failed set besides a successful retry.
    pub async fn clear_failed(&self, job_id: &str, ids: &[String]) -> Result<(), StoreError> {
        self.ensure_exists(job_id).await?;
        for id in ids {
            self.store.remove_failed(job_id, id).await?;
        }
        Ok(())
    }

    /// Pauses the job. Valid only from an active phase.
    pub async fn pause(&self, job_id: &str) -> Result<MigrationProgress, StoreError> {
        let mut progress = self.get_progress(job_id).await?;
        if !progress.phase.is_active() {
            return Err(invalid(progress.phase, MigrationPhase::Paused));
        }
        progress.phase = MigrationPhase::Paused;
        progress.updated_at = Utc::now();
        self.persist(&progress).await?;
        Ok(progress)
    }

    /// Resumes record migration. Valid only from `Paused` or `Failed`.
    pub async fn resume(&self, job_id: &str) -> Result<MigrationProgress, StoreError> {
        let mut progress = self.get_progress(job_id).await?;
        if !progress.phase.is_resumable() {
            return Err(invalid(progress.phase, MigrationPhase::MigratingRecords));
        }
        progress.phase = MigrationPhase::MigratingRecords;
        progress.updated_at = Utc::now();
        self.persist(&progress).await?;
        Ok(progress)
    }

    /// Marks the job completed. Terminal.
    pub async fn complete(&self, job_id: &str) -> Result<MigrationProgress, StoreError> {
        let mut progress = self.get_progress(job_id).await?;
        if !progress.phase.is_active() {
            return Err(invalid(progress.phase, MigrationPhase::Completed));
        }
        progress.phase = MigrationPhase::Completed;
        progress.current_record = None;
        progress.updated_at = Utc::now();
        self.persist(&progress).await?;
        self.store.clear_live(job_id).await?;
        Ok(progress)
    }

    /// Marks the job failed with a reason. Resumable via `resume`.
    pub async fn fail(&self, job_id: &str, error: &str) -> Result<MigrationProgress, StoreError> {
        let mut progress = self.get_progress(job_id).await?;
        if progress.phase.is_terminal() {
            return Err(invalid(progress.phase, MigrationPhase::Failed));
        }
        progress.phase = MigrationPhase::Failed;
        progress.last_error = Some(error.to_string());
        progress.error_count += 1;
        progress.updated_at = Utc::now();
        self.persist(&progress).await?;
        Ok(progress)
    }

    /// Cancels the job. Terminal and not resumable.
    pub async fn cancel(&self, job_id: &str) -> Result<MigrationProgress, StoreError> {
        let mut progress = self.get_progress(job_id).await?;
        if progress.phase.is_terminal() {
            return Err(invalid(progress.phase, MigrationPhase::Cancelled));
        }
        progress.phase = MigrationPhase::Cancelled;
        progress.current_record = None;
        progress.updated_at = Utc::now();
        self.persist(&progress).await?;
        self.store.clear_live(job_id).await?;
        Ok(progress)
    }

    async fn ensure_exists(&self, job_id: &str) -> Result<(), StoreError> {
        if self.store.get_config(job_id).await?.is_none() {
            return Err(StoreError::NotFound {
                job_id: job_id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_live(&self, job_id: &str) -> Result<LiveMarker, StoreError> {
        Ok(self
            .store
            .get_live(job_id)
            .await?
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default())
    }

    async fn put_live(&self, job_id: &str, live: &LiveMarker) -> Result<(), StoreError> {
        let json = serde_json::to_string(live)?;
        self.store.put_live(job_id, &json).await
    }

    /// Newest entry in the failed map, by failure timestamp.
    async fn latest_failure(&self, job_id: &str) -> Result<Option<FailedRecord>, StoreError> {
        let failed = self.get_failed(job_id).await?;
        Ok(failed
            .into_values()
            .max_by_key(|record| record.timestamp))
    }

    async fn persist(&self, progress: &MigrationProgress) -> Result<(), StoreError> {
        let json = serde_json::to_string(progress)?;
        self.store.put_progress(&progress.job_id, &json).await
    }
}

fn validate_transition(from: MigrationPhase, to: MigrationPhase) -> Result<(), StoreError> {
    // Same-phase re-entry is allowed so resumed drivers can repeat the
    // phase update they were interrupted in.
    if from == to {
        return Ok(());
    }
    let allowed = match from {
        MigrationPhase::Cancelled => false,
        // Completed only re-opens for the retry-failed path.
        MigrationPhase::Completed => to == MigrationPhase::MigratingRecords,
        _ => true,
    };
    if allowed {
        Ok(())
    } else {
        Err(invalid(from, to))
    }
}

fn invalid(from: MigrationPhase, to: MigrationPhase) -> StoreError {
    StoreError::InvalidTransition {
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::memory::MemoryProgressStore;

    fn tracker() -> ProgressTracker {
        ProgressTracker::new(Arc::new(MemoryProgressStore::new()))
    }

    fn config(job_id: &str) -> MigrationJobConfig {
        MigrationJobConfig::new(job_id, "user-1", "arxiv-mirror", "col-1")
    }

    async fn tracker_with_job(job_id: &str) -> ProgressTracker {
        let t = tracker();
        t.create_job(&config(job_id)).await.unwrap();
        t
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_create_job_initial_snapshot() {
        let t = tracker();
        let progress = t.create_job(&config("job-1")).await.unwrap();
        assert_eq!(progress.phase, MigrationPhase::Initializing);
        assert_eq!(progress.total_records, 0);
        assert_eq!(progress.processed_records, 0);

        let loaded = t.get_progress("job-1").await.unwrap();
        assert_eq!(loaded.phase, MigrationPhase::Initializing);
        let cfg = t.get_config("job-1").await.unwrap();
        assert_eq!(cfg.archive_name, "arxiv-mirror");
    }

    #[tokio::test]
    async fn test_create_job_rejects_reused_id() {
        let t = tracker_with_job("job-1").await;
        let err = t.create_job(&config("job-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_operations_on_missing_job() {
        let t = tracker();
        assert!(matches!(
            t.get_progress("nope").await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(
            t.pause("nope").await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(
            t.mark_completed("nope", "rec-1").await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(
            t.mark_failed("nope", "rec-1", "x").await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(
            t.get_config("nope").await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_update_phase_merges_metadata() {
        let t = tracker_with_job("job-1").await;

        let mut meta = HashMap::new();
        meta.insert("directoriesMapped".to_string(), serde_json::json!(7));
        let progress = t
            .update_phase("job-1", MigrationPhase::MappingDirectories, Some(meta))
            .await
            .unwrap();
        assert_eq!(progress.phase, MigrationPhase::MappingDirectories);

        // re-entering the same phase keeps existing metadata and adds new
        let mut meta = HashMap::new();
        meta.insert("mappingError".to_string(), serde_json::json!("timeout"));
        let progress = t
            .update_phase("job-1", MigrationPhase::MappingDirectories, Some(meta))
            .await
            .unwrap();
        assert_eq!(progress.metadata.get("directoriesMapped"), Some(&serde_json::json!(7)));
        assert_eq!(
            progress.metadata.get("mappingError"),
            Some(&serde_json::json!("timeout"))
        );
    }

    #[tokio::test]
    async fn test_set_total_records_replaces() {
        let t = tracker_with_job("job-1").await;
        let progress = t
            .set_total_records("job-1", &ids(&["a", "b", "c"]))
            .await
            .unwrap();
        assert_eq!(progress.total_records, 3);

        let progress = t.set_total_records("job-1", &ids(&["x"])).await.unwrap();
        assert_eq!(progress.total_records, 1);
        assert_eq!(t.get_pending("job-1").await.unwrap(), ids(&["x"]));
    }

    #[tokio::test]
    async fn test_marking_updates_derived_counters() {
        let t = tracker_with_job("job-1").await;
        t.set_total_records("job-1", &ids(&["a", "b", "c", "d"]))
            .await
            .unwrap();

        t.mark_completed("job-1", "a").await.unwrap();
        t.mark_completed("job-1", "b").await.unwrap();
        t.mark_failed("job-1", "c", "archive timeout").await.unwrap();

        let progress = t.get_progress("job-1").await.unwrap();
        assert_eq!(progress.completed_records, 2);
        assert_eq!(progress.failed_records, 1);
        assert_eq!(progress.processed_records, 3);
        assert_eq!(progress.last_error.as_deref(), Some("archive timeout"));
        assert_eq!(progress.error_count, 1);
        assert_eq!(t.get_pending("job-1").await.unwrap(), ids(&["d"]));
    }

    #[tokio::test]
    async fn test_marking_is_idempotent() {
        let t = tracker_with_job("job-1").await;
        t.set_total_records("job-1", &ids(&["a", "b"])).await.unwrap();

        t.mark_completed("job-1", "a").await.unwrap();
        t.mark_completed("job-1", "a").await.unwrap();
        t.mark_failed("job-1", "b", "boom").await.unwrap();
        t.mark_failed("job-1", "b", "boom").await.unwrap();

        let progress = t.get_progress("job-1").await.unwrap();
        assert_eq!(progress.completed_records, 1);
        assert_eq!(progress.failed_records, 1);
        assert_eq!(progress.processed_records, 2);
        assert_eq!(progress.error_count, 1);
    }

    #[tokio::test]
    async fn test_partition_invariant_holds() {
        let t = tracker_with_job("job-1").await;
        t.set_total_records("job-1", &ids(&["a", "b", "c", "d", "e"]))
            .await
            .unwrap();

        t.mark_completed("job-1", "a").await.unwrap();
        t.mark_failed("job-1", "b", "x").await.unwrap();
        // a failed record that later succeeds moves between the sets
        t.mark_completed("job-1", "b").await.unwrap();
        t.mark_failed("job-1", "c", "y").await.unwrap();

        let store = t.store();
        let completed = store.completed_records("job-1").await.unwrap();
        let failed = store.failed_records("job-1").await.unwrap();
        let pending = t.get_pending("job-1").await.unwrap();

        assert!(completed.contains("a") && completed.contains("b"));
        assert!(!failed.contains_key("b"));
        assert!(failed.contains_key("c"));
        assert_eq!(pending, ids(&["d", "e"]));
        // pairwise disjoint
        for id in &completed {
            assert!(!failed.contains_key(id));
            assert!(!pending.contains(id));
        }
        for id in failed.keys() {
            assert!(!pending.contains(id));
        }
    }

    #[tokio::test]
    async fn test_completion_wins_over_late_failure() {
        let t = tracker_with_job("job-1").await;
        t.set_total_records("job-1", &ids(&["a"])).await.unwrap();

        t.mark_completed("job-1", "a").await.unwrap();
        t.mark_failed("job-1", "a", "straggler error").await.unwrap();

        let progress = t.get_progress("job-1").await.unwrap();
        assert_eq!(progress.completed_records, 1);
        assert_eq!(progress.failed_records, 0);
        assert!(t.get_failed("job-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_failed_detail() {
        let t = tracker_with_job("job-1").await;
        t.set_total_records("job-1", &ids(&["a"])).await.unwrap();
        t.mark_failed("job-1", "a", "io error").await.unwrap();

        let failed = t.get_failed("job-1").await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed.get("a").unwrap().error, "io error");
    }

    #[tokio::test]
    async fn test_clear_failed() {
        let t = tracker_with_job("job-1").await;
        t.set_total_records("job-1", &ids(&["a", "b"])).await.unwrap();
        t.mark_failed("job-1", "a", "x").await.unwrap();
        t.mark_failed("job-1", "b", "y").await.unwrap();

        t.clear_failed("job-1", &ids(&["a"])).await.unwrap();

        let progress = t.get_progress("job-1").await.unwrap();
        assert_eq!(progress.failed_records, 1);
        // cleared record is pending again
        assert_eq!(t.get_pending("job-1").await.unwrap(), ids(&["a"]));
    }

    #[tokio::test]
    async fn test_advisory_markers() {
        let t = tracker_with_job("job-1").await;
        t.mark_processing("job-1", "rec-3").await.unwrap();
        t.set_current_batch("job-1", 2).await.unwrap();

        let progress = t.get_progress("job-1").await.unwrap();
        assert_eq!(progress.current_record.as_deref(), Some("rec-3"));
        assert_eq!(progress.current_batch, 2);

        // the marker is cleared once the job reaches a terminal phase
        t.update_phase("job-1", MigrationPhase::MigratingRecords, None)
            .await
            .unwrap();
        t.complete("job-1").await.unwrap();
        let progress = t.get_progress("job-1").await.unwrap();
        assert!(progress.current_record.is_none());
    }

    #[tokio::test]
    async fn test_pause_preconditions() {
        let t = tracker_with_job("job-1").await;
        t.update_phase("job-1", MigrationPhase::MigratingRecords, None)
            .await
            .unwrap();
        t.pause("job-1").await.unwrap();

        // pausing a paused job is invalid
        let err = t.pause("job-1").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_pause_survives_concurrent_marks() {
        let t = tracker_with_job("job-1").await;
        t.set_total_records("job-1", &ids(&["a", "b"])).await.unwrap();
        t.update_phase("job-1", MigrationPhase::MigratingRecords, None)
            .await
            .unwrap();

        t.pause("job-1").await.unwrap();
        // stragglers from an in-flight batch finish after the pause landed
        t.mark_processing("job-1", "a").await.unwrap();
        t.mark_completed("job-1", "a").await.unwrap();
        t.mark_failed("job-1", "b", "late").await.unwrap();

        let progress = t.get_progress("job-1").await.unwrap();
        assert_eq!(progress.phase, MigrationPhase::Paused);
        assert_eq!(progress.completed_records, 1);
        assert_eq!(progress.failed_records, 1);
    }

    #[tokio::test]
    async fn test_resume_only_from_paused_or_failed() {
        let t = tracker_with_job("job-1").await;
        let err = t.resume("job-1").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        t.update_phase("job-1", MigrationPhase::MigratingRecords, None)
            .await
            .unwrap();
        t.pause("job-1").await.unwrap();
        let progress = t.resume("job-1").await.unwrap();
        assert_eq!(progress.phase, MigrationPhase::MigratingRecords);

        t.fail("job-1", "driver crashed").await.unwrap();
        let progress = t.resume("job-1").await.unwrap();
        assert_eq!(progress.phase, MigrationPhase::MigratingRecords);
    }

    #[tokio::test]
    async fn test_job_level_failure_outranks_record_errors() {
        let t = tracker_with_job("job-1").await;
        t.set_total_records("job-1", &ids(&["a"])).await.unwrap();
        t.mark_failed("job-1", "a", "record-level detail").await.unwrap();

        t.fail("job-1", "archive went away").await.unwrap();
        let progress = t.get_progress("job-1").await.unwrap();
        assert_eq!(progress.phase, MigrationPhase::Failed);
        assert_eq!(progress.last_error.as_deref(), Some("archive went away"));
    }

    #[tokio::test]
    async fn test_terminal_phases_are_irreversible() {
        let t = tracker_with_job("job-1").await;
        t.update_phase("job-1", MigrationPhase::GeneratingSummaries, None)
            .await
            .unwrap();
        t.complete("job-1").await.unwrap();

        assert!(matches!(
            t.fail("job-1", "late").await.unwrap_err(),
            StoreError::InvalidTransition { .. }
        ));
        assert!(matches!(
            t.resume("job-1").await.unwrap_err(),
            StoreError::InvalidTransition { .. }
        ));
        assert!(matches!(
            t.cancel("job-1").await.unwrap_err(),
            StoreError::InvalidTransition { .. }
        ));

        // the retry path may re-open a completed job
        let progress = t
            .update_phase("job-1", MigrationPhase::MigratingRecords, None)
            .await
            .unwrap();
        assert_eq!(progress.phase, MigrationPhase::MigratingRecords);
    }

    #[tokio::test]
    async fn test_cancelled_is_fully_terminal() {
        let t = tracker_with_job("job-1").await;
        t.cancel("job-1").await.unwrap();

        let err = t
            .update_phase("job-1", MigrationPhase::MigratingRecords, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_marks_keep_counters_consistent() {
        let t = tracker_with_job("job-1").await;
        let all: Vec<String> = (0..40).map(|i| format!("rec-{i:02}")).collect();
        t.set_total_records("job-1", &all).await.unwrap();

        let mut handles = Vec::new();
        for (i, id) in all.iter().enumerate() {
            let t = t.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                if i % 4 == 0 {
                    t.mark_failed("job-1", &id, "transient").await
                } else {
                    t.mark_completed("job-1", &id).await
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let progress = t.get_progress("job-1").await.unwrap();
        assert_eq!(progress.completed_records, 30);
        assert_eq!(progress.failed_records, 10);
        assert_eq!(
            progress.processed_records,
            progress.completed_records + progress.failed_records
        );
        assert!(t.get_pending("job-1").await.unwrap().is_empty());
    }
}
