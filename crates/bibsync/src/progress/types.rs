//! Job configuration and progress snapshot types.
//!
//! Both types are persisted to the progress store as JSON blobs with
//! RFC-3339 timestamps; the wire shape must stay stable so a restarted
//! (or upgraded) process can resume jobs written by an older one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::progress::phase::MigrationPhase;

/// Default number of records per pipeline batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default per-record retry budget.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default overall job timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 6 * 3600;

/// Immutable configuration of one migration job.
///
/// Created once at submission and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationJobConfig {
    /// Unique job identifier. Callers must generate a fresh one per run.
    pub job_id: String,
    /// Owning user.
    pub user_id: String,
    /// Name of the source archive to migrate from.
    pub archive_name: String,
    /// Destination collection in the bibliography store.
    pub collection_id: String,
    /// Optional subtree path to scope discovery to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtree: Option<String>,
    /// Re-migrate records that were already synced in a previous run.
    #[serde(default)]
    pub force_resync: bool,
    /// Records per batch.
    pub batch_size: usize,
    /// Per-record retry budget.
    pub max_retries: u32,
    /// Overall job timeout in seconds.
    pub timeout_secs: u64,
}

impl MigrationJobConfig {
    pub fn new(job_id: &str, user_id: &str, archive_name: &str, collection_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            user_id: user_id.to_string(),
            archive_name: archive_name.to_string(),
            collection_id: collection_id.to_string(),
            subtree: None,
            force_resync: false,
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_subtree(mut self, subtree: &str) -> Self {
        self.subtree = Some(subtree.to_string());
        self
    }

    pub fn with_force_resync(mut self, force: bool) -> Self {
        self.force_resync = force;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// A failed record entry: the error that was captured and when.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailedRecord {
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl FailedRecord {
    pub fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Advisory liveness marker: what a driver is working on right now.
/// Stored outside the progress snapshot so parallel workers can update it
/// without touching authoritative job state; a crash loses at most this.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LiveMarker {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_record: Option<String>,
    #[serde(default)]
    pub current_batch: u64,
}

/// The authoritative progress snapshot of one migration job.
///
/// Counters are always recomputed from the record sets in the store, never
/// incremented in memory, so they stay correct across crashes and across
/// concurrent completions from parallel workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProgress {
    pub job_id: String,
    pub phase: MigrationPhase,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    pub total_records: u64,
    pub processed_records: u64,
    pub completed_records: u64,
    pub failed_records: u64,
    pub skipped_records: u64,
    /// Advisory "currently working on" marker; may lag behind reality.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_record: Option<String>,
    pub current_batch: u64,
    pub records_per_minute: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_minutes_remaining: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub error_count: u64,
    /// Phase-specific annotations (directories mapped, summaries generated, ...).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl MigrationProgress {
    pub fn new(job_id: &str) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.to_string(),
            phase: MigrationPhase::Initializing,
            started_at: now,
            updated_at: now,
            estimated_completion: None,
            total_records: 0,
            processed_records: 0,
            completed_records: 0,
            failed_records: 0,
            skipped_records: 0,
            current_record: None,
            current_batch: 0,
            records_per_minute: 0.0,
            estimated_minutes_remaining: None,
            last_error: None,
            error_count: 0,
            metadata: HashMap::new(),
        }
    }

    /// Recomputes the derived counters from authoritative set cardinalities
    /// and stamps the snapshot as updated.
    pub fn recompute(&mut self, completed: u64, failed: u64, now: DateTime<Utc>) {
        self.refresh_derived(completed, failed, now);
        self.updated_at = now;
    }

    /// Refreshes every derived field (counters, throughput, ETA) without
    /// touching `updated_at`; used when repairing a snapshot on read.
    ///
    /// Throughput is measured over the whole job runtime; the ETA is only
    /// present once throughput is nonzero.
    pub fn refresh_derived(&mut self, completed: u64, failed: u64, now: DateTime<Utc>) {
        self.completed_records = completed;
        self.failed_records = failed;
        self.processed_records = completed + failed;

        let elapsed_minutes = (now - self.started_at).num_milliseconds() as f64 / 60_000.0;
        if elapsed_minutes > 0.0 && self.processed_records > 0 {
            self.records_per_minute = self.processed_records as f64 / elapsed_minutes;
        }

        let pending = self
            .total_records
            .saturating_sub(self.processed_records);
        if self.records_per_minute > 0.0 && pending > 0 {
            let minutes = pending as f64 / self.records_per_minute;
            self.estimated_minutes_remaining = Some(minutes);
            self.estimated_completion =
                Some(now + chrono::Duration::milliseconds((minutes * 60_000.0) as i64));
        } else {
            self.estimated_minutes_remaining = None;
            self.estimated_completion = None;
        }
    }

    /// Pending records not yet processed.
    pub fn pending_records(&self) -> u64 {
        self.total_records.saturating_sub(self.processed_records)
    }

    /// True if the job finished its phases but some records failed.
    pub fn completed_with_errors(&self) -> bool {
        self.phase == MigrationPhase::Completed && self.failed_records > 0
    }
}

/// Compact per-job view for `list_jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: String,
    pub user_id: String,
    pub archive_name: String,
    pub phase: MigrationPhase,
    pub total_records: u64,
    pub completed_records: u64,
    pub failed_records: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobSummary {
    pub fn from_parts(config: &MigrationJobConfig, progress: &MigrationProgress) -> Self {
        Self {
            job_id: config.job_id.clone(),
            user_id: config.user_id.clone(),
            archive_name: config.archive_name.clone(),
            phase: progress.phase,
            total_records: progress.total_records,
            completed_records: progress.completed_records,
            failed_records: progress.failed_records,
            started_at: progress.started_at,
            updated_at: progress.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MigrationJobConfig::new("job-1", "user-1", "arxiv-mirror", "col-1");
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert!(!config.force_resync);
        assert!(config.subtree.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = MigrationJobConfig::new("job-1", "user-1", "arxiv-mirror", "col-1")
            .with_subtree("/physics/2024")
            .with_force_resync(true)
            .with_batch_size(0);
        assert_eq!(config.subtree.as_deref(), Some("/physics/2024"));
        assert!(config.force_resync);
        // batch size is clamped to at least 1
        assert_eq!(config.batch_size, 1);
    }

    #[test]
    fn test_config_wire_round_trip() {
        let config = MigrationJobConfig::new("job-1", "user-1", "arxiv-mirror", "col-1");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"jobId\":\"job-1\""));
        let back: MigrationJobConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, "job-1");
        assert_eq!(back.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_recompute_counters() {
        let mut progress = MigrationProgress::new("job-1");
        progress.total_records = 100;

        let later = progress.started_at + chrono::Duration::minutes(2);
        progress.recompute(30, 10, later);

        assert_eq!(progress.completed_records, 30);
        assert_eq!(progress.failed_records, 10);
        assert_eq!(progress.processed_records, 40);
        assert_eq!(progress.pending_records(), 60);
        assert!((progress.records_per_minute - 20.0).abs() < 0.01);
        let eta = progress.estimated_minutes_remaining.unwrap();
        assert!((eta - 3.0).abs() < 0.01);
        assert!(progress.estimated_completion.is_some());
    }

    #[test]
    fn test_recompute_no_eta_when_done() {
        let mut progress = MigrationProgress::new("job-1");
        progress.total_records = 10;

        let later = progress.started_at + chrono::Duration::minutes(1);
        progress.recompute(8, 2, later);

        assert_eq!(progress.pending_records(), 0);
        assert!(progress.estimated_minutes_remaining.is_none());
        assert!(progress.estimated_completion.is_none());
    }

    #[test]
    fn test_completed_with_errors() {
        let mut progress = MigrationProgress::new("job-1");
        progress.phase = MigrationPhase::Completed;
        progress.failed_records = 1;
        assert!(progress.completed_with_errors());

        progress.failed_records = 0;
        assert!(!progress.completed_with_errors());

        progress.phase = MigrationPhase::Failed;
        progress.failed_records = 1;
        assert!(!progress.completed_with_errors());
    }

    #[test]
    fn test_progress_wire_round_trip() {
        let mut progress = MigrationProgress::new("job-1");
        progress.metadata.insert(
            "directoriesMapped".to_string(),
            serde_json::Value::from(12u64),
        );

        let json = serde_json::to_string(&progress).unwrap();
        assert!(json.contains("\"phase\":\"initializing\""));
        let back: MigrationProgress = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, "job-1");
        assert_eq!(back.phase, MigrationPhase::Initializing);
        assert_eq!(
            back.metadata.get("directoriesMapped"),
            Some(&serde_json::Value::from(12u64))
        );
    }
}
