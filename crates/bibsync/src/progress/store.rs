//! The durable progress store contract.
//!
//! The store is deliberately narrow: string blobs for config and progress,
//! two identifier sets, one failure hash, and a job index. Everything the
//! tracker derives (pending set, counters, throughput) is recomputed from
//! these primitives so the store can never drift from itself.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// Retention applied to all keys of a job (default 7 days).
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 3600);

/// Key layout shared by all store backends.
///
/// Kept in one place so the wire format stays stable across versions.
pub mod keys {
    /// Index set of all known job identifiers.
    pub const JOB_INDEX: &str = "bibsync:jobs";

    pub fn config(job_id: &str) -> String {
        format!("bibsync:job:{job_id}:config")
    }

    pub fn progress(job_id: &str) -> String {
        format!("bibsync:job:{job_id}:progress")
    }

    pub fn all(job_id: &str) -> String {
        format!("bibsync:job:{job_id}:all")
    }

    pub fn completed(job_id: &str) -> String {
        format!("bibsync:job:{job_id}:completed")
    }

    pub fn failed(job_id: &str) -> String {
        format!("bibsync:job:{job_id}:failed")
    }

    pub fn live(job_id: &str) -> String {
        format!("bibsync:job:{job_id}:live")
    }
}

/// Durable, shared key/value store backing all job state.
///
/// All mutation goes through atomic per-record operations (set-add,
/// hash-field-set); aggregate counters are never stored read-modify-write.
/// Implementations must not silently lose updates: an operation either
/// succeeds durably or returns `StoreError::Unavailable` for the caller to
/// retry.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Persists the immutable config blob. Fails with `AlreadyExists` when
    /// the job identifier is reused.
    async fn create_config(&self, job_id: &str, config_json: &str) -> Result<(), StoreError>;

    async fn get_config(&self, job_id: &str) -> Result<Option<String>, StoreError>;

    /// Overwrites the progress snapshot blob.
    async fn put_progress(&self, job_id: &str, progress_json: &str) -> Result<(), StoreError>;

    async fn get_progress(&self, job_id: &str) -> Result<Option<String>, StoreError>;

    /// Replaces the *all* set with the given identifiers.
    async fn replace_all_set(&self, job_id: &str, ids: &[String]) -> Result<(), StoreError>;

    async fn all_records(&self, job_id: &str) -> Result<HashSet<String>, StoreError>;

    async fn add_completed(&self, job_id: &str, record_id: &str) -> Result<(), StoreError>;

    async fn completed_records(&self, job_id: &str) -> Result<HashSet<String>, StoreError>;

    async fn completed_count(&self, job_id: &str) -> Result<u64, StoreError>;

    async fn is_completed(&self, job_id: &str, record_id: &str) -> Result<bool, StoreError>;

    /// Sets the failure entry (JSON `{error, timestamp}`) for a record.
    async fn put_failed(
        &self,
        job_id: &str,
        record_id: &str,
        entry_json: &str,
    ) -> Result<(), StoreError>;

    async fn remove_failed(&self, job_id: &str, record_id: &str) -> Result<(), StoreError>;

    async fn failed_records(&self, job_id: &str) -> Result<HashMap<String, String>, StoreError>;

    async fn failed_count(&self, job_id: &str) -> Result<u64, StoreError>;

    async fn is_failed(&self, job_id: &str, record_id: &str) -> Result<bool, StoreError>;

    /// Overwrites the advisory liveness marker (currently-processing record
    /// and batch). Volatile; no durability guarantee is required, and the
    /// marker never participates in resume decisions.
    async fn put_live(&self, job_id: &str, live_json: &str) -> Result<(), StoreError>;

    async fn get_live(&self, job_id: &str) -> Result<Option<String>, StoreError>;

    async fn clear_live(&self, job_id: &str) -> Result<(), StoreError>;

    /// All known job identifiers (for `list_jobs`).
    async fn job_ids(&self) -> Result<Vec<String>, StoreError>;

    /// Removes every key belonging to a job, including its index entry.
    async fn delete_job(&self, job_id: &str) -> Result<(), StoreError>;
}
