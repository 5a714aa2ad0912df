//! In-memory progress store.
//!
//! Shares the exact semantics of the Redis backend minus durability and
//! TTL reclamation. Used by the test suite and as a single-process
//! fallback when no Redis endpoint is configured.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::progress::store::ProgressStore;

#[derive(Default)]
struct JobState {
    config: Option<String>,
    progress: Option<String>,
    all: HashSet<String>,
    completed: HashSet<String>,
    failed: HashMap<String, String>,
    live: Option<String>,
}

/// Progress store backed by process memory.
#[derive(Default, Clone)]
pub struct MemoryProgressStore {
    jobs: Arc<RwLock<HashMap<String, JobState>>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn create_config(&self, job_id: &str, config_json: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let state = jobs.entry(job_id.to_string()).or_default();
        if state.config.is_some() {
            return Err(StoreError::AlreadyExists {
                job_id: job_id.to_string(),
            });
        }
        state.config = Some(config_json.to_string());
        Ok(())
    }

    async fn get_config(&self, job_id: &str) -> Result<Option<String>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(job_id).and_then(|s| s.config.clone()))
    }

    async fn put_progress(&self, job_id: &str, progress_json: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let state = jobs.entry(job_id.to_string()).or_default();
        state.progress = Some(progress_json.to_string());
        Ok(())
    }

    async fn get_progress(&self, job_id: &str) -> Result<Option<String>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(job_id).and_then(|s| s.progress.clone()))
    }

    async fn replace_all_set(&self, job_id: &str, ids: &[String]) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let state = jobs.entry(job_id.to_string()).or_default();
        state.all = ids.iter().cloned().collect();
        Ok(())
    }

    async fn all_records(&self, job_id: &str) -> Result<HashSet<String>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(job_id).map(|s| s.all.clone()).unwrap_or_default())
    }

    async fn add_completed(&self, job_id: &str, record_id: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let state = jobs.entry(job_id.to_string()).or_default();
        state.completed.insert(record_id.to_string());
        Ok(())
    }

    async fn completed_records(&self, job_id: &str) -> Result<HashSet<String>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .get(job_id)
            .map(|s| s.completed.clone())
            .unwrap_or_default())
    }

    async fn completed_count(&self, job_id: &str) -> Result<u64, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(job_id).map(|s| s.completed.len() as u64).unwrap_or(0))
    }

    async fn is_completed(&self, job_id: &str, record_id: &str) -> Result<bool, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .get(job_id)
            .map(|s| s.completed.contains(record_id))
            .unwrap_or(false))
    }

    async fn put_failed(
        &self,
        job_id: &str,
        record_id: &str,
        entry_json: &str,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let state = jobs.entry(job_id.to_string()).or_default();
        state
            .failed
            .insert(record_id.to_string(), entry_json.to_string());
        Ok(())
    }

    async fn remove_failed(&self, job_id: &str, record_id: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if let Some(state) = jobs.get_mut(job_id) {
            state.failed.remove(record_id);
        }
        Ok(())
    }

    async fn failed_records(&self, job_id: &str) -> Result<HashMap<String, String>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .get(job_id)
            .map(|s| s.failed.clone())
            .unwrap_or_default())
    }

    async fn failed_count(&self, job_id: &str) -> Result<u64, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(job_id).map(|s| s.failed.len() as u64).unwrap_or(0))
    }

    async fn is_failed(&self, job_id: &str, record_id: &str) -> Result<bool, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .get(job_id)
            .map(|s| s.failed.contains_key(record_id))
            .unwrap_or(false))
    }

    async fn put_live(&self, job_id: &str, live_json: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let state = jobs.entry(job_id.to_string()).or_default();
        state.live = Some(live_json.to_string());
        Ok(())
    }

    async fn get_live(&self, job_id: &str) -> Result<Option<String>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(job_id).and_then(|s| s.live.clone()))
    }

    async fn clear_live(&self, job_id: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if let Some(state) = jobs.get_mut(job_id) {
            state.live = None;
        }
        Ok(())
    }

    async fn job_ids(&self) -> Result<Vec<String>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut ids: Vec<String> = jobs
            .iter()
            .filter(|(_, s)| s.config.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete_job(&self, job_id: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        jobs.remove(job_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_config_rejects_duplicate() {
        let store = MemoryProgressStore::new();
        store.create_config("job-1", "{}").await.unwrap();

        let err = store.create_config("job-1", "{}").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_set_operations_are_idempotent() {
        let store = MemoryProgressStore::new();
        store.add_completed("job-1", "rec-1").await.unwrap();
        store.add_completed("job-1", "rec-1").await.unwrap();

        assert_eq!(store.completed_count("job-1").await.unwrap(), 1);
        assert!(store.is_completed("job-1", "rec-1").await.unwrap());
        assert!(!store.is_completed("job-1", "rec-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_all_set() {
        let store = MemoryProgressStore::new();
        store
            .replace_all_set("job-1", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(store.all_records("job-1").await.unwrap().len(), 2);

        // force-resync re-discovery replaces, not merges
        store
            .replace_all_set("job-1", &["c".to_string()])
            .await
            .unwrap();
        let all = store.all_records("job-1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all.contains("c"));
    }

    #[tokio::test]
    async fn test_failed_hash_operations() {
        let store = MemoryProgressStore::new();
        store
            .put_failed("job-1", "rec-1", r#"{"error":"boom"}"#)
            .await
            .unwrap();
        assert_eq!(store.failed_count("job-1").await.unwrap(), 1);
        assert!(store.is_failed("job-1", "rec-1").await.unwrap());

        store.remove_failed("job-1", "rec-1").await.unwrap();
        assert_eq!(store.failed_count("job-1").await.unwrap(), 0);
        assert!(store.failed_records("job-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_job_index_lists_only_created_jobs() {
        let store = MemoryProgressStore::new();
        store.create_config("job-b", "{}").await.unwrap();
        store.create_config("job-a", "{}").await.unwrap();
        // progress writes alone do not register a job
        store.put_progress("orphan", "{}").await.unwrap();

        assert_eq!(store.job_ids().await.unwrap(), vec!["job-a", "job-b"]);
    }

    #[tokio::test]
    async fn test_delete_job_removes_everything() {
        let store = MemoryProgressStore::new();
        store.create_config("job-1", "{}").await.unwrap();
        store.add_completed("job-1", "rec-1").await.unwrap();

        store.delete_job("job-1").await.unwrap();

        assert!(store.get_config("job-1").await.unwrap().is_none());
        assert_eq!(store.completed_count("job-1").await.unwrap(), 0);
        assert!(store.job_ids().await.unwrap().is_empty());
    }
}
