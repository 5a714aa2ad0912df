//! Redis-backed progress store.
//!
//! One job maps to the keys in [`crate::progress::store::keys`]: the config
//! and progress JSON blobs, the *all* and *completed* sets, the *failed*
//! hash, and the volatile liveness marker. Every job key carries the
//! retention TTL so finished jobs are eventually reclaimed without an
//! explicit cleanup pass.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::StoreError;
use crate::progress::store::{keys, ProgressStore, DEFAULT_RETENTION};

/// Progress store over a Redis-compatible server.
#[derive(Clone)]
pub struct RedisProgressStore {
    manager: ConnectionManager,
    retention: Duration,
}

impl RedisProgressStore {
    /// Connects to the given Redis URL with the default 7-day retention.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::connect_with_retention(url, DEFAULT_RETENTION).await
    }

    pub async fn connect_with_retention(
        url: &str,
        retention: Duration,
    ) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let manager = ConnectionManager::new(client).await.map_err(unavailable)?;
        Ok(Self { manager, retention })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Refreshes the retention TTL on every key of a job.
    async fn touch(&self, job_id: &str) -> Result<(), StoreError> {
        let mut con = self.conn();
        let ttl = self.retention.as_secs() as i64;
        let job_keys = [
            keys::config(job_id),
            keys::progress(job_id),
            keys::all(job_id),
            keys::completed(job_id),
            keys::failed(job_id),
        ];
        for key in &job_keys {
            let _: bool = con.expire(key, ttl).await.map_err(unavailable)?;
        }
        Ok(())
    }
}

fn unavailable(e: redis::RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl ProgressStore for RedisProgressStore {
    async fn create_config(&self, job_id: &str, config_json: &str) -> Result<(), StoreError> {
        let mut con = self.conn();
        let created: bool = con
            .set_nx(keys::config(job_id), config_json)
            .await
            .map_err(unavailable)?;
        if !created {
            return Err(StoreError::AlreadyExists {
                job_id: job_id.to_string(),
            });
        }
        let _: i64 = con
            .sadd(keys::JOB_INDEX, job_id)
            .await
            .map_err(unavailable)?;
        self.touch(job_id).await
    }

    async fn get_config(&self, job_id: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.conn();
        con.get(keys::config(job_id)).await.map_err(unavailable)
    }

    async fn put_progress(&self, job_id: &str, progress_json: &str) -> Result<(), StoreError> {
        let mut con = self.conn();
        let _: () = con
            .set_ex(
                keys::progress(job_id),
                progress_json,
                self.retention.as_secs(),
            )
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn get_progress(&self, job_id: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.conn();
        con.get(keys::progress(job_id)).await.map_err(unavailable)
    }

    async fn replace_all_set(&self, job_id: &str, ids: &[String]) -> Result<(), StoreError> {
        let mut con = self.conn();
        let key = keys::all(job_id);
        let mut pipe = redis::pipe();
        pipe.atomic().del(&key);
        if !ids.is_empty() {
            pipe.sadd(&key, ids);
        }
        let _: () = pipe.query_async(&mut con).await.map_err(unavailable)?;
        self.touch(job_id).await
    }

    async fn all_records(&self, job_id: &str) -> Result<HashSet<String>, StoreError> {
        let mut con = self.conn();
        con.smembers(keys::all(job_id)).await.map_err(unavailable)
    }

    async fn add_completed(&self, job_id: &str, record_id: &str) -> Result<(), StoreError> {
        let mut con = self.conn();
        let _: i64 = con
            .sadd(keys::completed(job_id), record_id)
            .await
            .map_err(unavailable)?;
        let ttl = self.retention.as_secs() as i64;
        let _: bool = con
            .expire(keys::completed(job_id), ttl)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn completed_records(&self, job_id: &str) -> Result<HashSet<String>, StoreError> {
        let mut con = self.conn();
        con.smembers(keys::completed(job_id))
            .await
            .map_err(unavailable)
    }

    async fn completed_count(&self, job_id: &str) -> Result<u64, StoreError> {
        let mut con = self.conn();
        con.scard(keys::completed(job_id))
            .await
            .map_err(unavailable)
    }

    async fn is_completed(&self, job_id: &str, record_id: &str) -> Result<bool, StoreError> {
        let mut con = self.conn();
        con.sismember(keys::completed(job_id), record_id)
            .await
            .map_err(unavailable)
    }

    async fn put_failed(
        &self,
        job_id: &str,
        record_id: &str,
        entry_json: &str,
    ) -> Result<(), StoreError> {
        let mut con = self.conn();
        let _: i64 = con
            .hset(keys::failed(job_id), record_id, entry_json)
            .await
            .map_err(unavailable)?;
        let ttl = self.retention.as_secs() as i64;
        let _: bool = con
            .expire(keys::failed(job_id), ttl)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn remove_failed(&self, job_id: &str, record_id: &str) -> Result<(), StoreError> {
        let mut con = self.conn();
        let _: i64 = con
            .hdel(keys::failed(job_id), record_id)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn failed_records(&self, job_id: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut con = self.conn();
        con.hgetall(keys::failed(job_id)).await.map_err(unavailable)
    }

    async fn failed_count(&self, job_id: &str) -> Result<u64, StoreError> {
        let mut con = self.conn();
        con.hlen(keys::failed(job_id)).await.map_err(unavailable)
    }

    async fn is_failed(&self, job_id: &str, record_id: &str) -> Result<bool, StoreError> {
        let mut con = self.conn();
        con.hexists(keys::failed(job_id), record_id)
            .await
            .map_err(unavailable)
    }

    async fn put_live(&self, job_id: &str, live_json: &str) -> Result<(), StoreError> {
        let mut con = self.conn();
        let _: () = con
            .set_ex(keys::live(job_id), live_json, self.retention.as_secs())
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn get_live(&self, job_id: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.conn();
        con.get(keys::live(job_id)).await.map_err(unavailable)
    }

    async fn clear_live(&self, job_id: &str) -> Result<(), StoreError> {
        let mut con = self.conn();
        let _: i64 = con.del(keys::live(job_id)).await.map_err(unavailable)?;
        Ok(())
    }

    async fn job_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut con = self.conn();
        let mut ids: Vec<String> = con.smembers(keys::JOB_INDEX).await.map_err(unavailable)?;
        ids.sort();
        Ok(ids)
    }

    async fn delete_job(&self, job_id: &str) -> Result<(), StoreError> {
        let mut con = self.conn();
        let job_keys = vec![
            keys::config(job_id),
            keys::progress(job_id),
            keys::all(job_id),
            keys::completed(job_id),
            keys::failed(job_id),
            keys::live(job_id),
        ];
        let _: i64 = con.del(job_keys).await.map_err(unavailable)?;
        let _: i64 = con
            .srem(keys::JOB_INDEX, job_id)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
