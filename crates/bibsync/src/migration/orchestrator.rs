//! The migration state machine.
//!
//! Drives a job through its ordered phases, checkpointing every phase and
//! every record outcome in the progress store so a restarted process can
//! pick up exactly where the previous one stopped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use log::{info, warn};
use tokio::sync::Semaphore;
use tracing::{info_span, Instrument};

use crate::archive::client::ArchiveClient;
use crate::archive::types::ArchiveRecord;
use crate::error::{ArchiveError, BibsyncError, MigrationError};
use crate::extract::ContentExtractor;
use crate::index::EmbeddingIndexer;
use crate::library::{LibraryStore, PaperEntity};
use crate::pipeline::batch::BatchPipeline;
use crate::progress::phase::MigrationPhase;
use crate::progress::store::ProgressStore;
use crate::progress::tracker::ProgressTracker;
use crate::progress::types::{MigrationJobConfig, MigrationProgress};
use crate::summarize::Summarizer;

/// Default concurrency of the summary pool. Deliberately independent of the
/// batch size: the summarizer saturates far earlier than the archive.
const DEFAULT_SUMMARY_CONCURRENCY: usize = 2;

/// Excerpt length handed to the summarizer.
const SUMMARY_EXCERPT_CHARS: usize = 4000;

/// Top-level migration driver.
///
/// All collaborators are injected at construction; the orchestrator holds
/// no ambient state and can be cloned per driver task.
#[derive(Clone)]
pub struct MigrationOrchestrator {
    tracker: ProgressTracker,
    pipeline: BatchPipeline,
    archive: Arc<dyn ArchiveClient>,
    extractor: Arc<dyn ContentExtractor>,
    indexer: Arc<dyn EmbeddingIndexer>,
    summarizer: Arc<dyn Summarizer>,
    library: Arc<dyn LibraryStore>,
    summary_concurrency: usize,
}

impl MigrationOrchestrator {
    pub fn new(
        tracker: ProgressTracker,
        archive: Arc<dyn ArchiveClient>,
        extractor: Arc<dyn ContentExtractor>,
        indexer: Arc<dyn EmbeddingIndexer>,
        summarizer: Arc<dyn Summarizer>,
        library: Arc<dyn LibraryStore>,
    ) -> Self {
        let pipeline = BatchPipeline::new(tracker.clone());
        Self {
            tracker,
            pipeline,
            archive,
            extractor,
            indexer,
            summarizer,
            library,
            summary_concurrency: DEFAULT_SUMMARY_CONCURRENCY,
        }
    }

    pub fn with_summary_concurrency(mut self, concurrency: usize) -> Self {
        self.summary_concurrency = concurrency.max(1);
        self
    }

    /// Replaces the batch pipeline (tests use one without inter-batch delay).
    pub fn with_pipeline(mut self, pipeline: BatchPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Drives a freshly created job through all phases.
    ///
    /// The job must still be at `Initializing`; a second driver finding it
    /// past that refuses to start, which makes the phase machinery the
    /// mutual exclusion between competing drivers.
    pub async fn run(&self, config: &MigrationJobConfig) -> Result<MigrationProgress, BibsyncError> {
        let job_id = &config.job_id;
        let span = info_span!("migration", job_id = %job_id, archive = %config.archive_name);

        async {
            let progress = self.tracker.get_progress(job_id).await?;
            if progress.phase != MigrationPhase::Initializing {
                return Err(BibsyncError::Migration(MigrationError::AlreadyActive {
                    job_id: job_id.clone(),
                    phase: progress.phase.as_str().to_string(),
                }));
            }

            // Phase 1: prerequisites. Any failure is fatal before record work.
            if let Err(reason) = self.validate_prerequisites(config).await {
                warn!("Job {} failed prerequisite validation: {}", job_id, reason);
                return Ok(self.tracker.fail(job_id, &reason.to_string()).await?);
            }

            // Phase 2: directory mapping, best-effort.
            self.map_directories(config).await?;

            // Phase 3+4: discovery and the already-synced filter.
            let records = match self.discover_records(config).await {
                Ok(records) => records,
                Err(e) => {
                    let reason = format!("Record discovery failed: {e}");
                    return Ok(self.tracker.fail(job_id, &reason).await?);
                }
            };

            // Phases 5-7.
            self.migrate_and_finish(config, &records).await
        }
        .instrument(span)
        .await
    }

    /// Continues a job after `resume`: recomputes pending and re-enters
    /// record migration with exactly that set, never re-touching completed
    /// identifiers.
    pub async fn run_from_pending(&self, job_id: &str) -> Result<MigrationProgress, BibsyncError> {
        let config = self.tracker.get_config(job_id).await?;
        let pending = self.tracker.get_pending(job_id).await?;
        info!("Resuming job {} with {} pending records", job_id, pending.len());
        self.migrate_and_finish(&config, &pending).await
    }

    /// Resumes a paused or failed job.
    pub async fn resume(&self, job_id: &str) -> Result<MigrationProgress, BibsyncError> {
        let progress = self.tracker.get_progress(job_id).await?;
        if !progress.phase.is_resumable() {
            return Err(BibsyncError::Migration(MigrationError::NotResumable {
                job_id: job_id.to_string(),
                phase: progress.phase.as_str().to_string(),
            }));
        }
        self.tracker.resume(job_id).await?;
        self.run_from_pending(job_id).await
    }

    /// Re-submits exactly the failed subset. Returns `false` when the
    /// failed map is empty.
    pub async fn retry_failed(&self, job_id: &str) -> Result<bool, BibsyncError> {
        let Some(ids) = self.begin_retry(job_id).await? else {
            return Ok(false);
        };
        self.run_retry(job_id, ids).await?;
        Ok(true)
    }

    /// Runs the migration tail for a retry set prepared by [`begin_retry`].
    ///
    /// [`begin_retry`]: MigrationOrchestrator::begin_retry
    pub async fn run_retry(
        &self,
        job_id: &str,
        ids: Vec<String>,
    ) -> Result<MigrationProgress, BibsyncError> {
        let config = self.tracker.get_config(job_id).await?;
        self.migrate_and_finish(&config, &ids).await
    }

    /// Clears the failed map and returns the identifiers to reprocess, or
    /// `None` when there is nothing to retry. This is the only path that
    /// removes entries from the failed map besides a successful retry.
    pub async fn begin_retry(&self, job_id: &str) -> Result<Option<Vec<String>>, BibsyncError> {
        let failed = self.tracker.get_failed(job_id).await?;
        if failed.is_empty() {
            return Ok(None);
        }
        let mut ids: Vec<String> = failed.into_keys().collect();
        ids.sort();

        self.tracker.clear_failed(job_id, &ids).await?;
        self.tracker
            .update_phase(job_id, MigrationPhase::MigratingRecords, None)
            .await?;
        info!("Retrying {} failed records on job {}", ids.len(), job_id);
        Ok(Some(ids))
    }

    // ─── Phases ─────────────────────────────────────────────────────────────

    async fn validate_prerequisites(
        &self,
        config: &MigrationJobConfig,
    ) -> Result<(), MigrationError> {
        if !self.archive.is_available().await {
            return Err(MigrationError::Prerequisite(format!(
                "Archive '{}' is unreachable",
                config.archive_name
            )));
        }

        let sources = self
            .archive
            .list_open_sources()
            .await
            .map_err(|e| MigrationError::Prerequisite(format!("Failed to list archive sources: {e}")))?;
        if !sources.iter().any(|s| s.name == config.archive_name) {
            return Err(MigrationError::Prerequisite(format!(
                "Source '{}' not found in archive",
                config.archive_name
            )));
        }

        let collection = self
            .library
            .collection(&config.collection_id)
            .await
            .map_err(|e| MigrationError::Prerequisite(format!("Failed to look up collection: {e}")))?
            .ok_or_else(|| {
                MigrationError::Prerequisite(format!(
                    "Collection '{}' does not exist",
                    config.collection_id
                ))
            })?;
        if collection.owner_id != config.user_id {
            return Err(MigrationError::Prerequisite(format!(
                "Collection '{}' is not owned by user '{}'",
                config.collection_id, config.user_id
            )));
        }
        Ok(())
    }

    /// Walks the full folder hierarchy and records it in phase metadata.
    /// Mapping is a navigation convenience; failure is logged and the job
    /// moves on.
    async fn map_directories(&self, config: &MigrationJobConfig) -> Result<(), BibsyncError> {
        let job_id = &config.job_id;
        self.tracker
            .update_phase(job_id, MigrationPhase::MappingDirectories, None)
            .await?;

        let metadata = match self.walk(config, "").await {
            Ok((folders, _)) => {
                info!("Mapped {} directories for job {}", folders.len(), job_id);
                let mut meta = std::collections::HashMap::new();
                meta.insert(
                    "directoriesMapped".to_string(),
                    serde_json::json!(folders.len()),
                );
                meta.insert("directoryTree".to_string(), serde_json::json!(folders));
                meta
            }
            Err(e) => {
                warn!("Directory mapping failed for job {}: {}", job_id, e);
                let mut meta = std::collections::HashMap::new();
                meta.insert(
                    "directoryMappingError".to_string(),
                    serde_json::json!(e.to_string()),
                );
                meta
            }
        };
        self.tracker
            .update_phase(job_id, MigrationPhase::MappingDirectories, Some(metadata))
            .await?;
        Ok(())
    }

    /// Discovers the record universe (scoped to the configured subtree),
    /// applies the already-synced filter, and finalizes the totals.
    async fn discover_records(
        &self,
        config: &MigrationJobConfig,
    ) -> Result<Vec<String>, BibsyncError> {
        let job_id = &config.job_id;
        self.tracker
            .update_phase(job_id, MigrationPhase::DiscoveringRecords, None)
            .await?;

        let root = config.subtree.as_deref().unwrap_or("");
        let (_, documents) = self.walk(config, root).await?;
        let mut ids: Vec<String> = documents.into_iter().map(|r| r.id).collect();
        info!("Discovered {} records for job {}", ids.len(), job_id);

        // Non-forced re-runs are strictly additive: drop everything a prior
        // successful sync already brought over, before totals are final.
        if !config.force_resync {
            let synced = self.library.synced_source_ids(&config.user_id).await?;
            let before = ids.len();
            ids.retain(|id| !synced.contains(id));
            let skipped = (before - ids.len()) as u64;
            if skipped > 0 {
                info!(
                    "Skipping {} already-synced records for job {}",
                    skipped, job_id
                );
                self.tracker.record_skipped(job_id, skipped).await?;
            }
        }

        self.tracker.set_total_records(job_id, &ids).await?;
        Ok(ids)
    }

    /// Runs record migration over `records`, then summary generation, then
    /// completion. Shared by fresh runs, resumes and retries.
    async fn migrate_and_finish(
        &self,
        config: &MigrationJobConfig,
        records: &[String],
    ) -> Result<MigrationProgress, BibsyncError> {
        let job_id = &config.job_id;
        self.tracker
            .update_phase(job_id, MigrationPhase::MigratingRecords, None)
            .await?;

        let index_shortfall = Arc::new(AtomicU64::new(0));
        let outcome = {
            let archive = Arc::clone(&self.archive);
            let extractor = Arc::clone(&self.extractor);
            let indexer = Arc::clone(&self.indexer);
            let library = Arc::clone(&self.library);
            let config = config.clone();
            let shortfall = Arc::clone(&index_shortfall);

            self.pipeline
                .run(job_id, config.batch_size, records, move |record_id| {
                    let archive = Arc::clone(&archive);
                    let extractor = Arc::clone(&extractor);
                    let indexer = Arc::clone(&indexer);
                    let library = Arc::clone(&library);
                    let config = config.clone();
                    let shortfall = Arc::clone(&shortfall);
                    async move {
                        migrate_record(
                            archive, extractor, indexer, library, &config, shortfall, record_id,
                        )
                        .await
                    }
                })
                .await?
        };

        if outcome.interrupted {
            info!("Job {} interrupted during record migration", job_id);
            return Ok(self.tracker.get_progress(job_id).await?);
        }

        let shortfall = index_shortfall.load(Ordering::Relaxed);
        if shortfall > 0 {
            let mut meta = std::collections::HashMap::new();
            meta.insert("indexShortfall".to_string(), serde_json::json!(shortfall));
            self.tracker
                .update_phase(job_id, MigrationPhase::MigratingRecords, Some(meta))
                .await?;
        }

        self.generate_summaries(config).await?;
        Ok(self.tracker.complete(job_id).await?)
    }

    /// Generates summaries for every completed record that does not have
    /// one yet, through a bounded pool. Individual failures land in phase
    /// metadata and never fail the job.
    async fn generate_summaries(&self, config: &MigrationJobConfig) -> Result<(), BibsyncError> {
        let job_id = &config.job_id;
        self.tracker
            .update_phase(job_id, MigrationPhase::GeneratingSummaries, None)
            .await?;

        let mut completed: Vec<String> = self
            .tracker
            .store()
            .completed_records(job_id)
            .await?
            .into_iter()
            .collect();
        completed.sort();

        let semaphore = Arc::new(Semaphore::new(self.summary_concurrency));
        let generated = Arc::new(AtomicU64::new(0));
        let failures = Arc::new(AtomicU64::new(0));

        let tasks = completed.into_iter().map(|record_id| {
            let semaphore = Arc::clone(&semaphore);
            let generated = Arc::clone(&generated);
            let failures = Arc::clone(&failures);
            let summarizer = Arc::clone(&self.summarizer);
            let library = Arc::clone(&self.library);
            let user_id = config.user_id.clone();
            let job_id = job_id.clone();
            async move {
                let permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let _permit = permit;
                match summarize_record(&*summarizer, &*library, &user_id, &record_id).await {
                    Ok(true) => {
                        generated.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(
                            "Summary generation failed for record {} on job {}: {}",
                            record_id, job_id, e
                        );
                        failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        });
        join_all(tasks).await;

        let mut meta = std::collections::HashMap::new();
        meta.insert(
            "summariesGenerated".to_string(),
            serde_json::json!(generated.load(Ordering::Relaxed)),
        );
        let failed = failures.load(Ordering::Relaxed);
        if failed > 0 {
            meta.insert("summaryFailures".to_string(), serde_json::json!(failed));
        }
        self.tracker
            .update_phase(job_id, MigrationPhase::GeneratingSummaries, Some(meta))
            .await?;
        Ok(())
    }

    /// Breadth-first walk from `start`, returning folder paths and document
    /// records in discovery order.
    async fn walk(
        &self,
        config: &MigrationJobConfig,
        start: &str,
    ) -> Result<(Vec<String>, Vec<ArchiveRecord>), ArchiveError> {
        let mut folders = Vec::new();
        let mut documents = Vec::new();
        let mut queue = VecDeque::from([start.to_string()]);
        let mut visited = std::collections::HashSet::new();

        while let Some(path) = queue.pop_front() {
            if !visited.insert(path.clone()) {
                continue;
            }
            let children = self
                .archive
                .list_children(&path, &config.archive_name)
                .await?;
            for child in children {
                if child.is_folder {
                    folders.push(child.path.clone());
                    queue.push_back(child.path);
                } else {
                    documents.push(child);
                }
            }
        }
        Ok((folders, documents))
    }
}

/// The per-record unit of work: fetch, extract, persist, index.
///
/// Idempotent: a record that already maps to a persisted entity is a no-op
/// success unless the job forces a resync. Transient failures are retried
/// up to the configured budget before the record is marked failed.
async fn migrate_record(
    archive: Arc<dyn ArchiveClient>,
    extractor: Arc<dyn ContentExtractor>,
    indexer: Arc<dyn EmbeddingIndexer>,
    library: Arc<dyn LibraryStore>,
    config: &MigrationJobConfig,
    index_shortfall: Arc<AtomicU64>,
    record_id: String,
) -> Result<(), String> {
    if !config.force_resync {
        let existing = library
            .find_by_source_id(&config.user_id, &record_id)
            .await
            .map_err(|e| e.to_string())?;
        if existing.is_some() {
            return Ok(());
        }
    }

    let mut last_error = String::new();
    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            log::debug!(
                "Retrying record {} (attempt {}/{})",
                record_id,
                attempt,
                config.max_retries
            );
        }
        match try_migrate_record(&*archive, &*extractor, &*library, config, &record_id).await {
            Ok(entity) => {
                match indexer.embed_and_index(&entity).await {
                    Ok(true) => {}
                    Ok(false) => {
                        index_shortfall.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        warn!("Indexing failed for record {}: {}", record_id, e);
                        index_shortfall.fetch_add(1, Ordering::Relaxed);
                    }
                }
                return Ok(());
            }
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}

async fn try_migrate_record(
    archive: &dyn ArchiveClient,
    extractor: &dyn ContentExtractor,
    library: &dyn LibraryStore,
    config: &MigrationJobConfig,
    record_id: &str,
) -> Result<PaperEntity, String> {
    let properties = archive
        .get_properties(record_id)
        .await
        .map_err(|e| e.to_string())?;
    let content = archive
        .get_content(record_id)
        .await
        .map_err(|e| e.to_string())?;

    let metadata = extractor
        .extract_metadata(&content)
        .map_err(|e| e.to_string())?;
    let text = extractor.extract_text(&content).map_err(|e| e.to_string())?;

    let entity = PaperEntity::from_extraction(
        record_id,
        &config.collection_id,
        &properties.name,
        metadata,
        Some(text),
    );
    library
        .insert_paper(&config.user_id, entity.clone())
        .await
        .map_err(|e| e.to_string())?;
    Ok(entity)
}

/// Summarizes one record if it still lacks a summary. Returns whether a
/// summary was written.
async fn summarize_record(
    summarizer: &dyn Summarizer,
    library: &dyn LibraryStore,
    user_id: &str,
    record_id: &str,
) -> Result<bool, String> {
    let entity = library
        .find_by_source_id(user_id, record_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("no persisted entity for record {record_id}"))?;

    if entity.summary.is_some() {
        return Ok(false);
    }

    let excerpt: Option<String> = entity
        .full_text
        .as_deref()
        .map(|t| t.chars().take(SUMMARY_EXCERPT_CHARS).collect());
    let summary = summarizer
        .summarize(
            &entity.title,
            entity.abstract_text.as_deref(),
            excerpt.as_deref(),
        )
        .await
        .map_err(|e| e.to_string())?;

    match summary {
        Some(summary) => {
            library
                .set_summary(user_id, record_id, &summary)
                .await
                .map_err(|e| e.to_string())?;
            Ok(true)
        }
        // "No summary available" is a valid outcome, not an error.
        None => Ok(false),
    }
}
