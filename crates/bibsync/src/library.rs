//! Bibliography persistence collaborator.
//!
//! The relational store itself lives outside this engine; the orchestrator
//! only needs the narrow surface below. `MemoryLibraryStore` backs the test
//! suite and doubles as a single-process stand-in.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::LibraryError;
use crate::extract::DocumentMetadata;

/// A destination collection reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRef {
    pub id: String,
    pub owner_id: String,
    pub name: String,
}

/// A migrated bibliography entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperEntity {
    pub id: String,
    /// Identifier of the archive record this entity was migrated from.
    pub source_record_id: String,
    pub collection_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaperEntity {
    /// Builds an entity from an archive record plus extracted metadata.
    pub fn from_extraction(
        source_record_id: &str,
        collection_id: &str,
        fallback_title: &str,
        metadata: DocumentMetadata,
        full_text: Option<String>,
    ) -> Self {
        Self {
            id: format!("paper-{}", uuid::Uuid::new_v4()),
            source_record_id: source_record_id.to_string(),
            collection_id: collection_id.to_string(),
            title: metadata
                .title
                .unwrap_or_else(|| fallback_title.to_string()),
            authors: metadata.authors,
            abstract_text: metadata.abstract_text,
            year: metadata.year,
            doi: metadata.doi,
            full_text,
            summary: None,
            created_at: Utc::now(),
        }
    }
}

/// Persistence surface the migration engine requires.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    async fn collection(&self, collection_id: &str)
        -> Result<Option<CollectionRef>, LibraryError>;

    async fn find_by_source_id(
        &self,
        user_id: &str,
        source_record_id: &str,
    ) -> Result<Option<PaperEntity>, LibraryError>;

    async fn insert_paper(&self, user_id: &str, entity: PaperEntity)
        -> Result<(), LibraryError>;

    async fn set_summary(
        &self,
        user_id: &str,
        source_record_id: &str,
        summary: &str,
    ) -> Result<(), LibraryError>;

    /// Archive record identifiers already synced for this user; used to
    /// make non-forced re-runs strictly additive.
    async fn synced_source_ids(&self, user_id: &str) -> Result<HashSet<String>, LibraryError>;
}

#[derive(Default)]
struct MemoryLibraryState {
    collections: HashMap<String, CollectionRef>,
    /// (user_id, source_record_id) → entity
    papers: HashMap<(String, String), PaperEntity>,
}

/// In-memory library store.
#[derive(Default, Clone)]
pub struct MemoryLibraryStore {
    state: Arc<RwLock<MemoryLibraryState>>,
}

impl MemoryLibraryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_collection(&self, id: &str, owner_id: &str, name: &str) {
        let mut state = self.state.write().await;
        state.collections.insert(
            id.to_string(),
            CollectionRef {
                id: id.to_string(),
                owner_id: owner_id.to_string(),
                name: name.to_string(),
            },
        );
    }

    pub async fn paper_count(&self, user_id: &str) -> usize {
        let state = self.state.read().await;
        state.papers.keys().filter(|(u, _)| u == user_id).count()
    }
}

#[async_trait]
impl LibraryStore for MemoryLibraryStore {
    async fn collection(
        &self,
        collection_id: &str,
    ) -> Result<Option<CollectionRef>, LibraryError> {
        let state = self.state.read().await;
        Ok(state.collections.get(collection_id).cloned())
    }

    async fn find_by_source_id(
        &self,
        user_id: &str,
        source_record_id: &str,
    ) -> Result<Option<PaperEntity>, LibraryError> {
        let state = self.state.read().await;
        Ok(state
            .papers
            .get(&(user_id.to_string(), source_record_id.to_string()))
            .cloned())
    }

    async fn insert_paper(
        &self,
        user_id: &str,
        entity: PaperEntity,
    ) -> Result<(), LibraryError> {
        let mut state = self.state.write().await;
        state
            .papers
            .insert((user_id.to_string(), entity.source_record_id.clone()), entity);
        Ok(())
    }

    async fn set_summary(
        &self,
        user_id: &str,
        source_record_id: &str,
        summary: &str,
    ) -> Result<(), LibraryError> {
        let mut state = self.state.write().await;
        let key = (user_id.to_string(), source_record_id.to_string());
        match state.papers.get_mut(&key) {
            Some(entity) => {
                entity.summary = Some(summary.to_string());
                Ok(())
            }
            None => Err(LibraryError::Backend(format!(
                "no entity for source record {source_record_id}"
            ))),
        }
    }

    async fn synced_source_ids(&self, user_id: &str) -> Result<HashSet<String>, LibraryError> {
        let state = self.state.read().await;
        Ok(state
            .papers
            .keys()
            .filter(|(u, _)| u == user_id)
            .map(|(_, source_id)| source_id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = MemoryLibraryStore::new();
        let entity = PaperEntity::from_extraction(
            "rec-1",
            "col-1",
            "fallback.pdf",
            DocumentMetadata {
                title: Some("A Title".to_string()),
                ..Default::default()
            },
            Some("body".to_string()),
        );
        store.insert_paper("user-1", entity).await.unwrap();

        let found = store.find_by_source_id("user-1", "rec-1").await.unwrap();
        assert_eq!(found.unwrap().title, "A Title");
        // scoped per user
        assert!(store
            .find_by_source_id("user-2", "rec-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_fallback_title() {
        let entity = PaperEntity::from_extraction(
            "rec-1",
            "col-1",
            "scan-042.pdf",
            DocumentMetadata::default(),
            None,
        );
        assert_eq!(entity.title, "scan-042.pdf");
    }

    #[tokio::test]
    async fn test_set_summary() {
        let store = MemoryLibraryStore::new();
        let entity = PaperEntity::from_extraction(
            "rec-1",
            "col-1",
            "f.pdf",
            DocumentMetadata::default(),
            None,
        );
        store.insert_paper("user-1", entity).await.unwrap();

        store
            .set_summary("user-1", "rec-1", "Short summary.")
            .await
            .unwrap();
        let found = store
            .find_by_source_id("user-1", "rec-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.summary.as_deref(), Some("Short summary."));

        assert!(store.set_summary("user-1", "ghost", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_synced_source_ids() {
        let store = MemoryLibraryStore::new();
        for rec in ["rec-1", "rec-2"] {
            let entity = PaperEntity::from_extraction(
                rec,
                "col-1",
                rec,
                DocumentMetadata::default(),
                None,
            );
            store.insert_paper("user-1", entity).await.unwrap();
        }

        let synced = store.synced_source_ids("user-1").await.unwrap();
        assert_eq!(synced.len(), 2);
        assert!(synced.contains("rec-1"));
        assert!(store.synced_source_ids("user-2").await.unwrap().is_empty());
    }
}
