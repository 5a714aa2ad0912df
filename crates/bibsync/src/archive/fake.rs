//! In-memory fake archive for tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::archive::client::ArchiveClient;
use crate::archive::types::{ArchiveRecord, ArchiveSource, RecordProperties};
use crate::error::ArchiveError;

fn parent_path(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => String::new(),
        Some(idx) => path[..idx].to_string(),
    }
}

#[derive(Default)]
struct Inner {
    available: bool,
    sources: Vec<ArchiveSource>,
    children: HashMap<String, Vec<ArchiveRecord>>,
    properties: HashMap<String, RecordProperties>,
    content: HashMap<String, Vec<u8>>,
    broken: HashMap<String, String>,
}

/// A scriptable archive: folders, records, and injectable failures.
pub struct FakeArchive {
    inner: RwLock<Inner>,
}

impl FakeArchive {
    pub fn new(source_name: &str) -> Self {
        let inner = Inner {
            available: true,
            sources: vec![ArchiveSource {
                name: source_name.to_string(),
                description: None,
            }],
            ..Default::default()
        };
        Self {
            inner: RwLock::new(inner),
        }
    }

    pub async fn set_available(&self, available: bool) {
        self.inner.write().await.available = available;
    }

    pub async fn add_folder(&self, path: &str) {
        let mut inner = self.inner.write().await;
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        let record = ArchiveRecord {
            id: format!("folder:{path}"),
            name,
            path: path.to_string(),
            is_folder: true,
            size: None,
            modified: None,
        };
        inner
            .children
            .entry(parent_path(path))
            .or_default()
            .push(record);
        inner.children.entry(path.to_string()).or_default();
    }

    pub async fn add_record(&self, folder: &str, id: &str, name: &str, content: &[u8]) {
        let mut inner = self.inner.write().await;
        let path = format!("{folder}/{name}");
        let record = ArchiveRecord {
            id: id.to_string(),
            name: name.to_string(),
            path: path.clone(),
            is_folder: false,
            size: Some(content.len() as u64),
            modified: None,
        };
        inner
            .children
            .entry(folder.to_string())
            .or_default()
            .push(record);

        let mut properties = RecordProperties::new(id, name, &path);
        properties.size = Some(content.len() as u64);
        inner.properties.insert(id.to_string(), properties);
        inner.content.insert(id.to_string(), content.to_vec());
    }

    /// Makes `get_content` fail for the record until healed.
    pub async fn break_record(&self, id: &str, error: &str) {
        self.inner
            .write()
            .await
            .broken
            .insert(id.to_string(), error.to_string());
    }

    pub async fn heal_record(&self, id: &str) {
        self.inner.write().await.broken.remove(id);
    }
}

#[async_trait]
impl ArchiveClient for FakeArchive {
    async fn is_available(&self) -> bool {
        self.inner.read().await.available
    }

    async fn list_open_sources(&self) -> Result<Vec<ArchiveSource>, ArchiveError> {
        let inner = self.inner.read().await;
        if !inner.available {
            return Err(ArchiveError::Unavailable("fake archive offline".into()));
        }
        Ok(inner.sources.clone())
    }

    async fn list_children(
        &self,
        path: &str,
        _source: &str,
    ) -> Result<Vec<ArchiveRecord>, ArchiveError> {
        let inner = self.inner.read().await;
        if !inner.available {
            return Err(ArchiveError::Unavailable("fake archive offline".into()));
        }
        let normalized = if path == "/" { "" } else { path };
        Ok(inner.children.get(normalized).cloned().unwrap_or_default())
    }

    async fn get_properties(&self, record_id: &str) -> Result<RecordProperties, ArchiveError> {
        let inner = self.inner.read().await;
        inner
            .properties
            .get(record_id)
            .cloned()
            .ok_or_else(|| ArchiveError::RecordNotFound(record_id.to_string()))
    }

    async fn get_content(&self, record_id: &str) -> Result<Vec<u8>, ArchiveError> {
        let inner = self.inner.read().await;
        if let Some(error) = inner.broken.get(record_id) {
            return Err(ArchiveError::Request(error.clone()));
        }
        inner
            .content
            .get(record_id)
            .cloned()
            .ok_or_else(|| ArchiveError::RecordNotFound(record_id.to_string()))
    }

    async fn search(
        &self,
        query: &str,
        _source: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ArchiveRecord>, ArchiveError> {
        let inner = self.inner.read().await;
        let needle = query.to_lowercase();
        let mut hits: Vec<ArchiveRecord> = inner
            .children
            .values()
            .flatten()
            .filter(|r| !r.is_folder && r.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(limit) = limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_folder_hierarchy() {
        let archive = FakeArchive::new("papers");
        archive.add_folder("/physics").await;
        archive.add_folder("/physics/2024").await;
        archive.add_record("/physics/2024", "rec-1", "qcd.pdf", b"pdf").await;

        let root = archive.list_children("", "papers").await.unwrap();
        assert_eq!(root.len(), 1);
        assert!(root[0].is_folder);

        let leaf = archive.list_children("/physics/2024", "papers").await.unwrap();
        assert_eq!(leaf.len(), 1);
        assert_eq!(leaf[0].id, "rec-1");
        assert!(!leaf[0].is_folder);
    }

    #[tokio::test]
    async fn test_break_and_heal_record() {
        let archive = FakeArchive::new("papers");
        archive.add_record("", "rec-1", "a.pdf", b"data").await;

        archive.break_record("rec-1", "connection reset").await;
        assert!(archive.get_content("rec-1").await.is_err());

        archive.heal_record("rec-1").await;
        assert_eq!(archive.get_content("rec-1").await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_search_matches_names() {
        let archive = FakeArchive::new("papers");
        archive.add_record("", "rec-1", "quantum.pdf", b"a").await;
        archive.add_record("", "rec-2", "biology.pdf", b"b").await;

        let hits = archive.search("quantum", "papers", None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "rec-1");
    }
}
