//! Embedding/indexing collaborator interface.

use async_trait::async_trait;

use crate::error::IndexError;
use crate::library::PaperEntity;

/// Pushes a persisted entity into the vector index. Best-effort: a `false`
/// return or an error reduces search coverage but never fails the record.
#[async_trait]
pub trait EmbeddingIndexer: Send + Sync {
    async fn embed_and_index(&self, entity: &PaperEntity) -> Result<bool, IndexError>;
}

/// Indexer that accepts everything without doing anything.
pub struct NoopIndexer;

#[async_trait]
impl EmbeddingIndexer for NoopIndexer {
    async fn embed_and_index(&self, _entity: &PaperEntity) -> Result<bool, IndexError> {
        Ok(true)
    }
}
