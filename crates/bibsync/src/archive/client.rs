//! The archive capability interface.

use async_trait::async_trait;

use crate::archive::types::{ArchiveRecord, ArchiveSource, RecordProperties};
use crate::error::ArchiveError;

/// Narrow client interface over the remote document archive.
///
/// The orchestrator treats any error as a per-call failure recorded against
/// the record being worked on; it never needs to distinguish transient from
/// permanent causes. Swap implementations behind this trait: HTTP for
/// production, [`crate::archive::FakeArchive`] for tests.
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// Cheap reachability probe used by prerequisite validation.
    async fn is_available(&self) -> bool;

    async fn list_open_sources(&self) -> Result<Vec<ArchiveSource>, ArchiveError>;

    /// Children of a folder path (`""` or `"/"` for the root).
    async fn list_children(
        &self,
        path: &str,
        source: &str,
    ) -> Result<Vec<ArchiveRecord>, ArchiveError>;

    async fn get_properties(&self, record_id: &str) -> Result<RecordProperties, ArchiveError>;

    async fn get_content(&self, record_id: &str) -> Result<Vec<u8>, ArchiveError>;

    async fn search(
        &self,
        query: &str,
        source: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ArchiveRecord>, ArchiveError>;
}
