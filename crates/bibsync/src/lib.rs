pub mod archive;
pub mod error;
pub mod extract;
pub mod index;
pub mod library;
pub mod logging;
pub mod migration;
pub mod pipeline;
pub mod progress;
pub mod summarize;

pub use archive::{ArchiveClient, ArchiveRecord, ArchiveSource, FakeArchive, HttpArchiveClient};
pub use error::{
    ArchiveError, BibsyncError, ExtractError, IndexError, LibraryError, MigrationError, Result,
    StoreError, SummarizeError,
};
pub use extract::{ContentExtractor, DocumentMetadata, PdfExtractor, PlainTextExtractor};
pub use index::{EmbeddingIndexer, NoopIndexer};
pub use library::{CollectionRef, LibraryStore, MemoryLibraryStore, PaperEntity};
pub use migration::{MigrationOrchestrator, MigrationRequest, MigrationService};
pub use pipeline::{BatchOutcome, BatchPipeline};
pub use progress::{
    FailedRecord, JobSummary, MemoryProgressStore, MigrationJobConfig, MigrationPhase,
    MigrationProgress, ProgressStore, ProgressTracker, RedisProgressStore,
};
pub use summarize::{HttpSummarizer, StaticSummarizer, Summarizer};
