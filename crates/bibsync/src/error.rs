use thiserror::Error;

#[derive(Error, Debug)]
pub enum BibsyncError {
    #[error("Progress store error: {0}")]
    Store(#[from] StoreError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

/// Errors from the durable progress store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Job '{job_id}' not found")]
    NotFound { job_id: String },

    #[error("Job '{job_id}' already exists")]
    AlreadyExists { job_id: String },

    #[error("Progress store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Failed to serialize job state: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive unavailable: {0}")]
    Unavailable(String),

    #[error("Source '{0}' not found")]
    SourceNotFound(String),

    #[error("Record '{0}' not found")]
    RecordNotFound(String),

    #[error("Archive request failed: {0}")]
    Request(String),

    #[error("Failed to decode archive response: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to parse PDF: {0}")]
    PdfParsing(String),

    #[error("Text extraction failed: {0}")]
    TextExtraction(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContent(String),
}

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("Collection '{collection_id}' is not owned by user '{user_id}'")]
    NotOwned {
        collection_id: String,
        user_id: String,
    },

    #[error("Persistence conflict: {0}")]
    Conflict(String),

    #[error("Library backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Indexing backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("Summarization backend error: {0}")]
    Backend(String),

    #[error("Summarization request failed: {0}")]
    Request(String),
}

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Prerequisite check failed: {0}")]
    Prerequisite(String),

    #[error("Job '{job_id}' cannot be resumed from phase {phase}")]
    NotResumable { job_id: String, phase: String },

    #[error("Job '{job_id}' is already being driven (phase {phase})")]
    AlreadyActive { job_id: String, phase: String },
}

pub type Result<T> = std::result::Result<T, BibsyncError>;
