pub mod client;
pub mod fake;
pub mod http;
pub mod types;

pub use client::ArchiveClient;
pub use fake::FakeArchive;
pub use http::HttpArchiveClient;
pub use types::{ArchiveRecord, ArchiveSource, RecordProperties};
