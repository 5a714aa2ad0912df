pub mod memory;
pub mod phase;
pub mod redis;
pub mod store;
pub mod tracker;
pub mod types;

pub use memory::MemoryProgressStore;
pub use phase::MigrationPhase;
pub use self::redis::RedisProgressStore;
pub use store::{ProgressStore, DEFAULT_RETENTION};
pub use tracker::ProgressTracker;
pub use types::{
    FailedRecord, JobSummary, MigrationJobConfig, MigrationProgress, DEFAULT_BATCH_SIZE,
};
