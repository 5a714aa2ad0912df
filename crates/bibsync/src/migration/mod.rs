pub mod orchestrator;
pub mod service;

pub use orchestrator::MigrationOrchestrator;
pub use service::{MigrationRequest, MigrationService};
