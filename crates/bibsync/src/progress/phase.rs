//! Migration job phases.

use serde::{Deserialize, Serialize};

/// Phase of a migration job.
///
/// Phases advance in declaration order during a normal run. `Paused` and
/// `Failed` are the only phases a job can be resumed from; `Completed` and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    Initializing,
    MappingDirectories,
    DiscoveringRecords,
    MigratingRecords,
    GeneratingSummaries,
    Completed,
    Failed,
    Paused,
    Cancelled,
}

impl MigrationPhase {
    /// True while the job is actively being driven.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            MigrationPhase::Initializing
                | MigrationPhase::MappingDirectories
                | MigrationPhase::DiscoveringRecords
                | MigrationPhase::MigratingRecords
                | MigrationPhase::GeneratingSummaries
        )
    }

    /// True once no driver will ever touch the job again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationPhase::Completed | MigrationPhase::Cancelled)
    }

    /// True if `resume` may re-enter record migration from this phase.
    pub fn is_resumable(&self) -> bool {
        matches!(self, MigrationPhase::Paused | MigrationPhase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationPhase::Initializing => "initializing",
            MigrationPhase::MappingDirectories => "mapping_directories",
            MigrationPhase::DiscoveringRecords => "discovering_records",
            MigrationPhase::MigratingRecords => "migrating_records",
            MigrationPhase::GeneratingSummaries => "generating_summaries",
            MigrationPhase::Completed => "completed",
            MigrationPhase::Failed => "failed",
            MigrationPhase::Paused => "paused",
            MigrationPhase::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationPhase::Initializing => write!(f, "Initializing"),
            MigrationPhase::MappingDirectories => write!(f, "Mapping directories"),
            MigrationPhase::DiscoveringRecords => write!(f, "Discovering records"),
            MigrationPhase::MigratingRecords => write!(f, "Migrating records"),
            MigrationPhase::GeneratingSummaries => write!(f, "Generating summaries"),
            MigrationPhase::Completed => write!(f, "Completed"),
            MigrationPhase::Failed => write!(f, "Failed"),
            MigrationPhase::Paused => write!(f, "Paused"),
            MigrationPhase::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_phases() {
        assert!(MigrationPhase::Initializing.is_active());
        assert!(MigrationPhase::MigratingRecords.is_active());
        assert!(MigrationPhase::GeneratingSummaries.is_active());
        assert!(!MigrationPhase::Paused.is_active());
        assert!(!MigrationPhase::Completed.is_active());
    }

    #[test]
    fn test_terminal_phases() {
        assert!(MigrationPhase::Completed.is_terminal());
        assert!(MigrationPhase::Cancelled.is_terminal());
        assert!(!MigrationPhase::Failed.is_terminal());
        assert!(!MigrationPhase::Paused.is_terminal());
    }

    #[test]
    fn test_resumable_phases() {
        assert!(MigrationPhase::Paused.is_resumable());
        assert!(MigrationPhase::Failed.is_resumable());
        assert!(!MigrationPhase::Completed.is_resumable());
        assert!(!MigrationPhase::MigratingRecords.is_resumable());
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&MigrationPhase::MigratingRecords).unwrap();
        assert_eq!(json, r#""migrating_records""#);
        let phase: MigrationPhase = serde_json::from_str(&json).unwrap();
        assert_eq!(phase, MigrationPhase::MigratingRecords);
    }
}
