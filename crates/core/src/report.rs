use serde::{Deserialize, Serialize};

use crate::conflict::{Conflict, ConflictStatistics};
use crate::metadata::BackupMetadata;
use crate::records::EntityKind;

/// Outcome of checking an archive against the live store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub metadata: Option<BackupMetadata>,
    pub conflicts: Vec<Conflict>,
    pub statistics: ConflictStatistics,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Counters accumulated over one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStatistics {
    pub settings: usize,
    pub people: usize,
    pub users: usize,
    pub relationships: usize,
    pub suggestions: usize,
    pub audit_logs: usize,
    pub photos: usize,
    pub conflicts_resolved: usize,
    pub skipped_items: usize,
}

impl ImportStatistics {
    pub fn record_import(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Settings => self.settings += 1,
            EntityKind::Person => self.people += 1,
            EntityKind::Account => self.users += 1,
            EntityKind::Relationship => self.relationships += 1,
            EntityKind::Suggestion => self.suggestions += 1,
            EntityKind::AuditLog => self.audit_logs += 1,
            EntityKind::Photo => self.photos += 1,
        }
    }

    pub fn imported(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Settings => self.settings,
            EntityKind::Person => self.people,
            EntityKind::Account => self.users,
            EntityKind::Relationship => self.relationships,
            EntityKind::Suggestion => self.suggestions,
            EntityKind::AuditLog => self.audit_logs,
            EntityKind::Photo => self.photos,
        }
    }

    pub fn total_imported(&self) -> usize {
        self.settings
            + self.people
            + self.users
            + self.relationships
            + self.suggestions
            + self.audit_logs
            + self.photos
    }
}

/// Result of committing an archive. Always produced, even when individual
/// records failed; callers decide whether `errors` means overall failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub statistics: ImportStatistics,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}
