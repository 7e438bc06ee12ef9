pub mod conflict;
pub mod error;
pub mod ids;
pub mod merge;
pub mod metadata;
pub mod options;
pub mod records;
pub mod report;

pub use conflict::{Conflict, ConflictAction, ConflictStatistics, Severity};
pub use error::CoreError;
pub use ids::*;
pub use merge::Resolve;
pub use metadata::{BackupMetadata, BackupStatistics, EntryMap, Operator};
pub use options::{ExportOptions, ResolutionStrategy};
pub use records::*;
pub use report::{ImportOutcome, ImportStatistics, ValidationReport};
