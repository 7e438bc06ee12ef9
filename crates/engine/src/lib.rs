pub mod detect;
pub mod error;
pub mod gather;
pub mod resolve;
pub mod sections;
pub mod validate;

pub use detect::detect_conflicts;
pub use error::EngineError;
pub use gather::{gather_snapshot, ExportBundle};
pub use resolve::Importer;
pub use sections::{ArchiveSections, DecodedArchive};
pub use validate::{check_integrity, check_metadata, validate_entries};

use tracing::{info, warn};

use kinvault_core::{
    BackupMetadata, ExportOptions, ImportOutcome, Operator, ResolutionStrategy, ValidationReport,
};
use kinvault_storage::{ArchiveCodec, PhotoStore, RecordStore, TarZstdCodec};

/// A packed archive and the metadata written into it.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub metadata: BackupMetadata,
}

/// Backup and restore over one record store, one photo store and one
/// archive container format.
pub struct BackupEngine<S, P, C = TarZstdCodec> {
    store: S,
    photos: P,
    codec: C,
}

impl<S, P> BackupEngine<S, P, TarZstdCodec>
where
    S: RecordStore,
    P: PhotoStore,
{
    pub fn with_default_codec(store: S, photos: P) -> Self {
        Self::new(store, photos, TarZstdCodec::default())
    }
}

impl<S, P, C> BackupEngine<S, P, C>
where
    S: RecordStore,
    P: PhotoStore,
    C: ArchiveCodec,
{
    pub fn new(store: S, photos: P, codec: C) -> Self {
        Self {
            store,
            photos,
            codec,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn photos(&self) -> &P {
        &self.photos
    }

    pub fn photos_mut(&mut self) -> &mut P {
        &mut self.photos
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Gathers a snapshot and packs it.
    pub fn export(
        &self,
        options: &ExportOptions,
        operator: &Operator,
    ) -> Result<ExportArtifact, EngineError>
    where
        S: Sync,
        P: Sync,
    {
        let bundle = gather_snapshot(&self.store, &self.photos, options, operator)?;
        let (entries, metadata) = bundle.into_entries()?;
        let bytes = self.codec.pack(&entries)?;
        info!(
            target: "kinvault::export",
            entries = entries.len(),
            bytes = bytes.len(),
            "archive packed"
        );
        Ok(ExportArtifact { bytes, metadata })
    }

    /// Checks an archive without touching the store. An archive that cannot
    /// be unpacked yields an invalid report; `Err` means the store itself
    /// could not be read.
    pub fn validate(&self, bytes: &[u8]) -> Result<ValidationReport, EngineError> {
        let entries = match self.codec.unpack(bytes) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(target: "kinvault::validate", error = %e, "archive could not be unpacked");
                return Ok(ValidationReport {
                    errors: vec![format!("archive could not be read: {e}")],
                    ..Default::default()
                });
            }
        };
        validate_entries(&entries, &self.store)
    }

    /// Restores an archive under `strategy`.
    ///
    /// Structural problems (unreadable container, failed metadata check,
    /// checksum mismatch) return `Err` before anything is written. Past that
    /// point every record is attempted and failures are reported in the
    /// outcome.
    pub fn import(
        &mut self,
        bytes: &[u8],
        strategy: ResolutionStrategy,
    ) -> Result<ImportOutcome, EngineError> {
        let entries = self.codec.unpack(bytes)?;
        let metadata = check_metadata(&entries).map_err(EngineError::InvalidArchive)?;

        let decoded = ArchiveSections::decode(&entries);
        let (integrity_errors, warnings) = check_integrity(&entries, &metadata, &decoded);
        if !integrity_errors.is_empty() {
            return Err(EngineError::InvalidArchive(integrity_errors));
        }

        let conflicts = detect_conflicts(&decoded.sections, &self.store)?;
        let importer = Importer::new(&mut self.store, &mut self.photos, strategy, &conflicts);
        let mut outcome = importer.run(&decoded.sections);

        // Decode failures and integrity warnings come first, in archive order.
        outcome.errors.splice(0..0, decoded.errors);
        outcome.warnings.splice(0..0, warnings);
        Ok(outcome)
    }
}
