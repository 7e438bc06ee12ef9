//! Snapshot gathering for export.

use std::collections::BTreeSet;
use std::thread::{self, ScopedJoinHandle};

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use kinvault_core::{
    metadata::{checksum_hex, paths, photo_directory, photo_entry, ARCHIVE_VERSION},
    Account, AuditRecord, BackupMetadata, BackupStatistics, CoreError, EntryMap, ExportOptions,
    Operator, Person, PhotoAsset, Relationship, Settings, Suggestion,
};
use kinvault_storage::{PhotoStore, RecordStore, StorageError};

use crate::error::EngineError;

/// Everything an export carries, before it is laid out as archive entries.
#[derive(Debug, Clone)]
pub struct ExportBundle {
    pub metadata: BackupMetadata,
    pub settings: Option<Settings>,
    pub people: Vec<Person>,
    pub relationships: Vec<Relationship>,
    pub accounts: Vec<Account>,
    pub suggestions: Vec<Suggestion>,
    /// `None` when audit logs were not requested.
    pub audit_records: Option<Vec<AuditRecord>>,
    pub photos: Vec<PhotoAsset>,
}

impl ExportBundle {
    /// Lays the bundle out as archive entries and fills in the per-entry
    /// checksums. Returns the entries together with the final metadata.
    pub fn into_entries(self) -> Result<(EntryMap, BackupMetadata), EngineError> {
        let mut entries = EntryMap::new();
        put_section(&mut entries, paths::SETTINGS, &self.settings)?;
        put_section(&mut entries, paths::PEOPLE, &self.people)?;
        put_section(&mut entries, paths::USERS, &self.accounts)?;
        put_section(&mut entries, paths::RELATIONSHIPS, &self.relationships)?;
        put_section(&mut entries, paths::SUGGESTIONS, &self.suggestions)?;
        if let Some(audit_records) = &self.audit_records {
            put_section(&mut entries, paths::AUDIT_LOGS, audit_records)?;
        }
        for asset in self.photos {
            entries.insert(photo_entry(&asset), asset.bytes);
        }

        let mut metadata = self.metadata;
        metadata.checksums = entries
            .iter()
            .map(|(path, bytes)| (path.clone(), checksum_hex(bytes)))
            .collect();

        let raw = serde_json::to_vec_pretty(&metadata).map_err(CoreError::from)?;
        entries.insert(paths::METADATA.to_string(), raw);
        Ok((entries, metadata))
    }
}

fn put_section<T: Serialize + ?Sized>(
    entries: &mut EntryMap,
    section: &str,
    records: &T,
) -> Result<(), EngineError> {
    let raw = serde_json::to_vec_pretty(records).map_err(CoreError::from)?;
    entries.insert(paths::data_entry(section), raw);
    Ok(())
}

fn join<T>(
    handle: ScopedJoinHandle<'_, Result<T, StorageError>>,
    what: &str,
) -> Result<T, EngineError> {
    let result = handle
        .join()
        .map_err(|_| EngineError::SnapshotRead(format!("{what} reader panicked")))?;
    Ok(result?)
}

fn gather_photos<S, P>(store: &S, photos: &P) -> Result<Vec<PhotoAsset>, StorageError>
where
    S: RecordStore + ?Sized,
    P: PhotoStore + ?Sized,
{
    let mut assets = Vec::new();
    for person in store.list_people_with_photos()? {
        assets.extend(photos.list_photos(person.id)?);
    }
    Ok(assets)
}

/// Reads a point-in-time view of the store. Categories are read side by
/// side, so the result is a best-effort snapshot rather than a consistent cut.
pub fn gather_snapshot<S, P>(
    store: &S,
    photos: &P,
    options: &ExportOptions,
    operator: &Operator,
) -> Result<ExportBundle, EngineError>
where
    S: RecordStore + Sync + ?Sized,
    P: PhotoStore + Sync + ?Sized,
{
    options.validate().map_err(|e| match e {
        CoreError::InvalidOptions(msg) => EngineError::InvalidOptions(msg),
        other => other.into(),
    })?;

    let exported_at = Utc::now();
    let cutoff = exported_at - Duration::days(i64::from(options.audit_log_days));
    info!(
        target: "kinvault::export",
        include_photos = options.include_photos,
        include_audit_logs = options.include_audit_logs,
        audit_log_days = options.audit_log_days,
        "gathering snapshot"
    );

    let bundle = thread::scope(|s| {
        let people = s.spawn(|| store.list_people());
        let relationships = s.spawn(|| store.list_relationships());
        let accounts = s.spawn(|| store.list_accounts());
        let suggestions = s.spawn(|| store.list_suggestions());
        let settings = s.spawn(|| store.get_settings());
        let audit_records = options
            .include_audit_logs
            .then(|| s.spawn(move || store.list_audit_records_since(cutoff)));
        let assets = options
            .include_photos
            .then(|| s.spawn(|| gather_photos(store, photos)));

        Ok::<_, EngineError>(ExportBundle {
            metadata: BackupMetadata {
                version: ARCHIVE_VERSION.to_string(),
                exported_at,
                exported_by: operator.clone(),
                statistics: BackupStatistics::default(),
                data_files: Vec::new(),
                photo_directories: Vec::new(),
                checksums: Default::default(),
            },
            people: join(people, "people")?,
            relationships: join(relationships, "relationships")?,
            accounts: join(accounts, "users")?,
            suggestions: join(suggestions, "suggestions")?,
            settings: join(settings, "settings")?,
            audit_records: audit_records
                .map(|handle| join(handle, "audit log"))
                .transpose()?,
            photos: assets
                .map(|handle| join(handle, "photo"))
                .transpose()?
                .unwrap_or_default(),
        })
    })?;

    Ok(describe(bundle, options))
}

/// Fills in metadata so it states exactly what was gathered.
fn describe(mut bundle: ExportBundle, options: &ExportOptions) -> ExportBundle {
    let audit_log_count = bundle.audit_records.as_ref().map_or(0, Vec::len);
    bundle.metadata.statistics = BackupStatistics {
        total_people: bundle.people.len(),
        total_relationships: bundle.relationships.len(),
        total_users: bundle.accounts.len(),
        total_suggestions: bundle.suggestions.len(),
        total_photos: bundle.photos.len(),
        audit_log_days: options.audit_log_days,
        audit_log_count,
    };
    bundle.metadata.data_files = paths::SECTIONS
        .iter()
        .filter(|section| **section != paths::AUDIT_LOGS || bundle.audit_records.is_some())
        .map(|section| section.to_string())
        .collect();
    bundle.metadata.photo_directories = bundle
        .photos
        .iter()
        .map(|asset| photo_directory(asset.person_id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    debug!(
        target: "kinvault::export",
        people = bundle.metadata.statistics.total_people,
        relationships = bundle.metadata.statistics.total_relationships,
        users = bundle.metadata.statistics.total_users,
        suggestions = bundle.metadata.statistics.total_suggestions,
        audit_logs = audit_log_count,
        photos = bundle.metadata.statistics.total_photos,
        "snapshot gathered"
    );
    bundle
}
