//! Pre-import archive checks. Nothing here writes to a store.

use kinvault_core::{
    metadata::{checksum_hex, is_photo_entry, paths},
    BackupMetadata, Conflict, ConflictStatistics, EntryMap, Severity, ValidationReport,
};
use kinvault_storage::RecordStore;
use tracing::{info, warn};

use crate::detect::detect_conflicts;
use crate::error::EngineError;
use crate::sections::{ArchiveSections, DecodedArchive};

/// Structural check: metadata present and parseable, version supported,
/// every declared section and photo directory actually present. All
/// problems are collected before returning.
pub fn check_metadata(entries: &EntryMap) -> Result<BackupMetadata, Vec<String>> {
    let raw = entries
        .get(paths::METADATA)
        .ok_or_else(|| vec![format!("{} is missing", paths::METADATA)])?;
    let metadata: BackupMetadata = serde_json::from_slice(raw)
        .map_err(|e| vec![format!("{} is malformed: {e}", paths::METADATA)])?;

    if !metadata.is_supported_version() {
        return Err(vec![format!(
            "unsupported archive version {:?}",
            metadata.version
        )]);
    }

    let mut errors = Vec::new();
    for section in &metadata.data_files {
        if !entries.contains_key(&paths::data_entry(section)) {
            errors.push(format!("declared data file {section} is missing"));
        }
    }
    for dir in &metadata.photo_directories {
        let has_asset = entries
            .range(dir.clone()..)
            .take_while(|(path, _)| path.starts_with(dir.as_str()))
            .any(|(path, _)| is_photo_entry(path));
        if !has_asset {
            errors.push(format!("declared photo directory {dir} has no files"));
        }
    }

    if errors.is_empty() {
        Ok(metadata)
    } else {
        Err(errors)
    }
}

/// Entry-level integrity: checksums and declared counts against content.
/// Returns `(errors, warnings)`.
pub fn check_integrity(
    entries: &EntryMap,
    metadata: &BackupMetadata,
    decoded: &DecodedArchive,
) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for (path, expected) in &metadata.checksums {
        match entries.get(path) {
            Some(bytes) if checksum_hex(bytes) != *expected => {
                errors.push(format!("checksum mismatch for {path}"));
            }
            Some(_) => {}
            None => warnings.push(format!("checksum listed for absent entry {path}")),
        }
    }

    let photo_count = entries.keys().filter(|path| is_photo_entry(path)).count();
    if photo_count != metadata.statistics.total_photos {
        warnings.push(format!(
            "metadata declares {} photos but the archive contains {photo_count}",
            metadata.statistics.total_photos
        ));
    }

    let stats = &metadata.statistics;
    let declared = [
        (paths::PEOPLE, stats.total_people),
        (paths::RELATIONSHIPS, stats.total_relationships),
        (paths::USERS, stats.total_users),
        (paths::SUGGESTIONS, stats.total_suggestions),
        (paths::AUDIT_LOGS, stats.audit_log_count),
    ];
    for (section, expected) in declared {
        if let Some(&actual) = decoded.section_lengths.get(section)
            && actual != expected
        {
            warnings.push(format!(
                "{section} holds {actual} records but metadata declares {expected}"
            ));
        }
    }

    for path in entries.keys() {
        if let Some(section) = path.strip_prefix(paths::DATA_DIR)
            && !metadata.declares(section)
        {
            warnings.push(format!("undeclared data section {path}"));
        }
    }

    (errors, warnings)
}

/// Runs the full validation pipeline over an unpacked archive.
///
/// A failed metadata check short-circuits. Otherwise every record is shape
/// checked and the decodable ones are compared against the store; likely
/// duplicates surface as warnings.
pub fn validate_entries<S: RecordStore + ?Sized>(
    entries: &EntryMap,
    store: &S,
) -> Result<ValidationReport, EngineError> {
    let metadata = match check_metadata(entries) {
        Ok(metadata) => metadata,
        Err(errors) => {
            warn!(target: "kinvault::validate", errors = errors.len(), "metadata check failed");
            return Ok(ValidationReport {
                errors,
                ..Default::default()
            });
        }
    };

    let decoded = ArchiveSections::decode(entries);
    let (integrity_errors, mut warnings) = check_integrity(entries, &metadata, &decoded);
    let mut errors = decoded.errors;
    errors.extend(integrity_errors);

    let conflicts: Vec<Conflict> = detect_conflicts(&decoded.sections, store)?;
    warnings.extend(
        conflicts
            .iter()
            .filter(|c| c.severity == Severity::Low)
            .map(|c| c.description.clone()),
    );

    let report = ValidationReport {
        is_valid: errors.is_empty(),
        metadata: Some(metadata),
        statistics: ConflictStatistics::tally(&conflicts),
        conflicts,
        errors,
        warnings,
    };
    info!(
        target: "kinvault::validate",
        is_valid = report.is_valid,
        conflicts = report.statistics.total_conflicts,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "archive validated"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kinvault_core::{metadata::ARCHIVE_VERSION, AccountId, BackupStatistics, Operator};

    fn metadata(data_files: &[&str], photo_directories: &[&str]) -> BackupMetadata {
        BackupMetadata {
            version: ARCHIVE_VERSION.to_string(),
            exported_at: Utc::now(),
            exported_by: Operator {
                id: AccountId::new(),
                email: "admin@example.org".into(),
                name: None,
            },
            statistics: BackupStatistics::default(),
            data_files: data_files.iter().map(|s| s.to_string()).collect(),
            photo_directories: photo_directories.iter().map(|s| s.to_string()).collect(),
            checksums: Default::default(),
        }
    }

    fn entries_with(metadata: &BackupMetadata, extra: &[(&str, &[u8])]) -> EntryMap {
        let mut entries = EntryMap::from([(
            paths::METADATA.to_string(),
            serde_json::to_vec(metadata).unwrap(),
        )]);
        for (path, bytes) in extra {
            entries.insert(path.to_string(), bytes.to_vec());
        }
        entries
    }

    #[test]
    fn missing_metadata_is_fatal() {
        let errors = check_metadata(&EntryMap::new()).unwrap_err();
        assert_eq!(errors, vec!["metadata.json is missing".to_string()]);
    }

    #[test]
    fn unsupported_version_is_fatal() {
        let mut meta = metadata(&[], &[]);
        meta.version = "2.0".into();
        let errors = check_metadata(&entries_with(&meta, &[])).unwrap_err();
        assert!(errors[0].contains("2.0"));
    }

    #[test]
    fn every_missing_declaration_is_reported() {
        let meta = metadata(&["people.json", "users.json"], &["photos/abc/"]);
        let entries = entries_with(&meta, &[("data/people.json", b"[]".as_slice())]);
        let errors = check_metadata(&entries).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("users.json"));
        assert!(errors[1].contains("photos/abc/"));
    }

    #[test]
    fn tampered_entry_fails_its_checksum() {
        let mut meta = metadata(&["people.json"], &[]);
        meta.checksums.insert("data/people.json".into(), checksum_hex(b"[]"));
        meta.checksums.insert("data/gone.json".into(), checksum_hex(b"[]"));
        let entries = entries_with(&meta, &[("data/people.json", b"[ ]".as_slice())]);
        let decoded = ArchiveSections::decode(&entries);

        let (errors, warnings) = check_integrity(&entries, &meta, &decoded);
        assert_eq!(errors, vec!["checksum mismatch for data/people.json".to_string()]);
        assert_eq!(warnings, vec!["checksum listed for absent entry data/gone.json".to_string()]);
    }
}
