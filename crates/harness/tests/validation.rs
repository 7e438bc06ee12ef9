use serde_json::json;

use kinvault_core::{
    metadata::paths, ConflictAction, EntityKind, ExportOptions, ResolutionStrategy, Severity,
};
use kinvault_engine::EngineError;
use kinvault_harness::{edit_archive, edit_section, fixtures, TestInstance, TestResult};
use kinvault_storage::{ArchiveCodec, RecordStore, SqliteStore};

fn exported_family() -> TestResult<(TestInstance, Vec<u8>)> {
    let mut source = TestInstance::new()?;
    source.seed_family()?;
    let artifact = source
        .engine
        .export(&ExportOptions::default(), &source.operator())?;
    Ok((source, artifact.bytes))
}

// ============================================================================
// Clean archives
// ============================================================================

#[test]
fn fresh_export_is_valid_against_an_empty_store() -> TestResult<()> {
    let (_, bytes) = exported_family()?;
    let target = TestInstance::empty(SqliteStore::open_in_memory()?)?;

    let report = target.engine.validate(&bytes)?;
    assert!(report.is_valid, "{:?}", report.errors);
    assert!(report.errors.is_empty());
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert!(report.conflicts.is_empty());
    assert_eq!(report.metadata.map(|m| m.statistics.total_people), Some(3));
    Ok(())
}

#[test]
fn validation_never_writes() -> TestResult<()> {
    let (_, bytes) = exported_family()?;
    let target = TestInstance::new()?;
    let before = target.counts()?;
    target.engine.validate(&bytes)?;
    assert_eq!(target.counts()?, before);
    Ok(())
}

// ============================================================================
// Structural failures
// ============================================================================

#[test]
fn unreadable_bytes_give_an_invalid_report() -> TestResult<()> {
    let target = TestInstance::new()?;
    let report = target.engine.validate(b"definitely not zstd")?;
    assert!(!report.is_valid);
    assert!(report.metadata.is_none());
    assert_eq!(report.errors.len(), 1);
    Ok(())
}

#[test]
fn missing_metadata_short_circuits() -> TestResult<()> {
    let (source, bytes) = exported_family()?;
    let codec = source.engine.codec();
    let mut entries = codec.unpack(&bytes)?;
    entries.remove(paths::METADATA);
    let bytes = codec.pack(&entries)?;

    let report = TestInstance::new()?.engine.validate(&bytes)?;
    assert!(!report.is_valid);
    assert_eq!(report.errors, vec!["metadata.json is missing".to_string()]);
    assert!(report.conflicts.is_empty());
    Ok(())
}

#[test]
fn declared_but_absent_section_is_fatal_for_import() -> TestResult<()> {
    let (source, bytes) = exported_family()?;
    let bytes = edit_archive(source.engine.codec(), &bytes, |entries, _| {
        entries.remove(&paths::data_entry(paths::SUGGESTIONS));
        Ok(())
    })?;

    let mut target = TestInstance::new()?;
    let before = target.counts()?;
    let report = target.engine.validate(&bytes)?;
    assert!(!report.is_valid);
    assert!(report.errors[0].contains("suggestions.json"));

    let result = target.engine.import(&bytes, ResolutionStrategy::Replace);
    assert!(matches!(result, Err(EngineError::InvalidArchive(_))));
    assert_eq!(target.counts()?, before);
    Ok(())
}

#[test]
fn unsupported_version_is_rejected() -> TestResult<()> {
    let (source, bytes) = exported_family()?;
    let bytes = edit_archive(source.engine.codec(), &bytes, |_, metadata| {
        metadata.version = "0.9".to_string();
        Ok(())
    })?;
    let report = TestInstance::new()?.engine.validate(&bytes)?;
    assert!(!report.is_valid);
    assert!(report.errors[0].contains("0.9"));
    Ok(())
}

#[test]
fn declared_photo_directory_without_files_is_fatal() -> TestResult<()> {
    let (source, bytes) = exported_family()?;
    let bytes = edit_archive(source.engine.codec(), &bytes, |entries, _| {
        entries.retain(|path, _| !path.starts_with(paths::PHOTOS_DIR));
        Ok(())
    })?;
    let report = TestInstance::new()?.engine.validate(&bytes)?;
    assert!(!report.is_valid);
    assert!(report.errors[0].contains("photo directory"));
    Ok(())
}

// ============================================================================
// Record-level checks
// ============================================================================

#[test]
fn photo_count_mismatch_is_a_single_warning() -> TestResult<()> {
    let (source, bytes) = exported_family()?;
    let bytes = edit_archive(source.engine.codec(), &bytes, |_, metadata| {
        assert_eq!(metadata.statistics.total_photos, 2);
        metadata.statistics.total_photos = 3;
        Ok(())
    })?;

    let target = TestInstance::empty(SqliteStore::open_in_memory()?)?;
    let report = target.engine.validate(&bytes)?;
    assert!(report.is_valid, "{:?}", report.errors);
    assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
    assert!(report.warnings[0].contains("3 photos"));
    Ok(())
}

#[test]
fn each_bad_record_is_reported_and_scanning_continues() -> TestResult<()> {
    let (source, bytes) = exported_family()?;
    let bytes = edit_archive(source.engine.codec(), &bytes, |entries, _| {
        edit_section(entries, paths::PEOPLE, |people| {
            people[0]["lastName"] = json!("   ");
            people[2]["isLiving"] = json!("sometimes");
        })
    })?;

    let target = TestInstance::empty(SqliteStore::open_in_memory()?)?;
    let report = target.engine.validate(&bytes)?;
    assert!(!report.is_valid);
    assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
    assert!(report.errors[0].starts_with("people.json[0]"));
    assert!(report.errors[1].starts_with("people.json[2]"));
    Ok(())
}

#[test]
fn tampered_entry_fails_checksum() -> TestResult<()> {
    let (source, bytes) = exported_family()?;
    let codec = source.engine.codec();
    let mut entries = codec.unpack(&bytes)?;
    let path = paths::data_entry(paths::SUGGESTIONS);
    let tampered = entries
        .get(&path)
        .map(|raw| [raw.as_slice(), b" ".as_slice()].concat())
        .ok_or("suggestions missing")?;
    entries.insert(path, tampered);
    let bytes = codec.pack(&entries)?;

    let mut target = TestInstance::new()?;
    let report = target.engine.validate(&bytes)?;
    assert!(!report.is_valid);
    assert_eq!(report.errors, vec!["checksum mismatch for data/suggestions.json".to_string()]);
    assert!(matches!(
        target.engine.import(&bytes, ResolutionStrategy::Merge),
        Err(EngineError::InvalidArchive(_))
    ));
    Ok(())
}

#[test]
fn section_count_mismatch_is_a_warning() -> TestResult<()> {
    let (source, bytes) = exported_family()?;
    let bytes = edit_archive(source.engine.codec(), &bytes, |_, metadata| {
        metadata.statistics.total_relationships = 7;
        Ok(())
    })?;
    let target = TestInstance::empty(SqliteStore::open_in_memory()?)?;
    let report = target.engine.validate(&bytes)?;
    assert!(report.is_valid);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("relationships.json"));
    Ok(())
}

// ============================================================================
// Conflict detection
// ============================================================================

#[test]
fn person_identity_collision_reports_exact_fields() -> TestResult<()> {
    let (mut source, bytes) = exported_family()?;
    let mut child = source
        .store()
        .list_people()?
        .into_iter()
        .find(|p| p.first_name == "Ana")
        .ok_or("child missing")?;
    child.occupation = Some("Nurse".to_string());
    child.phone = Some("+351 555 0100".to_string());
    source.engine.store_mut().update_person(&child)?;

    let report = source.engine.validate(&bytes)?;
    let conflict = report
        .conflicts
        .iter()
        .find(|c| c.entity_type == EntityKind::Person && c.incoming_id == child.id.to_string())
        .ok_or("no conflict for the child")?;
    assert_eq!(conflict.action, ConflictAction::Update);
    assert_eq!(conflict.severity, Severity::Medium);
    assert_eq!(conflict.existing_id, Some(child.id.to_string()));
    assert_eq!(conflict.conflict_fields, vec!["occupation".to_string(), "phone".to_string()]);
    Ok(())
}

#[test]
fn conflict_statistics_count_by_type_and_severity() -> TestResult<()> {
    let (source, bytes) = exported_family()?;
    let report = source.engine.validate(&bytes)?;

    // Every person, account and relationship is already present.
    assert_eq!(report.statistics.total_conflicts, 3 + 2 + 4);
    assert_eq!(report.statistics.conflicts_by_type.get(&EntityKind::Person), Some(&3));
    assert_eq!(report.statistics.conflicts_by_type.get(&EntityKind::Account), Some(&2));
    assert_eq!(report.statistics.conflicts_by_severity.get(&Severity::High), Some(&2));
    assert_eq!(report.statistics.conflicts_by_severity.get(&Severity::Medium), Some(&7));
    assert!(report.is_valid);
    Ok(())
}

#[test]
fn account_email_collision_is_high() -> TestResult<()> {
    let (_, bytes) = exported_family()?;
    // A separate instance whose admin shares the source admin's address.
    let target = TestInstance::new()?;
    let report = target.engine.validate(&bytes)?;
    let conflict = report
        .conflicts
        .iter()
        .find(|c| c.entity_type == EntityKind::Account)
        .ok_or("no account conflict")?;
    assert_eq!(conflict.action, ConflictAction::Create);
    assert_eq!(conflict.severity, Severity::High);
    assert_eq!(conflict.existing_id, Some(target.admin.id.to_string()));
    Ok(())
}

#[test]
fn likely_duplicate_person_is_a_warning() -> TestResult<()> {
    let (_, bytes) = exported_family()?;
    let mut target = TestInstance::empty(SqliteStore::open_in_memory()?)?;
    let mut lookalike = fixtures::detailed_person("Maria", "Costa", (1942, 8, 9));
    lookalike.email = None;
    target.add_person(&lookalike)?;

    let report = target.engine.validate(&bytes)?;
    assert!(report.is_valid);
    let low: Vec<_> = report
        .conflicts
        .iter()
        .filter(|c| c.severity == Severity::Low)
        .collect();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].existing_id, Some(lookalike.id.to_string()));
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("may duplicate"));
    Ok(())
}
