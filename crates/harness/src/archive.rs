//! Helpers for building hand-edited archives in tests.

use serde_json::Value;

use kinvault_core::{
    metadata::{checksum_hex, paths},
    BackupMetadata, EntryMap,
};
use kinvault_storage::ArchiveCodec;

pub type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Unpacks `bytes`, lets `edit` change entries and metadata, then repacks
/// with checksums recomputed so only the intended edit is visible.
pub fn edit_archive<C: ArchiveCodec>(
    codec: &C,
    bytes: &[u8],
    edit: impl FnOnce(&mut EntryMap, &mut BackupMetadata) -> TestResult<()>,
) -> TestResult<Vec<u8>> {
    let mut entries = codec.unpack(bytes)?;
    let raw = entries
        .remove(paths::METADATA)
        .ok_or("archive has no metadata")?;
    let mut metadata: BackupMetadata = serde_json::from_slice(&raw)?;

    edit(&mut entries, &mut metadata)?;

    metadata.checksums = entries
        .iter()
        .map(|(path, bytes)| (path.clone(), checksum_hex(bytes)))
        .collect();
    entries.insert(paths::METADATA.to_string(), serde_json::to_vec_pretty(&metadata)?);
    Ok(codec.pack(&entries)?)
}

/// Rewrites one data section as a JSON array.
pub fn edit_section(
    entries: &mut EntryMap,
    section: &str,
    edit: impl FnOnce(&mut Vec<Value>),
) -> TestResult<()> {
    let path = paths::data_entry(section);
    let raw = entries.get(&path).ok_or_else(|| format!("{path} is missing"))?;
    let mut records: Vec<Value> = serde_json::from_slice(raw)?;
    edit(&mut records);
    entries.insert(path, serde_json::to_vec_pretty(&records)?);
    Ok(())
}
