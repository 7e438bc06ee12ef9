//! Archive metadata and entry layout.
//!
//! An archive is a flat map of entry paths to bytes:
//!
//! ```text
//! metadata.json
//! data/people.json
//! data/relationships.json
//! data/users.json
//! data/suggestions.json
//! data/settings.json
//! data/audit-logs.json          (optional)
//! photos/<personId>/<fileName>  (optional)
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{AccountId, PersonId};
use crate::records::PhotoAsset;

/// Version written by this build.
pub const ARCHIVE_VERSION: &str = "1.0";

/// Versions this build can restore.
pub const SUPPORTED_VERSIONS: &[&str] = &[ARCHIVE_VERSION];

/// Unpacked archive: entry path to raw content.
pub type EntryMap = BTreeMap<String, Vec<u8>>;

pub mod paths {
    pub const METADATA: &str = "metadata.json";
    pub const DATA_DIR: &str = "data/";
    pub const PHOTOS_DIR: &str = "photos/";

    pub const PEOPLE: &str = "people.json";
    pub const RELATIONSHIPS: &str = "relationships.json";
    pub const USERS: &str = "users.json";
    pub const SUGGESTIONS: &str = "suggestions.json";
    pub const SETTINGS: &str = "settings.json";
    pub const AUDIT_LOGS: &str = "audit-logs.json";

    /// Every data section this build knows, in import order.
    pub const SECTIONS: &[&str] = &[SETTINGS, PEOPLE, USERS, RELATIONSHIPS, SUGGESTIONS, AUDIT_LOGS];

    pub fn data_entry(section: &str) -> String {
        format!("{DATA_DIR}{section}")
    }
}

/// Who produced the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    pub id: AccountId,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatistics {
    pub total_people: usize,
    pub total_relationships: usize,
    pub total_users: usize,
    pub total_suggestions: usize,
    pub total_photos: usize,
    pub audit_log_days: u32,
    pub audit_log_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub exported_by: Operator,
    pub statistics: BackupStatistics,
    pub data_files: Vec<String>,
    #[serde(default)]
    pub photo_directories: Vec<String>,
    /// BLAKE3 hex digest per entry path. Archives from older writers may omit it.
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
}

impl BackupMetadata {
    pub fn is_supported_version(&self) -> bool {
        SUPPORTED_VERSIONS.contains(&self.version.as_str())
    }

    pub fn declares(&self, section: &str) -> bool {
        self.data_files.iter().any(|f| f == section)
    }
}

pub fn checksum_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

pub fn photo_directory(person_id: PersonId) -> String {
    format!("{}{person_id}/", paths::PHOTOS_DIR)
}

pub fn photo_entry(asset: &PhotoAsset) -> String {
    format!("{}{}", photo_directory(asset.person_id), asset.file_name)
}

/// Splits `photos/<personId>/<fileName>` into its owner and file name.
pub fn parse_photo_entry(path: &str) -> Result<(PersonId, String), CoreError> {
    let rest = path
        .strip_prefix(paths::PHOTOS_DIR)
        .ok_or_else(|| CoreError::InvalidData(format!("not a photo entry: {path}")))?;
    let (owner, file_name) = rest
        .split_once('/')
        .ok_or_else(|| CoreError::InvalidData(format!("photo entry without owner directory: {path}")))?;
    PhotoAsset::check_file_name(file_name)?;
    Ok((owner.parse()?, file_name.to_string()))
}

pub fn is_photo_entry(path: &str) -> bool {
    path.starts_with(paths::PHOTOS_DIR) && !path.ends_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photo_entry_paths_round_trip() {
        let asset = PhotoAsset {
            person_id: PersonId::new(),
            file_name: "portrait.png".into(),
            bytes: vec![1, 2, 3],
        };
        let path = photo_entry(&asset);
        assert!(is_photo_entry(&path));
        let (owner, name) = parse_photo_entry(&path).unwrap();
        assert_eq!(owner, asset.person_id);
        assert_eq!(name, "portrait.png");
    }

    #[test]
    fn nested_photo_paths_are_rejected() {
        let owner = PersonId::new();
        assert!(parse_photo_entry(&format!("photos/{owner}/a/b.png")).is_err());
        assert!(parse_photo_entry("photos/not-a-uuid/b.png").is_err());
        assert!(parse_photo_entry("data/people.json").is_err());
    }

    #[test]
    fn checksums_are_stable_hex() {
        assert_eq!(checksum_hex(b"abc"), checksum_hex(b"abc"));
        assert_ne!(checksum_hex(b"abc"), checksum_hex(b"abd"));
        assert_eq!(checksum_hex(b"").len(), 64);
    }

    #[test]
    fn metadata_without_checksums_still_parses() {
        let raw = serde_json::json!({
            "version": "1.0",
            "exportedAt": "2026-01-01T00:00:00Z",
            "exportedBy": { "id": AccountId::new(), "email": "admin@example.org" },
            "statistics": {
                "totalPeople": 0, "totalRelationships": 0, "totalUsers": 0,
                "totalSuggestions": 0, "totalPhotos": 0, "auditLogDays": 90,
                "auditLogCount": 0
            },
            "dataFiles": ["people.json"],
        });
        let meta: BackupMetadata = serde_json::from_value(raw).unwrap();
        assert!(meta.is_supported_version());
        assert!(meta.declares("people.json"));
        assert!(meta.checksums.is_empty());
    }
}
