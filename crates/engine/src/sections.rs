//! Typed view of an unpacked archive.

use std::collections::BTreeMap;

use serde_json::Value;

use kinvault_core::{
    metadata::{is_photo_entry, parse_photo_entry, paths},
    Account, AuditRecord, CoreError, EntryMap, Person, PhotoAsset, Record, Relationship, Settings,
    Suggestion,
};

/// Records decoded from an archive, in archive order.
#[derive(Debug, Clone, Default)]
pub struct ArchiveSections {
    pub settings: Option<Settings>,
    pub people: Vec<Person>,
    pub accounts: Vec<Account>,
    pub relationships: Vec<Relationship>,
    pub suggestions: Vec<Suggestion>,
    pub audit_records: Vec<AuditRecord>,
    pub photos: Vec<PhotoAsset>,
}

/// Result of decoding: the records that passed their shape check, one error
/// per record that did not, and the raw length of every present section.
#[derive(Debug, Clone, Default)]
pub struct DecodedArchive {
    pub sections: ArchiveSections,
    pub errors: Vec<String>,
    pub section_lengths: BTreeMap<&'static str, usize>,
}

impl ArchiveSections {
    /// Decodes every present data section and photo entry. Absent sections
    /// decode as empty; a record that fails never stops the scan.
    pub fn decode(entries: &EntryMap) -> DecodedArchive {
        let mut decoder = Decoder {
            entries,
            errors: Vec::new(),
            lengths: BTreeMap::new(),
        };

        let sections = ArchiveSections {
            settings: decoder.settings(),
            people: decoder.list(paths::PEOPLE),
            accounts: decoder.list(paths::USERS),
            relationships: decoder.list(paths::RELATIONSHIPS),
            suggestions: decoder.list(paths::SUGGESTIONS),
            audit_records: decoder.list(paths::AUDIT_LOGS),
            photos: decoder.photos(),
        };

        DecodedArchive {
            sections,
            errors: decoder.errors,
            section_lengths: decoder.lengths,
        }
    }

    pub fn record_count(&self) -> usize {
        usize::from(self.settings.is_some())
            + self.people.len()
            + self.accounts.len()
            + self.relationships.len()
            + self.suggestions.len()
            + self.audit_records.len()
    }
}

struct Decoder<'a> {
    entries: &'a EntryMap,
    errors: Vec<String>,
    lengths: BTreeMap<&'static str, usize>,
}

impl Decoder<'_> {
    fn raw(&self, section: &str) -> Option<&[u8]> {
        self.entries
            .get(&paths::data_entry(section))
            .map(Vec::as_slice)
    }

    fn list<T: Record>(&mut self, section: &'static str) -> Vec<T> {
        let Some(bytes) = self.raw(section) else {
            return Vec::new();
        };
        let values: Vec<Value> = match serde_json::from_slice(bytes) {
            Ok(values) => values,
            Err(e) => {
                self.errors
                    .push(format!("{section}: expected an array of records: {e}"));
                return Vec::new();
            }
        };
        self.lengths.insert(section, values.len());

        let mut records = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            match decode_record::<T>(value) {
                Ok(record) => records.push(record),
                Err(e) => self.errors.push(format!("{section}[{index}]: {e}")),
            }
        }
        records
    }

    fn settings(&mut self) -> Option<Settings> {
        let bytes = self.raw(paths::SETTINGS)?;
        let value: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(e) => {
                self.errors
                    .push(format!("{}: malformed JSON: {e}", paths::SETTINGS));
                return None;
            }
        };
        if value.is_null() {
            return None;
        }
        match decode_record::<Settings>(value) {
            Ok(settings) => Some(settings),
            Err(e) => {
                self.errors.push(format!("{}: {e}", paths::SETTINGS));
                None
            }
        }
    }

    fn photos(&mut self) -> Vec<PhotoAsset> {
        let mut assets = Vec::new();
        for (path, bytes) in self.entries {
            if !is_photo_entry(path) {
                continue;
            }
            match parse_photo_entry(path) {
                Ok((person_id, file_name)) => assets.push(PhotoAsset {
                    person_id,
                    file_name,
                    bytes: bytes.clone(),
                }),
                Err(e) => self.errors.push(format!("{path}: {e}")),
            }
        }
        assets
    }
}

fn decode_record<T: Record>(value: Value) -> Result<T, CoreError> {
    let record: T = serde_json::from_value(value)?;
    record.check()?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinvault_core::PersonId;
    use serde_json::json;

    fn entry(section: &str, value: Value) -> (String, Vec<u8>) {
        (paths::data_entry(section), serde_json::to_vec(&value).unwrap())
    }

    #[test]
    fn bad_records_are_reported_by_index_and_skipped() {
        let good = json!({
            "id": PersonId::new(),
            "firstName": "Ana",
            "lastName": "Costa",
            "isLiving": true,
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
        });
        let mut blank = good.clone();
        blank["id"] = json!(PersonId::new());
        blank["lastName"] = json!("");
        let entries = EntryMap::from([entry(paths::PEOPLE, json!([good, {"id": "x"}, blank]))]);

        let decoded = ArchiveSections::decode(&entries);
        assert_eq!(decoded.sections.people.len(), 1);
        assert_eq!(decoded.errors.len(), 2);
        assert!(decoded.errors[0].starts_with("people.json[1]:"));
        assert!(decoded.errors[1].starts_with("people.json[2]:"));
        assert_eq!(decoded.section_lengths.get(paths::PEOPLE), Some(&3));
    }

    #[test]
    fn null_settings_and_missing_sections_decode_empty() {
        let entries = EntryMap::from([entry(paths::SETTINGS, Value::Null)]);
        let decoded = ArchiveSections::decode(&entries);
        assert!(decoded.sections.settings.is_none());
        assert!(decoded.errors.is_empty());
        assert_eq!(decoded.sections.record_count(), 0);
    }

    #[test]
    fn photo_entries_become_assets() {
        let owner = PersonId::new();
        let entries = EntryMap::from([
            (format!("photos/{owner}/a.jpg"), vec![1]),
            ("photos/not-a-uuid/b.jpg".to_string(), vec![2]),
        ]);
        let decoded = ArchiveSections::decode(&entries);
        assert_eq!(decoded.sections.photos.len(), 1);
        assert_eq!(decoded.sections.photos[0].person_id, owner);
        assert_eq!(decoded.errors.len(), 1);
    }
}
