use chrono::{DateTime, NaiveDate, Utc};

use kinvault_core::{
    ids::*,
    records::{Account, AuditRecord, Person, PhotoAsset, Relationship, RelationshipKind, Settings, Suggestion},
};

use crate::error::StorageError;

/// The live application store, as seen by backup and restore.
///
/// Lookups take `&self` so snapshot reads can run side by side; writes take
/// `&mut self` and are issued by a single importer at a time.
pub trait RecordStore {
    fn find_person(&self, id: PersonId) -> Result<Option<Person>, StorageError>;

    /// Case-insensitive match on the contact address.
    fn find_person_by_email(&self, email: &str) -> Result<Option<Person>, StorageError>;

    fn find_people_by_name_and_birth(
        &self,
        first_name: &str,
        last_name: &str,
        birth_date: NaiveDate,
    ) -> Result<Vec<Person>, StorageError>;

    fn list_people(&self) -> Result<Vec<Person>, StorageError>;

    fn list_people_with_photos(&self) -> Result<Vec<Person>, StorageError>;

    fn create_person(&mut self, person: &Person) -> Result<(), StorageError>;

    fn update_person(&mut self, person: &Person) -> Result<(), StorageError>;

    fn find_relationship(&self, id: RelationshipId) -> Result<Option<Relationship>, StorageError>;

    fn find_relationship_by_edge(
        &self,
        person_id: PersonId,
        related_person_id: PersonId,
        kind: RelationshipKind,
    ) -> Result<Option<Relationship>, StorageError>;

    fn list_relationships(&self) -> Result<Vec<Relationship>, StorageError>;

    fn create_relationship(&mut self, relationship: &Relationship) -> Result<(), StorageError>;

    fn update_relationship(&mut self, relationship: &Relationship) -> Result<(), StorageError>;

    fn find_account(&self, id: AccountId) -> Result<Option<Account>, StorageError>;

    /// Case-insensitive match on the login address.
    fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StorageError>;

    /// The account linked to `person_id`, if any. At most one can exist.
    fn find_account_by_person(&self, person_id: PersonId) -> Result<Option<Account>, StorageError>;

    fn list_accounts(&self) -> Result<Vec<Account>, StorageError>;

    fn create_account(&mut self, account: &Account) -> Result<(), StorageError>;

    fn update_account(&mut self, account: &Account) -> Result<(), StorageError>;

    fn find_suggestion(&self, id: SuggestionId) -> Result<Option<Suggestion>, StorageError>;

    fn list_suggestions(&self) -> Result<Vec<Suggestion>, StorageError>;

    fn create_suggestion(&mut self, suggestion: &Suggestion) -> Result<(), StorageError>;

    fn update_suggestion(&mut self, suggestion: &Suggestion) -> Result<(), StorageError>;

    fn get_settings(&self) -> Result<Option<Settings>, StorageError>;

    /// Inserts the singleton row or overwrites it.
    fn put_settings(&mut self, settings: &Settings) -> Result<(), StorageError>;

    fn find_audit_record(&self, id: AuditId) -> Result<Option<AuditRecord>, StorageError>;

    /// Audit records created strictly after `cutoff`, oldest first.
    fn list_audit_records_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<AuditRecord>, StorageError>;

    fn create_audit_record(&mut self, record: &AuditRecord) -> Result<(), StorageError>;

    fn update_audit_record(&mut self, record: &AuditRecord) -> Result<(), StorageError>;
}

/// Physical storage for person photos.
pub trait PhotoStore {
    /// All assets stored for one person, ordered by file name.
    fn list_photos(&self, person_id: PersonId) -> Result<Vec<PhotoAsset>, StorageError>;

    fn has_photo(&self, person_id: PersonId, file_name: &str) -> Result<bool, StorageError>;

    /// Writes the asset, replacing any file of the same name.
    fn put_photo(&mut self, asset: &PhotoAsset) -> Result<(), StorageError>;
}
