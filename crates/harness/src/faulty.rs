use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};

use kinvault_core::{
    Account, AccountId, AuditId, AuditRecord, Person, PersonId, Relationship, RelationshipId,
    RelationshipKind, Settings, Suggestion, SuggestionId,
};
use kinvault_storage::{RecordStore, StorageError};

/// Wraps a store and rejects person writes for chosen first names. Every
/// other call goes straight through.
pub struct FaultyStore<S> {
    inner: S,
    failing_names: BTreeSet<String>,
}

impl<S: RecordStore> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing_names: BTreeSet::new(),
        }
    }

    pub fn fail_person_named(mut self, first_name: &str) -> Self {
        self.failing_names.insert(first_name.to_string());
        self
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn check(&self, person: &Person) -> Result<(), StorageError> {
        if self.failing_names.contains(&person.first_name) {
            return Err(StorageError::ConstraintViolation(format!(
                "injected failure for {}",
                person.full_name()
            )));
        }
        Ok(())
    }
}

impl<S: RecordStore> RecordStore for FaultyStore<S> {
    fn find_person(&self, id: PersonId) -> Result<Option<Person>, StorageError> {
        self.inner.find_person(id)
    }

    fn find_person_by_email(&self, email: &str) -> Result<Option<Person>, StorageError> {
        self.inner.find_person_by_email(email)
    }

    fn find_people_by_name_and_birth(
        &self,
        first_name: &str,
        last_name: &str,
        birth_date: NaiveDate,
    ) -> Result<Vec<Person>, StorageError> {
        self.inner
            .find_people_by_name_and_birth(first_name, last_name, birth_date)
    }

    fn list_people(&self) -> Result<Vec<Person>, StorageError> {
        self.inner.list_people()
    }

    fn list_people_with_photos(&self) -> Result<Vec<Person>, StorageError> {
        self.inner.list_people_with_photos()
    }

    fn create_person(&mut self, person: &Person) -> Result<(), StorageError> {
        self.check(person)?;
        self.inner.create_person(person)
    }

    fn update_person(&mut self, person: &Person) -> Result<(), StorageError> {
        self.check(person)?;
        self.inner.update_person(person)
    }

    fn find_relationship(&self, id: RelationshipId) -> Result<Option<Relationship>, StorageError> {
        self.inner.find_relationship(id)
    }

    fn find_relationship_by_edge(
        &self,
        person_id: PersonId,
        related_person_id: PersonId,
        kind: RelationshipKind,
    ) -> Result<Option<Relationship>, StorageError> {
        self.inner
            .find_relationship_by_edge(person_id, related_person_id, kind)
    }

    fn list_relationships(&self) -> Result<Vec<Relationship>, StorageError> {
        self.inner.list_relationships()
    }

    fn create_relationship(&mut self, relationship: &Relationship) -> Result<(), StorageError> {
        self.inner.create_relationship(relationship)
    }

    fn update_relationship(&mut self, relationship: &Relationship) -> Result<(), StorageError> {
        self.inner.update_relationship(relationship)
    }

    fn find_account(&self, id: AccountId) -> Result<Option<Account>, StorageError> {
        self.inner.find_account(id)
    }

    fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StorageError> {
        self.inner.find_account_by_email(email)
    }

    fn find_account_by_person(&self, person_id: PersonId) -> Result<Option<Account>, StorageError> {
        self.inner.find_account_by_person(person_id)
    }

    fn list_accounts(&self) -> Result<Vec<Account>, StorageError> {
        self.inner.list_accounts()
    }

    fn create_account(&mut self, account: &Account) -> Result<(), StorageError> {
        self.inner.create_account(account)
    }

    fn update_account(&mut self, account: &Account) -> Result<(), StorageError> {
        self.inner.update_account(account)
    }

    fn find_suggestion(&self, id: SuggestionId) -> Result<Option<Suggestion>, StorageError> {
        self.inner.find_suggestion(id)
    }

    fn list_suggestions(&self) -> Result<Vec<Suggestion>, StorageError> {
        self.inner.list_suggestions()
    }

    fn create_suggestion(&mut self, suggestion: &Suggestion) -> Result<(), StorageError> {
        self.inner.create_suggestion(suggestion)
    }

    fn update_suggestion(&mut self, suggestion: &Suggestion) -> Result<(), StorageError> {
        self.inner.update_suggestion(suggestion)
    }

    fn get_settings(&self) -> Result<Option<Settings>, StorageError> {
        self.inner.get_settings()
    }

    fn put_settings(&mut self, settings: &Settings) -> Result<(), StorageError> {
        self.inner.put_settings(settings)
    }

    fn find_audit_record(&self, id: AuditId) -> Result<Option<AuditRecord>, StorageError> {
        self.inner.find_audit_record(id)
    }

    fn list_audit_records_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<AuditRecord>, StorageError> {
        self.inner.list_audit_records_since(cutoff)
    }

    fn create_audit_record(&mut self, record: &AuditRecord) -> Result<(), StorageError> {
        self.inner.create_audit_record(record)
    }

    fn update_audit_record(&mut self, record: &AuditRecord) -> Result<(), StorageError> {
        self.inner.update_audit_record(record)
    }
}
