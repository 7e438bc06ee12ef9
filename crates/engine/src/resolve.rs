//! Commits decoded archive records into a live store.
//!
//! Phases run in dependency order (settings, people, users, relationships,
//! suggestions, audit logs, photos) and records are written one at a time,
//! so references are checked against rows created earlier in the same run.
//! A failed record is logged in the outcome and the run carries on.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use kinvault_core::{
    Account, AccountId, AuditRecord, Conflict, ConflictAction, EntityKind, ImportOutcome, Person,
    PersonId, PhotoAsset, Record, Relationship, Resolve, ResolutionStrategy, Settings, Suggestion,
};
use kinvault_storage::{PhotoStore, RecordStore, StorageError};

use crate::error::EngineError;
use crate::sections::ArchiveSections;

/// How a single record ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Created,
    Resolved,
    Skipped,
}

pub struct Importer<'a, S: ?Sized, P: ?Sized> {
    store: &'a mut S,
    photos: &'a mut P,
    strategy: ResolutionStrategy,
    conflicts: HashMap<(EntityKind, String), Vec<&'a Conflict>>,
    people: HashMap<PersonId, PersonId>,
    accounts: HashMap<AccountId, AccountId>,
    outcome: ImportOutcome,
}

impl<'a, S, P> Importer<'a, S, P>
where
    S: RecordStore + ?Sized,
    P: PhotoStore + ?Sized,
{
    pub fn new(
        store: &'a mut S,
        photos: &'a mut P,
        strategy: ResolutionStrategy,
        conflicts: &'a [Conflict],
    ) -> Self {
        let mut by_record: HashMap<(EntityKind, String), Vec<&'a Conflict>> = HashMap::new();
        for conflict in conflicts {
            by_record
                .entry((conflict.entity_type, conflict.incoming_id.clone()))
                .or_default()
                .push(conflict);
        }
        Self {
            store,
            photos,
            strategy,
            conflicts: by_record,
            people: HashMap::new(),
            accounts: HashMap::new(),
            outcome: ImportOutcome::default(),
        }
    }

    pub fn run(mut self, sections: &ArchiveSections) -> ImportOutcome {
        info!(
            target: "kinvault::import",
            strategy = %self.strategy,
            records = sections.record_count(),
            photos = sections.photos.len(),
            conflicts = self.conflicts.values().map(Vec::len).sum::<usize>(),
            "import started"
        );

        if let Some(settings) = &sections.settings {
            let result = self.import_settings(settings);
            self.settle_result(settings.label(), result);
        }
        self.phase(EntityKind::Settings);

        for person in &sections.people {
            let result = self.import_person(person);
            self.settle_result(person.label(), result);
        }
        self.phase(EntityKind::Person);

        // Inviters must land before the accounts they invited.
        let mut accounts: Vec<&Account> = sections.accounts.iter().collect();
        accounts.sort_by_key(|account| account.created_at);
        for account in accounts {
            let result = self.import_account(account);
            self.settle_result(account.label(), result);
        }
        self.phase(EntityKind::Account);

        for relationship in &sections.relationships {
            let result = self.import_relationship(relationship);
            self.settle_result(relationship.label(), result);
        }
        self.phase(EntityKind::Relationship);

        for suggestion in &sections.suggestions {
            let result = self.import_suggestion(suggestion);
            self.settle_result(suggestion.label(), result);
        }
        self.phase(EntityKind::Suggestion);

        for record in &sections.audit_records {
            let result = self.import_audit_record(record);
            self.settle_result(record.label(), result);
        }
        self.phase(EntityKind::AuditLog);

        for asset in &sections.photos {
            let label = format!("photo {}/{}", asset.person_id, asset.file_name);
            let result = self.import_photo(asset);
            self.settle_result(label, result);
        }
        self.phase(EntityKind::Photo);

        let stats = &self.outcome.statistics;
        info!(
            target: "kinvault::import",
            imported = stats.total_imported(),
            conflicts_resolved = stats.conflicts_resolved,
            skipped = stats.skipped_items,
            errors = self.outcome.errors.len(),
            warnings = self.outcome.warnings.len(),
            "import finished"
        );
        self.outcome
    }

    fn phase(&self, kind: EntityKind) {
        debug!(
            target: "kinvault::import",
            phase = %kind,
            imported = self.outcome.statistics.imported(kind),
            "phase complete"
        );
    }

    fn settle_result(&mut self, label: String, result: Result<(), EngineError>) {
        if let Err(e) = result {
            warn!(target: "kinvault::import", record = %label, error = %e, "record failed");
            self.outcome.errors.push(format!("failed to import {label}: {e}"));
        }
    }

    fn warning(&mut self, message: String) {
        warn!(target: "kinvault::import", "{message}");
        self.outcome.warnings.push(message);
    }

    fn skip(&mut self, message: String) {
        self.outcome.statistics.skipped_items += 1;
        self.warning(message);
    }

    /// The conflict that decides this record's fate: an identity hit if
    /// there is one, otherwise the first non-advisory conflict.
    fn blocking(&self, kind: EntityKind, id: &str) -> Option<&'a Conflict> {
        let conflicts = self.conflicts.get(&(kind, id.to_string()))?;
        conflicts
            .iter()
            .find(|c| c.action == ConflictAction::Update)
            .or_else(|| conflicts.iter().find(|c| c.is_blocking()))
            .copied()
    }

    fn advisories(&self, kind: EntityKind, id: &str) -> Vec<String> {
        self.conflicts
            .get(&(kind, id.to_string()))
            .map(|conflicts| {
                conflicts
                    .iter()
                    .filter(|c| !c.is_blocking())
                    .map(|c| c.description.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Applies the strategy to one record. With no `existing` row the record
    /// is created; otherwise it is skipped, replaced or merged onto that row.
    fn settle<T: Resolve>(
        &mut self,
        incoming: &T,
        existing: Option<T>,
        create: impl FnOnce(&mut S, &T) -> Result<(), StorageError>,
        update: impl FnOnce(&mut S, &T) -> Result<(), StorageError>,
    ) -> Result<Settled, EngineError> {
        let Some(existing) = existing else {
            create(&mut *self.store, incoming)?;
            self.outcome.statistics.record_import(T::KIND);
            return Ok(Settled::Created);
        };

        let resolved = match self.strategy {
            ResolutionStrategy::Skip => {
                self.skip(format!(
                    "skipped {}: already present as {}",
                    incoming.label(),
                    existing.label()
                ));
                return Ok(Settled::Skipped);
            }
            ResolutionStrategy::Replace => T::replace(&existing, incoming),
            ResolutionStrategy::Merge => T::merge(&existing, incoming),
        };
        update(&mut *self.store, &resolved)?;
        self.outcome.statistics.record_import(T::KIND);
        self.outcome.statistics.conflicts_resolved += 1;
        Ok(Settled::Resolved)
    }

    fn person_ref(&self, id: PersonId) -> PersonId {
        self.people.get(&id).copied().unwrap_or(id)
    }

    fn account_ref(&self, id: AccountId) -> AccountId {
        self.accounts.get(&id).copied().unwrap_or(id)
    }

    fn import_settings(&mut self, incoming: &Settings) -> Result<(), EngineError> {
        let existing = self.store.get_settings()?;
        self.settle(
            incoming,
            existing,
            |store, s| store.put_settings(s),
            |store, s| store.put_settings(s),
        )?;
        Ok(())
    }

    fn import_person(&mut self, incoming: &Person) -> Result<(), EngineError> {
        let existing = match self.blocking(EntityKind::Person, &incoming.record_id()) {
            Some(conflict) => match &conflict.existing_id {
                Some(id) => self.store.find_person(id.parse()?)?,
                None => None,
            },
            None => None,
        };
        let target = existing.as_ref().map(|p| p.id);
        let settled = self.settle(
            incoming,
            existing,
            |store, p| store.create_person(p),
            |store, p| store.update_person(p),
        )?;

        match (settled, target) {
            (Settled::Created, _) => {
                for advisory in self.advisories(EntityKind::Person, &incoming.record_id()) {
                    self.warning(format!("created {} despite: {advisory}", incoming.label()));
                }
            }
            (_, Some(target)) if target != incoming.id => {
                self.people.insert(incoming.id, target);
            }
            _ => {}
        }
        Ok(())
    }

    fn import_account(&mut self, incoming: &Account) -> Result<(), EngineError> {
        let existing = match self.blocking(EntityKind::Account, &incoming.record_id()) {
            Some(conflict) => match &conflict.existing_id {
                Some(id) => self.store.find_account(id.parse()?)?,
                None => None,
            },
            None => None,
        };
        let target = existing.as_ref().map(|a| a.id);
        let mut account = incoming.clone();

        if let Some(person_id) = account.person_id.map(|id| self.person_ref(id)) {
            account.person_id = None;
            if self.store.find_person(person_id)?.is_none() {
                self.warning(format!(
                    "{}: linked person {person_id} is not present, link dropped",
                    account.label()
                ));
            } else if let Some(holder) = self.store.find_account_by_person(person_id)?
                && Some(holder.id) != target
                && holder.id != incoming.id
            {
                // One account per person.
                self.warning(format!(
                    "{}: person {person_id} is already linked to {}, link dropped",
                    account.label(),
                    holder.label()
                ));
            } else {
                account.person_id = Some(person_id);
            }
        }
        if let Some(inviter) = account.invited_by_id.map(|id| self.account_ref(id)) {
            if self.store.find_account(inviter)?.is_some() {
                account.invited_by_id = Some(inviter);
            } else {
                account.invited_by_id = None;
                self.warning(format!(
                    "{}: inviter {inviter} is not present, reference dropped",
                    account.label()
                ));
            }
        }

        if existing.is_none() {
            // Archives carry no credentials.
            account.must_change_password = true;
        }
        let settled = self.settle(
            &account,
            existing,
            |store, a| store.create_account(a),
            |store, a| store.update_account(a),
        )?;

        if settled != Settled::Created
            && let Some(target) = target
            && target != incoming.id
        {
            self.accounts.insert(incoming.id, target);
        }
        Ok(())
    }

    fn import_relationship(&mut self, incoming: &Relationship) -> Result<(), EngineError> {
        let relationship = Relationship {
            person_id: self.person_ref(incoming.person_id),
            related_person_id: self.person_ref(incoming.related_person_id),
            ..incoming.clone()
        };

        let existing = match self.blocking(EntityKind::Relationship, &incoming.record_id()) {
            Some(conflict) => match &conflict.existing_id {
                Some(id) => self.store.find_relationship(id.parse()?)?,
                None => None,
            },
            // Remapped endpoints can land on an edge the detector never saw.
            None => self.store.find_relationship_by_edge(
                relationship.person_id,
                relationship.related_person_id,
                relationship.kind,
            )?,
        };
        self.settle(
            &relationship,
            existing,
            |store, r| store.create_relationship(r),
            |store, r| store.update_relationship(r),
        )?;
        Ok(())
    }

    fn import_suggestion(&mut self, incoming: &Suggestion) -> Result<(), EngineError> {
        let mut suggestion = incoming.clone();
        suggestion.submitted_by_id = self.account_ref(incoming.submitted_by_id);
        suggestion.target_person_id = incoming.target_person_id.map(|id| self.person_ref(id));
        suggestion.reviewed_by_id = incoming.reviewed_by_id.map(|id| self.account_ref(id));

        if self.store.find_account(suggestion.submitted_by_id)?.is_none() {
            self.skip(format!(
                "skipped {}: submitter {} is not present",
                suggestion.label(),
                suggestion.submitted_by_id
            ));
            return Ok(());
        }
        if let Some(target) = suggestion.target_person_id
            && self.store.find_person(target)?.is_none()
        {
            self.skip(format!(
                "skipped {}: target person {target} is not present",
                suggestion.label()
            ));
            return Ok(());
        }
        if let Some(reviewer) = suggestion.reviewed_by_id
            && self.store.find_account(reviewer)?.is_none()
        {
            suggestion.reviewed_by_id = None;
            self.warning(format!(
                "{}: reviewer {reviewer} is not present, reference dropped",
                suggestion.label()
            ));
        }

        let existing = self.store.find_suggestion(suggestion.id)?;
        self.settle(
            &suggestion,
            existing,
            |store, s| store.create_suggestion(s),
            |store, s| store.update_suggestion(s),
        )?;
        Ok(())
    }

    fn import_audit_record(&mut self, incoming: &AuditRecord) -> Result<(), EngineError> {
        let record = AuditRecord {
            user_id: self.account_ref(incoming.user_id),
            ..incoming.clone()
        };
        if self.store.find_account(record.user_id)?.is_none() {
            self.skip(format!(
                "skipped {}: user {} is not present",
                record.label(),
                record.user_id
            ));
            return Ok(());
        }

        let existing = self.store.find_audit_record(record.id)?;
        self.settle(
            &record,
            existing,
            |store, r| store.create_audit_record(r),
            |store, r| store.update_audit_record(r),
        )?;
        Ok(())
    }

    fn import_photo(&mut self, incoming: &PhotoAsset) -> Result<(), EngineError> {
        let asset = PhotoAsset {
            person_id: self.person_ref(incoming.person_id),
            ..incoming.clone()
        };
        if self.store.find_person(asset.person_id)?.is_none() {
            self.skip(format!(
                "skipped photo {}: person {} is not present",
                asset.file_name, asset.person_id
            ));
            return Ok(());
        }

        let present = self.photos.has_photo(asset.person_id, &asset.file_name)?;
        if present && self.strategy == ResolutionStrategy::Skip {
            self.skip(format!(
                "skipped photo {}: already present for person {}",
                asset.file_name, asset.person_id
            ));
            return Ok(());
        }

        self.photos.put_photo(&asset)?;
        self.outcome.statistics.record_import(EntityKind::Photo);
        if present {
            self.outcome.statistics.conflicts_resolved += 1;
        }
        Ok(())
    }
}
