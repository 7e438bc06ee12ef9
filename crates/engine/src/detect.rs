//! Collision detection between incoming records and the live store.

use kinvault_core::{
    conflict::differing_scalar_fields, Conflict, ConflictAction, CoreError, Record, Severity,
};
use kinvault_storage::RecordStore;
use tracing::debug;

use crate::error::EngineError;
use crate::sections::ArchiveSections;

fn conflict<T: Record>(
    action: ConflictAction,
    existing: &T,
    incoming: &T,
    conflict_fields: Vec<String>,
    severity: Severity,
    description: String,
) -> Result<Conflict, CoreError> {
    Ok(Conflict {
        entity_type: T::KIND,
        action,
        existing_id: Some(existing.record_id()),
        incoming_id: incoming.record_id(),
        existing_data: serde_json::to_value(existing)?,
        incoming_data: serde_json::to_value(incoming)?,
        conflict_fields,
        severity,
        description,
    })
}

/// Same identity already stored: an update of that row.
fn identity_conflict<T: Record>(
    existing: &T,
    incoming: &T,
    severity: Severity,
) -> Result<Conflict, CoreError> {
    let existing_data = serde_json::to_value(existing)?;
    let incoming_data = serde_json::to_value(incoming)?;
    let fields = differing_scalar_fields(&existing_data, &incoming_data);
    let description = if fields.is_empty() {
        format!("{} already exists with identical values", incoming.label())
    } else {
        format!("{} already exists; differs in {}", incoming.label(), fields.join(", "))
    };
    Ok(Conflict {
        entity_type: T::KIND,
        action: ConflictAction::Update,
        existing_id: Some(existing.record_id()),
        incoming_id: incoming.record_id(),
        existing_data,
        incoming_data,
        conflict_fields: fields,
        severity,
        description,
    })
}

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// Compares every decoded person, account and relationship against the
/// store. Reads only; every record is checked even after a hit.
pub fn detect_conflicts<S: RecordStore + ?Sized>(
    sections: &ArchiveSections,
    store: &S,
) -> Result<Vec<Conflict>, EngineError> {
    let mut conflicts = Vec::new();

    for person in &sections.people {
        if let Some(existing) = store.find_person(person.id)? {
            conflicts.push(identity_conflict(&existing, person, Severity::Medium)?);
            continue;
        }
        if let Some(email) = person.email.as_deref().filter(|e| !e.trim().is_empty())
            && let Some(existing) = store.find_person_by_email(email)?
        {
            conflicts.push(conflict(
                ConflictAction::Create,
                &existing,
                person,
                fields(&["email"]),
                Severity::High,
                format!("{} shares email {email} with existing {}", person.label(), existing.label()),
            )?);
        }
        if let Some(birth_date) = person.birth_date {
            for existing in
                store.find_people_by_name_and_birth(&person.first_name, &person.last_name, birth_date)?
            {
                conflicts.push(conflict(
                    ConflictAction::Create,
                    &existing,
                    person,
                    fields(&["firstName", "lastName", "birthDate"]),
                    Severity::Low,
                    format!(
                        "{} may duplicate existing {} (same name and birth date)",
                        person.label(),
                        existing.label()
                    ),
                )?);
            }
        }
    }

    for account in &sections.accounts {
        if let Some(existing) = store.find_account(account.id)? {
            conflicts.push(identity_conflict(&existing, account, Severity::High)?);
        } else if let Some(existing) = store.find_account_by_email(&account.email)? {
            conflicts.push(conflict(
                ConflictAction::Create,
                &existing,
                account,
                fields(&["email"]),
                Severity::High,
                format!("{} collides with existing {}", account.label(), existing.label()),
            )?);
        }
    }

    for relationship in &sections.relationships {
        if let Some(existing) = store.find_relationship(relationship.id)? {
            conflicts.push(identity_conflict(&existing, relationship, Severity::Medium)?);
        } else if let Some(existing) = store.find_relationship_by_edge(
            relationship.person_id,
            relationship.related_person_id,
            relationship.kind,
        )? {
            conflicts.push(conflict(
                ConflictAction::Create,
                &existing,
                relationship,
                fields(&["personId", "relatedPersonId", "type"]),
                Severity::Medium,
                format!("{} duplicates existing {}", relationship.label(), existing.label()),
            )?);
        }
    }

    debug!(target: "kinvault::validate", conflicts = conflicts.len(), "conflict detection finished");
    Ok(conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use kinvault_core::{Person, PersonId, Relationship, RelationshipId, RelationshipKind};
    use kinvault_storage::SqliteStore;

    fn person(first: &str, email: Option<&str>) -> Person {
        let now = Utc::now();
        Person {
            id: PersonId::new(),
            first_name: first.into(),
            last_name: "Costa".into(),
            maiden_name: None,
            birth_date: NaiveDate::from_ymd_opt(1961, 7, 2),
            death_date: None,
            birth_place: None,
            native_place: None,
            gender: None,
            photo_url: None,
            email: email.map(str::to_string),
            phone: None,
            address: None,
            occupation: None,
            biography: None,
            is_living: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn name_and_birth_match_is_low_and_email_match_is_high() -> Result<(), EngineError> {
        let mut store = SqliteStore::open_in_memory()?;
        let stored = person("Rui", Some("rui@example.org"));
        store.create_person(&stored)?;

        let sections = ArchiveSections {
            people: vec![person("Rui", Some("RUI@example.org"))],
            ..Default::default()
        };
        let conflicts = detect_conflicts(&sections, &store)?;
        let severities: Vec<_> = conflicts.iter().map(|c| c.severity).collect();
        assert_eq!(severities, vec![Severity::High, Severity::Low]);
        assert!(conflicts.iter().all(|c| c.action == ConflictAction::Create));
        assert_eq!(conflicts[0].existing_id, Some(stored.id.to_string()));
        Ok(())
    }

    #[test]
    fn heuristic_needs_a_birth_date() -> Result<(), EngineError> {
        let mut store = SqliteStore::open_in_memory()?;
        let mut stored = person("Rui", None);
        stored.birth_date = None;
        store.create_person(&stored)?;

        let mut incoming = person("Rui", None);
        incoming.birth_date = None;
        let sections = ArchiveSections {
            people: vec![incoming],
            ..Default::default()
        };
        assert!(detect_conflicts(&sections, &store)?.is_empty());
        Ok(())
    }

    fn parent_edge(from: PersonId, to: PersonId) -> Relationship {
        let now = Utc::now();
        Relationship {
            id: RelationshipId::new(),
            person_id: from,
            related_person_id: to,
            kind: RelationshipKind::Parent,
            marriage_date: None,
            divorce_date: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn same_edge_under_a_new_id_is_a_medium_create() -> Result<(), EngineError> {
        let mut store = SqliteStore::open_in_memory()?;
        let (parent, kid) = (person("Rui", None), person("Lara", None));
        store.create_person(&parent)?;
        store.create_person(&kid)?;
        let stored = parent_edge(parent.id, kid.id);
        store.create_relationship(&stored)?;

        let sections = ArchiveSections {
            relationships: vec![parent_edge(parent.id, kid.id)],
            ..Default::default()
        };
        let conflicts = detect_conflicts(&sections, &store)?;
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].action, ConflictAction::Create);
        assert_eq!(conflicts[0].severity, Severity::Medium);
        assert_eq!(conflicts[0].existing_id, Some(stored.id.to_string()));
        assert_eq!(conflicts[0].conflict_fields, vec!["personId", "relatedPersonId", "type"]);
        Ok(())
    }
}
