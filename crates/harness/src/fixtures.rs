//! Record builders with plausible defaults. Tests override what they care about.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, Utc};
use serde_json::json;

use kinvault_core::{
    Account, AccountId, AuditId, AuditRecord, Gender, Operator, Person, PersonId, PhotoAsset,
    PrivacyLevel, Relationship, RelationshipId, RelationshipKind, Role, Settings, Suggestion,
    SuggestionId, SuggestionKind, SuggestionStatus,
};

pub fn person(first_name: &str, last_name: &str) -> Person {
    let now = Utc::now();
    Person {
        id: PersonId::new(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        maiden_name: None,
        birth_date: None,
        death_date: None,
        birth_place: None,
        native_place: None,
        gender: None,
        photo_url: None,
        email: None,
        phone: None,
        address: None,
        occupation: None,
        biography: None,
        is_living: true,
        created_at: now,
        updated_at: now,
    }
}

/// A person with the optional fields filled in.
pub fn detailed_person(first_name: &str, last_name: &str, birth: (i32, u32, u32)) -> Person {
    let mut p = person(first_name, last_name);
    p.birth_date = NaiveDate::from_ymd_opt(birth.0, birth.1, birth.2);
    p.birth_place = Some("Porto".to_string());
    p.gender = Some(Gender::Other);
    p.email = Some(format!(
        "{}.{}@example.org",
        first_name.to_lowercase(),
        last_name.to_lowercase()
    ));
    p.occupation = Some("Librarian".to_string());
    p
}

pub fn account(email: &str, role: Role) -> Account {
    let now = Utc::now();
    Account {
        id: AccountId::new(),
        email: email.to_string(),
        name: None,
        person_id: None,
        role,
        is_active: true,
        must_change_password: false,
        invited_by_id: None,
        created_at: now,
        updated_at: now,
        last_login_at: None,
    }
}

pub fn relationship(from: PersonId, to: PersonId, kind: RelationshipKind) -> Relationship {
    let now = Utc::now();
    Relationship {
        id: RelationshipId::new(),
        person_id: from,
        related_person_id: to,
        kind,
        marriage_date: None,
        divorce_date: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn suggestion(submitted_by: AccountId, target: Option<PersonId>) -> Suggestion {
    Suggestion {
        id: SuggestionId::new(),
        kind: SuggestionKind::Update,
        target_person_id: target,
        suggested_data: json!({"occupation": "Carpenter"}),
        reason: "Family records".to_string(),
        status: SuggestionStatus::Pending,
        submitted_by_id: submitted_by,
        reviewed_by_id: None,
        review_note: None,
        submitted_at: Utc::now(),
        reviewed_at: None,
    }
}

pub fn audit_record(user_id: AccountId, days_ago: i64) -> AuditRecord {
    AuditRecord {
        id: AuditId::new(),
        user_id,
        action: "UPDATE".to_string(),
        entity_type: "Person".to_string(),
        entity_id: None,
        old_data: None,
        new_data: Some(json!({"lastName": "Costa"})),
        ip_address: Some("127.0.0.1".to_string()),
        user_agent: None,
        created_at: Utc::now() - Duration::days(days_ago),
    }
}

pub fn settings(site_name: &str) -> Settings {
    Settings {
        site_name: site_name.to_string(),
        site_description: None,
        language: "en".to_string(),
        custom_labels: BTreeMap::new(),
        default_privacy: PrivacyLevel::MembersOnly,
        allow_self_registration: false,
        require_approval_for_edits: true,
        updated_at: Utc::now(),
    }
}

pub fn photo(person_id: PersonId, file_name: &str) -> PhotoAsset {
    PhotoAsset {
        person_id,
        file_name: file_name.to_string(),
        bytes: format!("jpeg:{person_id}:{file_name}").into_bytes(),
    }
}

pub fn operator(account: &Account) -> Operator {
    Operator {
        id: account.id,
        email: account.email.clone(),
        name: account.name.clone(),
    }
}
