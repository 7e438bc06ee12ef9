//! Field-level folding of an incoming record onto a stored one.
//!
//! `merge_*` keeps the stored value wherever the incoming record is blank
//! (absent optional, empty string, `null` payload). `replace` takes every
//! incoming value but keeps the stored identity. Neither touches a store.

use crate::records::*;

/// Per-kind resolution of a stored record against an incoming one.
pub trait Resolve: Record {
    fn merge(existing: &Self, incoming: &Self) -> Self;

    fn replace(existing: &Self, incoming: &Self) -> Self;
}

fn text(existing: &str, incoming: &str) -> String {
    if incoming.trim().is_empty() {
        existing.to_string()
    } else {
        incoming.to_string()
    }
}

fn opt_text(existing: &Option<String>, incoming: &Option<String>) -> Option<String> {
    match incoming {
        Some(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => existing.clone(),
    }
}

fn opt<T: Clone>(existing: &Option<T>, incoming: &Option<T>) -> Option<T> {
    incoming.clone().or_else(|| existing.clone())
}

fn opt_json(
    existing: &Option<serde_json::Value>,
    incoming: &Option<serde_json::Value>,
) -> Option<serde_json::Value> {
    match incoming {
        Some(v) if !v.is_null() => Some(v.clone()),
        _ => existing.clone(),
    }
}

pub fn merge_person(existing: &Person, incoming: &Person) -> Person {
    Person {
        id: existing.id,
        first_name: text(&existing.first_name, &incoming.first_name),
        last_name: text(&existing.last_name, &incoming.last_name),
        maiden_name: opt_text(&existing.maiden_name, &incoming.maiden_name),
        birth_date: opt(&existing.birth_date, &incoming.birth_date),
        death_date: opt(&existing.death_date, &incoming.death_date),
        birth_place: opt_text(&existing.birth_place, &incoming.birth_place),
        native_place: opt_text(&existing.native_place, &incoming.native_place),
        gender: opt(&existing.gender, &incoming.gender),
        photo_url: opt_text(&existing.photo_url, &incoming.photo_url),
        email: opt_text(&existing.email, &incoming.email),
        phone: opt_text(&existing.phone, &incoming.phone),
        address: opt_text(&existing.address, &incoming.address),
        occupation: opt_text(&existing.occupation, &incoming.occupation),
        biography: opt_text(&existing.biography, &incoming.biography),
        is_living: incoming.is_living,
        created_at: existing.created_at,
        updated_at: existing.updated_at.max(incoming.updated_at),
    }
}

pub fn merge_relationship(existing: &Relationship, incoming: &Relationship) -> Relationship {
    Relationship {
        id: existing.id,
        person_id: incoming.person_id,
        related_person_id: incoming.related_person_id,
        kind: incoming.kind,
        marriage_date: opt(&existing.marriage_date, &incoming.marriage_date),
        divorce_date: opt(&existing.divorce_date, &incoming.divorce_date),
        is_active: incoming.is_active,
        created_at: existing.created_at,
        updated_at: existing.updated_at.max(incoming.updated_at),
    }
}

pub fn merge_account(existing: &Account, incoming: &Account) -> Account {
    Account {
        id: existing.id,
        email: text(&existing.email, &incoming.email),
        name: opt_text(&existing.name, &incoming.name),
        person_id: opt(&existing.person_id, &incoming.person_id),
        role: incoming.role,
        is_active: incoming.is_active,
        must_change_password: existing.must_change_password || incoming.must_change_password,
        invited_by_id: opt(&existing.invited_by_id, &incoming.invited_by_id),
        created_at: existing.created_at,
        updated_at: existing.updated_at.max(incoming.updated_at),
        last_login_at: existing.last_login_at.max(incoming.last_login_at),
    }
}

pub fn merge_suggestion(existing: &Suggestion, incoming: &Suggestion) -> Suggestion {
    Suggestion {
        id: existing.id,
        kind: incoming.kind,
        target_person_id: opt(&existing.target_person_id, &incoming.target_person_id),
        suggested_data: if incoming.suggested_data.is_null() {
            existing.suggested_data.clone()
        } else {
            incoming.suggested_data.clone()
        },
        reason: text(&existing.reason, &incoming.reason),
        status: incoming.status,
        submitted_by_id: incoming.submitted_by_id,
        reviewed_by_id: opt(&existing.reviewed_by_id, &incoming.reviewed_by_id),
        review_note: opt_text(&existing.review_note, &incoming.review_note),
        submitted_at: existing.submitted_at,
        reviewed_at: opt(&existing.reviewed_at, &incoming.reviewed_at),
    }
}

pub fn merge_settings(existing: &Settings, incoming: &Settings) -> Settings {
    let mut custom_labels = existing.custom_labels.clone();
    for (key, label) in &incoming.custom_labels {
        if !label.trim().is_empty() {
            custom_labels.insert(key.clone(), label.clone());
        }
    }
    Settings {
        site_name: text(&existing.site_name, &incoming.site_name),
        site_description: opt_text(&existing.site_description, &incoming.site_description),
        language: text(&existing.language, &incoming.language),
        custom_labels,
        default_privacy: incoming.default_privacy,
        allow_self_registration: incoming.allow_self_registration,
        require_approval_for_edits: incoming.require_approval_for_edits,
        updated_at: existing.updated_at.max(incoming.updated_at),
    }
}

pub fn merge_audit_record(existing: &AuditRecord, incoming: &AuditRecord) -> AuditRecord {
    AuditRecord {
        id: existing.id,
        user_id: incoming.user_id,
        action: text(&existing.action, &incoming.action),
        entity_type: text(&existing.entity_type, &incoming.entity_type),
        entity_id: opt_text(&existing.entity_id, &incoming.entity_id),
        old_data: opt_json(&existing.old_data, &incoming.old_data),
        new_data: opt_json(&existing.new_data, &incoming.new_data),
        ip_address: opt_text(&existing.ip_address, &incoming.ip_address),
        user_agent: opt_text(&existing.user_agent, &incoming.user_agent),
        created_at: existing.created_at,
    }
}

impl Resolve for Person {
    fn merge(existing: &Self, incoming: &Self) -> Self {
        merge_person(existing, incoming)
    }

    fn replace(existing: &Self, incoming: &Self) -> Self {
        Self { id: existing.id, ..incoming.clone() }
    }
}

impl Resolve for Relationship {
    fn merge(existing: &Self, incoming: &Self) -> Self {
        merge_relationship(existing, incoming)
    }

    fn replace(existing: &Self, incoming: &Self) -> Self {
        Self { id: existing.id, ..incoming.clone() }
    }
}

impl Resolve for Account {
    fn merge(existing: &Self, incoming: &Self) -> Self {
        merge_account(existing, incoming)
    }

    fn replace(existing: &Self, incoming: &Self) -> Self {
        Self { id: existing.id, ..incoming.clone() }
    }
}

impl Resolve for Suggestion {
    fn merge(existing: &Self, incoming: &Self) -> Self {
        merge_suggestion(existing, incoming)
    }

    fn replace(existing: &Self, incoming: &Self) -> Self {
        Self { id: existing.id, ..incoming.clone() }
    }
}

impl Resolve for Settings {
    fn merge(existing: &Self, incoming: &Self) -> Self {
        merge_settings(existing, incoming)
    }

    fn replace(_existing: &Self, incoming: &Self) -> Self {
        incoming.clone()
    }
}

impl Resolve for AuditRecord {
    fn merge(existing: &Self, incoming: &Self) -> Self {
        merge_audit_record(existing, incoming)
    }

    fn replace(existing: &Self, incoming: &Self) -> Self {
        Self { id: existing.id, ..incoming.clone() }
    }
}
