//! Records carried by a backup archive.
//!
//! Field names follow the archive's JSON shape (camelCase, enumerations in
//! SCREAMING_SNAKE_CASE). Optional fields accept either `null` or absence.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::*;

/// The entity kinds an archive carries, used to tag conflicts, statistics
/// and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Settings,
    Person,
    #[serde(rename = "user")]
    Account,
    Relationship,
    Suggestion,
    AuditLog,
    Photo,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Settings => "settings",
            Self::Person => "person",
            Self::Account => "user",
            Self::Relationship => "relationship",
            Self::Suggestion => "suggestion",
            Self::AuditLog => "auditLog",
            Self::Photo => "photo",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common surface of every archived record.
pub trait Record: Serialize + DeserializeOwned + Clone {
    const KIND: EntityKind;

    /// Identity rendered as a string, used to key conflicts.
    fn record_id(&self) -> String;

    /// Human-readable label used in warnings and errors.
    fn label(&self) -> String;

    /// Checks the natural fields serde cannot express (non-blank names, etc).
    fn check(&self) -> Result<(), CoreError> {
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn require_text(value: &str, entity: String, field: &'static str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::MissingField { entity, field });
    }
    Ok(())
}

// ============================================================================
// People
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "MALE",
            Self::Female => "FEMALE",
            Self::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "MALE" => Ok(Self::Male),
            "FEMALE" => Ok(Self::Female),
            "OTHER" => Ok(Self::Other),
            _ => Err(CoreError::InvalidData(format!("unknown gender: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: PersonId,
    pub first_name: String,
    pub last_name: String,
    pub maiden_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub death_date: Option<NaiveDate>,
    pub birth_place: Option<String>,
    pub native_place: Option<String>,
    pub gender: Option<Gender>,
    pub photo_url: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub occupation: Option<String>,
    pub biography: Option<String>,
    pub is_living: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Person {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn has_photo(&self) -> bool {
        self.photo_url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }
}

impl Record for Person {
    const KIND: EntityKind = EntityKind::Person;

    fn record_id(&self) -> String {
        self.id.to_string()
    }

    fn label(&self) -> String {
        format!("person \"{}\" ({})", self.full_name(), self.id)
    }

    fn check(&self) -> Result<(), CoreError> {
        require_text(&self.first_name, self.label(), "firstName")?;
        require_text(&self.last_name, self.label(), "lastName")
    }
}

// ============================================================================
// Relationships
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipKind {
    Parent,
    Child,
    Spouse,
    Sibling,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parent => "PARENT",
            Self::Child => "CHILD",
            Self::Spouse => "SPOUSE",
            Self::Sibling => "SIBLING",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "PARENT" => Ok(Self::Parent),
            "CHILD" => Ok(Self::Child),
            "SPOUSE" => Ok(Self::Spouse),
            "SIBLING" => Ok(Self::Sibling),
            _ => Err(CoreError::InvalidData(format!("unknown relationship type: {s}"))),
        }
    }

    /// The kind stored on the mirrored row (B→A) of an A→B edge.
    pub fn mirror(&self) -> Self {
        match self {
            Self::Parent => Self::Child,
            Self::Child => Self::Parent,
            Self::Spouse => Self::Spouse,
            Self::Sibling => Self::Sibling,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: RelationshipId,
    pub person_id: PersonId,
    pub related_person_id: PersonId,
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    pub marriage_date: Option<NaiveDate>,
    pub divorce_date: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Relationship {
    const KIND: EntityKind = EntityKind::Relationship;

    fn record_id(&self) -> String {
        self.id.to_string()
    }

    fn label(&self) -> String {
        format!(
            "relationship {} {} -> {} ({})",
            self.kind.as_str(),
            self.person_id,
            self.related_person_id,
            self.id
        )
    }

    fn check(&self) -> Result<(), CoreError> {
        if self.person_id == self.related_person_id {
            return Err(CoreError::InvalidData(format!(
                "{} relates a person to themselves",
                self.label()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Editor => "EDITOR",
            Self::Viewer => "VIEWER",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "ADMIN" => Ok(Self::Admin),
            "EDITOR" => Ok(Self::Editor),
            "VIEWER" => Ok(Self::Viewer),
            _ => Err(CoreError::InvalidData(format!("unknown role: {s}"))),
        }
    }
}

/// A login account. Archives never carry credential material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    pub name: Option<String>,
    pub person_id: Option<PersonId>,
    pub role: Role,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub must_change_password: bool,
    pub invited_by_id: Option<AccountId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl Record for Account {
    const KIND: EntityKind = EntityKind::Account;

    fn record_id(&self) -> String {
        self.id.to_string()
    }

    fn label(&self) -> String {
        format!("user {} ({})", self.email, self.id)
    }

    fn check(&self) -> Result<(), CoreError> {
        require_text(&self.email, self.label(), "email")?;
        if !self.email.contains('@') {
            return Err(CoreError::InvalidData(format!(
                "{} has a malformed email address",
                self.label()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Suggestions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionKind {
    Create,
    Update,
    Delete,
    AddRelationship,
    RemoveRelationship,
}

impl SuggestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::AddRelationship => "ADD_RELATIONSHIP",
            Self::RemoveRelationship => "REMOVE_RELATIONSHIP",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            "ADD_RELATIONSHIP" => Ok(Self::AddRelationship),
            "REMOVE_RELATIONSHIP" => Ok(Self::RemoveRelationship),
            _ => Err(CoreError::InvalidData(format!("unknown suggestion type: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            _ => Err(CoreError::InvalidData(format!("unknown suggestion status: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: SuggestionId,
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub target_person_id: Option<PersonId>,
    pub suggested_data: serde_json::Value,
    #[serde(default)]
    pub reason: String,
    pub status: SuggestionStatus,
    pub submitted_by_id: AccountId,
    pub reviewed_by_id: Option<AccountId>,
    pub review_note: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Record for Suggestion {
    const KIND: EntityKind = EntityKind::Suggestion;

    fn record_id(&self) -> String {
        self.id.to_string()
    }

    fn label(&self) -> String {
        format!("suggestion {} ({})", self.kind.as_str(), self.id)
    }
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrivacyLevel {
    Public,
    MembersOnly,
    Private,
}

impl PrivacyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "PUBLIC",
            Self::MembersOnly => "MEMBERS_ONLY",
            Self::Private => "PRIVATE",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "PUBLIC" => Ok(Self::Public),
            "MEMBERS_ONLY" => Ok(Self::MembersOnly),
            "PRIVATE" => Ok(Self::Private),
            _ => Err(CoreError::InvalidData(format!("unknown privacy level: {s}"))),
        }
    }
}

/// Site-wide settings. A store holds at most one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub site_name: String,
    pub site_description: Option<String>,
    pub language: String,
    #[serde(default)]
    pub custom_labels: BTreeMap<String, String>,
    pub default_privacy: PrivacyLevel,
    #[serde(default)]
    pub allow_self_registration: bool,
    #[serde(default = "default_true")]
    pub require_approval_for_edits: bool,
    pub updated_at: DateTime<Utc>,
}

impl Record for Settings {
    const KIND: EntityKind = EntityKind::Settings;

    fn record_id(&self) -> String {
        "settings".to_string()
    }

    fn label(&self) -> String {
        format!("settings \"{}\"", self.site_name)
    }

    fn check(&self) -> Result<(), CoreError> {
        require_text(&self.site_name, self.label(), "siteName")?;
        require_text(&self.language, self.label(), "language")
    }
}

// ============================================================================
// Audit log
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: AuditId,
    pub user_id: AccountId,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for AuditRecord {
    const KIND: EntityKind = EntityKind::AuditLog;

    fn record_id(&self) -> String {
        self.id.to_string()
    }

    fn label(&self) -> String {
        format!("audit log {} on {} ({})", self.action, self.entity_type, self.id)
    }

    fn check(&self) -> Result<(), CoreError> {
        require_text(&self.action, self.label(), "action")?;
        require_text(&self.entity_type, self.label(), "entityType")
    }
}

// ============================================================================
// Photo assets
// ============================================================================

/// A binary photo file belonging to one person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoAsset {
    pub person_id: PersonId,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl PhotoAsset {
    /// Rejects names that would escape the owning person's directory.
    pub fn check_file_name(name: &str) -> Result<(), CoreError> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(CoreError::InvalidData(format!("invalid photo file name: {name:?}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn person_accepts_missing_optional_fields() {
        let raw = json!({
            "id": PersonId::new(),
            "firstName": "Ada",
            "lastName": "Lovelace",
            "isLiving": false,
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
        });
        let person: Person = serde_json::from_value(raw).unwrap();
        assert!(person.birth_date.is_none());
        assert!(!person.has_photo());
        assert!(person.check().is_ok());
    }

    #[test]
    fn person_without_living_flag_is_rejected() {
        let raw = json!({
            "id": PersonId::new(),
            "firstName": "Ada",
            "lastName": "Lovelace",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
        });
        assert!(serde_json::from_value::<Person>(raw).is_err());
    }

    #[test]
    fn blank_names_fail_the_shape_check() {
        let raw = json!({
            "id": PersonId::new(),
            "firstName": "  ",
            "lastName": "Lovelace",
            "isLiving": true,
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
        });
        let person: Person = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            person.check(),
            Err(CoreError::MissingField { field: "firstName", .. })
        ));
    }

    #[test]
    fn relationship_type_uses_wire_names() {
        let rel = Relationship {
            id: RelationshipId::new(),
            person_id: PersonId::new(),
            related_person_id: PersonId::new(),
            kind: RelationshipKind::Parent,
            marriage_date: None,
            divorce_date: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&rel).unwrap();
        assert_eq!(value["type"], "PARENT");
        assert_eq!(RelationshipKind::Parent.mirror(), RelationshipKind::Child);
        assert_eq!(RelationshipKind::Spouse.mirror(), RelationshipKind::Spouse);
    }

    #[test]
    fn account_email_must_look_like_an_address() {
        let raw = json!({
            "id": AccountId::new(),
            "email": "nobody",
            "role": "VIEWER",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
        });
        let account: Account = serde_json::from_value(raw).unwrap();
        assert!(account.is_active);
        assert!(account.check().is_err());
    }

    #[test]
    fn entity_kind_keys_match_section_vocabulary() {
        assert_eq!(serde_json::to_value(EntityKind::Account).unwrap(), "user");
        assert_eq!(serde_json::to_value(EntityKind::AuditLog).unwrap(), "auditLog");
    }

    #[test]
    fn photo_names_cannot_traverse() {
        assert!(PhotoAsset::check_file_name("portrait.jpg").is_ok());
        assert!(PhotoAsset::check_file_name("../etc/passwd").is_err());
        assert!(PhotoAsset::check_file_name("..").is_err());
        assert!(PhotoAsset::check_file_name("").is_err());
    }
}
