use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, Row};
use tracing::debug;

use kinvault_core::{
    ids::*,
    records::{
        Account, AuditRecord, Gender, Person, PrivacyLevel, Relationship, RelationshipKind, Role,
        Settings, Suggestion, SuggestionKind, SuggestionStatus,
    },
};

use crate::error::StorageError;
use crate::traits::RecordStore;

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn get_id(row: &Row<'_>, idx: usize, label: &str) -> Result<[u8; 16], StorageError> {
    let bytes: Vec<u8> = row.get(idx)?;
    to_array::<16>(bytes, label)
}

fn get_opt_id(row: &Row<'_>, idx: usize, label: &str) -> Result<Option<[u8; 16]>, StorageError> {
    let bytes: Option<Vec<u8>> = row.get(idx)?;
    bytes.map(|b| to_array::<16>(b, label)).transpose()
}

fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("invalid timestamp {raw:?}: {e}")))
}

fn get_ts(row: &Row<'_>, idx: usize) -> Result<DateTime<Utc>, StorageError> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw)
}

fn get_opt_ts(row: &Row<'_>, idx: usize) -> Result<Option<DateTime<Utc>>, StorageError> {
    let raw: Option<String> = row.get(idx)?;
    raw.as_deref().map(parse_ts).transpose()
}

fn date(value: &NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

fn get_opt_date(row: &Row<'_>, idx: usize) -> Result<Option<NaiveDate>, StorageError> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map_err(|e| StorageError::Serialization(format!("invalid date {s:?}: {e}")))
    })
    .transpose()
}

fn to_msgpack<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    rmp_serde::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn from_msgpack<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    rmp_serde::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn get_opt_json(row: &Row<'_>, idx: usize) -> Result<Option<serde_json::Value>, StorageError> {
    let bytes: Option<Vec<u8>> = row.get(idx)?;
    bytes.as_deref().map(from_msgpack).transpose()
}

fn opt_json_blob(value: &Option<serde_json::Value>) -> Result<Option<Vec<u8>>, StorageError> {
    value.as_ref().map(to_msgpack).transpose()
}

/// Maps constraint failures to a typed error naming the record.
fn write_err(e: rusqlite::Error, what: &str) -> StorageError {
    match e {
        rusqlite::Error::SqliteFailure(err, msg)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StorageError::ConstraintViolation(format!(
                "{what}: {}",
                msg.unwrap_or_else(|| err.to_string())
            ))
        }
        other => StorageError::Sqlite(other),
    }
}

fn expect_updated(changed: usize, what: &str) -> Result<(), StorageError> {
    if changed == 0 {
        return Err(StorageError::NotFound(what.to_string()));
    }
    Ok(())
}

fn query_rows<T, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    read: fn(&Row<'_>) -> Result<T, StorageError>,
) -> Result<Vec<T>, StorageError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(read(row)?);
    }
    Ok(result)
}

fn query_first<T, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    read: fn(&Row<'_>) -> Result<T, StorageError>,
) -> Result<Option<T>, StorageError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    match rows.next()? {
        Some(row) => Ok(Some(read(row)?)),
        None => Ok(None),
    }
}

const PERSON_COLUMNS: &str = "id, first_name, last_name, maiden_name, birth_date, death_date, birth_place, native_place, gender, photo_url, email, phone, address, occupation, biography, is_living, created_at, updated_at";

fn read_person(row: &Row<'_>) -> Result<Person, StorageError> {
    let gender: Option<String> = row.get(8)?;
    Ok(Person {
        id: PersonId::from_bytes(get_id(row, 0, "person id")?),
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        maiden_name: row.get(3)?,
        birth_date: get_opt_date(row, 4)?,
        death_date: get_opt_date(row, 5)?,
        birth_place: row.get(6)?,
        native_place: row.get(7)?,
        gender: gender.as_deref().map(Gender::parse).transpose()?,
        photo_url: row.get(9)?,
        email: row.get(10)?,
        phone: row.get(11)?,
        address: row.get(12)?,
        occupation: row.get(13)?,
        biography: row.get(14)?,
        is_living: row.get(15)?,
        created_at: get_ts(row, 16)?,
        updated_at: get_ts(row, 17)?,
    })
}

const RELATIONSHIP_COLUMNS: &str =
    "id, person_id, related_person_id, type, marriage_date, divorce_date, is_active, created_at, updated_at";

fn read_relationship(row: &Row<'_>) -> Result<Relationship, StorageError> {
    let kind: String = row.get(3)?;
    Ok(Relationship {
        id: RelationshipId::from_bytes(get_id(row, 0, "relationship id")?),
        person_id: PersonId::from_bytes(get_id(row, 1, "person_id")?),
        related_person_id: PersonId::from_bytes(get_id(row, 2, "related_person_id")?),
        kind: RelationshipKind::parse(&kind)?,
        marriage_date: get_opt_date(row, 4)?,
        divorce_date: get_opt_date(row, 5)?,
        is_active: row.get(6)?,
        created_at: get_ts(row, 7)?,
        updated_at: get_ts(row, 8)?,
    })
}

const ACCOUNT_COLUMNS: &str = "id, email, name, person_id, role, is_active, must_change_password, invited_by_id, created_at, updated_at, last_login_at";

fn read_account(row: &Row<'_>) -> Result<Account, StorageError> {
    let role: String = row.get(4)?;
    Ok(Account {
        id: AccountId::from_bytes(get_id(row, 0, "user id")?),
        email: row.get(1)?,
        name: row.get(2)?,
        person_id: get_opt_id(row, 3, "person_id")?.map(PersonId::from_bytes),
        role: Role::parse(&role)?,
        is_active: row.get(5)?,
        must_change_password: row.get(6)?,
        invited_by_id: get_opt_id(row, 7, "invited_by_id")?.map(AccountId::from_bytes),
        created_at: get_ts(row, 8)?,
        updated_at: get_ts(row, 9)?,
        last_login_at: get_opt_ts(row, 10)?,
    })
}

const SUGGESTION_COLUMNS: &str = "id, type, target_person_id, suggested_data, reason, status, submitted_by_id, reviewed_by_id, review_note, submitted_at, reviewed_at";

fn read_suggestion(row: &Row<'_>) -> Result<Suggestion, StorageError> {
    let kind: String = row.get(1)?;
    let data: Vec<u8> = row.get(3)?;
    let status: String = row.get(5)?;
    Ok(Suggestion {
        id: SuggestionId::from_bytes(get_id(row, 0, "suggestion id")?),
        kind: SuggestionKind::parse(&kind)?,
        target_person_id: get_opt_id(row, 2, "target_person_id")?.map(PersonId::from_bytes),
        suggested_data: from_msgpack(&data)?,
        reason: row.get(4)?,
        status: SuggestionStatus::parse(&status)?,
        submitted_by_id: AccountId::from_bytes(get_id(row, 6, "submitted_by_id")?),
        reviewed_by_id: get_opt_id(row, 7, "reviewed_by_id")?.map(AccountId::from_bytes),
        review_note: row.get(8)?,
        submitted_at: get_ts(row, 9)?,
        reviewed_at: get_opt_ts(row, 10)?,
    })
}

fn read_settings(row: &Row<'_>) -> Result<Settings, StorageError> {
    let labels: Vec<u8> = row.get(3)?;
    let privacy: String = row.get(4)?;
    Ok(Settings {
        site_name: row.get(0)?,
        site_description: row.get(1)?,
        language: row.get(2)?,
        custom_labels: from_msgpack::<BTreeMap<String, String>>(&labels)?,
        default_privacy: PrivacyLevel::parse(&privacy)?,
        allow_self_registration: row.get(5)?,
        require_approval_for_edits: row.get(6)?,
        updated_at: get_ts(row, 7)?,
    })
}

const AUDIT_COLUMNS: &str = "id, user_id, action, entity_type, entity_id, old_data, new_data, ip_address, user_agent, created_at";

fn read_audit(row: &Row<'_>) -> Result<AuditRecord, StorageError> {
    Ok(AuditRecord {
        id: AuditId::from_bytes(get_id(row, 0, "audit id")?),
        user_id: AccountId::from_bytes(get_id(row, 1, "user_id")?),
        action: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        old_data: get_opt_json(row, 5)?,
        new_data: get_opt_json(row, 6)?,
        ip_address: row.get(7)?,
        user_agent: row.get(8)?,
        created_at: get_ts(row, 9)?,
    })
}

/// SQLite-backed application store.
///
/// The connection sits behind a mutex so the store is `Sync` and snapshot
/// reads may be issued from several threads; writes go through `&mut self`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        debug!(target: "kinvault::storage", path, "sqlite store opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Stores a credential hash for an account. Never exported.
    pub fn set_password_hash(&mut self, id: AccountId, hash: &str) -> Result<(), StorageError> {
        let changed = self.conn.get_mut().execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            rusqlite::params![hash, id.as_bytes().as_slice()],
        )?;
        expect_updated(changed, &format!("user {id}"))
    }

    pub fn password_hash(&self, id: AccountId) -> Result<Option<String>, StorageError> {
        let conn = self.conn.lock();
        let hash: Option<Option<String>> = query_first(
            &conn,
            "SELECT password_hash FROM users WHERE id = ?1",
            rusqlite::params![id.as_bytes().as_slice()],
            |row| Ok(row.get::<_, Option<String>>(0)?),
        )?;
        Ok(hash.flatten())
    }
}

impl RecordStore for SqliteStore {
    fn find_person(&self, id: PersonId) -> Result<Option<Person>, StorageError> {
        let conn = self.conn.lock();
        query_first(
            &conn,
            &format!("SELECT {PERSON_COLUMNS} FROM people WHERE id = ?1"),
            rusqlite::params![id.as_bytes().as_slice()],
            read_person,
        )
    }

    fn find_person_by_email(&self, email: &str) -> Result<Option<Person>, StorageError> {
        let conn = self.conn.lock();
        query_first(
            &conn,
            &format!(
                "SELECT {PERSON_COLUMNS} FROM people WHERE email = ?1 COLLATE NOCASE ORDER BY created_at LIMIT 1"
            ),
            rusqlite::params![email],
            read_person,
        )
    }

    fn find_people_by_name_and_birth(
        &self,
        first_name: &str,
        last_name: &str,
        birth_date: NaiveDate,
    ) -> Result<Vec<Person>, StorageError> {
        let conn = self.conn.lock();
        query_rows(
            &conn,
            &format!(
                "SELECT {PERSON_COLUMNS} FROM people WHERE first_name = ?1 AND last_name = ?2 AND birth_date = ?3 ORDER BY created_at"
            ),
            rusqlite::params![first_name, last_name, date(&birth_date)],
            read_person,
        )
    }

    fn list_people(&self) -> Result<Vec<Person>, StorageError> {
        let conn = self.conn.lock();
        query_rows(
            &conn,
            &format!("SELECT {PERSON_COLUMNS} FROM people ORDER BY created_at, id"),
            [],
            read_person,
        )
    }

    fn list_people_with_photos(&self) -> Result<Vec<Person>, StorageError> {
        let conn = self.conn.lock();
        query_rows(
            &conn,
            &format!(
                "SELECT {PERSON_COLUMNS} FROM people WHERE photo_url IS NOT NULL AND trim(photo_url) != '' ORDER BY created_at, id"
            ),
            [],
            read_person,
        )
    }

    fn create_person(&mut self, person: &Person) -> Result<(), StorageError> {
        self.conn
            .get_mut()
            .execute(
                &format!(
                    "INSERT INTO people ({PERSON_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
                ),
                rusqlite::params![
                    person.id.as_bytes().as_slice(),
                    person.first_name,
                    person.last_name,
                    person.maiden_name,
                    person.birth_date.as_ref().map(date),
                    person.death_date.as_ref().map(date),
                    person.birth_place,
                    person.native_place,
                    person.gender.map(|g| g.as_str()),
                    person.photo_url,
                    person.email,
                    person.phone,
                    person.address,
                    person.occupation,
                    person.biography,
                    person.is_living,
                    ts(&person.created_at),
                    ts(&person.updated_at),
                ],
            )
            .map_err(|e| write_err(e, &format!("person {}", person.id)))?;
        Ok(())
    }

    fn update_person(&mut self, person: &Person) -> Result<(), StorageError> {
        let changed = self
            .conn
            .get_mut()
            .execute(
                "UPDATE people SET first_name = ?2, last_name = ?3, maiden_name = ?4, birth_date = ?5, death_date = ?6,
                 birth_place = ?7, native_place = ?8, gender = ?9, photo_url = ?10, email = ?11, phone = ?12,
                 address = ?13, occupation = ?14, biography = ?15, is_living = ?16, created_at = ?17, updated_at = ?18
                 WHERE id = ?1",
                rusqlite::params![
                    person.id.as_bytes().as_slice(),
                    person.first_name,
                    person.last_name,
                    person.maiden_name,
                    person.birth_date.as_ref().map(date),
                    person.death_date.as_ref().map(date),
                    person.birth_place,
                    person.native_place,
                    person.gender.map(|g| g.as_str()),
                    person.photo_url,
                    person.email,
                    person.phone,
                    person.address,
                    person.occupation,
                    person.biography,
                    person.is_living,
                    ts(&person.created_at),
                    ts(&person.updated_at),
                ],
            )
            .map_err(|e| write_err(e, &format!("person {}", person.id)))?;
        expect_updated(changed, &format!("person {}", person.id))
    }

    fn find_relationship(&self, id: RelationshipId) -> Result<Option<Relationship>, StorageError> {
        let conn = self.conn.lock();
        query_first(
            &conn,
            &format!("SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE id = ?1"),
            rusqlite::params![id.as_bytes().as_slice()],
            read_relationship,
        )
    }

    fn find_relationship_by_edge(
        &self,
        person_id: PersonId,
        related_person_id: PersonId,
        kind: RelationshipKind,
    ) -> Result<Option<Relationship>, StorageError> {
        let conn = self.conn.lock();
        query_first(
            &conn,
            &format!(
                "SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE person_id = ?1 AND related_person_id = ?2 AND type = ?3 ORDER BY created_at LIMIT 1"
            ),
            rusqlite::params![
                person_id.as_bytes().as_slice(),
                related_person_id.as_bytes().as_slice(),
                kind.as_str(),
            ],
            read_relationship,
        )
    }

    fn list_relationships(&self) -> Result<Vec<Relationship>, StorageError> {
        let conn = self.conn.lock();
        query_rows(
            &conn,
            &format!("SELECT {RELATIONSHIP_COLUMNS} FROM relationships ORDER BY created_at, id"),
            [],
            read_relationship,
        )
    }

    fn create_relationship(&mut self, relationship: &Relationship) -> Result<(), StorageError> {
        self.conn
            .get_mut()
            .execute(
                &format!(
                    "INSERT INTO relationships ({RELATIONSHIP_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                rusqlite::params![
                    relationship.id.as_bytes().as_slice(),
                    relationship.person_id.as_bytes().as_slice(),
                    relationship.related_person_id.as_bytes().as_slice(),
                    relationship.kind.as_str(),
                    relationship.marriage_date.as_ref().map(date),
                    relationship.divorce_date.as_ref().map(date),
                    relationship.is_active,
                    ts(&relationship.created_at),
                    ts(&relationship.updated_at),
                ],
            )
            .map_err(|e| write_err(e, &format!("relationship {}", relationship.id)))?;
        Ok(())
    }

    fn update_relationship(&mut self, relationship: &Relationship) -> Result<(), StorageError> {
        let changed = self
            .conn
            .get_mut()
            .execute(
                "UPDATE relationships SET person_id = ?2, related_person_id = ?3, type = ?4, marriage_date = ?5,
                 divorce_date = ?6, is_active = ?7, created_at = ?8, updated_at = ?9 WHERE id = ?1",
                rusqlite::params![
                    relationship.id.as_bytes().as_slice(),
                    relationship.person_id.as_bytes().as_slice(),
                    relationship.related_person_id.as_bytes().as_slice(),
                    relationship.kind.as_str(),
                    relationship.marriage_date.as_ref().map(date),
                    relationship.divorce_date.as_ref().map(date),
                    relationship.is_active,
                    ts(&relationship.created_at),
                    ts(&relationship.updated_at),
                ],
            )
            .map_err(|e| write_err(e, &format!("relationship {}", relationship.id)))?;
        expect_updated(changed, &format!("relationship {}", relationship.id))
    }

    fn find_account(&self, id: AccountId) -> Result<Option<Account>, StorageError> {
        let conn = self.conn.lock();
        query_first(
            &conn,
            &format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = ?1"),
            rusqlite::params![id.as_bytes().as_slice()],
            read_account,
        )
    }

    fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StorageError> {
        let conn = self.conn.lock();
        query_first(
            &conn,
            &format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE"),
            rusqlite::params![email],
            read_account,
        )
    }

    fn find_account_by_person(&self, person_id: PersonId) -> Result<Option<Account>, StorageError> {
        let conn = self.conn.lock();
        query_first(
            &conn,
            &format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE person_id = ?1"),
            rusqlite::params![person_id.as_bytes().as_slice()],
            read_account,
        )
    }

    fn list_accounts(&self) -> Result<Vec<Account>, StorageError> {
        let conn = self.conn.lock();
        query_rows(
            &conn,
            &format!("SELECT {ACCOUNT_COLUMNS} FROM users ORDER BY created_at, id"),
            [],
            read_account,
        )
    }

    fn create_account(&mut self, account: &Account) -> Result<(), StorageError> {
        self.conn
            .get_mut()
            .execute(
                &format!(
                    "INSERT INTO users ({ACCOUNT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                rusqlite::params![
                    account.id.as_bytes().as_slice(),
                    account.email,
                    account.name,
                    account.person_id.map(|id| id.as_bytes().to_vec()),
                    account.role.as_str(),
                    account.is_active,
                    account.must_change_password,
                    account.invited_by_id.map(|id| id.as_bytes().to_vec()),
                    ts(&account.created_at),
                    ts(&account.updated_at),
                    account.last_login_at.as_ref().map(ts),
                ],
            )
            .map_err(|e| write_err(e, &format!("user {}", account.email)))?;
        Ok(())
    }

    fn update_account(&mut self, account: &Account) -> Result<(), StorageError> {
        let changed = self
            .conn
            .get_mut()
            .execute(
                "UPDATE users SET email = ?2, name = ?3, person_id = ?4, role = ?5, is_active = ?6,
                 must_change_password = ?7, invited_by_id = ?8, created_at = ?9, updated_at = ?10,
                 last_login_at = ?11 WHERE id = ?1",
                rusqlite::params![
                    account.id.as_bytes().as_slice(),
                    account.email,
                    account.name,
                    account.person_id.map(|id| id.as_bytes().to_vec()),
                    account.role.as_str(),
                    account.is_active,
                    account.must_change_password,
                    account.invited_by_id.map(|id| id.as_bytes().to_vec()),
                    ts(&account.created_at),
                    ts(&account.updated_at),
                    account.last_login_at.as_ref().map(ts),
                ],
            )
            .map_err(|e| write_err(e, &format!("user {}", account.email)))?;
        expect_updated(changed, &format!("user {}", account.id))
    }

    fn find_suggestion(&self, id: SuggestionId) -> Result<Option<Suggestion>, StorageError> {
        let conn = self.conn.lock();
        query_first(
            &conn,
            &format!("SELECT {SUGGESTION_COLUMNS} FROM suggestions WHERE id = ?1"),
            rusqlite::params![id.as_bytes().as_slice()],
            read_suggestion,
        )
    }

    fn list_suggestions(&self) -> Result<Vec<Suggestion>, StorageError> {
        let conn = self.conn.lock();
        query_rows(
            &conn,
            &format!("SELECT {SUGGESTION_COLUMNS} FROM suggestions ORDER BY submitted_at, id"),
            [],
            read_suggestion,
        )
    }

    fn create_suggestion(&mut self, suggestion: &Suggestion) -> Result<(), StorageError> {
        let data = to_msgpack(&suggestion.suggested_data)?;
        self.conn
            .get_mut()
            .execute(
                &format!(
                    "INSERT INTO suggestions ({SUGGESTION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                rusqlite::params![
                    suggestion.id.as_bytes().as_slice(),
                    suggestion.kind.as_str(),
                    suggestion.target_person_id.map(|id| id.as_bytes().to_vec()),
                    data,
                    suggestion.reason,
                    suggestion.status.as_str(),
                    suggestion.submitted_by_id.as_bytes().as_slice(),
                    suggestion.reviewed_by_id.map(|id| id.as_bytes().to_vec()),
                    suggestion.review_note,
                    ts(&suggestion.submitted_at),
                    suggestion.reviewed_at.as_ref().map(ts),
                ],
            )
            .map_err(|e| write_err(e, &format!("suggestion {}", suggestion.id)))?;
        Ok(())
    }

    fn update_suggestion(&mut self, suggestion: &Suggestion) -> Result<(), StorageError> {
        let data = to_msgpack(&suggestion.suggested_data)?;
        let changed = self
            .conn
            .get_mut()
            .execute(
                "UPDATE suggestions SET type = ?2, target_person_id = ?3, suggested_data = ?4, reason = ?5,
                 status = ?6, submitted_by_id = ?7, reviewed_by_id = ?8, review_note = ?9,
                 submitted_at = ?10, reviewed_at = ?11 WHERE id = ?1",
                rusqlite::params![
                    suggestion.id.as_bytes().as_slice(),
                    suggestion.kind.as_str(),
                    suggestion.target_person_id.map(|id| id.as_bytes().to_vec()),
                    data,
                    suggestion.reason,
                    suggestion.status.as_str(),
                    suggestion.submitted_by_id.as_bytes().as_slice(),
                    suggestion.reviewed_by_id.map(|id| id.as_bytes().to_vec()),
                    suggestion.review_note,
                    ts(&suggestion.submitted_at),
                    suggestion.reviewed_at.as_ref().map(ts),
                ],
            )
            .map_err(|e| write_err(e, &format!("suggestion {}", suggestion.id)))?;
        expect_updated(changed, &format!("suggestion {}", suggestion.id))
    }

    fn get_settings(&self) -> Result<Option<Settings>, StorageError> {
        let conn = self.conn.lock();
        query_first(
            &conn,
            "SELECT site_name, site_description, language, custom_labels, default_privacy,
             allow_self_registration, require_approval_for_edits, updated_at FROM settings WHERE id = 1",
            [],
            read_settings,
        )
    }

    fn put_settings(&mut self, settings: &Settings) -> Result<(), StorageError> {
        let labels = to_msgpack(&settings.custom_labels)?;
        self.conn
            .get_mut()
            .execute(
                "INSERT INTO settings (id, site_name, site_description, language, custom_labels, default_privacy,
                 allow_self_registration, require_approval_for_edits, updated_at)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET site_name = excluded.site_name,
                 site_description = excluded.site_description, language = excluded.language,
                 custom_labels = excluded.custom_labels, default_privacy = excluded.default_privacy,
                 allow_self_registration = excluded.allow_self_registration,
                 require_approval_for_edits = excluded.require_approval_for_edits,
                 updated_at = excluded.updated_at",
                rusqlite::params![
                    settings.site_name,
                    settings.site_description,
                    settings.language,
                    labels,
                    settings.default_privacy.as_str(),
                    settings.allow_self_registration,
                    settings.require_approval_for_edits,
                    ts(&settings.updated_at),
                ],
            )
            .map_err(|e| write_err(e, "settings"))?;
        Ok(())
    }

    fn find_audit_record(&self, id: AuditId) -> Result<Option<AuditRecord>, StorageError> {
        let conn = self.conn.lock();
        query_first(
            &conn,
            &format!("SELECT {AUDIT_COLUMNS} FROM audit_logs WHERE id = ?1"),
            rusqlite::params![id.as_bytes().as_slice()],
            read_audit,
        )
    }

    fn list_audit_records_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<AuditRecord>, StorageError> {
        let conn = self.conn.lock();
        query_rows(
            &conn,
            &format!("SELECT {AUDIT_COLUMNS} FROM audit_logs WHERE created_at > ?1 ORDER BY created_at, id"),
            rusqlite::params![ts(&cutoff)],
            read_audit,
        )
    }

    fn create_audit_record(&mut self, record: &AuditRecord) -> Result<(), StorageError> {
        let old_data = opt_json_blob(&record.old_data)?;
        let new_data = opt_json_blob(&record.new_data)?;
        self.conn
            .get_mut()
            .execute(
                &format!(
                    "INSERT INTO audit_logs ({AUDIT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                rusqlite::params![
                    record.id.as_bytes().as_slice(),
                    record.user_id.as_bytes().as_slice(),
                    record.action,
                    record.entity_type,
                    record.entity_id,
                    old_data,
                    new_data,
                    record.ip_address,
                    record.user_agent,
                    ts(&record.created_at),
                ],
            )
            .map_err(|e| write_err(e, &format!("audit log {}", record.id)))?;
        Ok(())
    }

    fn update_audit_record(&mut self, record: &AuditRecord) -> Result<(), StorageError> {
        let old_data = opt_json_blob(&record.old_data)?;
        let new_data = opt_json_blob(&record.new_data)?;
        let changed = self
            .conn
            .get_mut()
            .execute(
                "UPDATE audit_logs SET user_id = ?2, action = ?3, entity_type = ?4, entity_id = ?5,
                 old_data = ?6, new_data = ?7, ip_address = ?8, user_agent = ?9, created_at = ?10
                 WHERE id = ?1",
                rusqlite::params![
                    record.id.as_bytes().as_slice(),
                    record.user_id.as_bytes().as_slice(),
                    record.action,
                    record.entity_type,
                    record.entity_id,
                    old_data,
                    new_data,
                    record.ip_address,
                    record.user_agent,
                    ts(&record.created_at),
                ],
            )
            .map_err(|e| write_err(e, &format!("audit log {}", record.id)))?;
        expect_updated(changed, &format!("audit log {}", record.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn person(first: &str, last: &str) -> Person {
        let now = Utc::now();
        Person {
            id: PersonId::new(),
            first_name: first.into(),
            last_name: last.into(),
            maiden_name: None,
            birth_date: NaiveDate::from_ymd_opt(1950, 3, 14),
            death_date: None,
            birth_place: Some("Lisbon".into()),
            native_place: None,
            gender: Some(Gender::Female),
            photo_url: None,
            email: Some(format!("{first}@example.org").to_lowercase()),
            phone: None,
            address: None,
            occupation: None,
            biography: None,
            is_living: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn account(email: &str) -> Account {
        let now = Utc::now();
        Account {
            id: AccountId::new(),
            email: email.into(),
            name: None,
            person_id: None,
            role: Role::Editor,
            is_active: true,
            must_change_password: false,
            invited_by_id: None,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    #[test]
    fn person_round_trips_through_sqlite() -> Result<(), StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        let p = person("Maria", "Silva");
        store.create_person(&p)?;

        assert_eq!(store.find_person(p.id)?, Some(p.clone()));
        assert_eq!(store.find_person_by_email("MARIA@example.org")?, Some(p.clone()));
        let by_name =
            store.find_people_by_name_and_birth("Maria", "Silva", NaiveDate::from_ymd_opt(1950, 3, 14).unwrap())?;
        assert_eq!(by_name.len(), 1);
        Ok(())
    }

    #[test]
    fn duplicate_person_id_is_a_constraint_violation() -> Result<(), StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        let p = person("Maria", "Silva");
        store.create_person(&p)?;
        let err = store.create_person(&p).unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));
        Ok(())
    }

    #[test]
    fn update_of_missing_row_is_not_found() -> Result<(), StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        let err = store.update_person(&person("Ghost", "Row")).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        Ok(())
    }

    #[test]
    fn account_email_is_unique_ignoring_case() -> Result<(), StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        store.create_account(&account("admin@example.org"))?;
        let err = store.create_account(&account("ADMIN@example.org")).unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));
        assert!(store.find_account_by_email("Admin@Example.org")?.is_some());
        Ok(())
    }

    #[test]
    fn one_account_per_person() -> Result<(), StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        let p = person("Maria", "Silva");
        store.create_person(&p)?;
        let mut first = account("a@example.org");
        first.person_id = Some(p.id);
        store.create_account(&first)?;
        let mut second = account("b@example.org");
        second.person_id = Some(p.id);
        assert!(matches!(
            store.create_account(&second),
            Err(StorageError::ConstraintViolation(_))
        ));
        assert_eq!(store.find_account_by_person(p.id)?.map(|a| a.id), Some(first.id));
        Ok(())
    }

    #[test]
    fn relationship_requires_existing_people() -> Result<(), StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        let now = Utc::now();
        let rel = Relationship {
            id: RelationshipId::new(),
            person_id: PersonId::new(),
            related_person_id: PersonId::new(),
            kind: RelationshipKind::Parent,
            marriage_date: None,
            divorce_date: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(
            store.create_relationship(&rel),
            Err(StorageError::ConstraintViolation(_))
        ));
        Ok(())
    }

    #[test]
    fn settings_is_a_singleton() -> Result<(), StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        assert!(store.get_settings()?.is_none());
        let mut settings = Settings {
            site_name: "Silva Family".into(),
            site_description: None,
            language: "pt".into(),
            custom_labels: BTreeMap::from([("person".to_string(), "Parente".to_string())]),
            default_privacy: PrivacyLevel::MembersOnly,
            allow_self_registration: false,
            require_approval_for_edits: true,
            updated_at: Utc::now(),
        };
        store.put_settings(&settings)?;
        settings.language = "en".into();
        store.put_settings(&settings)?;
        assert_eq!(store.get_settings()?, Some(settings));
        Ok(())
    }

    #[test]
    fn audit_window_excludes_older_records() -> Result<(), StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        let user = account("auditor@example.org");
        store.create_account(&user)?;
        let now = Utc::now();
        for days_ago in [1, 10, 100] {
            store.create_audit_record(&AuditRecord {
                id: AuditId::new(),
                user_id: user.id,
                action: "UPDATE".into(),
                entity_type: "Person".into(),
                entity_id: None,
                old_data: Some(serde_json::json!({"firstName": "A"})),
                new_data: None,
                ip_address: None,
                user_agent: None,
                created_at: now - Duration::days(days_ago),
            })?;
        }
        let recent = store.list_audit_records_since(now - Duration::days(30))?;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].old_data, Some(serde_json::json!({"firstName": "A"})));
        Ok(())
    }

    #[test]
    fn password_hash_is_kept_off_the_record() -> Result<(), StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        let user = account("secret@example.org");
        store.create_account(&user)?;
        store.set_password_hash(user.id, "argon2id$...")?;
        store.update_account(&user)?;
        assert_eq!(store.password_hash(user.id)?.as_deref(), Some("argon2id$..."));
        Ok(())
    }
}
