use rusqlite::Connection;

use crate::error::StorageError;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -32000;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

// Timestamps are RFC 3339 UTC with nanosecond precision so text order is time order.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS people (
    id BLOB PRIMARY KEY CHECK (length(id) = 16),
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    maiden_name TEXT,
    birth_date TEXT,
    death_date TEXT,
    birth_place TEXT,
    native_place TEXT,
    gender TEXT CHECK (gender IS NULL OR gender IN ('MALE', 'FEMALE', 'OTHER')),
    photo_url TEXT,
    email TEXT,
    phone TEXT,
    address TEXT,
    occupation TEXT,
    biography TEXT,
    is_living INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_people_email ON people (email COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_people_name_birth ON people (first_name, last_name, birth_date);

CREATE TABLE IF NOT EXISTS users (
    id BLOB PRIMARY KEY CHECK (length(id) = 16),
    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
    name TEXT,
    person_id BLOB UNIQUE REFERENCES people (id),
    role TEXT NOT NULL CHECK (role IN ('ADMIN', 'EDITOR', 'VIEWER')),
    is_active INTEGER NOT NULL,
    must_change_password INTEGER NOT NULL,
    password_hash TEXT,
    invited_by_id BLOB REFERENCES users (id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_login_at TEXT
);

CREATE TABLE IF NOT EXISTS relationships (
    id BLOB PRIMARY KEY CHECK (length(id) = 16),
    person_id BLOB NOT NULL REFERENCES people (id),
    related_person_id BLOB NOT NULL REFERENCES people (id),
    type TEXT NOT NULL CHECK (type IN ('PARENT', 'CHILD', 'SPOUSE', 'SIBLING')),
    marriage_date TEXT,
    divorce_date TEXT,
    is_active INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_relationships_edge ON relationships (person_id, related_person_id, type);

CREATE TABLE IF NOT EXISTS suggestions (
    id BLOB PRIMARY KEY CHECK (length(id) = 16),
    type TEXT NOT NULL,
    target_person_id BLOB REFERENCES people (id),
    suggested_data BLOB NOT NULL,
    reason TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('PENDING', 'APPROVED', 'REJECTED')),
    submitted_by_id BLOB NOT NULL REFERENCES users (id),
    reviewed_by_id BLOB REFERENCES users (id),
    review_note TEXT,
    submitted_at TEXT NOT NULL,
    reviewed_at TEXT
);

CREATE TABLE IF NOT EXISTS settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    site_name TEXT NOT NULL,
    site_description TEXT,
    language TEXT NOT NULL,
    custom_labels BLOB NOT NULL,
    default_privacy TEXT NOT NULL,
    allow_self_registration INTEGER NOT NULL,
    require_approval_for_edits INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_logs (
    id BLOB PRIMARY KEY CHECK (length(id) = 16),
    user_id BLOB NOT NULL REFERENCES users (id),
    action TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT,
    old_data BLOB,
    new_data BLOB,
    ip_address TEXT,
    user_agent TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_logs_created ON audit_logs (created_at);
";
