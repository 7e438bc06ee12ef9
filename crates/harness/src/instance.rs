use chrono::{Duration, Utc};
use tempfile::TempDir;

use kinvault_core::{
    Account, AuditRecord, EntityKind, Operator, Person, PhotoAsset, Relationship,
    RelationshipKind, Role, Settings, Suggestion,
};
use kinvault_engine::BackupEngine;
use kinvault_storage::{FsPhotoStore, PhotoStore, RecordStore, SqliteStore, StorageError};

use crate::fixtures;

/// Records written by [`TestInstance::seed_family`].
pub struct Family {
    pub grandfather: Person,
    pub grandmother: Person,
    pub child: Person,
    pub editor: Account,
    pub suggestion: Suggestion,
}

/// One application instance: an in-memory store, a throwaway photo
/// directory and an admin account to export as.
pub struct TestInstance<S = SqliteStore> {
    pub engine: BackupEngine<S, FsPhotoStore>,
    pub admin: Account,
    _photo_dir: TempDir,
}

impl TestInstance<SqliteStore> {
    pub fn new() -> Result<Self, StorageError> {
        Self::with_store(SqliteStore::open_in_memory()?)
    }
}

impl<S: RecordStore> TestInstance<S> {
    /// Wraps `store`, adding the admin account to it.
    pub fn with_store(mut store: S) -> Result<Self, StorageError> {
        let photo_dir = tempfile::tempdir()?;
        let admin = fixtures::account("admin@example.org", Role::Admin);
        store.create_account(&admin)?;
        Ok(Self {
            engine: BackupEngine::with_default_codec(store, FsPhotoStore::new(photo_dir.path())),
            admin,
            _photo_dir: photo_dir,
        })
    }

    /// Like `with_store`, but leaves the store empty.
    pub fn empty(store: S) -> Result<Self, StorageError> {
        let photo_dir = tempfile::tempdir()?;
        Ok(Self {
            engine: BackupEngine::with_default_codec(store, FsPhotoStore::new(photo_dir.path())),
            admin: fixtures::account("admin@example.org", Role::Admin),
            _photo_dir: photo_dir,
        })
    }

    /// Three generations with mirrored edges, a linked editor account, one
    /// pending suggestion, one recent and one stale audit record, and two
    /// photos of the grandfather.
    pub fn seed_family(&mut self) -> Result<Family, StorageError> {
        self.set_settings(&fixtures::settings("Costa Family"))?;

        let mut grandfather = fixtures::detailed_person("Joao", "Costa", (1940, 5, 1));
        grandfather.photo_url = Some("portrait.jpg".to_string());
        let grandmother = fixtures::detailed_person("Maria", "Costa", (1942, 8, 9));
        let child = fixtures::detailed_person("Ana", "Costa", (1970, 1, 15));
        for person in [&grandfather, &grandmother, &child] {
            self.add_person(person)?;
        }

        for (from, to, kind) in [
            (grandfather.id, child.id, RelationshipKind::Parent),
            (child.id, grandfather.id, RelationshipKind::Child),
            (grandfather.id, grandmother.id, RelationshipKind::Spouse),
            (grandmother.id, grandfather.id, RelationshipKind::Spouse),
        ] {
            self.add_relationship(&fixtures::relationship(from, to, kind))?;
        }

        let mut editor = fixtures::account("ana@example.org", Role::Editor);
        editor.person_id = Some(child.id);
        editor.invited_by_id = Some(self.admin.id);
        editor.created_at = self.admin.created_at + Duration::seconds(1);
        self.add_account(&editor)?;

        let suggestion = fixtures::suggestion(editor.id, Some(child.id));
        self.add_suggestion(&suggestion)?;

        self.add_audit_record(&fixtures::audit_record(self.admin.id, 5))?;
        self.add_audit_record(&fixtures::audit_record(self.admin.id, 200))?;

        self.add_photo(&fixtures::photo(grandfather.id, "portrait.jpg"))?;
        self.add_photo(&fixtures::photo(grandfather.id, "wedding.jpg"))?;

        Ok(Family {
            grandfather,
            grandmother,
            child,
            editor,
            suggestion,
        })
    }

    pub fn operator(&self) -> Operator {
        fixtures::operator(&self.admin)
    }

    pub fn store(&self) -> &S {
        self.engine.store()
    }

    pub fn add_person(&mut self, person: &Person) -> Result<(), StorageError> {
        self.engine.store_mut().create_person(person)
    }

    pub fn add_account(&mut self, account: &Account) -> Result<(), StorageError> {
        self.engine.store_mut().create_account(account)
    }

    pub fn add_relationship(&mut self, relationship: &Relationship) -> Result<(), StorageError> {
        self.engine.store_mut().create_relationship(relationship)
    }

    pub fn add_suggestion(&mut self, suggestion: &Suggestion) -> Result<(), StorageError> {
        self.engine.store_mut().create_suggestion(suggestion)
    }

    pub fn add_audit_record(&mut self, record: &AuditRecord) -> Result<(), StorageError> {
        self.engine.store_mut().create_audit_record(record)
    }

    pub fn set_settings(&mut self, settings: &Settings) -> Result<(), StorageError> {
        self.engine.store_mut().put_settings(settings)
    }

    pub fn add_photo(&mut self, asset: &PhotoAsset) -> Result<(), StorageError> {
        self.engine.photos_mut().put_photo(asset)
    }

    /// Row count per entity kind, for before/after comparisons.
    pub fn count(&self, kind: EntityKind) -> Result<usize, StorageError> {
        let store = self.engine.store();
        Ok(match kind {
            EntityKind::Settings => usize::from(store.get_settings()?.is_some()),
            EntityKind::Person => store.list_people()?.len(),
            EntityKind::Account => store.list_accounts()?.len(),
            EntityKind::Relationship => store.list_relationships()?.len(),
            EntityKind::Suggestion => store.list_suggestions()?.len(),
            EntityKind::AuditLog => store
                .list_audit_records_since(Utc::now() - Duration::days(36_500))?
                .len(),
            EntityKind::Photo => {
                let mut total = 0;
                for person in store.list_people()? {
                    total += self.engine.photos().list_photos(person.id)?.len();
                }
                total
            }
        })
    }

    pub fn counts(&self) -> Result<Vec<(EntityKind, usize)>, StorageError> {
        [
            EntityKind::Settings,
            EntityKind::Person,
            EntityKind::Account,
            EntityKind::Relationship,
            EntityKind::Suggestion,
            EntityKind::AuditLog,
            EntityKind::Photo,
        ]
        .into_iter()
        .map(|kind| Ok::<_, StorageError>((kind, self.count(kind)?)))
        .collect()
    }
}
