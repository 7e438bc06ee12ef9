use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use kinvault_core::{PersonId, PhotoAsset};
use tracing::debug;

use crate::error::StorageError;
use crate::traits::PhotoStore;

/// Photo files on disk, laid out as `<root>/<personId>/<fileName>`.
pub struct FsPhotoStore {
    root: PathBuf,
}

impl FsPhotoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn person_dir(&self, person_id: PersonId) -> PathBuf {
        self.root.join(person_id.to_string())
    }
}

impl PhotoStore for FsPhotoStore {
    fn list_photos(&self, person_id: PersonId) -> Result<Vec<PhotoAsset>, StorageError> {
        let dir = self.person_dir(person_id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut assets = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let bytes = fs::read(entry.path())?;
            assets.push(PhotoAsset {
                person_id,
                file_name,
                bytes,
            });
        }
        assets.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(assets)
    }

    fn has_photo(&self, person_id: PersonId, file_name: &str) -> Result<bool, StorageError> {
        PhotoAsset::check_file_name(file_name)?;
        Ok(self.person_dir(person_id).join(file_name).is_file())
    }

    fn put_photo(&mut self, asset: &PhotoAsset) -> Result<(), StorageError> {
        PhotoAsset::check_file_name(&asset.file_name)?;
        let dir = self.person_dir(asset.person_id);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(&asset.file_name), &asset.bytes)?;
        debug!(
            target: "kinvault::storage",
            person = %asset.person_id,
            file = %asset.file_name,
            bytes = asset.bytes.len(),
            "photo written"
        );
        Ok(())
    }
}
