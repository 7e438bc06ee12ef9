//! Archive container: a tar stream compressed with zstd.
//!
//! Entries are written in path order with zero mtime and mode 0644, so the
//! same entry map always packs to the same bytes.

use std::io::{Read, Write};

use tar::{Archive, Builder, Header};

use kinvault_core::EntryMap;

use crate::error::StorageError;

pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Turns a named-entry map into container bytes and back.
pub trait ArchiveCodec {
    fn pack(&self, entries: &EntryMap) -> Result<Vec<u8>, StorageError>;

    fn unpack(&self, bytes: &[u8]) -> Result<EntryMap, StorageError>;
}

#[derive(Debug, Clone, Copy)]
pub struct TarZstdCodec {
    level: i32,
}

impl TarZstdCodec {
    pub fn new() -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// zstd level (1-22).
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }

    /// Paths past the 100-byte ustar limit get a GNU long-name record.
    fn append<W: Write>(builder: &mut Builder<W>, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let mut header = Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);

        builder
            .append_data(&mut header, path, data)
            .map_err(|e| StorageError::archive(format!("append '{path}': {e}")))
    }
}

impl Default for TarZstdCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveCodec for TarZstdCodec {
    fn pack(&self, entries: &EntryMap) -> Result<Vec<u8>, StorageError> {
        let mut buffer = Vec::new();
        {
            let encoder = zstd::Encoder::new(&mut buffer, self.level)
                .map_err(|e| StorageError::archive(format!("zstd encoder: {e}")))?;
            let mut builder = Builder::new(encoder.auto_finish());

            for (path, data) in entries {
                Self::append(&mut builder, path, data)?;
            }

            let encoder = builder
                .into_inner()
                .map_err(|e| StorageError::archive(format!("tar finish: {e}")))?;
            drop(encoder);
        }
        Ok(buffer)
    }

    fn unpack(&self, bytes: &[u8]) -> Result<EntryMap, StorageError> {
        let decoder =
            zstd::Decoder::new(bytes).map_err(|e| StorageError::archive(format!("zstd decode: {e}")))?;
        let mut archive = Archive::new(decoder);
        let mut files = EntryMap::new();

        for entry in archive
            .entries()
            .map_err(|e| StorageError::archive(e.to_string()))?
        {
            let mut entry = entry.map_err(|e| StorageError::archive(e.to_string()))?;
            if entry.header().entry_type().is_dir() {
                continue;
            }
            let path = entry
                .path()
                .map_err(|e| StorageError::archive(e.to_string()))?
                .to_string_lossy()
                .to_string();

            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|e| StorageError::archive(format!("read {path}: {e}")))?;
            files.insert(path, data);
        }

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EntryMap {
        EntryMap::from([
            ("metadata.json".to_string(), br#"{"version":"1.0"}"#.to_vec()),
            ("data/people.json".to_string(), b"[]".to_vec()),
            ("photos/abc/portrait.jpg".to_string(), vec![0xff, 0xd8, 0xff]),
        ])
    }

    #[test]
    fn unpack_restores_every_entry() -> Result<(), StorageError> {
        let codec = TarZstdCodec::default();
        let packed = codec.pack(&sample())?;
        assert_eq!(codec.unpack(&packed)?, sample());
        Ok(())
    }

    #[test]
    fn packing_is_deterministic() -> Result<(), StorageError> {
        let codec = TarZstdCodec::with_level(9);
        assert_eq!(codec.pack(&sample())?, codec.pack(&sample())?);
        Ok(())
    }

    #[test]
    fn long_photo_names_survive_a_round_trip() -> Result<(), StorageError> {
        let codec = TarZstdCodec::default();
        let path = format!(
            "photos/01931f4e-7d2a-7c3b-9e1f-2a4b6c8d0e1f/{}.jpg",
            "a".repeat(120)
        );
        let mut entries = sample();
        entries.insert(path.clone(), vec![1, 2, 3]);

        let packed = codec.pack(&entries)?;
        assert_eq!(codec.pack(&entries)?, packed);
        let unpacked = codec.unpack(&packed)?;
        assert_eq!(unpacked.get(&path), Some(&vec![1, 2, 3]));
        assert_eq!(unpacked, entries);
        Ok(())
    }

    #[test]
    fn garbage_is_an_archive_error() {
        let err = TarZstdCodec::new().unpack(b"not an archive").unwrap_err();
        assert!(matches!(err, StorageError::Archive(_)));
    }
}
