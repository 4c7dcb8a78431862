//! A durable, file-per-key mirror of store snapshots.
//!
//! Record layout: `SATCHELS` magic, a little-endian `u32` version, then a JSON body
//! holding the key, the save time and the snapshot itself.
//! Writes go through a temp file in the same directory and are renamed into place.

use std::{
    fs,
    io::Write as _,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

const RECORD_FILE_EXTENSION: &str = "snapshot";
const RECORD_MAGIC: &[u8] = b"SATCHELS";
const RECORD_VERSION: u32 = 1;
const RECORD_HEADER_LEN: usize = RECORD_MAGIC.len() + 4;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache record is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache record has a bad header")]
    BadHeader,
    #[error("cache record version {0} is not supported")]
    UnsupportedVersion(u32),
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSnapshot<T> {
    pub key: String,
    pub saved_at: DateTime<Utc>,
    pub snapshot: T,
}

#[derive(Clone, Debug)]
pub struct SnapshotCache {
    directory: PathBuf,
}

impl SnapshotCache {
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)
            .inspect_err(|e| log::error!("Failed to create cache directory {directory:?}: {e}"))?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Keys like `cart:<userId>` are not valid file names everywhere, so anything outside `[A-Za-z0-9_-]` becomes `_`.
    /// The real key is stored inside the record and checked on load.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let file_stem: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.directory
            .join(format!("{file_stem}.{RECORD_FILE_EXTENSION}"))
    }

    pub fn store<T: Serialize>(&self, key: &str, snapshot: &T) -> Result<(), CacheError> {
        let bytes = encode_record(key, snapshot)?;
        let mut file = tempfile::NamedTempFile::new_in(&self.directory)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(self.path_for(key))
            .map_err(|e| CacheError::Io(e.error))?;
        log::debug!("Cached snapshot for {key} ({} bytes)", bytes.len());
        Ok(())
    }

    pub fn load<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<CachedSnapshot<T>>, CacheError> {
        let bytes = match fs::read(self.path_for(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: CachedSnapshot<T> = decode_record(&bytes)?;
        if record.key != key {
            log::warn!(
                "Cache file for {key} holds a record for {}, ignoring it",
                record.key
            );
            return Ok(None);
        }
        Ok(Some(record))
    }

    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub fn encode_record<T: Serialize>(key: &str, snapshot: &T) -> Result<Vec<u8>, CacheError> {
    let body = serde_json::to_vec(&CachedSnapshot {
        key: key.to_string(),
        saved_at: Utc::now(),
        snapshot,
    })?;
    let mut bytes = Vec::with_capacity(RECORD_HEADER_LEN + body.len());
    bytes.extend_from_slice(RECORD_MAGIC);
    bytes.extend_from_slice(&RECORD_VERSION.to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<CachedSnapshot<T>, CacheError> {
    let version = parse_header(bytes)?;
    if version != RECORD_VERSION {
        return Err(CacheError::UnsupportedVersion(version));
    }
    Ok(serde_json::from_slice(&bytes[RECORD_HEADER_LEN..])?)
}

/// Returns the record version if the magic matches.
pub fn parse_header(bytes: &[u8]) -> Result<u32, CacheError> {
    if bytes.len() < RECORD_HEADER_LEN || !bytes.starts_with(RECORD_MAGIC) {
        return Err(CacheError::BadHeader);
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[RECORD_MAGIC.len()..RECORD_HEADER_LEN]);
    Ok(u32::from_le_bytes(version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::open(dir.path()).unwrap();

        cache.store("cart:user_1", &vec![1, 2, 3]).unwrap();
        let record = cache.load::<Vec<i32>>("cart:user_1").unwrap().unwrap();
        assert_eq!(record.key, "cart:user_1");
        assert_eq!(record.snapshot, vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::open(dir.path()).unwrap();
        assert!(cache.load::<u8>("wishlist:nobody").unwrap().is_none());
        cache.remove("wishlist:nobody").unwrap();
    }

    #[test]
    fn test_colliding_file_names_are_told_apart() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::open(dir.path()).unwrap();
        assert_eq!(cache.path_for("cart:a"), cache.path_for("cart_a"));

        cache.store("cart:a", &1).unwrap();
        assert!(cache.load::<i32>("cart_a").unwrap().is_none());
        assert_eq!(cache.load::<i32>("cart:a").unwrap().unwrap().snapshot, 1);
    }

    #[test]
    fn test_rejects_foreign_bytes() {
        assert!(matches!(
            decode_record::<i32>(b"not a record"),
            Err(CacheError::BadHeader)
        ));

        let mut bytes = encode_record("k", &1).unwrap();
        bytes[RECORD_MAGIC.len()..RECORD_HEADER_LEN].copy_from_slice(&7u32.to_le_bytes());
        assert!(matches!(
            decode_record::<i32>(&bytes),
            Err(CacheError::UnsupportedVersion(7))
        ));
    }
}
