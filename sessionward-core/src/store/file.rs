//! JSON file secret storage implementation.
//!
//! Entries live in a single JSON object on disk, by default at
//! `~/.local/share/sessionward/session.json` on Linux (the platform data
//! directory elsewhere). The file is rewritten in full on every change.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::{Secret, SecretStore, StoreError};

/// On-disk format of the session file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileStoreData {
    /// Version of the file format (for future migrations).
    version: u32,

    entries: BTreeMap<String, Secret>,
}

impl Default for FileStoreData {
    fn default() -> Self {
        Self {
            version: 1,
            entries: BTreeMap::new(),
        }
    }
}

/// Disk-backed secret store.
///
/// Reads are served from an in-memory copy loaded at open time; writes update
/// the copy and then replace the file through a temporary sibling and a rename.
pub struct FileStore {
    path: PathBuf,
    data: RwLock<FileStoreData>,
}

impl FileStore {
    /// Get the default path of the session file.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let dirs = directories::ProjectDirs::from("dev", "sessionward", "sessionward")
            .ok_or(StoreError::DataDirUnavailable)?;
        Ok(dirs.data_dir().join("session.json"))
    }

    /// Open the store at `path`.
    ///
    /// Creates parent directories if they don't exist. A missing file is an
    /// empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            FileStoreData::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, data: &FileStoreData) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("keys_count", &self.data.read().entries.len())
            .finish()
    }
}

#[async_trait]
impl SecretStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self.data.read().entries.get(key).cloned())
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        let mut data = self.data.write();
        data.entries.insert(key.to_string(), secret.clone());
        self.save(&data)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut data = self.data.write();
        if data.entries.remove(key).is_none() {
            return Ok(());
        }
        self.save(&data)
    }

    async fn set_many(&self, entries: &[(&str, &Secret)]) -> Result<(), StoreError> {
        let mut data = self.data.write();
        for (key, secret) in entries {
            data.entries.insert(key.to_string(), (*secret).clone());
        }
        self.save(&data)
    }
}
