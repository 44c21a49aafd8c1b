//! Device key/value persistence: `get`, `set` and `remove` over strings.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{Result, TaskflowError};

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

const DEFAULT_DIR_NAME: &str = ".taskflow";

/// Resolves the data directory, `~/.taskflow` unless one is given.
pub fn default_data_dir(base_dir: Option<PathBuf>) -> Result<PathBuf> {
    match base_dir {
        Some(dir) => Ok(dir),
        None => dirs::home_dir()
            .map(|home| home.join(DEFAULT_DIR_NAME))
            .ok_or_else(|| TaskflowError::Config("could not determine home directory".to_string())),
    }
}

/// One `<key>.json` file per key under the data directory.
#[derive(Clone, Debug)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(base_dir: Option<PathBuf>) -> Result<Self> {
        let dir = default_data_dir(base_dir)?;
        fs::create_dir_all(&dir)?;
        Ok(FileKeyValueStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(TaskflowError::storage(format!("invalid key: '{}'", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        let written = fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(value.as_bytes())?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&tmp, &path));
        if let Err(err) = written {
            // best effort; the write error is what matters
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default, Debug)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

impl<K: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<K> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(Some(dir.path().to_path_buf())).unwrap();

        assert_eq!(store.get("taskflow_tasks").unwrap(), None);
        store.set("taskflow_tasks", "[]").unwrap();
        assert_eq!(store.get("taskflow_tasks").unwrap().as_deref(), Some("[]"));
        assert!(dir.path().join("taskflow_tasks.json").exists());

        store.remove("taskflow_tasks").unwrap();
        assert_eq!(store.get("taskflow_tasks").unwrap(), None);
        // second remove is a no-op
        store.remove("taskflow_tasks").unwrap();
    }

    #[test]
    fn test_file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(Some(dir.path().to_path_buf())).unwrap();
        assert!(store.set("../escape", "x").is_err());
    }

    #[test]
    fn test_failed_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(Some(dir.path().to_path_buf())).unwrap();
        // a directory where the value file belongs makes the rename fail
        let blocker = dir.path().join("taskflow_user.json");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), "x").unwrap();

        let err = store.set("taskflow_user", "{}").unwrap_err();
        assert!(matches!(err, TaskflowError::StorageFailure { .. }));
        assert!(!dir.path().join("taskflow_user.json.tmp").exists());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryKeyValueStore::new();
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }
}
