//! Directory-backed key/value store for persistent storage.

use crate::backend::{validate_key, KeyValueStore};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const TEMP_SUFFIX: &str = ".tmp";

/// A key/value store keeping one file per key inside a directory.
///
/// ```text
/// store_dir/
/// ├─ LOCK                  # Advisory lock for single-writer
/// ├─ closetsync.queue      # One file per key
/// └─ closetsync.last_sync
/// ```
///
/// # Durability
///
/// `set` writes the value to a temporary file, calls `sync_all()`, then
/// renames it over the previous file, so a crash leaves either the old or
/// the new value.
///
/// # Locking
///
/// The store holds an exclusive advisory lock on `LOCK` for its lifetime.
/// A second `FileStore` on the same directory fails with
/// [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use closetsync_storage::{FileStore, KeyValueStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("./closetsync-data")).unwrap();
/// store.set("closetsync.last_sync", "0").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a store in the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - Another process holds the lock (returns `Locked`)
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        if key == LOCK_FILE || key.ends_with(TEMP_SUFFIX) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.key_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| StorageError::InvalidUtf8 {
                    key: key.to_string(),
                }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        let temp_path = self.dir.join(format!("{key}{TEMP_SUFFIX}"));

        let _guard = self.write_lock.lock();
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name == LOCK_FILE || name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            if validate_key(&name).is_ok() {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.set("closetsync.queue", "[]").unwrap();
        assert_eq!(store.get("closetsync.queue").unwrap().as_deref(), Some("[]"));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.set("closetsync.last_sync", "42").unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(
            store.get("closetsync.last_sync").unwrap().as_deref(),
            Some("42")
        );
    }

    #[test]
    fn file_store_is_exclusive() {
        let dir = tempdir().unwrap();
        let _first = FileStore::open(dir.path()).unwrap();

        let second = FileStore::open(dir.path());
        assert!(matches!(second, Err(StorageError::Locked)));
    }

    #[test]
    fn file_store_keys_skip_lock_and_temp_files() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.set("b", "2").unwrap();
        store.set("a", "1").unwrap();
        fs::write(dir.path().join("c.tmp"), "partial").unwrap();

        assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn file_store_rejects_lock_key() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.set("LOCK", "x"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn file_store_invalid_utf8() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("bin"), [0xff, 0xfe]).unwrap();

        assert!(matches!(
            store.get("bin"),
            Err(StorageError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn file_store_remove() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.set("k", "v").unwrap();
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }
}
