//! List and set store backing the ledger.

use std::collections::{BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::LedgerError;

/// Store of named ordered lists and named sets.
///
/// Each call is atomic on its own. Nothing groups several calls together.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Append to the tail of a list, returning the new length.
    async fn push(&self, key: &str, value: &str) -> Result<usize, LedgerError>;

    /// Length of a list, 0 when absent.
    async fn len(&self, key: &str) -> Result<usize, LedgerError>;

    /// Read up to `limit` elements starting at `offset`.
    async fn range(&self, key: &str, offset: usize, limit: usize) -> Result<Vec<String>, LedgerError>;

    /// Overwrite the element at `index`. Returns `false` when there is none.
    async fn set(&self, key: &str, index: usize, value: &str) -> Result<bool, LedgerError>;

    /// Remove the first `count` elements equal to `value`, returning how many went.
    async fn remove_value(&self, key: &str, count: usize, value: &str) -> Result<usize, LedgerError>;

    /// Delete a key of any kind. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, LedgerError>;

    /// Add a set member. Returns `false` when it was already present.
    async fn add_member(&self, key: &str, member: &str) -> Result<bool, LedgerError>;

    /// Members of a set, empty when absent.
    async fn members(&self, key: &str) -> Result<BTreeSet<String>, LedgerError>;
}

fn slice_range(list: &[String], offset: usize, limit: usize) -> Vec<String> {
    list.iter().skip(offset).take(limit).cloned().collect()
}

fn remove_matching(list: &mut Vec<String>, count: usize, value: &str) -> usize {
    let mut removed = 0;
    list.retain(|item| {
        if removed < count && item == value {
            removed += 1;
            false
        } else {
            true
        }
    });
    removed
}

#[derive(Default)]
struct MemoryState {
    lists: HashMap<String, Vec<String>>,
    sets: HashMap<String, BTreeSet<String>>,
}

/// In-memory store for tests and throwaway runs.
pub struct MemoryListStore {
    state: RwLock<MemoryState>,
}

impl MemoryListStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
        }
    }
}

impl Default for MemoryListStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ListStore for MemoryListStore {
    async fn push(&self, key: &str, value: &str) -> Result<usize, LedgerError> {
        let mut state = self.state.write().await;
        let list = state.lists.entry(key.to_string()).or_default();
        list.push(value.to_string());
        Ok(list.len())
    }

    async fn len(&self, key: &str) -> Result<usize, LedgerError> {
        let state = self.state.read().await;
        Ok(state.lists.get(key).map_or(0, Vec::len))
    }

    async fn range(&self, key: &str, offset: usize, limit: usize) -> Result<Vec<String>, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .lists
            .get(key)
            .map(|list| slice_range(list, offset, limit))
            .unwrap_or_default())
    }

    async fn set(&self, key: &str, index: usize, value: &str) -> Result<bool, LedgerError> {
        let mut state = self.state.write().await;
        match state.lists.get_mut(key).and_then(|list| list.get_mut(index)) {
            Some(slot) => {
                *slot = value.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_value(&self, key: &str, count: usize, value: &str) -> Result<usize, LedgerError> {
        let mut state = self.state.write().await;
        let Some(list) = state.lists.get_mut(key) else {
            return Ok(0);
        };
        let removed = remove_matching(list, count, value);
        if list.is_empty() {
            state.lists.remove(key);
        }
        Ok(removed)
    }

    async fn delete(&self, key: &str) -> Result<bool, LedgerError> {
        let mut state = self.state.write().await;
        let had_list = state.lists.remove(key).is_some();
        let had_set = state.sets.remove(key).is_some();
        Ok(had_list || had_set)
    }

    async fn add_member(&self, key: &str, member: &str) -> Result<bool, LedgerError> {
        let mut state = self.state.write().await;
        Ok(state
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn members(&self, key: &str) -> Result<BTreeSet<String>, LedgerError> {
        let state = self.state.read().await;
        Ok(state.sets.get(key).cloned().unwrap_or_default())
    }
}

/// Exclusive hold on one key's lock file, released on drop.
///
/// On Unix this is an advisory `flock`, so it also excludes other processes
/// and other store handles on the same directory. Elsewhere only the
/// in-process write lock applies.
struct KeyLock {
    #[cfg(unix)]
    _flock: nix::fcntl::Flock<std::fs::File>,
    #[cfg(not(unix))]
    _file: std::fs::File,
}

impl KeyLock {
    /// Open `path` and block until the exclusive lock is held.
    fn acquire(path: &Path) -> Result<Self, LedgerError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| {
                LedgerError::StorageUnavailable(format!("Failed to open lock {:?}: {}", path, e))
            })?;
        Self::lock_file(file, path)
    }

    #[cfg(unix)]
    fn lock_file(file: std::fs::File, path: &Path) -> Result<Self, LedgerError> {
        use nix::fcntl::{Flock, FlockArg};

        let flock = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
            LedgerError::StorageUnavailable(format!("Failed to lock {:?}: {}", path, errno))
        })?;
        Ok(Self { _flock: flock })
    }

    #[cfg(not(unix))]
    fn lock_file(file: std::fs::File, _path: &Path) -> Result<Self, LedgerError> {
        Ok(Self { _file: file })
    }
}

/// File system based store.
///
/// Every key is one JSON array of strings:
/// ```text
/// {storage_path}/
/// ├── lists/
/// │   └── {key}.json
/// ├── sets/
/// │   └── {key}.json
/// └── locks/
///     └── {key}.lock
/// ```
/// A mutation holds the key's lock file for its whole read-modify-write and
/// replaces the data file through a uniquely named temporary file and a
/// rename. Readers take no lock and always see a complete file.
pub struct FileListStore {
    /// Base storage path.
    storage_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileListStore {
    /// Create a new file-based store, creating its directories.
    ///
    /// # Arguments
    /// * `storage_path` - Base directory for list and set files
    pub async fn new(storage_path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let storage_path = storage_path.into();

        for kind in ["lists", "sets", "locks"] {
            let dir = storage_path.join(kind);
            fs::create_dir_all(&dir).await.map_err(|e| {
                LedgerError::StorageUnavailable(format!("Failed to create {} directory: {}", kind, e))
            })?;
        }

        debug!("FileListStore initialized at {:?}", storage_path);

        Ok(Self {
            storage_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Encode a key into a file name; distinct keys never collide.
    fn file_name(key: &str) -> String {
        let mut name = String::with_capacity(key.len() + 5);
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                name.push(byte as char);
            } else {
                name.push_str(&format!("%{:02X}", byte));
            }
        }
        name.push_str(".json");
        name
    }

    fn list_path(&self, key: &str) -> PathBuf {
        self.storage_path.join("lists").join(Self::file_name(key))
    }

    fn set_path(&self, key: &str) -> PathBuf {
        self.storage_path.join("sets").join(Self::file_name(key))
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.storage_path
            .join("locks")
            .join(Self::file_name(key))
            .with_extension("lock")
    }

    /// Hold the lock file of `key`, waiting out other handles and processes.
    async fn lock_key(&self, key: &str) -> Result<KeyLock, LedgerError> {
        let path = self.lock_path(key);
        tokio::task::spawn_blocking(move || KeyLock::acquire(&path))
            .await
            .map_err(|e| LedgerError::StorageUnavailable(format!("Lock task failed: {}", e)))?
    }

    async fn read_values(path: &Path) -> Result<Vec<String>, LedgerError> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LedgerError::StorageUnavailable(format!(
                    "Failed to read {:?}: {}",
                    path, e
                )));
            }
        };

        serde_json::from_str(&content).map_err(|e| {
            LedgerError::StorageUnavailable(format!("Corrupt store file {:?}: {}", path, e))
        })
    }

    /// Replace the file at `path`; an empty collection removes it.
    async fn write_values(path: &Path, values: &[String]) -> Result<(), LedgerError> {
        if values.is_empty() {
            Self::remove_file(path).await?;
            return Ok(());
        }

        let content = serde_json::to_string(values)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;

        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        fs::write(&tmp, content).await.map_err(|e| {
            LedgerError::StorageUnavailable(format!("Failed to write {:?}: {}", tmp, e))
        })?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(LedgerError::StorageUnavailable(format!(
                "Failed to replace {:?}: {}",
                path, e
            )));
        }
        Ok(())
    }

    /// Remove `path`, returning whether it existed.
    async fn remove_file(path: &Path) -> Result<bool, LedgerError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LedgerError::StorageUnavailable(format!(
                "Failed to remove {:?}: {}",
                path, e
            ))),
        }
    }
}

#[async_trait]
impl ListStore for FileListStore {
    async fn push(&self, key: &str, value: &str) -> Result<usize, LedgerError> {
        let _guard = self.write_lock.lock().await;
        let _key_lock = self.lock_key(key).await?;
        let path = self.list_path(key);
        let mut list = Self::read_values(&path).await?;
        list.push(value.to_string());
        Self::write_values(&path, &list).await?;
        debug!("Pushed onto '{}', length {}", key, list.len());
        Ok(list.len())
    }

    async fn len(&self, key: &str) -> Result<usize, LedgerError> {
        Ok(Self::read_values(&self.list_path(key)).await?.len())
    }

    async fn range(&self, key: &str, offset: usize, limit: usize) -> Result<Vec<String>, LedgerError> {
        let list = Self::read_values(&self.list_path(key)).await?;
        Ok(slice_range(&list, offset, limit))
    }

    async fn set(&self, key: &str, index: usize, value: &str) -> Result<bool, LedgerError> {
        let _guard = self.write_lock.lock().await;
        let _key_lock = self.lock_key(key).await?;
        let path = self.list_path(key);
        let mut list = Self::read_values(&path).await?;
        let Some(slot) = list.get_mut(index) else {
            return Ok(false);
        };
        *slot = value.to_string();
        Self::write_values(&path, &list).await?;
        Ok(true)
    }

    async fn remove_value(&self, key: &str, count: usize, value: &str) -> Result<usize, LedgerError> {
        let _guard = self.write_lock.lock().await;
        let _key_lock = self.lock_key(key).await?;
        let path = self.list_path(key);
        let mut list = Self::read_values(&path).await?;
        let removed = remove_matching(&mut list, count, value);
        if removed > 0 {
            Self::write_values(&path, &list).await?;
        }
        Ok(removed)
    }

    async fn delete(&self, key: &str) -> Result<bool, LedgerError> {
        let _guard = self.write_lock.lock().await;
        let _key_lock = self.lock_key(key).await?;
        let mut existed = false;
        for path in [self.list_path(key), self.set_path(key)] {
            existed |= Self::remove_file(&path).await?;
        }
        if existed {
            debug!("Deleted key '{}'", key);
        }
        Ok(existed)
    }

    async fn add_member(&self, key: &str, member: &str) -> Result<bool, LedgerError> {
        let _guard = self.write_lock.lock().await;
        let _key_lock = self.lock_key(key).await?;
        let path = self.set_path(key);
        let mut members = Self::read_values(&path).await?;
        if members.iter().any(|m| m == member) {
            return Ok(false);
        }
        members.push(member.to_string());
        Self::write_values(&path, &members).await?;
        Ok(true)
    }

    async fn members(&self, key: &str) -> Result<BTreeSet<String>, LedgerError> {
        let members = Self::read_values(&self.set_path(key)).await?;
        Ok(members.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn exercise_lists(store: &dyn ListStore) {
        assert_eq!(store.push("failed", "a").await.unwrap(), 1);
        assert_eq!(store.push("failed", "b").await.unwrap(), 2);
        assert_eq!(store.push("failed", "a").await.unwrap(), 3);
        assert_eq!(store.len("failed").await.unwrap(), 3);

        assert_eq!(store.range("failed", 1, 10).await.unwrap(), vec!["b", "a"]);
        assert!(store.range("failed", 5, 10).await.unwrap().is_empty());

        assert!(store.set("failed", 1, "x").await.unwrap());
        assert!(!store.set("failed", 3, "x").await.unwrap());
        assert!(!store.set("missing", 0, "x").await.unwrap());

        // Only the first match goes.
        assert_eq!(store.remove_value("failed", 1, "a").await.unwrap(), 1);
        assert_eq!(store.range("failed", 0, 10).await.unwrap(), vec!["x", "a"]);
        assert_eq!(store.remove_value("failed", 1, "zzz").await.unwrap(), 0);

        assert!(store.delete("failed").await.unwrap());
        assert!(!store.delete("failed").await.unwrap());
        assert_eq!(store.len("failed").await.unwrap(), 0);
    }

    async fn exercise_sets(store: &dyn ListStore) {
        assert!(store.members("failed_queues").await.unwrap().is_empty());
        assert!(store.add_member("failed_queues", "b_failed").await.unwrap());
        assert!(store.add_member("failed_queues", "a_failed").await.unwrap());
        assert!(!store.add_member("failed_queues", "a_failed").await.unwrap());

        let members: Vec<_> = store.members("failed_queues").await.unwrap().into_iter().collect();
        assert_eq!(members, vec!["a_failed", "b_failed"]);
    }

    #[tokio::test]
    async fn test_memory_store_lists() {
        exercise_lists(&MemoryListStore::new()).await;
    }

    #[tokio::test]
    async fn test_memory_store_sets() {
        exercise_sets(&MemoryListStore::new()).await;
    }

    #[tokio::test]
    async fn test_file_store_lists() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileListStore::new(temp_dir.path()).await.unwrap();
        exercise_lists(&store).await;
    }

    #[tokio::test]
    async fn test_file_store_sets() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileListStore::new(temp_dir.path()).await.unwrap();
        exercise_sets(&store).await;
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileListStore::new(temp_dir.path()).await.unwrap();
            store.push("emails_failed", "{}").await.unwrap();
        }

        let store = FileListStore::new(temp_dir.path()).await.unwrap();
        assert_eq!(store.range("emails_failed", 0, 1).await.unwrap(), vec!["{}"]);
    }

    #[test]
    fn test_file_name_encoding() {
        assert_eq!(FileListStore::file_name("emails_failed"), "emails_failed.json");
        assert_eq!(FileListStore::file_name("queue:emails"), "queue%3Aemails.json");
        assert_ne!(
            FileListStore::file_name("a:b"),
            FileListStore::file_name("a_b")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_store_handles_share_directory_without_losing_pushes() {
        let temp_dir = TempDir::new().unwrap();
        let first = Arc::new(FileListStore::new(temp_dir.path()).await.unwrap());
        let second = Arc::new(FileListStore::new(temp_dir.path()).await.unwrap());

        let mut tasks = Vec::new();
        for n in 0..50 {
            let store = if n % 2 == 0 { first.clone() } else { second.clone() };
            tasks.push(tokio::spawn(async move {
                store.push("emails_failed", &format!("failure {}", n)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = first.range("emails_failed", 0, 100).await.unwrap();
        assert_eq!(stored.len(), 50);
        for n in 0..50 {
            assert!(stored.contains(&format!("failure {}", n)));
        }

        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path().join("lists"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name.to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_lock_is_per_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileListStore::new(temp_dir.path()).await.unwrap();

        let _held = store.lock_key("emails_failed").await.unwrap();
        let other = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            store.lock_key("images_failed"),
        )
        .await;
        assert!(other.unwrap().is_ok());
        assert!(store.lock_path("emails_failed").ends_with("locks/emails_failed.lock"));
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileListStore::new(temp_dir.path()).await.unwrap();
        std::fs::write(store.list_path("failed"), "not json").unwrap();

        let result = store.len("failed").await;
        assert!(matches!(result, Err(LedgerError::StorageUnavailable(_))));
    }
}
