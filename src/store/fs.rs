use super::KvStore;
use crate::error::{Result, SatchelError};
use directories::ProjectDirs;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

const DATA_FILENAME: &str = "data.json";

/// Directory-backed key-value store for the persistent tier.
///
/// All entries live in a single `data.json` map that is rewritten wholesale
/// on every mutation. The map is cached in memory, so reads never touch disk
/// after `open`. A corrupt data file is discarded rather than propagated: the
/// store's contract is that unreadable state is indistinguishable from an
/// empty store.
pub struct FileStore {
    dir: PathBuf,
    quota: Option<usize>,
    entries: RefCell<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or create) a store rooted at `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(SatchelError::Io)?;
        }
        let entries = Self::load_entries(&dir)?;
        Ok(Self {
            dir,
            quota: None,
            entries: RefCell::new(entries),
        })
    }

    /// Open a store in the platform data directory for `app_name`.
    pub fn open_default(app_name: &str) -> Result<Self> {
        let dirs = ProjectDirs::from("", "", app_name)
            .ok_or_else(|| SatchelError::Store("No home directory available".to_string()))?;
        Self::open(dirs.data_dir())
    }

    /// Cap the store at `bytes`, counted as `key.len() + value.len()`
    /// summed over all entries.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load_entries(dir: &Path) -> Result<BTreeMap<String, String>> {
        let data_file = dir.join(DATA_FILENAME);
        if !data_file.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&data_file).map_err(SatchelError::Io)?;
        match serde_json::from_str(&content) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                warn!("discarding corrupt {}: {}", DATA_FILENAME, err);
                Ok(BTreeMap::new())
            }
        }
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let content = serde_json::to_string_pretty(entries).map_err(SatchelError::Serialization)?;

        // Atomic write
        let tmp_file = self.dir.join(format!(".data-{}.tmp", Uuid::new_v4()));
        fs::write(&tmp_file, content).map_err(SatchelError::Io)?;
        fs::rename(&tmp_file, self.dir.join(DATA_FILENAME)).map_err(SatchelError::Io)?;
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Some(quota) = self.quota {
            let entries = self.entries.borrow();
            let current: usize = entries.iter().map(|(k, v)| k.len() + v.len()).sum();
            let replaced = entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let projected = current - replaced + key.len() + value.len();
            if projected > quota {
                return Err(SatchelError::CapacityExceeded(format!(
                    "{} bytes needed, quota is {}",
                    projected, quota
                )));
            }
        }

        // Persist first, commit to the cache only once the file is on disk.
        let mut updated = self.entries.borrow().clone();
        updated.insert(key.to_string(), value.to_string());
        self.persist(&updated)?;
        *self.entries.borrow_mut() = updated;
        Ok(())
    }

    fn remove(&self, key: &str) {
        let mut updated = self.entries.borrow().clone();
        if updated.remove(key).is_none() {
            return;
        }
        // remove is void by contract; a failed rewrite leaves the old file.
        match self.persist(&updated) {
            Ok(()) => *self.entries.borrow_mut() = updated,
            Err(err) => warn!("could not persist removal of {:?}: {}", key, err),
        }
    }

    fn key_at(&self, index: usize) -> Option<String> {
        self.entries.borrow().keys().nth(index).cloned()
    }

    fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}
