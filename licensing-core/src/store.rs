//! Storage collaborators: the generic config store the license cache lives
//! in, and the secure storage that holds the license key.
//!
//! Config store writes are staged in memory and only become durable on
//! [`ConfigStore::commit`]. Staging several keys and committing once is what
//! makes the cache's state/digest pair atomic.

use crate::error::{LicenseError, LicenseResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::fs;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

/// Secure-storage key under which the license key is kept.
pub const LICENSE_KEY_ENTRY: &str = "License.key";

/// Generic key-value configuration store.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Returns the staged value for `key`.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Stages `value` under `key`.
    fn set(&self, key: &str, value: Vec<u8>);

    /// Stages removal of `key`.
    fn remove(&self, key: &str);

    /// Returns the staged values for `keys`. Stores shared between tasks
    /// override this to read all keys under one lock.
    fn get_many(&self, keys: &[&str]) -> Vec<Option<Vec<u8>>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Stages all `entries`, atomically in the provided stores.
    fn set_many(&self, entries: Vec<(&str, Vec<u8>)>) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    /// Stages removal of all `keys`, atomically in the provided stores.
    fn remove_many(&self, keys: &[&str]) {
        for key in keys {
            self.remove(key);
        }
    }

    /// Makes all staged changes durable.
    async fn commit(&self) -> LicenseResult<()>;

    /// Discards staged changes, restoring the last committed contents.
    fn rollback(&self);
}

/// Read access to secure credential storage.
#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// Returns the secret stored under `key`. `None` is a normal state.
    async fn get(&self, key: &str) -> LicenseResult<Option<String>>;
}

#[derive(Debug, Default, Clone)]
struct Entries {
    committed: BTreeMap<String, Vec<u8>>,
    working: BTreeMap<String, Vec<u8>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Entries {
    fn get_many(&self, keys: &[&str]) -> Vec<Option<Vec<u8>>> {
        keys.iter().map(|key| self.working.get(*key).cloned()).collect()
    }

    fn set_many(&mut self, entries: Vec<(&str, Vec<u8>)>) {
        for (key, value) in entries {
            self.working.insert(key.to_string(), value);
        }
    }

    fn remove_many(&mut self, keys: &[&str]) {
        for key in keys {
            self.working.remove(*key);
        }
    }
}

/// In-memory config store.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    entries: Mutex<Entries>,
    commits: AtomicUsize,
    fail_commits: AtomicBool,
}

impl MemoryConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful commits so far.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Makes subsequent commits fail with a storage error.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Returns the committed (durable) value for `key`.
    #[must_use]
    pub fn committed(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.entries).committed.get(key).cloned()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.entries).working.get(key).cloned()
    }

    fn set(&self, key: &str, value: Vec<u8>) {
        lock(&self.entries).working.insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        lock(&self.entries).working.remove(key);
    }

    fn get_many(&self, keys: &[&str]) -> Vec<Option<Vec<u8>>> {
        lock(&self.entries).get_many(keys)
    }

    fn set_many(&self, entries: Vec<(&str, Vec<u8>)>) {
        lock(&self.entries).set_many(entries);
    }

    fn remove_many(&self, keys: &[&str]) {
        lock(&self.entries).remove_many(keys);
    }

    async fn commit(&self) -> LicenseResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(LicenseError::Storage("commit rejected".to_string()));
        }
        let mut entries = lock(&self.entries);
        entries.committed = entries.working.clone();
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self) {
        let mut entries = lock(&self.entries);
        entries.working = entries.committed.clone();
    }
}

/// Config store persisted as a JSON file of base64 values.
///
/// Commits write a sibling temp file and rename it over the target, so a
/// crash mid-commit leaves either the old or the new contents. Commits are
/// serialized; the snapshot is taken once the commit lock is held.
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
    entries: Mutex<Entries>,
    commit_lock: AsyncMutex<()>,
}

// Distinguishes temp files of stores sharing a path within one process.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

impl FileConfigStore {
    /// Opens the store at `path`, loading existing contents if the file
    /// exists.
    ///
    /// An undecodable file is moved aside to `<path>.corrupt` and the store
    /// starts empty: cached entries are re-derived on the next resolution.
    pub async fn open(path: impl Into<PathBuf>) -> LicenseResult<Self> {
        let path = path.into();
        let committed = match fs::read(&path).await {
            Ok(bytes) => match decode_file(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Config store at {} is unreadable, starting empty: {e}", path.display());
                    quarantine(&path).await;
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(LicenseError::Storage(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        debug!("Opened config store at {} ({} entries)", path.display(), committed.len());
        Ok(Self {
            path,
            entries: Mutex::new(Entries {
                working: committed.clone(),
                committed,
            }),
            commit_lock: AsyncMutex::new(()),
        })
    }

    /// Opens the store in the platform config directory, e.g.
    /// `~/.config/<app_id>/license.json` on Linux.
    pub async fn open_default(app_id: &str) -> LicenseResult<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| LicenseError::Storage("no config directory on this platform".to_string()))?
            .join(app_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| LicenseError::Storage(format!("failed to create {}: {e}", dir.display())))?;
        Self::open(dir.join("license.json")).await
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.entries).working.get(key).cloned()
    }

    fn set(&self, key: &str, value: Vec<u8>) {
        lock(&self.entries).working.insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        lock(&self.entries).working.remove(key);
    }

    fn get_many(&self, keys: &[&str]) -> Vec<Option<Vec<u8>>> {
        lock(&self.entries).get_many(keys)
    }

    fn set_many(&self, entries: Vec<(&str, Vec<u8>)>) {
        lock(&self.entries).set_many(entries);
    }

    fn remove_many(&self, keys: &[&str]) {
        lock(&self.entries).remove_many(keys);
    }

    async fn commit(&self) -> LicenseResult<()> {
        let _guard = self.commit_lock.lock().await;
        let snapshot = lock(&self.entries).working.clone();
        let encoded: BTreeMap<&str, String> = snapshot
            .iter()
            .map(|(k, v)| (k.as_str(), BASE64.encode(v)))
            .collect();
        let bytes = serde_json::to_vec_pretty(&encoded)?;

        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .path
            .with_extension(format!("json.{}.{seq}.tmp", std::process::id()));
        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| LicenseError::Storage(format!("failed to write {}: {e}", tmp.display())))?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            warn!("Config store rename failed, removing temp file: {e}");
            let _ = fs::remove_file(&tmp).await;
            return Err(LicenseError::Storage(format!(
                "failed to replace {}: {e}",
                self.path.display()
            )));
        }

        lock(&self.entries).committed = snapshot;
        Ok(())
    }

    fn rollback(&self) {
        let mut entries = lock(&self.entries);
        entries.working = entries.committed.clone();
    }
}

async fn quarantine(path: &Path) {
    let aside = path.with_extension("json.corrupt");
    if let Err(e) = fs::rename(path, &aside).await {
        warn!("Failed to move {} aside: {e}", path.display());
    }
}

fn decode_file(bytes: &[u8]) -> LicenseResult<BTreeMap<String, Vec<u8>>> {
    let encoded: BTreeMap<String, String> = serde_json::from_slice(bytes)?;
    encoded
        .into_iter()
        .map(|(k, v)| {
            BASE64
                .decode(v.as_bytes())
                .map(|bytes| (k.clone(), bytes))
                .map_err(|e| LicenseError::Storage(format!("invalid value for {k}: {e}")))
        })
        .collect()
}

/// In-memory secure storage.
#[derive(Debug, Default)]
pub struct MemorySecureStorage {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemorySecureStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates storage holding `license_key` under [`LICENSE_KEY_ENTRY`].
    #[must_use]
    pub fn with_license_key(license_key: &str) -> Self {
        let storage = Self::new();
        storage.insert(LICENSE_KEY_ENTRY, license_key);
        storage
    }

    /// Stores a secret.
    pub fn insert(&self, key: &str, value: &str) {
        lock(&self.secrets).insert(key.to_string(), value.to_string());
    }

    /// Removes a secret.
    pub fn remove(&self, key: &str) {
        lock(&self.secrets).remove(key);
    }
}

#[async_trait]
impl SecureStorage for MemorySecureStorage {
    async fn get(&self, key: &str) -> LicenseResult<Option<String>> {
        Ok(lock(&self.secrets).get(key).cloned())
    }
}
