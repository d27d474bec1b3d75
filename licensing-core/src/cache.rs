//! Tamper-evident license-state cache.
//!
//! The serialized state and its digest live under two keys of the shared
//! config store. Both are read, staged and committed together, and an
//! entry that fails verification is deleted rather than skipped, so a
//! later unvalidated read can never surface it.
//!
//! Concurrent resolutions may both write here. Writes for the same
//! key/device pair are idempotent and the last writer wins. Readers never
//! see half of a write because the pair goes through the store's multi-key
//! operations.

use crate::device::DeviceIdentifier;
use crate::error::{LicenseError, LicenseResult};
use crate::hasher;
use crate::state::{Freshness, LicenseKey, LicenseState};
use crate::store::ConfigStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default config-store key of the serialized state.
pub const DEFAULT_STATE_ENTRY: &str = "License.cache.state";
/// Default config-store key of the digest.
pub const DEFAULT_DIGEST_ENTRY: &str = "License.cache.digest";

/// License-state cache on top of a [`ConfigStore`].
#[derive(Clone)]
pub struct CacheStore {
    store: Arc<dyn ConfigStore>,
    state_entry: String,
    digest_entry: String,
}

impl CacheStore {
    /// Creates a cache using the default entry names.
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self::with_entries(store, DEFAULT_STATE_ENTRY, DEFAULT_DIGEST_ENTRY)
    }

    /// Creates a cache using custom entry names.
    pub fn with_entries(store: Arc<dyn ConfigStore>, state_entry: &str, digest_entry: &str) -> Self {
        Self {
            store,
            state_entry: state_entry.to_string(),
            digest_entry: digest_entry.to_string(),
        }
    }

    /// Reads the cached state, relabelled [`Freshness::Cached`].
    ///
    /// With `validate` unset no integrity check happens; this is the fast
    /// path for callers that don't know the key or device yet. With
    /// `validate` set the digest is recomputed against `license_key` and
    /// `device`, and a mismatch deletes the entry.
    pub async fn read(
        &self,
        license_key: &LicenseKey,
        device: &DeviceIdentifier,
        validate: bool,
    ) -> Option<LicenseState> {
        if !validate {
            return self.read_unvalidated();
        }

        let [serialized, digest]: [Option<Vec<u8>>; 2] = self
            .store
            .get_many(&[self.state_entry.as_str(), self.digest_entry.as_str()])
            .try_into()
            .ok()?;
        let serialized = serialized?;
        let verified = digest
            .is_some_and(|d| hasher::verify(&serialized, license_key.as_str(), device.as_bytes(), &d));

        let state = if verified {
            serde_json::from_slice::<LicenseState>(&serialized).ok()
        } else {
            None
        };

        match state {
            Some(state) => {
                debug!("License cache hit ({:?})", state.license_type_info());
                Some(state.with_freshness(Freshness::Cached))
            }
            None => {
                warn!("{}; deleting cache entry", LicenseError::CacheIntegrity);
                self.invalidate().await;
                None
            }
        }
    }

    /// Unvalidated read. Synchronous so it can back a non-blocking
    /// preliminary answer.
    pub fn read_unvalidated(&self) -> Option<LicenseState> {
        let serialized = self.store.get(&self.state_entry)?;
        match serde_json::from_slice::<LicenseState>(&serialized) {
            Ok(state) => Some(state.with_freshness(Freshness::Cached)),
            Err(e) => {
                debug!("Ignoring undecodable license cache: {e}");
                None
            }
        }
    }

    /// Writes `state` with a digest bound to `license_key` and `device`.
    ///
    /// State and digest are committed together. On failure the staged
    /// changes are rolled back and neither entry is updated.
    pub async fn write(
        &self,
        state: &LicenseState,
        license_key: &LicenseKey,
        device: &DeviceIdentifier,
    ) -> LicenseResult<()> {
        let serialized = serde_json::to_vec(state)?;
        let digest = hasher::digest(&serialized, license_key.as_str(), device.as_bytes());

        self.store.set_many(vec![
            (self.state_entry.as_str(), serialized),
            (self.digest_entry.as_str(), digest.to_vec()),
        ]);
        self.commit_or_rollback().await?;
        debug!("Cached license state ({:?})", state.license_type_info());
        Ok(())
    }

    /// Deletes both entries durably.
    pub async fn clear(&self) -> LicenseResult<()> {
        self.remove_entries();
        self.commit_or_rollback().await
    }

    // The removal stays staged even if the commit fails, so unvalidated
    // reads can't surface the entry and the next commit persists it.
    async fn invalidate(&self) {
        self.remove_entries();
        if let Err(e) = self.store.commit().await {
            warn!("Failed to persist deletion of invalid license cache: {e}");
        }
    }

    fn remove_entries(&self) {
        self.store.remove_many(&[self.state_entry.as_str(), self.digest_entry.as_str()]);
    }

    async fn commit_or_rollback(&self) -> LicenseResult<()> {
        if let Err(e) = self.store.commit().await {
            self.store.rollback();
            return Err(e);
        }
        Ok(())
    }
}
