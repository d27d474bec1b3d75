//! License-state resolution.
//!
//! With a key present, the tiers run strictly in order and the first one to
//! produce a state wins:
//!
//! ```text
//! key lookup ─► validated cache ─► server ─► hardcoded fallback
//!                                     │
//!                                     └─► cache write on definitive answers
//! ```
//!
//! If the result is unlicensed, the override rules get a chance to replace
//! it. Two concurrent resolutions may both miss the cache and both ask the
//! server; their cache writes are identical, so the race only wastes a
//! request.

use crate::cache::CacheStore;
use crate::device::{DeviceIdSource, DeviceIdentifier, MachineDeviceId};
use crate::error::{LicenseError, LicenseResult};
use crate::license_config::{LicenseConfigSource, MemoizedConfig, RemoteLicenseConfig};
use crate::overrides::OverrideEngine;
use crate::region::{LocaleRegion, RegionSource};
use crate::server::{ServerClient, ServerValidation};
use crate::settings::LicensingSettings;
use crate::state::{Freshness, LicenseKey, LicenseState};
use crate::store::{ConfigStore, SecureStorage};
use crate::trial::TrialState;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Key-based resolution tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Cache,
    Server,
    Fallback,
}

const KEYED_STAGES: [Stage; 3] = [Stage::Cache, Stage::Server, Stage::Fallback];

/// The outcome of a resolution.
#[derive(Debug)]
pub struct Resolution {
    /// The licensing decision.
    pub state: LicenseState,
    /// Diagnostic detail from the tiers that were tried. Never prevents a
    /// decision from being made.
    pub error: Option<LicenseError>,
}

/// External collaborators the resolver depends on.
#[derive(Clone)]
pub struct Collaborators {
    /// Holds the license key.
    pub secure_storage: Arc<dyn SecureStorage>,
    /// Holds the license cache and trial counter.
    pub config_store: Arc<dyn ConfigStore>,
    /// Supplies the license config.
    pub config_source: Arc<dyn LicenseConfigSource>,
    /// Supplies the device identifier.
    pub device: Arc<dyn DeviceIdSource>,
    /// Supplies the user's region.
    pub region: Arc<dyn RegionSource>,
}

/// Resolves the license state of this installation.
#[derive(Clone)]
pub struct LicenseResolver {
    secure_storage: Arc<dyn SecureStorage>,
    config_store: Arc<dyn ConfigStore>,
    config_source: Arc<dyn LicenseConfigSource>,
    device: Arc<dyn DeviceIdSource>,
    cache: CacheStore,
    server: ServerClient,
    overrides: OverrideEngine,
    license_key_entry: String,
    days_of_use_entry: String,
}

impl LicenseResolver {
    /// Creates a resolver from explicit collaborators.
    pub fn new(settings: &LicensingSettings, collaborators: Collaborators) -> LicenseResult<Self> {
        let Collaborators {
            secure_storage,
            config_store,
            config_source,
            device,
            region,
        } = collaborators;

        Ok(Self {
            cache: CacheStore::with_entries(
                Arc::clone(&config_store),
                &settings.cache_state_entry,
                &settings.cache_digest_entry,
            ),
            server: ServerClient::new(settings)?,
            overrides: OverrideEngine::new(settings.force_licensed, region),
            secure_storage,
            config_store,
            config_source,
            device,
            license_key_entry: settings.license_key_entry.clone(),
            days_of_use_entry: settings.days_of_use_entry.clone(),
        })
    }

    /// Creates a resolver with the platform device ID, the locale region
    /// and the remote config source from `settings`.
    pub fn with_platform_defaults(
        settings: &LicensingSettings,
        secure_storage: Arc<dyn SecureStorage>,
        config_store: Arc<dyn ConfigStore>,
    ) -> LicenseResult<Self> {
        let config_source = RemoteLicenseConfig::new(
            settings.config_url.clone(),
            settings.request_timeout(),
            Arc::clone(&config_store),
            &settings.config_cache_entry,
        )?;
        Self::new(
            settings,
            Collaborators {
                secure_storage,
                config_store,
                config_source: Arc::new(config_source),
                device: Arc::new(MachineDeviceId),
                region: Arc::new(LocaleRegion),
            },
        )
    }

    /// Resolves the current license state.
    ///
    /// # Panics
    ///
    /// Panics if the resolved state violates the [`LicenseState`]
    /// invariants, which would be a bug in this crate.
    pub async fn resolve(&self) -> Resolution {
        let config = MemoizedConfig::new(self.config_source.as_ref());

        let (mut state, error) = match self.license_key().await {
            Ok(Some(key)) => self.resolve_key(&key, &config).await,
            Ok(None) => {
                debug!("No license key stored");
                (LicenseState::unlicensed(Freshness::Fresh), None)
            }
            Err(e) => {
                warn!("Failed to read license key: {e}");
                (LicenseState::fallback(), Some(e))
            }
        };

        if !state.is_licensed() {
            if let Some(overridden) = self.overrides.resolve(&config).await {
                state = overridden;
            }
        }

        state.assert_invariants();
        Resolution { state, error }
    }

    /// Immediate answer for callers that can't wait: the unvalidated cache,
    /// or the hardcoded fallback. Never touches the network. Usually agrees
    /// with [`resolve`](Self::resolve) but may be stale.
    #[must_use]
    pub fn resolve_preliminary(&self) -> LicenseState {
        let state = self
            .cache
            .read_unvalidated()
            .unwrap_or_else(LicenseState::fallback);
        state.assert_invariants();
        state
    }

    /// Validates a user-entered key, counting it as a new activation.
    ///
    /// Definitive answers are cached for this key. The cache is not
    /// consulted and overrides are not applied: this answers whether the
    /// key is valid, not whether the installation is licensed.
    pub async fn activate(&self, key: &LicenseKey) -> ServerValidation {
        let config = self.config_source.license_config().await;
        let validation = self.server.validate(key, true, &config).await;
        if let Some(state) = &validation.state {
            let device = self.device.device_identifier();
            self.write_cache(state, key, &device).await;
        }
        info!("Activation finished with verdict {:?}", validation.verdict);
        validation
    }

    /// Deletes the cached license state.
    pub async fn clear_cache(&self) -> LicenseResult<()> {
        self.cache.clear().await
    }

    /// Returns the trial progress.
    pub async fn trial_state(&self) -> TrialState {
        let config = self.config_source.license_config().await;
        TrialState::load(self.config_store.as_ref(), &self.days_of_use_entry, config.trial_days)
    }

    async fn license_key(&self) -> LicenseResult<Option<LicenseKey>> {
        let raw = self.secure_storage.get(&self.license_key_entry).await?;
        Ok(raw.as_deref().and_then(LicenseKey::new))
    }

    async fn resolve_key(
        &self,
        key: &LicenseKey,
        config: &MemoizedConfig<'_>,
    ) -> (LicenseState, Option<LicenseError>) {
        let device = self.device.device_identifier();
        if device.is_fallback() {
            debug!("No device identifier available, using fallback");
        }

        let mut error = None;
        for stage in KEYED_STAGES {
            if let Some(state) = self.run_stage(stage, key, &device, config, &mut error).await {
                debug!("License resolved at {stage:?} tier ({:?})", state.freshness());
                return (state, error);
            }
        }
        unreachable!("the fallback tier always produces a state")
    }

    async fn run_stage(
        &self,
        stage: Stage,
        key: &LicenseKey,
        device: &DeviceIdentifier,
        config: &MemoizedConfig<'_>,
        error: &mut Option<LicenseError>,
    ) -> Option<LicenseState> {
        match stage {
            Stage::Cache => self.cache.read(key, device, true).await,
            Stage::Server => {
                let validation = self.server.validate(key, false, config.get().await).await;
                *error = validation.error;
                if let Some(state) = &validation.state {
                    self.write_cache(state, key, device).await;
                }
                validation.state
            }
            Stage::Fallback => {
                if let Some(e) = error.take_if(|e| e.is_transport()) {
                    warn!("Server unreachable and no valid cache: {e}");
                    *error = Some(LicenseError::NoInternetAndNoCache);
                }
                Some(LicenseState::fallback())
            }
        }
    }

    async fn write_cache(&self, state: &LicenseState, key: &LicenseKey, device: &DeviceIdentifier) {
        if let Err(e) = self.cache.write(state, key, device).await {
            warn!("Failed to cache license state: {e}");
        }
    }
}
