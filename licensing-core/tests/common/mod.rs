//! Shared test helpers for licensing tests.

#![allow(dead_code)]

use licensing_core::{
    Collaborators, DeviceIdentifier, FixedDeviceId, FixedRegion, LicenseConfig, LicenseResolver,
    LicensingSettings, MemoryConfigStore, MemorySecureStorage, RegionCode, StaticLicenseConfig,
};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// A base URL nothing listens on.
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:1";

/// Installs a test log subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Settings pointing at `api_base_url` with a short timeout.
pub fn settings_for(api_base_url: &str) -> LicensingSettings {
    LicensingSettings {
        api_base_url: api_base_url.to_string(),
        request_timeout_secs: 2,
        ..Default::default()
    }
}

/// A config with the given free countries and the default limits.
pub fn config_with_free_countries(codes: &[&str]) -> LicenseConfig {
    LicenseConfig {
        free_countries: codes
            .iter()
            .filter_map(|c| RegionCode::parse(c))
            .collect::<BTreeSet<_>>(),
        ..Default::default()
    }
}

/// A successful verify response.
pub fn verify_ok(uses: u64) -> Value {
    json!({
        "success": true,
        "uses": uses,
        "purchase": { "product_permalink": "mmfinapp", "refunded": false }
    })
}

/// The response for a key that belongs to another product.
pub fn verify_unknown_for_product() -> Value {
    json!({
        "success": false,
        "message": "That license does not exist for the provided product."
    })
}

/// In-memory collaborators plus the resolver built on them.
pub struct Harness {
    pub store: Arc<MemoryConfigStore>,
    pub secrets: Arc<MemorySecureStorage>,
    pub resolver: LicenseResolver,
}

/// Builder for [`Harness`].
pub struct HarnessBuilder {
    settings: LicensingSettings,
    key: Option<String>,
    device: DeviceIdentifier,
    region: Option<RegionCode>,
    config: LicenseConfig,
    store: Arc<MemoryConfigStore>,
}

impl HarnessBuilder {
    pub fn new(api_base_url: &str) -> Self {
        Self {
            settings: settings_for(api_base_url),
            key: None,
            device: DeviceIdentifier::new(b"device-x".to_vec()),
            region: None,
            config: LicenseConfig::default(),
            store: Arc::new(MemoryConfigStore::new()),
        }
    }

    pub fn key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn device(mut self, device: &[u8]) -> Self {
        self.device = DeviceIdentifier::new(device.to_vec());
        self
    }

    pub fn region(mut self, code: &str) -> Self {
        self.region = RegionCode::parse(code);
        self
    }

    pub fn config(mut self, config: LicenseConfig) -> Self {
        self.config = config;
        self
    }

    pub fn force_licensed(mut self) -> Self {
        self.settings.force_licensed = true;
        self
    }

    /// Shares a config store with another harness.
    pub fn store(mut self, store: Arc<MemoryConfigStore>) -> Self {
        self.store = store;
        self
    }

    pub fn build(self) -> Harness {
        let secrets = Arc::new(match &self.key {
            Some(key) => MemorySecureStorage::with_license_key(key),
            None => MemorySecureStorage::new(),
        });
        let resolver = LicenseResolver::new(
            &self.settings,
            Collaborators {
                secure_storage: secrets.clone(),
                config_store: self.store.clone(),
                config_source: Arc::new(StaticLicenseConfig(self.config)),
                device: Arc::new(FixedDeviceId(self.device)),
                region: Arc::new(FixedRegion(self.region)),
            },
        )
        .unwrap();
        Harness {
            store: self.store,
            secrets,
            resolver,
        }
    }
}
