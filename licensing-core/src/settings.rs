//! Resolver settings.

use crate::cache::{DEFAULT_DIGEST_ENTRY, DEFAULT_STATE_ENTRY};
use crate::store::LICENSE_KEY_ENTRY;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for license resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LicensingSettings {
    /// Base URL of the validation API (e.g. `https://api.gumroad.com`).
    pub api_base_url: String,
    /// Product permalink keys are validated against first.
    pub product_permalink: String,
    /// Permalink of the older product, tried once when the primary
    /// product doesn't know the key.
    pub legacy_product_permalink: String,
    /// URL of the remote license config document. Without one, the last
    /// cached config or the built-in defaults are used.
    pub config_url: Option<String>,
    /// Timeout applied to every HTTP request, in seconds.
    pub request_timeout_secs: u64,
    /// Secure-storage entry holding the license key.
    pub license_key_entry: String,
    /// Config-store entry holding the cached state.
    pub cache_state_entry: String,
    /// Config-store entry holding the cache digest.
    pub cache_digest_entry: String,
    /// Config-store entry holding the last fetched license config.
    pub config_cache_entry: String,
    /// Config-store entry holding the trial days-of-use counter.
    pub days_of_use_entry: String,
    /// Treat every installation as licensed. For tests and internal builds.
    pub force_licensed: bool,
}

impl LicensingSettings {
    /// Returns the request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the license verification endpoint.
    #[must_use]
    pub fn verify_url(&self) -> String {
        format!("{}/v2/licenses/verify", self.api_base_url.trim_end_matches('/'))
    }
}

impl Default for LicensingSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.gumroad.com".to_string(),
            product_permalink: "mmfinapp".to_string(),
            legacy_product_permalink: "mmfinappeuro".to_string(),
            config_url: None,
            request_timeout_secs: 10,
            license_key_entry: LICENSE_KEY_ENTRY.to_string(),
            cache_state_entry: DEFAULT_STATE_ENTRY.to_string(),
            cache_digest_entry: DEFAULT_DIGEST_ENTRY.to_string(),
            config_cache_entry: "License.config".to_string(),
            days_of_use_entry: "License.trial.daysOfUse".to_string(),
            force_licensed: false,
        }
    }
}
