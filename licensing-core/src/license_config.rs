//! Remote license configuration (activation limit, trial length,
//! free-country list).
//!
//! The config is fetched with the same fresh → cached → fallback tiers as the
//! license state itself, so it is always available, if possibly stale.

use crate::error::{LicenseError, LicenseResult};
use crate::region::RegionCode;
use crate::state::Freshness;
use crate::store::ConfigStore;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Licensing parameters supplied by the remote config source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseConfig {
    /// Maximum number of activations per key.
    pub max_activations: u64,
    /// Length of the trial in days.
    pub trial_days: u32,
    /// Regions where the app is licensed for free. Entries that aren't
    /// valid region codes are skipped when parsing.
    #[serde(default, deserialize_with = "lenient_regions")]
    pub free_countries: BTreeSet<RegionCode>,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            max_activations: 4,
            trial_days: 30,
            free_countries: BTreeSet::new(),
        }
    }
}

impl LicenseConfig {
    /// Returns true if `region` is licensed for free.
    #[must_use]
    pub fn is_free_country(&self, region: &RegionCode) -> bool {
        self.free_countries.contains(region)
    }
}

fn lenient_regions<'de, D>(deserializer: D) -> Result<BTreeSet<RegionCode>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|entry| {
            let code = entry.as_str().and_then(RegionCode::parse);
            if code.is_none() {
                warn!("Skipping invalid free-country entry {entry}");
            }
            code
        })
        .collect())
}

/// Supplies the current [`LicenseConfig`].
#[async_trait]
pub trait LicenseConfigSource: Send + Sync {
    /// Returns the config. Never fails; implementations fall back to
    /// defaults.
    async fn license_config(&self) -> LicenseConfig;
}

/// A fixed config.
#[derive(Debug, Clone, Default)]
pub struct StaticLicenseConfig(pub LicenseConfig);

#[async_trait]
impl LicenseConfigSource for StaticLicenseConfig {
    async fn license_config(&self) -> LicenseConfig {
        self.0.clone()
    }
}

/// Fetches the config document over HTTP and caches the last good copy in
/// the config store.
pub struct RemoteLicenseConfig {
    client: Client,
    url: Option<String>,
    store: Arc<dyn ConfigStore>,
    cache_entry: String,
}

impl RemoteLicenseConfig {
    /// Creates a source fetching from `url`. With no URL only the cache and
    /// the defaults are consulted.
    pub fn new(
        url: Option<String>,
        timeout: Duration,
        store: Arc<dyn ConfigStore>,
        cache_entry: &str,
    ) -> LicenseResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            store,
            cache_entry: cache_entry.to_string(),
        })
    }

    /// Returns the config together with where it came from.
    pub async fn fetch(&self) -> (LicenseConfig, Freshness) {
        if let Some(url) = &self.url {
            match self.fetch_remote(url).await {
                Ok(config) => {
                    self.store_cached(&config).await;
                    return (config, Freshness::Fresh);
                }
                Err(e) => warn!("Failed to fetch license config: {e}"),
            }
        }

        match self.load_cached() {
            Some(config) => (config, Freshness::Cached),
            None => {
                debug!("Using fallback license config");
                (LicenseConfig::default(), Freshness::Fallback)
            }
        }
    }

    async fn fetch_remote(&self, url: &str) -> LicenseResult<LicenseConfig> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(LicenseError::ServerResponse {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        serde_json::from_slice(&body)
            .map_err(|e| LicenseError::ServerResponseInvalid(format!("license config: {e}")))
    }

    fn load_cached(&self) -> Option<LicenseConfig> {
        let bytes = self.store.get(&self.cache_entry)?;
        serde_json::from_slice(&bytes)
            .inspect_err(|e| warn!("Ignoring undecodable cached license config: {e}"))
            .ok()
    }

    async fn store_cached(&self, config: &LicenseConfig) {
        let bytes = match serde_json::to_vec(config) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize license config: {e}");
                return;
            }
        };
        self.store.set(&self.cache_entry, bytes);
        if let Err(e) = self.store.commit().await {
            self.store.rollback();
            warn!("Failed to cache license config: {e}");
        }
    }
}

#[async_trait]
impl LicenseConfigSource for RemoteLicenseConfig {
    async fn license_config(&self) -> LicenseConfig {
        let (config, freshness) = self.fetch().await;
        debug!("License config resolved ({freshness:?})");
        config
    }
}

/// Fetches the config at most once, on first use.
///
/// One resolution may need the config in several tiers; this keeps it to a
/// single fetch, and to none if no tier asks.
pub struct MemoizedConfig<'a> {
    source: &'a dyn LicenseConfigSource,
    cell: OnceCell<LicenseConfig>,
}

impl<'a> MemoizedConfig<'a> {
    /// Wraps `source`.
    pub fn new(source: &'a dyn LicenseConfigSource) -> Self {
        Self {
            source,
            cell: OnceCell::new(),
        }
    }

    /// Returns the config, fetching it on first call.
    pub async fn get(&self) -> &LicenseConfig {
        self.cell.get_or_init(|| self.source.license_config()).await
    }

    /// Returns true if the config has been fetched.
    #[must_use]
    pub fn is_fetched(&self) -> bool {
        self.cell.initialized()
    }
}
