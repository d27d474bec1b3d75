//! Licensing rules that don't depend on a license key.
//!
//! Only consulted when key-based resolution ended up unlicensed. An override
//! can turn "unlicensed" into "licensed", never the other way round.

use crate::license_config::MemoizedConfig;
use crate::region::RegionSource;
use crate::state::LicenseState;
use std::sync::Arc;
use tracing::info;

/// Evaluates the override rules in order: force switch, then free country.
#[derive(Clone)]
pub struct OverrideEngine {
    force_licensed: bool,
    region: Arc<dyn RegionSource>,
}

impl OverrideEngine {
    /// Creates an engine.
    pub fn new(force_licensed: bool, region: Arc<dyn RegionSource>) -> Self {
        Self {
            force_licensed,
            region,
        }
    }

    /// Returns the first matching override, or `None`.
    ///
    /// The free-country check comes last because it needs the license
    /// config, which may require a network fetch.
    pub async fn resolve(&self, config: &MemoizedConfig<'_>) -> Option<LicenseState> {
        if self.force_licensed {
            info!("Licensed by force switch");
            return Some(LicenseState::forced());
        }

        let region = self.region.region_code()?;
        if config.get().await.is_free_country(&region) {
            info!("Licensed as free country ({region})");
            return Some(LicenseState::free_country(region));
        }
        None
    }
}
