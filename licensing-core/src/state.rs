//! License state value types.
//!
//! A [`LicenseState`] is immutable. Every resolution produces a new one and
//! the only way to build one is through constructors that keep
//! `is_licensed` and the license type consistent with each other.

use crate::region::RegionCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a license decision came from.
///
/// Variants are declared from least to most trustworthy, so
/// `Fresh > Cached > Fallback > None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Placeholder. Never appears in a [`LicenseState`].
    None,
    /// Neither server nor cache were available.
    Fallback,
    /// From the validated local cache.
    Cached,
    /// Straight from the source of truth (the validation server, or an
    /// override evaluated just now).
    Fresh,
}

/// Why an installation is (or is not) licensed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "region", rename_all = "snake_case")]
pub enum LicenseTypeInfo {
    /// Unlicensed.
    NotLicensed,
    /// Key sold under the legacy product.
    GumroadV0,
    /// Key sold under the current product.
    GumroadV1,
    /// Licensed for free because of the user's region.
    FreeCountry(RegionCode),
    /// Licensed by the force switch.
    Forced,
}

impl LicenseTypeInfo {
    /// Returns true if this variant grants a license.
    #[must_use]
    pub fn grants_license(&self) -> bool {
        match self {
            Self::NotLicensed => false,
            Self::GumroadV0 | Self::GumroadV1 | Self::FreeCountry(_) | Self::Forced => true,
        }
    }
}

/// The resolved licensing decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLicenseState")]
pub struct LicenseState {
    is_licensed: bool,
    freshness: Freshness,
    license_type_info: LicenseTypeInfo,
}

impl LicenseState {
    /// Builds a state, rejecting combinations that violate the invariants:
    /// `Freshness::None`, or `is_licensed` disagreeing with the license type.
    #[must_use]
    pub fn new(
        is_licensed: bool,
        freshness: Freshness,
        license_type_info: LicenseTypeInfo,
    ) -> Option<Self> {
        if freshness == Freshness::None || is_licensed != license_type_info.grants_license() {
            return None;
        }
        Some(Self {
            is_licensed,
            freshness,
            license_type_info,
        })
    }

    /// An unlicensed state.
    #[must_use]
    pub fn unlicensed(freshness: Freshness) -> Self {
        Self::from_parts(false, freshness, LicenseTypeInfo::NotLicensed)
    }

    /// The hardcoded last-resort value used when neither server nor cache
    /// could produce an answer.
    #[must_use]
    pub fn fallback() -> Self {
        Self::unlicensed(Freshness::Fallback)
    }

    /// A freshly validated Gumroad license. `legacy` selects the product
    /// the server recognised the key under.
    #[must_use]
    pub fn gumroad(legacy: bool) -> Self {
        let info = if legacy {
            LicenseTypeInfo::GumroadV0
        } else {
            LicenseTypeInfo::GumroadV1
        };
        Self::from_parts(true, Freshness::Fresh, info)
    }

    /// A free-country override for `region`.
    #[must_use]
    pub fn free_country(region: RegionCode) -> Self {
        Self::from_parts(true, Freshness::Fresh, LicenseTypeInfo::FreeCountry(region))
    }

    /// A force-switch override.
    #[must_use]
    pub fn forced() -> Self {
        Self::from_parts(true, Freshness::Fresh, LicenseTypeInfo::Forced)
    }

    /// Returns true if the installation is licensed.
    #[must_use]
    pub fn is_licensed(&self) -> bool {
        self.is_licensed
    }

    /// Returns where this decision came from.
    #[must_use]
    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    /// Returns the license type.
    #[must_use]
    pub fn license_type_info(&self) -> &LicenseTypeInfo {
        &self.license_type_info
    }

    /// Returns a copy of this state relabelled with `freshness`.
    pub(crate) fn with_freshness(&self, freshness: Freshness) -> Self {
        debug_assert_ne!(freshness, Freshness::None);
        Self {
            freshness,
            ..self.clone()
        }
    }

    /// Panics if the invariants do not hold. Resolution calls this right
    /// before handing a state to its caller.
    pub(crate) fn assert_invariants(&self) {
        assert_ne!(
            self.freshness,
            Freshness::None,
            "resolved license state has no freshness"
        );
        assert_eq!(
            self.is_licensed,
            self.license_type_info.grants_license(),
            "license flag disagrees with license type {:?}",
            self.license_type_info
        );
    }

    fn from_parts(is_licensed: bool, freshness: Freshness, license_type_info: LicenseTypeInfo) -> Self {
        Self {
            is_licensed,
            freshness,
            license_type_info,
        }
    }
}

#[derive(Deserialize)]
struct RawLicenseState {
    is_licensed: bool,
    freshness: Freshness,
    license_type_info: LicenseTypeInfo,
}

impl TryFrom<RawLicenseState> for LicenseState {
    type Error = String;

    fn try_from(raw: RawLicenseState) -> Result<Self, Self::Error> {
        Self::new(raw.is_licensed, raw.freshness, raw.license_type_info)
            .ok_or_else(|| "inconsistent license state".to_string())
    }
}

/// A license key as entered by the user.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LicenseKey(String);

impl LicenseKey {
    /// Wraps a raw key, trimming surrounding whitespace. Returns `None` for
    /// blank input.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Returns the key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keys are credentials; only a short prefix ever reaches logs.
impl fmt::Debug for LicenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "LicenseKey({prefix}…)")
    }
}
