//! Region detection for free-country licensing.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;

/// A two-letter ISO 3166-1 region code, stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionCode(String);

impl RegionCode {
    /// Parses a region code. Accepts two ASCII letters in any case.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Some(Self(code.to_ascii_uppercase()))
        } else {
            None
        }
    }

    /// Returns the uppercase code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RegionCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid region code: {value:?}"))
    }
}

impl From<RegionCode> for String {
    fn from(code: RegionCode) -> Self {
        code.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supplies the user's current region.
pub trait RegionSource: Send + Sync {
    /// Returns the current region, if it can be determined.
    fn region_code(&self) -> Option<RegionCode>;
}

/// Reads the region from the POSIX locale environment
/// (`LC_ALL`, then `LC_MESSAGES`, then `LANG`).
#[derive(Debug, Clone, Copy, Default)]
pub struct LocaleRegion;

impl RegionSource for LocaleRegion {
    fn region_code(&self) -> Option<RegionCode> {
        ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|var| env::var(var).ok())
            .find(|value| !value.is_empty())
            .and_then(|locale| region_from_locale(&locale))
    }
}

/// A fixed region, or none.
#[derive(Debug, Clone, Default)]
pub struct FixedRegion(pub Option<RegionCode>);

impl RegionSource for FixedRegion {
    fn region_code(&self) -> Option<RegionCode> {
        self.0.clone()
    }
}

/// Extracts the territory from a locale string such as `zh_CN.UTF-8`,
/// `en-US` or `ru_RU@euro`.
#[must_use]
pub fn region_from_locale(locale: &str) -> Option<RegionCode> {
    let name = locale
        .split(['.', '@'])
        .next()
        .unwrap_or_default();
    let territory = name.split(['_', '-']).nth(1)?;
    RegionCode::parse(territory)
}
