//! License-state resolution.
//!
//! Decides whether this installation is licensed, staying correct when the
//! network is down, the server answers ambiguously, or stored data has been
//! tampered with.
//!
//! # Resolution tiers
//!
//! 1. **Key lookup** in secure storage. No key means unlicensed, not an error.
//! 2. **Validated cache**: a state blob plus a SHA-256 digest bound to the
//!    key and the device. Works offline.
//! 3. **Validation server**: definitive answers are cached.
//! 4. **Hardcoded fallback**: unlicensed, marked [`Freshness::Fallback`].
//! 5. **Overrides** (force switch, free country), only if still unlicensed.
//!
//! # Design Principles
//!
//! - **Conservative on ambiguity**: only a clean "unknown key" answer or a
//!   business-rule rejection counts as invalid. Everything else falls back
//!   to a less fresh state.
//! - **Tamper evidence without a round trip**: a cache entry that fails its
//!   digest is deleted, never used.
//! - **Collaborators behind traits**: storage, device ID, region and the
//!   license config are injected, so every tier is testable in isolation.

mod cache;
mod device;
mod error;
mod hasher;
mod license_config;
mod overrides;
mod region;
mod resolver;
mod server;
mod settings;
mod state;
mod store;
mod trial;

pub use cache::{CacheStore, DEFAULT_DIGEST_ENTRY, DEFAULT_STATE_ENTRY};
pub use device::{DeviceIdSource, DeviceIdentifier, FixedDeviceId, MachineDeviceId};
pub use error::{LicenseError, LicenseResult};
pub use hasher::{digest, verify, DIGEST_LEN};
pub use license_config::{
    LicenseConfig, LicenseConfigSource, MemoizedConfig, RemoteLicenseConfig, StaticLicenseConfig,
};
pub use overrides::OverrideEngine;
pub use region::{region_from_locale, FixedRegion, LocaleRegion, RegionCode, RegionSource};
pub use resolver::{Collaborators, LicenseResolver, Resolution};
pub use server::{classify, ServerClient, ServerReply, ServerValidation, Verdict, STATUS_LICENSE_UNKNOWN};
pub use settings::LicensingSettings;
pub use state::{Freshness, LicenseKey, LicenseState, LicenseTypeInfo};
pub use store::{
    ConfigStore, FileConfigStore, MemoryConfigStore, MemorySecureStorage, SecureStorage,
    LICENSE_KEY_ENTRY,
};
pub use trial::TrialState;
