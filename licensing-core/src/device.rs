//! Device identification for cache binding.
//!
//! The identifier only has to be stable, not secret: it is mixed into the
//! cache digest so that a cache copied between machines stops verifying.
//! When no platform identifier is available the empty fallback is used.
//! Writers and readers must agree on that fallback, otherwise offline
//! validation fails permanently on the affected device.

use sha2::{Digest, Sha256};
use std::fmt;

/// A best-effort stable per-device identifier.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct DeviceIdentifier(Vec<u8>);

impl DeviceIdentifier {
    /// Wraps raw identifier bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The identifier used when the platform provides none. Always empty.
    #[must_use]
    pub fn fallback() -> Self {
        Self(Vec::new())
    }

    /// Returns the identifier bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns true if this is the empty fallback.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceIdentifier({} bytes)", self.0.len())
    }
}

/// Supplies the current device identifier.
pub trait DeviceIdSource: Send + Sync {
    /// Returns the identifier, or [`DeviceIdentifier::fallback`].
    fn device_identifier(&self) -> DeviceIdentifier;
}

/// Derives the identifier from the platform machine ID.
///
/// The raw machine ID is hashed so it never lands in the cache verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct MachineDeviceId;

impl DeviceIdSource for MachineDeviceId {
    fn device_identifier(&self) -> DeviceIdentifier {
        match get_machine_id() {
            Some(id) if !id.is_empty() => {
                DeviceIdentifier(Sha256::digest(id.as_bytes()).to_vec())
            }
            _ => DeviceIdentifier::fallback(),
        }
    }
}

/// A fixed identifier.
#[derive(Debug, Clone, Default)]
pub struct FixedDeviceId(pub DeviceIdentifier);

impl DeviceIdSource for FixedDeviceId {
    fn device_identifier(&self) -> DeviceIdentifier {
        self.0.clone()
    }
}

/// Gets the machine ID (platform-specific unique identifier).
fn get_machine_id() -> Option<String> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}
