//! Tamper-evident digest over a cached license state.
//!
//! The digest binds the serialized state to the license key and the device
//! it was written on, so a cache entry copied to another machine or edited
//! by hand no longer verifies.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Length of a digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Computes `SHA-256(state ‖ key ‖ device)`.
///
/// Each input is prefixed with its length so that bytes cannot be shifted
/// from one field into its neighbour without changing the digest.
#[must_use]
pub fn digest(serialized_state: &[u8], license_key: &str, device_identifier: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    for part in [serialized_state, license_key.as_bytes(), device_identifier] {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Recomputes the digest and compares it against `expected` in constant time.
#[must_use]
pub fn verify(
    serialized_state: &[u8],
    license_key: &str,
    device_identifier: &[u8],
    expected: &[u8],
) -> bool {
    let actual = digest(serialized_state, license_key, device_identifier);
    // Length mismatch short-circuits in ct_eq; the length is not secret.
    bool::from(actual.as_slice().ct_eq(expected))
}
