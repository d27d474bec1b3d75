//! Error types for license resolution.
//!
//! Most of these never abort a resolution. They travel alongside a result
//! (or alongside the absence of one) so callers can show diagnostic detail,
//! while the cascade moves on to the next tier.

use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// The validation server could not be reached (timeout, DNS, refused).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with `success: false`.
    #[error("server rejected license (HTTP {status}): {message}")]
    ServerResponse {
        /// HTTP status code of the response.
        status: u16,
        /// Message reported by the server, if any.
        message: String,
    },

    /// The server response does not follow the expected format.
    #[error("invalid server response: {0}")]
    ServerResponseInvalid(String),

    /// The key is activated on more devices than the license allows.
    #[error("too many activations ({activations}, max {max})")]
    TooManyActivations {
        /// Activation count reported by the server.
        activations: u64,
        /// Maximum allowed by the license config.
        max: u64,
    },

    /// Cached license state failed its integrity check.
    #[error("cached license state failed integrity check")]
    CacheIntegrity,

    /// The server was unreachable and no valid cache exists.
    #[error("no internet connection and no cached license state")]
    NoInternetAndNoCache,

    /// Config store or secure storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LicenseError {
    /// Returns true for errors caused by not reaching the server at all.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for LicenseError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
