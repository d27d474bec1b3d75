//! Remote license validation.
//!
//! Talks to a Gumroad-compatible `POST /v2/licenses/verify` endpoint and
//! reduces whatever comes back to a tri-state [`Verdict`]. Only a clean
//! `success: false` with HTTP 404, or a business-rule rejection, counts as
//! `Invalid`. Everything ambiguous is `Unsure`, which lets the caller fall
//! back to its cache instead of locking the user out.

use crate::error::{LicenseError, LicenseResult};
use crate::license_config::LicenseConfig;
use crate::settings::LicensingSettings;
use crate::state::{Freshness, LicenseKey, LicenseState};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

/// HTTP status the server uses for a definitive "unknown or disabled key".
pub const STATUS_LICENSE_UNKNOWN: u16 = 404;

/// Message fragment the server sends when a key belongs to another product.
const UNKNOWN_FOR_PRODUCT: &str = "does not exist for the provided product";

/// Classification of a server reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The key is valid.
    Valid,
    /// The key is definitively not valid.
    Invalid,
    /// No conclusion could be drawn.
    Unsure,
}

/// A raw server reply, before classification.
#[derive(Debug, Clone)]
pub enum ServerReply {
    /// The request never produced a response.
    Transport(String),
    /// The server responded. `body` is `None` if it was not JSON.
    Response {
        /// HTTP status code.
        status: u16,
        /// Parsed JSON body.
        body: Option<Value>,
    },
}

impl ServerReply {
    fn body(&self) -> Option<&Value> {
        match self {
            Self::Transport(_) => None,
            Self::Response { body, .. } => body.as_ref(),
        }
    }

    /// The `success` field, if present and boolean.
    #[must_use]
    pub fn success(&self) -> Option<bool> {
        self.body()?.get("success")?.as_bool()
    }

    /// The `message` field, if present.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.body()?.get("message")?.as_str()
    }

    /// The activation count (`uses`), if present.
    #[must_use]
    pub fn activations(&self) -> Option<u64> {
        self.body()?.get("uses")?.as_u64()
    }

    /// Returns true if the server said the key doesn't exist for the
    /// product that was asked about.
    #[must_use]
    pub fn is_unknown_for_product(&self) -> bool {
        self.success() == Some(false)
            && self
                .message()
                .is_some_and(|m| m.to_ascii_lowercase().contains(UNKNOWN_FOR_PRODUCT))
    }
}

/// Classifies a reply. The error explains any verdict other than `Valid`.
#[must_use]
pub fn classify(reply: &ServerReply) -> (Verdict, Option<LicenseError>) {
    let status = match reply {
        ServerReply::Transport(e) => {
            return (Verdict::Unsure, Some(LicenseError::Transport(e.clone())));
        }
        ServerReply::Response { status, .. } => *status,
    };

    match reply.success() {
        Some(true) => (Verdict::Valid, None),
        None => (
            Verdict::Unsure,
            Some(LicenseError::ServerResponseInvalid(format!(
                "no boolean `success` field (HTTP {status})"
            ))),
        ),
        Some(false) => {
            let error = LicenseError::ServerResponse {
                status,
                message: reply.message().unwrap_or_default().to_string(),
            };
            if status == STATUS_LICENSE_UNKNOWN {
                (Verdict::Invalid, Some(error))
            } else {
                (Verdict::Unsure, Some(error))
            }
        }
    }
}

/// Result of [`ServerClient::validate`].
#[derive(Debug)]
pub struct ServerValidation {
    /// Final verdict, after the activation-count rule.
    pub verdict: Verdict,
    /// `None` when the verdict is `Unsure`.
    pub state: Option<LicenseState>,
    /// Diagnostic detail for any verdict other than `Valid`.
    pub error: Option<LicenseError>,
    /// Activation count reported by the server.
    pub activations: Option<u64>,
    /// True if the legacy product answered.
    pub legacy: bool,
}

/// Client for the validation server.
#[derive(Debug, Clone)]
pub struct ServerClient {
    client: Client,
    verify_url: String,
    product_permalink: String,
    legacy_product_permalink: String,
}

impl ServerClient {
    /// Creates a client from `settings`. Every request is bounded by
    /// `settings.request_timeout()`.
    pub fn new(settings: &LicensingSettings) -> LicenseResult<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            client,
            verify_url: settings.verify_url(),
            product_permalink: settings.product_permalink.clone(),
            legacy_product_permalink: settings.legacy_product_permalink.clone(),
        })
    }

    /// Validates `key`, optionally counting this as a new activation.
    ///
    /// If the primary product doesn't know the key, the legacy product is
    /// asked once. A valid key with more activations than
    /// `config.max_activations` is rejected.
    pub async fn validate(
        &self,
        key: &LicenseKey,
        increment_activation_count: bool,
        config: &LicenseConfig,
    ) -> ServerValidation {
        let mut reply = self
            .request(&self.product_permalink, key, increment_activation_count)
            .await;
        let mut legacy = false;
        if reply.is_unknown_for_product() {
            info!("Key unknown for primary product, retrying with legacy product");
            reply = self
                .request(&self.legacy_product_permalink, key, increment_activation_count)
                .await;
            legacy = true;
        }

        let (mut verdict, mut error) = classify(&reply);
        let activations = reply.activations();
        if verdict == Verdict::Valid {
            match activations {
                Some(count) if count > config.max_activations => {
                    verdict = Verdict::Invalid;
                    error = Some(LicenseError::TooManyActivations {
                        activations: count,
                        max: config.max_activations,
                    });
                }
                Some(_) => {}
                None => {
                    verdict = Verdict::Unsure;
                    error = Some(LicenseError::ServerResponseInvalid(
                        "no numeric `uses` field".to_string(),
                    ));
                }
            }
        }
        debug!("Server verdict {verdict:?} (legacy: {legacy}, activations: {activations:?})");

        let state = match verdict {
            Verdict::Unsure => None,
            Verdict::Invalid => Some(LicenseState::unlicensed(Freshness::Fresh)),
            Verdict::Valid => Some(LicenseState::gumroad(legacy)),
        };

        ServerValidation {
            verdict,
            state,
            error,
            activations,
            legacy,
        }
    }

    async fn request(&self, permalink: &str, key: &LicenseKey, increment: bool) -> ServerReply {
        let form = [
            ("product_permalink", permalink),
            ("license_key", key.as_str()),
            ("increment_uses_count", if increment { "true" } else { "false" }),
        ];
        let response = match self.client.post(&self.verify_url).form(&form).send().await {
            Ok(response) => response,
            Err(e) => return ServerReply::Transport(e.to_string()),
        };
        let status = response.status().as_u16();
        match response.bytes().await {
            Ok(bytes) => ServerReply::Response {
                status,
                body: serde_json::from_slice(&bytes).ok(),
            },
            Err(e) => ServerReply::Transport(e.to_string()),
        }
    }
}
