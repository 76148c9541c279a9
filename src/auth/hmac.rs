//! HMAC-SHA256 signature verification for webhook deliveries
//!
//! Compatible with the `X-Hub-Signature-256` header sent by GitHub: the value is
//! `sha256=` followed by the lowercase hex digest of the raw request body.

use constant_time_eq::constant_time_eq;
use ring::hmac;
use tracing::debug;

use crate::secrets::SecretString;

const SIGNATURE_PREFIX: &str = "sha256=";

/// HMAC validator for webhook signature verification
pub struct HmacValidator {
    key: hmac::Key,
}

impl HmacValidator {
    /// Create a new HMAC validator keyed by the shared secret
    pub fn new(secret: &SecretString) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.expose()),
        }
    }

    /// Validate an HMAC signature against the exact bytes that were received
    pub fn validate(&self, body: &[u8], signature: &str) -> bool {
        // Parse the signature header (expected format: "sha256=<hex>")
        let Some(provided_hex) = signature.trim().strip_prefix(SIGNATURE_PREFIX) else {
            debug!("Invalid signature format - missing 'sha256=' prefix");
            return false;
        };

        let Ok(provided_bytes) = hex::decode(provided_hex) else {
            debug!("Invalid signature format - failed to decode hex");
            return false;
        };

        let expected = hmac::sign(&self.key, body);

        // Must stay constant-time
        let is_valid = constant_time_eq(expected.as_ref(), &provided_bytes);

        if is_valid {
            debug!("HMAC signature validation successful");
        } else {
            debug!("HMAC signature validation failed");
        }

        is_valid
    }

    /// Produce the header value a sender would attach to `body`
    pub fn sign(&self, body: &[u8]) -> String {
        let signature = hmac::sign(&self.key, body);
        format!("{}{}", SIGNATURE_PREFIX, hex::encode(signature.as_ref()))
    }
}
