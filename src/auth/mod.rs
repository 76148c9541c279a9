//! Request authentication for inbound webhook deliveries
//!
//! Two strategies exist and exactly one is active per process:
//! - [`AuthMode::Signed`]: the `X-Hub-Signature-256` header must carry a valid
//!   HMAC-SHA256 of the raw body, keyed by the shared secret.
//! - [`AuthMode::Permissive`]: no cryptographic check. The `User-Agent` header
//!   is inspected for a known marker and a mismatch only produces a warning.
//!   This is a degraded trust boundary and must be selected explicitly.

pub mod hmac;

use axum::http::HeaderMap;
use std::fmt;

use crate::secrets::SecretString;

pub use hmac::HmacValidator;

/// Header carrying the body signature in signed mode
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
/// Header naming the event type of the delivery
pub const EVENT_HEADER: &str = "x-github-event";
/// Header carrying the sender's unique delivery id
pub const DELIVERY_HEADER: &str = "x-github-delivery";

/// The configured trust strategy
pub enum AuthMode {
    Signed { secret: SecretString },
    Permissive { user_agent_marker: String },
}

impl AuthMode {
    pub fn name(&self) -> &'static str {
        match self {
            AuthMode::Signed { .. } => "signed",
            AuthMode::Permissive { .. } => "permissive",
        }
    }
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Signed { secret } => f.debug_struct("Signed").field("secret", secret).finish(),
            AuthMode::Permissive { user_agent_marker } => f
                .debug_struct("Permissive")
                .field("user_agent_marker", user_agent_marker)
                .finish(),
        }
    }
}

/// Why a delivery was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingSignature,
    InvalidSignature,
}

/// Result of running the authenticator over one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// Signed mode, signature matched
    Verified,
    /// Permissive mode, user agent carries the expected marker
    Recognized,
    /// Permissive mode, user agent does not look like the expected sender
    Unrecognized { user_agent: String },
    /// Signed mode, delivery refused
    Rejected(AuthFailure),
}

impl AuthDecision {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, AuthDecision::Rejected(_))
    }
}

/// Applies the configured [`AuthMode`] to inbound deliveries
pub struct Authenticator {
    mode: AuthMode,
    strategy: Strategy,
}

enum Strategy {
    Signature(HmacValidator),
    UserAgent(String),
}

impl Authenticator {
    pub fn new(mode: AuthMode) -> Self {
        let strategy = match &mode {
            AuthMode::Signed { secret } => Strategy::Signature(HmacValidator::new(secret)),
            AuthMode::Permissive { user_agent_marker } => {
                Strategy::UserAgent(user_agent_marker.clone())
            }
        };
        Self { mode, strategy }
    }

    pub fn mode(&self) -> &AuthMode {
        &self.mode
    }

    /// Decide whether `body` with `headers` is trusted
    ///
    /// The signature is checked over the raw bytes exactly as received.
    pub fn authenticate(&self, headers: &HeaderMap, body: &[u8]) -> AuthDecision {
        match &self.strategy {
            Strategy::Signature(validator) => {
                let Some(signature) = header_str(headers, SIGNATURE_HEADER) else {
                    return AuthDecision::Rejected(AuthFailure::MissingSignature);
                };
                if validator.validate(body, signature) {
                    AuthDecision::Verified
                } else {
                    AuthDecision::Rejected(AuthFailure::InvalidSignature)
                }
            }
            Strategy::UserAgent(marker) => {
                let user_agent = header_str(headers, "user-agent").unwrap_or("");
                if user_agent.contains(marker.as_str()) {
                    AuthDecision::Recognized
                } else {
                    AuthDecision::Unrecognized {
                        user_agent: user_agent.to_string(),
                    }
                }
            }
        }
    }
}

/// Read a header as UTF-8, treating unreadable values as absent
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-for-hmac-validation";

    fn signed() -> Authenticator {
        Authenticator::new(AuthMode::Signed {
            secret: SecretString::from(SECRET),
        })
    }

    fn permissive() -> Authenticator {
        Authenticator::new(AuthMode::Permissive {
            user_agent_marker: "GitHub-Hookshot".to_string(),
        })
    }

    #[test]
    fn test_signed_mode_accepts_valid_signature() {
        let auth = signed();
        let body = br#"{"ref":"refs/heads/main"}"#;
        let signature = HmacValidator::new(&SecretString::from(SECRET)).sign(body);

        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, signature.parse().unwrap());

        assert_eq!(auth.authenticate(&headers, body), AuthDecision::Verified);
    }

    #[test]
    fn test_signed_mode_header_lookup_is_case_insensitive() {
        let auth = signed();
        let body = b"{}";
        let signature = HmacValidator::new(&SecretString::from(SECRET)).sign(body);

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::HeaderName::from_bytes(b"X-Hub-Signature-256").unwrap(),
            signature.parse().unwrap(),
        );

        assert!(auth.authenticate(&headers, body).is_accepted());
    }

    #[test]
    fn test_signed_mode_missing_signature() {
        let auth = signed();
        assert_eq!(
            auth.authenticate(&HeaderMap::new(), b"{}"),
            AuthDecision::Rejected(AuthFailure::MissingSignature)
        );
    }

    #[test]
    fn test_signed_mode_signature_for_other_body() {
        let auth = signed();
        let signature = HmacValidator::new(&SecretString::from(SECRET)).sign(b"{\"a\":1}");

        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, signature.parse().unwrap());

        assert_eq!(
            auth.authenticate(&headers, b"{\"a\":2}"),
            AuthDecision::Rejected(AuthFailure::InvalidSignature)
        );
    }

    #[test]
    fn test_signed_mode_ignores_user_agent() {
        let auth = signed();
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", "GitHub-Hookshot/abc".parse().unwrap());

        assert!(!auth.authenticate(&headers, b"{}").is_accepted());
    }

    #[test]
    fn test_permissive_mode_recognized_user_agent() {
        let auth = permissive();
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", "GitHub-Hookshot/044aadd".parse().unwrap());

        assert_eq!(auth.authenticate(&headers, b"{}"), AuthDecision::Recognized);
    }

    #[test]
    fn test_permissive_mode_fails_open() {
        let auth = permissive();
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", "curl/8.0".parse().unwrap());

        let decision = auth.authenticate(&headers, b"{}");
        assert!(decision.is_accepted());
        assert_eq!(
            decision,
            AuthDecision::Unrecognized {
                user_agent: "curl/8.0".to_string()
            }
        );

        // No user agent at all still proceeds
        assert!(auth.authenticate(&HeaderMap::new(), b"{}").is_accepted());
    }

    #[test]
    fn test_mode_debug_hides_secret() {
        let auth = signed();
        let debug = format!("{:?}", auth.mode());
        assert!(!debug.contains(SECRET));
        assert_eq!(auth.mode().name(), "signed");
        assert_eq!(permissive().mode().name(), "permissive");
    }
}
