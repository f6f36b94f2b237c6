//! Webhook signature verification.
//!
//! The hosting provider signs each delivery with an HMAC-SHA1 of the raw
//! request body keyed by the shared webhook secret, and sends the result in
//! the `X-Hub-Signature` header as `sha1=<hex-digest>`. Verification
//! recomputes that exact string and compares it in constant time.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument, warn};

/// Name of the header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";

/// Prefix of the signature value.
const SIGNATURE_PREFIX: &str = "sha1=";

type HmacSha1 = Hmac<Sha1>;

/// Compute the expected `sha1=<hex>` signature for `body`.
pub fn compute_signature(secret: &[u8], body: &[u8]) -> String {
    let mut mac = match HmacSha1::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA1 accepts keys of any length"),
    };
    mac.update(body);
    format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    )
}

/// Check a claimed signature against the body and secret.
///
/// Returns `false` when `claimed` is `None`. The claimed value must match the
/// full `sha1=<hex>` string; the comparison runs in constant time with
/// respect to the contents.
pub fn verify_signature(secret: &[u8], body: &[u8], claimed: Option<&str>) -> bool {
    let Some(claimed) = claimed else {
        return false;
    };

    let expected = compute_signature(secret, body);
    expected.as_bytes().ct_eq(claimed.as_bytes()).into()
}

// ============================================================================
// WebhookVerifier
// ============================================================================

/// Verifier holding the shared webhook secret.
///
/// The secret never appears in `Debug` output or logs.
///
/// # Examples
///
/// ```rust
/// use scan_relay_core::signature::{compute_signature, WebhookVerifier};
///
/// let verifier = WebhookVerifier::new("my-secret");
/// let body = br#"{"repository":{"clone_url":"https://example.com/org/repo.git"}}"#;
/// let signature = compute_signature(b"my-secret", body);
///
/// assert!(verifier.verify(body, Some(&signature)));
/// assert!(!verifier.verify(body, None));
/// ```
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
}

impl WebhookVerifier {
    /// Construct a new verifier with the given shared secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verify a delivery, logging the outcome.
    #[instrument(skip(self, body, claimed), fields(body_len = body.len(), has_signature = claimed.is_some()))]
    pub fn verify(&self, body: &[u8], claimed: Option<&str>) -> bool {
        if claimed.is_none() {
            warn!("Webhook delivery has no {} header", SIGNATURE_HEADER);
            return false;
        }

        let authentic = verify_signature(self.secret.as_bytes(), body, claimed);
        if authentic {
            debug!("Webhook signature verified");
        } else {
            warn!("Webhook signature does not match");
        }
        authentic
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"<REDACTED>")
            .finish()
    }
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
