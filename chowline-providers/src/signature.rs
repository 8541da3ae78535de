use chowline_core::{DeliveryError, DeliveryResult};
use chowline_shared::Masked;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Verifies provider callbacks: hex-encoded HMAC-SHA256 of the raw request
/// body, keyed with the provider's webhook secret. A `sha256=` prefix on the
/// header value is accepted.
///
/// With no secret configured, callbacks are rejected unless unsigned
/// callbacks were explicitly allowed (local development only).
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<Masked<String>>,
    allow_unsigned: bool,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>, allow_unsigned: bool) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(Masked),
            allow_unsigned,
        }
    }

    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> DeliveryResult<()> {
        let Some(secret) = &self.secret else {
            if self.allow_unsigned {
                warn!("Accepting unsigned provider callback; no webhook secret configured");
                return Ok(());
            }
            return Err(DeliveryError::WebhookSignatureInvalid);
        };

        let signature = signature.ok_or(DeliveryError::WebhookSignatureInvalid)?.trim();
        let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
        let expected = hex::decode(signature).map_err(|_| DeliveryError::WebhookSignatureInvalid)?;

        let mut mac = HmacSha256::new_from_slice(secret.expose().as_bytes())
            .map_err(|_| DeliveryError::WebhookSignatureInvalid)?;
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| DeliveryError::WebhookSignatureInvalid)
    }
}

/// Signature a provider would send for `body`.
pub fn sign(secret: &str, body: &[u8]) -> DeliveryResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| DeliveryError::WebhookSignatureInvalid)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"event":"shipment.status.changed","status":"delivered"}"#;

    #[test]
    fn test_accepts_valid_signature() {
        let verifier = WebhookVerifier::new(Some("whsec".into()), false);
        let sig = sign("whsec", BODY).unwrap();
        verifier.verify(BODY, Some(&sig)).unwrap();
        verifier.verify(BODY, Some(&format!("sha256={sig}"))).unwrap();
    }

    #[test]
    fn test_rejects_tampered_or_missing() {
        let verifier = WebhookVerifier::new(Some("whsec".into()), false);
        let sig = sign("other", BODY).unwrap();
        assert!(verifier.verify(BODY, Some(&sig)).is_err());
        assert!(verifier.verify(b"{}", Some(&sign("whsec", BODY).unwrap())).is_err());
        assert!(verifier.verify(BODY, None).is_err());
        assert!(verifier.verify(BODY, Some("not-hex")).is_err());
    }

    #[test]
    fn test_missing_secret_fails_closed() {
        assert!(WebhookVerifier::new(None, false).verify(BODY, None).is_err());
        assert!(WebhookVerifier::new(Some(String::new()), false).verify(BODY, None).is_err());
        WebhookVerifier::new(None, true).verify(BODY, None).unwrap();
    }
}
