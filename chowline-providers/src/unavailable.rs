//! Stand-in for a provider with no configuration. Every call fails, so
//! checkout through it is blocked and its callbacks are never trusted.

use async_trait::async_trait;
use chowline_core::address::Address;
use chowline_core::{DeliveryError, DeliveryResult, ProviderId};
use chowline_quote::{ProviderQuote, Quote};
use tracing::warn;
use uuid::Uuid;

use crate::{CreatedShipment, DeliveryProvider, ProviderTracking, QuoteRequest, ValidatedAddress, WebhookEvent};

pub struct UnconfiguredProvider {
    id: ProviderId,
}

impl UnconfiguredProvider {
    pub fn new(id: ProviderId) -> Self {
        Self { id }
    }

    fn refuse<T>(&self) -> DeliveryResult<T> {
        Err(DeliveryError::UnsupportedProvider(format!(
            "{} delivery unavailable: provider not configured",
            self.id
        )))
    }
}

#[async_trait]
impl DeliveryProvider for UnconfiguredProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn validate_address(&self, _address: &Address) -> DeliveryResult<ValidatedAddress> {
        self.refuse()
    }

    async fn get_quote(&self, _request: &QuoteRequest) -> DeliveryResult<ProviderQuote> {
        self.refuse()
    }

    async fn create_shipment(&self, _quote: &Quote, _order_id: Uuid) -> DeliveryResult<CreatedShipment> {
        self.refuse()
    }

    async fn track_shipment(&self, _tracking_number: &str) -> DeliveryResult<ProviderTracking> {
        self.refuse()
    }

    async fn cancel_shipment(&self, _tracking_number: &str) -> DeliveryResult<bool> {
        self.refuse()
    }

    fn signature_header(&self) -> &'static str {
        "x-signature"
    }

    fn verify_webhook(&self, _body: &[u8], _signature: Option<&str>) -> DeliveryResult<()> {
        warn!(provider = %self.id, "Rejecting callback for unconfigured provider");
        Err(DeliveryError::WebhookSignatureInvalid)
    }

    fn parse_webhook(&self, _body: &[u8]) -> DeliveryResult<WebhookEvent> {
        self.refuse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use crate::signature::sign;

    #[tokio::test]
    async fn test_every_call_is_refused() {
        let provider = UnconfiguredProvider::new(ProviderId::International);
        let quote = MockProvider::sample_quote(ProviderId::International);

        let err = provider.create_shipment(&quote, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::UnsupportedProvider(ref msg) if msg.contains("delivery unavailable")));
        assert!(provider.track_shipment("T1").await.is_err());
        assert!(provider.cancel_shipment("T1").await.is_err());
    }

    #[test]
    fn test_callbacks_fail_closed() {
        let provider = UnconfiguredProvider::new(ProviderId::Regional);
        let body = br#"{"status":"delivered"}"#;
        let signature = sign("anything", body).unwrap();

        assert!(matches!(provider.verify_webhook(body, None), Err(DeliveryError::WebhookSignatureInvalid)));
        assert!(matches!(
            provider.verify_webhook(body, Some(&signature)),
            Err(DeliveryError::WebhookSignatureInvalid)
        ));
        assert!(provider.parse_webhook(body).is_err());
    }
}
