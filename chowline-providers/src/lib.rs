//! Delivery provider integrations.
//!
//! Both providers sit behind [`DeliveryProvider`]. Workflow differences (rate
//! shopping vs. single quotes, confirmation, address codes) are described by
//! [`ProviderCapabilities`] rather than by optional methods, and
//! [`ProviderRegistry`] resolves a [`ProviderId`] with an exhaustive match.

use async_trait::async_trait;
use chowline_core::address::Address;
use chowline_core::{DeliveryError, DeliveryResult, ProviderCapabilities, ProviderId};
use chowline_quote::{PackageManifest, Party, ProviderQuote, Quote};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

pub mod http;
pub mod token;
pub mod signature;
pub mod regional;
pub mod international;
pub mod resiliency;
pub mod mock;
pub mod unavailable;

pub use international::{InternationalClient, InternationalConfig};
pub use regional::{RegionalClient, RegionalConfig};
pub use resiliency::{CircuitBreaker, ResilientProvider, RetryPolicy};
pub use signature::WebhookVerifier;
pub use token::{AccessToken, TokenCache, TokenSource};
pub use unavailable::UnconfiguredProvider;

/// Normalized address as the provider understands it.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedAddress {
    /// Provider-issued code; only providers that cache codes return one.
    pub code: Option<String>,
    pub formatted: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub origin: Party,
    pub destination: Party,
    pub manifest: PackageManifest,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreatedShipment {
    pub tracking_number: String,
    pub label_url: Option<String>,
    pub courier_name: Option<String>,
    pub service_type: Option<String>,
    pub cost: Decimal,
    pub currency: String,
    pub estimated_delivery_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

/// Live status as reported by the provider on demand.
#[derive(Debug, Clone)]
pub struct ProviderTracking {
    pub raw_status: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

/// A provider callback reduced to the fields reconciliation needs.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub tracking_number: String,
    pub event_type: String,
    /// Absent for events that carry no delivery status (courier pings etc).
    pub raw_status: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

/// The contract every delivery provider implements.
#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn capabilities(&self) -> &'static ProviderCapabilities {
        self.id().capabilities()
    }

    async fn validate_address(&self, address: &Address) -> DeliveryResult<ValidatedAddress>;

    async fn get_quote(&self, request: &QuoteRequest) -> DeliveryResult<ProviderQuote>;

    async fn create_shipment(&self, quote: &Quote, order_id: Uuid) -> DeliveryResult<CreatedShipment>;

    async fn track_shipment(&self, tracking_number: &str) -> DeliveryResult<ProviderTracking>;

    async fn cancel_shipment(&self, tracking_number: &str) -> DeliveryResult<bool>;

    /// Header the provider puts its callback signature in.
    fn signature_header(&self) -> &'static str;

    fn verify_webhook(&self, body: &[u8], signature: Option<&str>) -> DeliveryResult<()>;

    fn parse_webhook(&self, body: &[u8]) -> DeliveryResult<WebhookEvent>;
}

/// One slot per provider.
#[derive(Clone)]
pub struct ProviderRegistry {
    regional: Arc<dyn DeliveryProvider>,
    international: Arc<dyn DeliveryProvider>,
}

impl ProviderRegistry {
    pub fn new(
        regional: Arc<dyn DeliveryProvider>,
        international: Arc<dyn DeliveryProvider>,
    ) -> DeliveryResult<Self> {
        for (slot, provider) in [
            (ProviderId::Regional, &regional),
            (ProviderId::International, &international),
        ] {
            if provider.id() != slot {
                return Err(DeliveryError::UnsupportedProvider(format!(
                    "{} registered in the {} slot",
                    provider.id(),
                    slot
                )));
            }
        }
        Ok(Self { regional, international })
    }

    pub fn get(&self, id: ProviderId) -> &Arc<dyn DeliveryProvider> {
        match id {
            ProviderId::Regional => &self.regional,
            ProviderId::International => &self.international,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;

    #[test]
    fn test_registry_rejects_swapped_slots() {
        let regional: Arc<dyn DeliveryProvider> = Arc::new(MockProvider::regional(vec![1200]));
        let international: Arc<dyn DeliveryProvider> =
            Arc::new(MockProvider::on_demand(899, chrono::Duration::minutes(10)));

        assert!(ProviderRegistry::new(international.clone(), regional.clone()).is_err());

        let registry = ProviderRegistry::new(regional, international).unwrap();
        assert_eq!(registry.get(ProviderId::Regional).id(), ProviderId::Regional);
        assert_eq!(registry.get(ProviderId::International).id(), ProviderId::International);
    }
}
