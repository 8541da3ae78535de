//! In-process provider for tests. Behaves like the real
//! workflow it stands in for, without the network.

use async_trait::async_trait;
use chowline_core::address::Address;
use chowline_core::{DeliveryError, DeliveryResult, ProviderId};
use chowline_quote::{select_cheapest, PackageItem, PackageManifest, Party, ProviderQuote, Quote, RateOffer};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::signature::WebhookVerifier;
use crate::{CreatedShipment, DeliveryProvider, ProviderTracking, QuoteRequest, ValidatedAddress, WebhookEvent};

pub const SIGNATURE_HEADER: &str = "x-mock-signature";

enum Pricing {
    /// Rate shop over these totals, in major units.
    Rates(Vec<i64>),
    /// One quote at this fee in minor units, valid for `ttl`.
    Single { fee_minor: i64, ttl: Duration },
}

pub struct MockProvider {
    id: ProviderId,
    pricing: Pricing,
    verifier: WebhookVerifier,
    fail_remaining: AtomicUsize,
    reject_addresses: AtomicBool,
    cancel_accepted: AtomicBool,
    tracking_status: Mutex<String>,
    geocode: Mutex<Option<(String, f64, f64)>>,
    next_tracking: AtomicUsize,
    validate_calls: AtomicUsize,
    quote_calls: AtomicUsize,
    shipment_calls: AtomicUsize,
    track_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
}

impl MockProvider {
    fn build(id: ProviderId, pricing: Pricing) -> Self {
        Self {
            id,
            pricing,
            verifier: WebhookVerifier::new(None, true),
            fail_remaining: AtomicUsize::new(0),
            reject_addresses: AtomicBool::new(false),
            cancel_accepted: AtomicBool::new(true),
            tracking_status: Mutex::new("pending".to_string()),
            geocode: Mutex::new(None),
            next_tracking: AtomicUsize::new(0),
            validate_calls: AtomicUsize::new(0),
            quote_calls: AtomicUsize::new(0),
            shipment_calls: AtomicUsize::new(0),
            track_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
        }
    }

    /// Scheduled, rate-shopping provider offering one courier per total.
    pub fn regional(totals: Vec<i64>) -> Self {
        Self::build(ProviderId::Regional, Pricing::Rates(totals))
    }

    /// On-demand provider quoting `fee_minor` (cents) with the given validity.
    pub fn on_demand(fee_minor: i64, ttl: Duration) -> Self {
        Self::build(ProviderId::International, Pricing::Single { fee_minor, ttl })
    }

    /// Require signed callbacks with `secret`.
    pub fn with_webhook_secret(mut self, secret: &str) -> Self {
        self.verifier = WebhookVerifier::new(Some(secret.to_string()), false);
        self
    }

    /// The next `n` network calls fail as provider outages.
    pub fn fail_next_calls(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub fn reject_addresses(&self, reject: bool) {
        self.reject_addresses.store(reject, Ordering::SeqCst);
    }

    pub fn set_cancel_accepted(&self, accepted: bool) {
        self.cancel_accepted.store(accepted, Ordering::SeqCst);
    }

    /// Status reported by `track_shipment`.
    /// Validation reports this city and position instead of echoing the input.
    pub fn normalize_to(&self, city: &str, latitude: f64, longitude: f64) {
        *self.geocode.lock().unwrap_or_else(PoisonError::into_inner) = Some((city.to_string(), latitude, longitude));
    }

    pub fn set_tracking_status(&self, status: &str) {
        *self.tracking_status.lock().unwrap_or_else(PoisonError::into_inner) = status.to_string();
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn shipment_calls(&self) -> usize {
        self.shipment_calls.load(Ordering::SeqCst)
    }

    pub fn track_calls(&self) -> usize {
        self.track_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Callback body in the mock's wire format.
    pub fn webhook_body(tracking_number: &str, status: &str) -> Vec<u8> {
        json!({
            "event": "shipment.status",
            "tracking_number": tracking_number,
            "status": status,
        })
        .to_string()
        .into_bytes()
    }

    fn maybe_fail(&self) -> DeliveryResult<()> {
        let injected = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(DeliveryError::ProviderUnavailable("injected outage".to_string())),
            Err(_) => Ok(()),
        }
    }

    fn currency(&self) -> &'static str {
        match self.id {
            ProviderId::Regional => "NGN",
            ProviderId::International => "USD",
        }
    }

    /// A small two-party request, handy in tests.
    pub fn sample_request() -> QuoteRequest {
        let party = |name: &str, code: &str| Party {
            name: name.to_string(),
            phone: Some("+2348000000000".into()),
            email: None,
            address_line: "12 Admiralty Way, Lekki".to_string(),
            city: Some("Lagos".to_string()),
            state: Some("Lagos".to_string()),
            postal_code: None,
            country: "NG".to_string(),
            latitude: Some(6.4474),
            longitude: Some(3.4723),
            address_code: Some(code.to_string()),
        };
        let manifest = PackageManifest::from_items(
            vec![PackageItem {
                name: "Jollof rice".to_string(),
                description: None,
                quantity: 2,
                unit_value: Decimal::new(2500, 0),
                unit_weight_kg: Decimal::new(5, 1),
            }],
            "NGN",
        );

        QuoteRequest {
            origin: party("Mama Put", "A-100"),
            destination: party("Ada", "A-200"),
            manifest,
            requested_at: Utc::now(),
        }
    }

    /// A PENDING quote built from `sample_request`.
    pub fn sample_quote(provider: ProviderId) -> Quote {
        let request = Self::sample_request();
        let offer = ProviderQuote {
            provider_quote_id: Some("mock-quote".to_string()),
            request_token: Some("mock-token".to_string()),
            courier_id: Some("c1".to_string()),
            courier_name: Some("Mock Courier".to_string()),
            service_code: Some("mock_standard".to_string()),
            service_type: Some("standard".to_string()),
            fee: Decimal::new(1200, 0),
            currency: "NGN".to_string(),
            insurance_fee: None,
            expires_at: None,
            estimated_delivery_at: None,
            raw: Value::Null,
        };
        Quote::new(provider, request.origin, request.destination, request.manifest, offer, request.requested_at)
    }
}

#[derive(Deserialize)]
struct MockWebhook {
    event: String,
    tracking_number: String,
    status: Option<String>,
    description: Option<String>,
    location: Option<String>,
}

#[async_trait]
impl DeliveryProvider for MockProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn validate_address(&self, address: &Address) -> DeliveryResult<ValidatedAddress> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        if self.reject_addresses.load(Ordering::SeqCst) {
            return Err(DeliveryError::AddressNotServiceable(format!(
                "address {} rejected",
                address.id
            )));
        }

        let code = self
            .capabilities()
            .caches_address_codes
            .then(|| format!("{}-{}", self.id, &address.fingerprint()[..8]));
        let geocode = self.geocode.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let (city, latitude, longitude) = match geocode {
            Some((city, lat, lng)) => (Some(city), Some(lat), Some(lng)),
            None => (address.city.clone(), address.latitude, address.longitude),
        };
        Ok(ValidatedAddress {
            code,
            formatted: Some(address.single_line()),
            city,
            state: address.state.clone(),
            postal_code: address.postal_code.clone(),
            latitude,
            longitude,
        })
    }

    async fn get_quote(&self, request: &QuoteRequest) -> DeliveryResult<ProviderQuote> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;

        match &self.pricing {
            Pricing::Rates(totals) => {
                let offers: Vec<RateOffer> = totals
                    .iter()
                    .enumerate()
                    .map(|(i, total)| RateOffer {
                        courier_id: format!("c{}", i + 1),
                        courier_name: format!("Courier {}", i + 1),
                        service_code: format!("courier_{}_standard", i + 1),
                        service_type: Some("standard".to_string()),
                        total: Decimal::from(*total),
                        currency: self.currency().to_string(),
                        insurance_fee: None,
                        estimated_delivery_at: None,
                    })
                    .collect();
                let best = select_cheapest(&offers)?;
                Ok(ProviderQuote {
                    provider_quote_id: None,
                    request_token: Some(format!("rt-{}", Uuid::new_v4().simple())),
                    courier_id: Some(best.courier_id.clone()),
                    courier_name: Some(best.courier_name.clone()),
                    service_code: Some(best.service_code.clone()),
                    service_type: best.service_type.clone(),
                    fee: best.total,
                    currency: best.currency.clone(),
                    insurance_fee: None,
                    expires_at: None,
                    estimated_delivery_at: None,
                    raw: json!({ "couriers": totals }),
                })
            }
            Pricing::Single { fee_minor, ttl } => Ok(ProviderQuote {
                provider_quote_id: Some(format!("dq_{}", Uuid::new_v4().simple())),
                request_token: None,
                courier_id: None,
                courier_name: None,
                service_code: None,
                service_type: Some("on_demand".to_string()),
                fee: Decimal::new(*fee_minor, 2),
                currency: self.currency().to_string(),
                insurance_fee: None,
                expires_at: Some(request.requested_at + *ttl),
                estimated_delivery_at: Some(request.requested_at + Duration::minutes(45)),
                raw: json!({ "fee": fee_minor }),
            }),
        }
    }

    async fn create_shipment(&self, quote: &Quote, order_id: Uuid) -> DeliveryResult<CreatedShipment> {
        self.shipment_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;

        let n = self.next_tracking.fetch_add(1, Ordering::SeqCst) + 1;
        let tracking_number = format!("T{n}");
        Ok(CreatedShipment {
            label_url: Some(format!("https://track.mock.local/{tracking_number}")),
            tracking_number,
            courier_name: quote.courier_name.clone(),
            service_type: quote.service_type.clone(),
            cost: quote.fee,
            currency: quote.currency.clone(),
            estimated_delivery_at: quote.estimated_delivery_at,
            raw: json!({ "order_id": order_id, "quote_id": quote.id }),
        })
    }

    async fn track_shipment(&self, tracking_number: &str) -> DeliveryResult<ProviderTracking> {
        self.track_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;

        let status = self
            .tracking_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(ProviderTracking {
            raw: json!({ "tracking_number": tracking_number, "status": status }),
            raw_status: status,
            description: None,
            location: None,
            occurred_at: Some(Utc::now()),
        })
    }

    async fn cancel_shipment(&self, _tracking_number: &str) -> DeliveryResult<bool> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        Ok(self.cancel_accepted.load(Ordering::SeqCst))
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    fn verify_webhook(&self, body: &[u8], signature: Option<&str>) -> DeliveryResult<()> {
        self.verifier.verify(body, signature)
    }

    fn parse_webhook(&self, body: &[u8]) -> DeliveryResult<WebhookEvent> {
        let raw: Value = serde_json::from_slice(body)?;
        let hook: MockWebhook = serde_json::from_value(raw.clone())?;
        Ok(WebhookEvent {
            tracking_number: hook.tracking_number,
            event_type: hook.event,
            raw_status: hook.status,
            description: hook.description,
            location: hook.location,
            occurred_at: None,
            raw,
        })
    }
}
