//! Regional courier aggregator: scheduled pickups, rate shopping across
//! several couriers, and provider-issued address codes.

use async_trait::async_trait;
use chowline_core::address::Address;
use chowline_core::{DeliveryError, DeliveryResult, ProviderId};
use chowline_quote::{select_cheapest, ProviderQuote, Quote, RateOffer, RateSheet};
use chowline_shared::Masked;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::http::{self, transport_error};
use crate::signature::WebhookVerifier;
use crate::{CreatedShipment, DeliveryProvider, ProviderTracking, QuoteRequest, ValidatedAddress, WebhookEvent};

pub const SIGNATURE_HEADER: &str = "x-regional-signature";
const DEFAULT_CURRENCY: &str = "NGN";

#[derive(Debug, Clone, Deserialize)]
pub struct RegionalConfig {
    pub base_url: String,
    pub api_key: Masked<String>,
    pub webhook_secret: Option<String>,
    /// Package category sent with rate requests ("hot food" on most accounts).
    pub category_id: Option<String>,
}

pub struct RegionalClient {
    client: reqwest::Client,
    base: Url,
    api_key: Masked<String>,
    category_id: Option<String>,
    verifier: WebhookVerifier,
}

type Rejection = fn(String) -> DeliveryError;

impl RegionalClient {
    pub fn new(config: &RegionalConfig, timeout: Duration, allow_unsigned: bool) -> DeliveryResult<Self> {
        Ok(Self {
            client: http::build_client(timeout)?,
            base: parse_base(&config.base_url)?,
            api_key: config.api_key.clone(),
            category_id: config.category_id.clone(),
            verifier: WebhookVerifier::new(config.webhook_secret.clone(), allow_unsigned),
        })
    }

    fn url(&self, path: &str) -> DeliveryResult<Url> {
        self.base
            .join(path)
            .map_err(|e| DeliveryError::MalformedPayload(format!("bad provider path {path}: {e}")))
    }

    async fn post(&self, path: &str, body: &Value, on_rejected: Rejection) -> DeliveryResult<Value> {
        let response = self
            .client
            .post(self.url(path)?)
            .bearer_auth(self.api_key.expose())
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        unwrap_envelope(http::read_json(response, on_rejected).await?, on_rejected)
    }

    async fn get(&self, path: &str, on_rejected: Rejection) -> DeliveryResult<Value> {
        let response = self
            .client
            .get(self.url(path)?)
            .bearer_auth(self.api_key.expose())
            .send()
            .await
            .map_err(transport_error)?;
        unwrap_envelope(http::read_json(response, on_rejected).await?, on_rejected)
    }
}

pub(crate) fn parse_base(base_url: &str) -> DeliveryResult<Url> {
    let mut base = base_url.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base).map_err(|e| DeliveryError::UnsupportedProvider(format!("invalid base url {base_url}: {e}")))
}

/// Responses come wrapped as `{"status": "success", "message": .., "data": ..}`.
fn unwrap_envelope(value: Value, on_rejected: Rejection) -> DeliveryResult<Value> {
    let status = value.get("status").and_then(Value::as_str).unwrap_or("success");
    if !status.eq_ignore_ascii_case("success") {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(status)
            .to_string();
        return Err(on_rejected(message));
    }
    value
        .get("data")
        .cloned()
        .ok_or_else(|| DeliveryError::MalformedPayload("response has no data".to_string()))
}

/// Identifiers arrive as strings or numbers depending on the endpoint.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[derive(Deserialize)]
struct AddressData {
    address_code: Value,
    formatted_address: Option<String>,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Deserialize)]
struct RatesData {
    request_token: String,
    #[serde(default)]
    couriers: Vec<CourierRate>,
}

#[derive(Deserialize)]
struct CourierRate {
    courier_id: Value,
    courier_name: String,
    service_code: String,
    service_type: Option<String>,
    total: Decimal,
    currency: Option<String>,
    insurance: Option<Insurance>,
    delivery_eta_time: Option<String>,
}

#[derive(Deserialize)]
struct Insurance {
    fee: Option<Decimal>,
}

/// Offer set from a `fetch_rates` response, in provider order.
pub fn parse_rate_sheet(data: &Value) -> DeliveryResult<RateSheet> {
    let rates: RatesData = serde_json::from_value(data.clone())?;
    let offers = rates
        .couriers
        .into_iter()
        .map(|c| RateOffer {
            courier_id: id_string(&c.courier_id).unwrap_or_default(),
            courier_name: c.courier_name,
            service_code: c.service_code,
            service_type: c.service_type,
            total: c.total,
            currency: c.currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            insurance_fee: c.insurance.and_then(|i| i.fee),
            estimated_delivery_at: parse_time(c.delivery_eta_time.as_deref()),
        })
        .collect();
    Ok(RateSheet { request_token: rates.request_token, offers })
}

#[derive(Deserialize)]
struct LabelData {
    order_id: Value,
    tracking_url: Option<String>,
    courier: Option<LabelCourier>,
    payment: Option<LabelPayment>,
    delivery_eta_time: Option<String>,
}

#[derive(Deserialize)]
struct LabelCourier {
    name: Option<String>,
}

#[derive(Deserialize)]
struct LabelPayment {
    shipping_fee: Option<Decimal>,
    currency: Option<String>,
}

#[derive(Deserialize)]
struct TrackingData {
    status: String,
    #[serde(default)]
    events: Vec<TrackingPoint>,
}

#[derive(Deserialize)]
struct TrackingPoint {
    location: Option<String>,
    message: Option<String>,
    captured: Option<String>,
}

#[derive(Deserialize)]
struct RegionalWebhook {
    event: String,
    order_id: Value,
    status: Option<String>,
    description: Option<String>,
    location: Option<String>,
    timestamp: Option<String>,
}

/// Decode a regional callback body.
pub fn parse_webhook_payload(body: &[u8]) -> DeliveryResult<WebhookEvent> {
    let raw: Value = serde_json::from_slice(body)?;
    let hook: RegionalWebhook = serde_json::from_value(raw.clone())?;
    let tracking_number = id_string(&hook.order_id)
        .ok_or_else(|| DeliveryError::MalformedPayload("callback has no order_id".to_string()))?;

    Ok(WebhookEvent {
        tracking_number,
        event_type: hook.event,
        raw_status: hook.status,
        description: hook.description,
        location: hook.location,
        occurred_at: parse_time(hook.timestamp.as_deref()),
        raw,
    })
}

#[async_trait]
impl DeliveryProvider for RegionalClient {
    fn id(&self) -> ProviderId {
        ProviderId::Regional
    }

    async fn validate_address(&self, address: &Address) -> DeliveryResult<ValidatedAddress> {
        let body = json!({
            "name": address.contact_name,
            "email": address.email,
            "phone": address.phone,
            "address": address.single_line(),
            "latitude": address.latitude,
            "longitude": address.longitude,
        });
        let data = self
            .post("shipping/address/validate", &body, DeliveryError::AddressNotServiceable)
            .await?;
        let parsed: AddressData = serde_json::from_value(data)?;
        let code = id_string(&parsed.address_code)
            .ok_or_else(|| DeliveryError::AddressNotServiceable("no address code issued".to_string()))?;

        Ok(ValidatedAddress {
            code: Some(code),
            formatted: parsed.formatted_address,
            city: parsed.city,
            state: parsed.state,
            postal_code: parsed.postal_code,
            latitude: parsed.latitude,
            longitude: parsed.longitude,
        })
    }

    async fn get_quote(&self, request: &QuoteRequest) -> DeliveryResult<ProviderQuote> {
        let missing_code = |side: &str| {
            DeliveryError::AddressNotServiceable(format!("{side} address has not been validated"))
        };
        let sender = request.origin.address_code.as_deref().ok_or_else(|| missing_code("pickup"))?;
        let receiver = request
            .destination
            .address_code
            .as_deref()
            .ok_or_else(|| missing_code("delivery"))?;

        let manifest = &request.manifest;
        let items: Vec<Value> = manifest
            .items
            .iter()
            .map(|item| {
                json!({
                    "name": item.name,
                    "description": item.description.clone().unwrap_or_else(|| item.name.clone()),
                    "unit_weight": item.unit_weight_kg,
                    "unit_amount": item.unit_value,
                    "quantity": item.quantity,
                })
            })
            .collect();
        let body = json!({
            "sender_address_code": sender,
            "receiver_address_code": receiver,
            "pickup_date": request.requested_at.format("%Y-%m-%d").to_string(),
            "category_id": self.category_id,
            "package_items": items,
            "package_dimension": {
                "length": manifest.dimensions.length_cm,
                "width": manifest.dimensions.width_cm,
                "height": manifest.dimensions.height_cm,
            },
        });

        let data = self
            .post("shipping/fetch_rates", &body, |message| {
                warn!(%message, "Rate request rejected by regional provider");
                DeliveryError::NoCourierAvailable
            })
            .await?;
        let sheet = parse_rate_sheet(&data)?;
        let best = select_cheapest(&sheet.offers)?;
        info!(
            courier = %best.courier_name,
            total = %best.total,
            offers = sheet.offers.len(),
            "Selected cheapest regional rate"
        );

        Ok(ProviderQuote {
            provider_quote_id: None,
            request_token: Some(sheet.request_token.clone()),
            courier_id: Some(best.courier_id.clone()),
            courier_name: Some(best.courier_name.clone()),
            service_code: Some(best.service_code.clone()),
            service_type: best.service_type.clone(),
            fee: best.total,
            currency: best.currency.clone(),
            insurance_fee: best.insurance_fee,
            expires_at: None,
            estimated_delivery_at: best.estimated_delivery_at,
            raw: data,
        })
    }

    async fn create_shipment(&self, quote: &Quote, order_id: Uuid) -> DeliveryResult<CreatedShipment> {
        let request_token = quote.provider_request_token.as_deref().ok_or_else(|| {
            DeliveryError::MalformedPayload(format!("quote {} has no request token", quote.id))
        })?;
        let body = json!({
            "request_token": request_token,
            "service_code": quote.service_code,
            "courier_id": quote.courier_id,
            "reference": order_id,
        });

        let data = self
            .post("shipping/labels", &body, |message| {
                warn!(%message, "Label request rejected by regional provider");
                DeliveryError::NoCourierAvailable
            })
            .await?;
        let label: LabelData = serde_json::from_value(data.clone())?;
        let tracking_number = id_string(&label.order_id)
            .ok_or_else(|| DeliveryError::MalformedPayload("label has no order_id".to_string()))?;
        let payment = label.payment;

        Ok(CreatedShipment {
            tracking_number,
            label_url: label.tracking_url,
            courier_name: label.courier.and_then(|c| c.name).or_else(|| quote.courier_name.clone()),
            service_type: quote.service_type.clone(),
            cost: payment.as_ref().and_then(|p| p.shipping_fee).unwrap_or(quote.fee),
            currency: payment
                .and_then(|p| p.currency)
                .unwrap_or_else(|| quote.currency.clone()),
            estimated_delivery_at: parse_time(label.delivery_eta_time.as_deref())
                .or(quote.estimated_delivery_at),
            raw: data,
        })
    }

    async fn track_shipment(&self, tracking_number: &str) -> DeliveryResult<ProviderTracking> {
        let data = self
            .get(&format!("shipping/labels/{tracking_number}"), DeliveryError::ShipmentNotFound)
            .await?;
        let tracking: TrackingData = serde_json::from_value(data.clone())?;
        let latest = tracking.events.last();

        Ok(ProviderTracking {
            raw_status: tracking.status,
            description: latest.and_then(|e| e.message.clone()),
            location: latest.and_then(|e| e.location.clone()),
            occurred_at: latest.and_then(|e| parse_time(e.captured.as_deref())),
            raw: data,
        })
    }

    async fn cancel_shipment(&self, tracking_number: &str) -> DeliveryResult<bool> {
        let response = self
            .client
            .post(self.url(&format!("shipping/labels/cancel/{tracking_number}"))?)
            .bearer_auth(self.api_key.expose())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_client_error()
            && !matches!(
                status,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
            )
        {
            warn!(tracking_number, %status, "Regional provider refused cancellation");
            return Ok(false);
        }
        let value = http::read_json(response, DeliveryError::MalformedPayload).await?;
        let accepted = value
            .get("status")
            .and_then(Value::as_str)
            .map(|s| s.eq_ignore_ascii_case("success"))
            .unwrap_or(true);
        if !accepted {
            warn!(tracking_number, "Regional provider refused cancellation");
        }
        Ok(accepted)
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    fn verify_webhook(&self, body: &[u8], signature: Option<&str>) -> DeliveryResult<()> {
        self.verifier.verify(body, signature)
    }

    fn parse_webhook(&self, body: &[u8]) -> DeliveryResult<WebhookEvent> {
        parse_webhook_payload(body)
    }
}
