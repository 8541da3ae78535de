//! On-demand courier network used outside the domestic market. One quote per
//! request, valid for a short window, authenticated with OAuth client
//! credentials.

use async_trait::async_trait;
use chowline_core::address::Address;
use chowline_core::{DeliveryError, DeliveryResult, ProviderId};
use chowline_quote::{Party, ProviderQuote, Quote};
use chowline_shared::Masked;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Method, StatusCode, Url};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::http::{self, transport_error};
use crate::regional::{parse_base, parse_time};
use crate::signature::WebhookVerifier;
use crate::token::{AccessToken, TokenCache, TokenSource};
use crate::{CreatedShipment, DeliveryProvider, ProviderTracking, QuoteRequest, ValidatedAddress, WebhookEvent};

pub const SIGNATURE_HEADER: &str = "x-delivery-signature";

const PICKUP_LEAD: i64 = 15;
const PICKUP_WINDOW: i64 = 30;
const DROPOFF_GRACE: i64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct InternationalConfig {
    pub base_url: String,
    pub auth_url: String,
    pub customer_id: String,
    pub client_id: String,
    pub client_secret: Masked<String>,
    pub scope: String,
    pub webhook_secret: Option<String>,
}

/// Pickup and dropoff windows sent with every quote and delivery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryWindows {
    pub pickup_ready: DateTime<Utc>,
    pub pickup_deadline: DateTime<Utc>,
    pub dropoff_ready: DateTime<Utc>,
    pub dropoff_deadline: DateTime<Utc>,
}

impl DeliveryWindows {
    pub fn starting(now: DateTime<Utc>) -> Self {
        let pickup_ready = now + Duration::minutes(PICKUP_LEAD);
        let pickup_deadline = pickup_ready + Duration::minutes(PICKUP_WINDOW);
        Self {
            pickup_ready,
            pickup_deadline,
            dropoff_ready: pickup_ready,
            dropoff_deadline: pickup_deadline + Duration::minutes(DROPOFF_GRACE),
        }
    }
}

/// Client-credentials grant against the provider's auth server.
pub struct OAuthTokenSource {
    client: reqwest::Client,
    auth_url: String,
    client_id: String,
    client_secret: Masked<String>,
    scope: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[async_trait]
impl TokenSource for OAuthTokenSource {
    async fn fetch_token(&self) -> DeliveryResult<AccessToken> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose().as_str()),
            ("grant_type", "client_credentials"),
            ("scope", self.scope.as_str()),
        ];
        let response = self
            .client
            .post(&self.auth_url)
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;
        let value = http::read_json(response, DeliveryError::ProviderAuthFailure).await?;
        let token: TokenResponse = serde_json::from_value(value)?;

        debug!(expires_in = token.expires_in, "Obtained international provider token");
        Ok(AccessToken {
            value: Masked(token.access_token),
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }
}

pub struct InternationalClient {
    client: reqwest::Client,
    base: Url,
    customer_id: String,
    tokens: TokenCache<OAuthTokenSource>,
    verifier: WebhookVerifier,
}

type Rejection = fn(String) -> DeliveryError;

impl InternationalClient {
    pub fn new(
        config: &InternationalConfig,
        timeout: std::time::Duration,
        allow_unsigned: bool,
    ) -> DeliveryResult<Self> {
        let client = http::build_client(timeout)?;
        let source = OAuthTokenSource {
            client: client.clone(),
            auth_url: config.auth_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: config.scope.clone(),
        };
        Ok(Self {
            client,
            base: parse_base(&config.base_url)?,
            customer_id: config.customer_id.clone(),
            tokens: TokenCache::new(source),
            verifier: WebhookVerifier::new(config.webhook_secret.clone(), allow_unsigned),
        })
    }

    fn url(&self, path: &str) -> DeliveryResult<Url> {
        let full = format!("v1/customers/{}/{}", self.customer_id, path);
        self.base
            .join(&full)
            .map_err(|e| DeliveryError::MalformedPayload(format!("bad provider path {full}: {e}")))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> DeliveryResult<reqwest::Response> {
        let token = self.tokens.token().await?;
        let mut request = self.client.request(method, self.url(path)?).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(transport_error)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }
        Ok(response)
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        on_rejected: Rejection,
    ) -> DeliveryResult<Value> {
        let response = self.send(method, path, body).await?;
        http::read_json(response, on_rejected).await
    }
}

/// The API takes structured addresses as a JSON document inside a string field.
fn address_document(party: &Party) -> DeliveryResult<String> {
    let document = json!({
        "street_address": [party.address_line],
        "city": party.city,
        "state": party.state,
        "zip_code": party.postal_code,
        "country": party.country,
    });
    Ok(serde_json::to_string(&document)?)
}

pub(crate) fn to_minor_units(amount: Decimal) -> i64 {
    (amount * Decimal::ONE_HUNDRED).round().to_i64().unwrap_or(i64::MAX)
}

pub(crate) fn from_minor_units(amount: i64) -> Decimal {
    Decimal::new(amount, 2)
}

fn phone(party: &Party) -> Option<&str> {
    party.phone.as_ref().map(|p| p.expose().as_str())
}

fn quote_rejection(message: String) -> DeliveryError {
    if message.contains("undeliverable") || message.contains("address") {
        DeliveryError::AddressNotServiceable(message)
    } else {
        warn!(%message, "Quote request rejected by international provider");
        DeliveryError::NoCourierAvailable
    }
}

#[derive(Deserialize)]
struct QuoteResponse {
    id: String,
    fee: i64,
    currency: Option<String>,
    currency_type: Option<String>,
    expires: Option<String>,
    dropoff_eta: Option<String>,
}

#[derive(Deserialize)]
struct DeliveryResponse {
    id: String,
    status: Option<String>,
    fee: Option<i64>,
    currency: Option<String>,
    tracking_url: Option<String>,
    dropoff_eta: Option<String>,
    updated: Option<String>,
    courier: Option<CourierInfo>,
}

#[derive(Deserialize)]
struct CourierInfo {
    name: Option<String>,
    location: Option<CourierLocation>,
}

#[derive(Deserialize)]
struct CourierLocation {
    lat: f64,
    lng: f64,
}

impl CourierLocation {
    fn describe(&self) -> String {
        format!("{:.5},{:.5}", self.lat, self.lng)
    }
}

#[derive(Deserialize)]
struct InternationalWebhook {
    kind: String,
    delivery_id: String,
    status: Option<String>,
    created: Option<String>,
    data: Option<WebhookData>,
}

#[derive(Deserialize)]
struct WebhookData {
    courier: Option<CourierInfo>,
}

pub const EVENT_DELIVERY_STATUS: &str = "event.delivery_status";
pub const EVENT_COURIER_UPDATE: &str = "event.courier_update";

/// Decode an international callback. Courier position pings carry no delivery
/// status and come back with `raw_status: None`.
pub fn parse_webhook_payload(body: &[u8]) -> DeliveryResult<WebhookEvent> {
    let raw: Value = serde_json::from_slice(body)?;
    let hook: InternationalWebhook = serde_json::from_value(raw.clone())?;
    if hook.delivery_id.is_empty() {
        return Err(DeliveryError::MalformedPayload("callback has no delivery_id".to_string()));
    }

    let raw_status = match hook.kind.as_str() {
        EVENT_COURIER_UPDATE => None,
        _ => hook.status,
    };
    let location = hook
        .data
        .and_then(|d| d.courier)
        .and_then(|c| c.location)
        .map(|l| l.describe());

    Ok(WebhookEvent {
        tracking_number: hook.delivery_id,
        event_type: hook.kind,
        raw_status,
        description: None,
        location,
        occurred_at: parse_time(hook.created.as_deref()),
        raw,
    })
}

#[async_trait]
impl DeliveryProvider for InternationalClient {
    fn id(&self) -> ProviderId {
        ProviderId::International
    }

    /// No validation endpoint exists; addresses are checked for the fields a
    /// quote request needs.
    async fn validate_address(&self, address: &Address) -> DeliveryResult<ValidatedAddress> {
        if address.line1.trim().is_empty() || address.country.trim().is_empty() {
            return Err(DeliveryError::AddressNotServiceable(format!(
                "address {} is missing street or country",
                address.id
            )));
        }
        Ok(ValidatedAddress {
            code: None,
            formatted: Some(address.single_line()),
            city: address.city.clone(),
            state: address.state.clone(),
            postal_code: address.postal_code.clone(),
            latitude: address.latitude,
            longitude: address.longitude,
        })
    }

    async fn get_quote(&self, request: &QuoteRequest) -> DeliveryResult<ProviderQuote> {
        let windows = DeliveryWindows::starting(request.requested_at);
        let body = json!({
            "pickup_address": address_document(&request.origin)?,
            "dropoff_address": address_document(&request.destination)?,
            "pickup_latitude": request.origin.latitude,
            "pickup_longitude": request.origin.longitude,
            "dropoff_latitude": request.destination.latitude,
            "dropoff_longitude": request.destination.longitude,
            "pickup_phone_number": phone(&request.origin),
            "dropoff_phone_number": phone(&request.destination),
            "pickup_ready_dt": windows.pickup_ready.to_rfc3339(),
            "pickup_deadline_dt": windows.pickup_deadline.to_rfc3339(),
            "dropoff_ready_dt": windows.dropoff_ready.to_rfc3339(),
            "dropoff_deadline_dt": windows.dropoff_deadline.to_rfc3339(),
            "manifest_total_value": to_minor_units(request.manifest.declared_value),
        });

        let data = self
            .call(Method::POST, "delivery_quotes", Some(&body), quote_rejection)
            .await?;
        let quote: QuoteResponse = serde_json::from_value(data.clone())?;
        let currency = quote
            .currency
            .or(quote.currency_type)
            .unwrap_or_else(|| request.manifest.currency.clone())
            .to_ascii_uppercase();
        let fee = from_minor_units(quote.fee);
        info!(provider_quote_id = %quote.id, %fee, %currency, "Received international quote");

        Ok(ProviderQuote {
            provider_quote_id: Some(quote.id),
            request_token: None,
            courier_id: None,
            courier_name: None,
            service_code: None,
            service_type: Some("on_demand".to_string()),
            fee,
            currency,
            insurance_fee: None,
            expires_at: parse_time(quote.expires.as_deref()),
            estimated_delivery_at: parse_time(quote.dropoff_eta.as_deref()),
            raw: data,
        })
    }

    async fn create_shipment(&self, quote: &Quote, order_id: Uuid) -> DeliveryResult<CreatedShipment> {
        let provider_quote_id = quote.provider_quote_id.as_deref().ok_or_else(|| {
            DeliveryError::MalformedPayload(format!("quote {} has no provider quote id", quote.id))
        })?;
        let windows = DeliveryWindows::starting(Utc::now());
        let items: Vec<Value> = quote
            .manifest
            .items
            .iter()
            .map(|item| json!({"name": item.name, "quantity": item.quantity, "size": "small"}))
            .collect();
        let body = json!({
            "quote_id": provider_quote_id,
            "external_id": order_id,
            "pickup_name": quote.origin.name,
            "pickup_address": address_document(&quote.origin)?,
            "pickup_phone_number": phone(&quote.origin),
            "pickup_latitude": quote.origin.latitude,
            "pickup_longitude": quote.origin.longitude,
            "dropoff_name": quote.destination.name,
            "dropoff_address": address_document(&quote.destination)?,
            "dropoff_phone_number": phone(&quote.destination),
            "dropoff_latitude": quote.destination.latitude,
            "dropoff_longitude": quote.destination.longitude,
            "manifest_items": items,
            "manifest_total_value": to_minor_units(quote.manifest.declared_value),
            "pickup_ready_dt": windows.pickup_ready.to_rfc3339(),
            "pickup_deadline_dt": windows.pickup_deadline.to_rfc3339(),
            "dropoff_ready_dt": windows.dropoff_ready.to_rfc3339(),
            "dropoff_deadline_dt": windows.dropoff_deadline.to_rfc3339(),
        });

        let data = self
            .call(Method::POST, "deliveries", Some(&body), |message| {
                if message.contains("expired") {
                    warn!(%message, "International provider reports quote expired");
                }
                DeliveryError::NoCourierAvailable
            })
            .await?;
        let delivery: DeliveryResponse = serde_json::from_value(data.clone())?;

        Ok(CreatedShipment {
            tracking_number: delivery.id,
            label_url: delivery.tracking_url,
            courier_name: delivery.courier.and_then(|c| c.name),
            service_type: quote.service_type.clone(),
            cost: delivery.fee.map(from_minor_units).unwrap_or(quote.fee),
            currency: delivery
                .currency
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or_else(|| quote.currency.clone()),
            estimated_delivery_at: parse_time(delivery.dropoff_eta.as_deref())
                .or(quote.estimated_delivery_at),
            raw: data,
        })
    }

    async fn track_shipment(&self, tracking_number: &str) -> DeliveryResult<ProviderTracking> {
        let data = self
            .call(
                Method::GET,
                &format!("deliveries/{tracking_number}"),
                None,
                DeliveryError::ShipmentNotFound,
            )
            .await?;
        let delivery: DeliveryResponse = serde_json::from_value(data.clone())?;
        let raw_status = delivery
            .status
            .ok_or_else(|| DeliveryError::MalformedPayload("delivery has no status".to_string()))?;

        Ok(ProviderTracking {
            raw_status,
            description: None,
            location: delivery
                .courier
                .and_then(|c| c.location)
                .map(|l| l.describe()),
            occurred_at: parse_time(delivery.updated.as_deref()),
            raw: data,
        })
    }

    async fn cancel_shipment(&self, tracking_number: &str) -> DeliveryResult<bool> {
        let response = self
            .send(Method::POST, &format!("deliveries/{tracking_number}/cancel"), None)
            .await?;
        let status = response.status();
        if status.is_client_error()
            && !matches!(
                status,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
            )
        {
            warn!(tracking_number, %status, "International provider refused cancellation");
            return Ok(false);
        }
        http::read_json(response, DeliveryError::MalformedPayload).await?;
        Ok(true)
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
