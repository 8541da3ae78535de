use chowline_core::address::Address;
use chowline_core::{DeliveryError, ProviderId};
use chowline_shared::Masked;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::manifest::PackageManifest;

/// Quote status. Providers never see these, but they are persisted and
/// reported back to clients, so the names are stable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStatus {
    Pending,
    Selected,
    Used,
    Expired,
    Cancelled,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Pending => "PENDING",
            QuoteStatus::Selected => "SELECTED",
            QuoteStatus::Used => "USED",
            QuoteStatus::Expired => "EXPIRED",
            QuoteStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QuoteStatus::Used | QuoteStatus::Expired | QuoteStatus::Cancelled)
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteStatus {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PENDING" => QuoteStatus::Pending,
            "SELECTED" => QuoteStatus::Selected,
            "USED" => QuoteStatus::Used,
            "EXPIRED" => QuoteStatus::Expired,
            "CANCELLED" => QuoteStatus::Cancelled,
            other => return Err(DeliveryError::Storage(format!("unknown quote status {other}"))),
        })
    }
}

/// Snapshot of one end of the delivery, frozen at quote time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub phone: Option<Masked<String>>,
    pub email: Option<Masked<String>>,
    pub address_line: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address_code: Option<String>,
}

impl Party {
    pub fn from_address(address: &Address, address_code: Option<String>) -> Self {
        Self {
            name: address.contact_name.clone(),
            phone: address.phone.clone(),
            email: address.email.clone(),
            address_line: address.single_line(),
            city: address.city.clone(),
            state: address.state.clone(),
            postal_code: address.postal_code.clone(),
            country: address.country.trim().to_ascii_uppercase(),
            latitude: address.latitude,
            longitude: address.longitude,
            address_code,
        }
    }
}

/// What a provider hands back for a priced delivery, whichever workflow
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderQuote {
    pub provider_quote_id: Option<String>,
    pub request_token: Option<String>,
    pub courier_id: Option<String>,
    pub courier_name: Option<String>,
    pub service_code: Option<String>,
    pub service_type: Option<String>,
    pub fee: Decimal,
    pub currency: String,
    pub insurance_fee: Option<Decimal>,
    pub expires_at: Option<DateTime<Utc>>,
    pub estimated_delivery_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

/// Who accepted a quote, and whether the provider-side confirmation happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub by: String,
    pub reason: Option<String>,
    pub confirmed: bool,
}

/// A priced, time-boxed delivery offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub provider: ProviderId,
    pub provider_quote_id: Option<String>,
    pub provider_request_token: Option<String>,
    pub courier_id: Option<String>,
    pub courier_name: Option<String>,
    pub service_code: Option<String>,
    pub service_type: Option<String>,
    pub fee: Decimal,
    pub currency: String,
    pub insurance_fee: Option<Decimal>,
    pub origin: Party,
    pub destination: Party,
    pub manifest: PackageManifest,
    pub raw_response: serde_json::Value,
    pub status: QuoteStatus,
    pub selected_by: Option<String>,
    pub selection_reason: Option<String>,
    pub selected_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub used_at: Option<DateTime<Utc>>,
    pub shipment_id: Option<Uuid>,
    pub estimated_delivery_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    /// A fresh quote always starts out PENDING.
    pub fn new(
        provider: ProviderId,
        origin: Party,
        destination: Party,
        manifest: PackageManifest,
        offer: ProviderQuote,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider,
            provider_quote_id: offer.provider_quote_id,
            provider_request_token: offer.request_token,
            courier_id: offer.courier_id,
            courier_name: offer.courier_name,
            service_code: offer.service_code,
            service_type: offer.service_type,
            fee: offer.fee.max(Decimal::ZERO),
            currency: offer.currency,
            insurance_fee: offer.insurance_fee,
            origin,
            destination,
            manifest,
            raw_response: offer.raw,
            status: QuoteStatus::Pending,
            selected_by: None,
            selection_reason: None,
            selected_at: None,
            confirmed_at: None,
            used_at: None,
            shipment_id: None,
            estimated_delivery_at: offer.estimated_delivery_at,
            expires_at: offer.expires_at,
            created_at: now,
            updated_at: now,
        }
    }
}
