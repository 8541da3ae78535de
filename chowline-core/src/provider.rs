use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DeliveryError;

/// Country served by the regional provider. Every other country code goes
/// to the international provider.
pub const DOMESTIC_COUNTRY: &str = "NG";

/// Delivery providers known to the platform. Stored on quotes and shipments,
/// so the serialized names must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Regional,
    International,
}

/// How a provider turns a delivery request into a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    /// Rate shopping across several couriers; the cheapest offer wins.
    Scheduled,
    /// A single time-windowed quote that must be confirmed before use.
    OnDemand,
}

/// Static metadata describing what a provider can do.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderCapabilities {
    pub id: ProviderId,
    pub workflow: Workflow,
    /// ISO country codes; empty means the provider takes anything.
    pub supported_countries: &'static [&'static str],
    pub requires_confirmation: bool,
    pub supports_store_locations: bool,
    /// Whether the provider issues address codes worth caching on the address record.
    pub caches_address_codes: bool,
    pub quotes_expire: bool,
}

static REGIONAL: ProviderCapabilities = ProviderCapabilities {
    id: ProviderId::Regional,
    workflow: Workflow::Scheduled,
    supported_countries: &[DOMESTIC_COUNTRY],
    requires_confirmation: false,
    supports_store_locations: false,
    caches_address_codes: true,
    quotes_expire: false,
};

static INTERNATIONAL: ProviderCapabilities = ProviderCapabilities {
    id: ProviderId::International,
    workflow: Workflow::OnDemand,
    supported_countries: &[],
    requires_confirmation: true,
    supports_store_locations: true,
    caches_address_codes: false,
    quotes_expire: true,
};

impl ProviderCapabilities {
    pub fn serves(&self, country: &str) -> bool {
        self.supported_countries.is_empty()
            || self
                .supported_countries
                .iter()
                .any(|c| c.eq_ignore_ascii_case(country.trim()))
    }
}

impl ProviderId {
    pub const ALL: [ProviderId; 2] = [ProviderId::Regional, ProviderId::International];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Regional => "regional",
            ProviderId::International => "international",
        }
    }

    pub fn capabilities(&self) -> &'static ProviderCapabilities {
        match self {
            ProviderId::Regional => &REGIONAL,
            ProviderId::International => &INTERNATIONAL,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regional" => Ok(ProviderId::Regional),
            "international" => Ok(ProviderId::International),
            other => Err(DeliveryError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Pick the provider responsible for a country. Total: anything the regional
/// provider does not explicitly serve falls through to the international one.
pub fn select_provider(country: &str) -> ProviderId {
    if REGIONAL.serves(country) {
        ProviderId::Regional
    } else {
        ProviderId::International
    }
}
