use chowline_core::{DeliveryError, DeliveryResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One courier/service option from a rate-shopping provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateOffer {
    pub courier_id: String,
    pub courier_name: String,
    pub service_code: String,
    pub service_type: Option<String>,
    pub total: Decimal,
    pub currency: String,
    pub insurance_fee: Option<Decimal>,
    pub estimated_delivery_at: Option<DateTime<Utc>>,
}

/// Offers in provider response order, plus the token that ties them together
/// when booking one of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateSheet {
    pub request_token: String,
    pub offers: Vec<RateOffer>,
}

/// The offer with the strictly lowest total; on a tie the earlier offer wins.
pub fn select_cheapest(offers: &[RateOffer]) -> DeliveryResult<&RateOffer> {
    let mut best: Option<&RateOffer> = None;
    for offer in offers {
        match best {
            Some(current) if offer.total >= current.total => {}
            _ => best = Some(offer),
        }
    }
    best.ok_or(DeliveryError::NoCourierAvailable)
}
