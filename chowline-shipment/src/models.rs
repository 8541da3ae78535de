use chowline_core::{DeliveryError, ProviderId};
use chowline_providers::CreatedShipment;
use chowline_quote::Quote;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Canonical shipment status, shared by every provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Pending,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
    Failed,
    Cancelled,
    Returned,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "PENDING",
            ShipmentStatus::PickedUp => "PICKED_UP",
            ShipmentStatus::InTransit => "IN_TRANSIT",
            ShipmentStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            ShipmentStatus::Delivered => "DELIVERED",
            ShipmentStatus::Failed => "FAILED",
            ShipmentStatus::Cancelled => "CANCELLED",
            ShipmentStatus::Returned => "RETURNED",
        }
    }

    /// No provider event moves a shipment out of these.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ShipmentStatus::Delivered | ShipmentStatus::Cancelled | ShipmentStatus::Returned
        )
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShipmentStatus {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PENDING" => ShipmentStatus::Pending,
            "PICKED_UP" => ShipmentStatus::PickedUp,
            "IN_TRANSIT" => ShipmentStatus::InTransit,
            "OUT_FOR_DELIVERY" => ShipmentStatus::OutForDelivery,
            "DELIVERED" => ShipmentStatus::Delivered,
            "FAILED" => ShipmentStatus::Failed,
            "CANCELLED" => ShipmentStatus::Cancelled,
            "RETURNED" => ShipmentStatus::Returned,
            other => return Err(DeliveryError::Storage(format!("unknown shipment status {other}"))),
        })
    }
}

/// A live delivery, created once from a consumed quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub quote_id: Uuid,
    pub provider: ProviderId,
    pub tracking_number: String,
    pub status: ShipmentStatus,
    pub cost: Decimal,
    pub currency: String,
    pub courier_name: Option<String>,
    pub service_type: Option<String>,
    pub label_url: Option<String>,
    pub estimated_delivery_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    pub fn from_created(quote: &Quote, order_id: Uuid, created: CreatedShipment, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            quote_id: quote.id,
            provider: quote.provider,
            tracking_number: created.tracking_number,
            status: ShipmentStatus::Pending,
            cost: created.cost,
            currency: created.currency,
            courier_name: created.courier_name,
            service_type: created.service_type,
            label_url: created.label_url,
            estimated_delivery_at: created.estimated_delivery_at,
            delivered_at: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy of this shipment moved to `status`.
    pub fn transitioned(&self, status: ShipmentStatus, detail: Option<&str>, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.status = status;
        next.updated_at = at;
        match status {
            ShipmentStatus::Delivered => next.delivered_at = Some(at),
            ShipmentStatus::Failed | ShipmentStatus::Cancelled => {
                next.failure_reason = detail.map(str::to_string).or(next.failure_reason);
            }
            _ => {}
        }
        next
    }
}

/// Append-only history entry. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub status: ShipmentStatus,
    /// Provider's own status string, as received.
    pub provider_status: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub raw: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentTrackingView {
    #[serde(flatten)]
    pub shipment: Shipment,
    pub events: Vec<TrackingEvent>,
}
