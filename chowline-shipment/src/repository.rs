use async_trait::async_trait;
use chowline_core::DeliveryResult;
use chowline_quote::Quote;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Shipment, ShipmentStatus, TrackingEvent};

#[async_trait]
pub trait ShipmentRepository: Send + Sync {
    /// Consume the quote and insert the shipment as one atomic step.
    ///
    /// Fails with `ShipmentAlreadyExists` if the order already has a live
    /// shipment, or with the quote's own transition error. An expiry noticed
    /// during the attempt is persisted even though the call fails.
    async fn create_from_quote(
        &self,
        quote_id: Uuid,
        shipment: &Shipment,
        now: DateTime<Utc>,
    ) -> DeliveryResult<Quote>;

    async fn find_shipment(&self, id: Uuid) -> DeliveryResult<Option<Shipment>>;

    async fn find_by_tracking(&self, tracking_number: &str) -> DeliveryResult<Option<Shipment>>;

    /// The order's shipment, unless it was cancelled.
    async fn find_active_for_order(&self, order_id: Uuid) -> DeliveryResult<Option<Shipment>>;

    /// Compare-and-set on status: stores `updated` and appends `event` only
    /// if the shipment is still in `expected`. Returns whether it applied.
    async fn record_transition(
        &self,
        expected: ShipmentStatus,
        updated: &Shipment,
        event: &TrackingEvent,
    ) -> DeliveryResult<bool>;

    /// History in insertion order.
    async fn tracking_events(&self, shipment_id: Uuid) -> DeliveryResult<Vec<TrackingEvent>>;
}
