//! Folds provider status reports (pushed callbacks or pulled tracking) into
//! shipment state. Each accepted change appends one tracking event, moves the
//! shipment with a compare-and-set on its previous status, and runs the order
//! bridge. Replayed reports run the bridge again so an order that missed an
//! update catches up; the bridge only notifies when the order actually moves.

use chowline_core::{DeliveryError, DeliveryResult, ProviderId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridge::OrderStatusBridge;
use crate::models::{Shipment, ShipmentStatus, TrackingEvent};
use crate::repository::ShipmentRepository;
use crate::status::{supersedes, translate};

const CAS_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub tracking_number: String,
    pub raw_status: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub raw: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Applied { from: ShipmentStatus, to: ShipmentStatus },
    /// Already in that status (replayed callback).
    Duplicate { status: ShipmentStatus },
    /// Would move the shipment backwards or out of a terminal status.
    Stale { current: ShipmentStatus, incoming: ShipmentStatus },
    Unrecognized { raw_status: String },
    /// Event carried no delivery status.
    Ignored,
}

#[derive(Clone)]
pub struct TrackingReconciler {
    shipments: Arc<dyn ShipmentRepository>,
    bridge: OrderStatusBridge,
}

impl TrackingReconciler {
    pub fn new(shipments: Arc<dyn ShipmentRepository>, bridge: OrderStatusBridge) -> Self {
        Self { shipments, bridge }
    }

    /// Translate a provider status string, then apply it.
    pub async fn apply_raw(&self, provider: ProviderId, update: StatusUpdate) -> DeliveryResult<ReconcileOutcome> {
        let status = match translate(provider, &update.raw_status).into_result() {
            Ok(status) => status,
            Err(e) => {
                warn!(%provider, tracking_number = %update.tracking_number, error = %e, "Ignoring provider status");
                return Ok(ReconcileOutcome::Unrecognized { raw_status: update.raw_status });
            }
        };
        self.apply_status(provider, status, update).await
    }

    pub async fn apply_status(
        &self,
        provider: ProviderId,
        status: ShipmentStatus,
        update: StatusUpdate,
    ) -> DeliveryResult<ReconcileOutcome> {
        for _ in 0..CAS_ATTEMPTS {
            let shipment = self
                .shipments
                .find_by_tracking(&update.tracking_number)
                .await?
                .filter(|s| s.provider == provider)
                .ok_or_else(|| DeliveryError::ShipmentNotFound(update.tracking_number.clone()))?;

            let current = shipment.status;
            if current == status {
                debug!(tracking_number = %shipment.tracking_number, %status, "Duplicate status report");
                // The order may have missed the first report; the bridge is a no-op when it is in sync.
                self.sync_order(&shipment).await;
                return Ok(ReconcileOutcome::Duplicate { status });
            }
            if !supersedes(current, status) {
                info!(tracking_number = %shipment.tracking_number, %current, incoming = %status, "Ignoring out-of-order status");
                return Ok(ReconcileOutcome::Stale { current, incoming: status });
            }

            let now = Utc::now();
            let occurred_at = update.occurred_at.unwrap_or(now);
            let updated = shipment.transitioned(status, update.description.as_deref(), occurred_at);
            let event = TrackingEvent {
                id: Uuid::new_v4(),
                shipment_id: shipment.id,
                status,
                provider_status: Some(update.raw_status.clone()),
                description: update.description.clone(),
                location: update.location.clone(),
                occurred_at,
                raw: update.raw.clone(),
                created_at: now,
            };

            if self.shipments.record_transition(current, &updated, &event).await? {
                info!(
                    tracking_number = %updated.tracking_number,
                    %provider,
                    from = %current,
                    to = %status,
                    "Shipment status updated"
                );
                self.sync_order(&updated).await;
                return Ok(ReconcileOutcome::Applied { from: current, to: status });
            }
            debug!(tracking_number = %update.tracking_number, "Shipment changed concurrently, re-reading");
        }

        Err(DeliveryError::Storage(format!(
            "shipment {} kept changing during update",
            update.tracking_number
        )))
    }

    async fn sync_order(&self, shipment: &Shipment) {
        if let Err(e) = self.bridge.on_shipment_status(shipment).await {
            warn!(order_id = %shipment.order_id, tracking_number = %shipment.tracking_number, error = %e, "Order bridge failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, RecordingNotifier};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use chowline_core::order::{Order, OrderRepository, OrderStatus};
    use chowline_providers::mock::MockProvider;
    use chowline_providers::CreatedShipment;
    use chowline_quote::{QuoteRepository, Selection};
    use rust_decimal::Decimal;

    struct Fixture {
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        reconciler: TrackingReconciler,
        order: Order,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let order = Order::new(Uuid::new_v4(), Uuid::new_v4());
        store.insert_order(order.clone()).await;

        let quote = MockProvider::sample_quote(ProviderId::Regional);
        store.insert_quote(&quote).await.unwrap();
        store
            .select_quote(quote.id, Selection { by: "t".into(), reason: None, confirmed: false }, Utc::now())
            .await
            .unwrap();
        let created = CreatedShipment {
            tracking_number: "T1".into(),
            label_url: None,
            courier_name: None,
            service_type: None,
            cost: Decimal::new(1200, 0),
            currency: "NGN".into(),
            estimated_delivery_at: None,
            raw: serde_json::Value::Null,
        };
        let shipment = Shipment::from_created(&quote, order.id, created, Utc::now());
        store.create_from_quote(quote.id, &shipment, Utc::now()).await.unwrap();

        let bridge = OrderStatusBridge::new(store.clone(), notifier.clone());
        let reconciler = TrackingReconciler::new(store.clone(), bridge);
        Fixture { store, notifier, reconciler, order }
    }

    fn update(raw: &str) -> StatusUpdate {
        StatusUpdate {
            tracking_number: "T1".into(),
            raw_status: raw.into(),
            description: None,
            location: None,
            occurred_at: None,
            raw: None,
        }
    }

    #[tokio::test]
    async fn test_replayed_delivery_is_applied_once() {
        let f = fixture().await;

        let first = f.reconciler.apply_raw(ProviderId::Regional, update("delivered")).await.unwrap();
        assert_eq!(
            first,
            ReconcileOutcome::Applied { from: ShipmentStatus::Pending, to: ShipmentStatus::Delivered }
        );
        let replay = f.reconciler.apply_raw(ProviderId::Regional, update("delivered")).await.unwrap();
        assert_eq!(replay, ReconcileOutcome::Duplicate { status: ShipmentStatus::Delivered });

        let shipment = f.store.find_by_tracking("T1").await.unwrap().unwrap();
        assert_eq!(f.store.tracking_events(shipment.id).await.unwrap().len(), 1);
        assert!(shipment.delivered_at.is_some());

        let order = f.store.find_order(f.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert!(order.delivered_at.is_some());
        assert_eq!(f.notifier.sent().await.len(), 1);
    }

    /// Order store whose first save is lost.
    struct FlakyOrders {
        inner: Arc<MemoryStore>,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl OrderRepository for FlakyOrders {
        async fn find_order(&self, id: Uuid) -> DeliveryResult<Option<Order>> {
            self.inner.find_order(id).await
        }

        async fn save_order(&self, order: &Order) -> DeliveryResult<()> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(DeliveryError::Storage("connection reset".into()));
            }
            self.inner.save_order(order).await
        }
    }

    #[tokio::test]
    async fn test_replay_repairs_order_after_failed_save() {
        let f = fixture().await;
        let orders = Arc::new(FlakyOrders { inner: f.store.clone(), failures_left: AtomicUsize::new(1) });
        let bridge = OrderStatusBridge::new(orders, f.notifier.clone());
        let reconciler = TrackingReconciler::new(f.store.clone(), bridge);

        let first = reconciler.apply_raw(ProviderId::Regional, update("delivered")).await.unwrap();
        assert_eq!(
            first,
            ReconcileOutcome::Applied { from: ShipmentStatus::Pending, to: ShipmentStatus::Delivered }
        );
        let order = f.store.find_order(f.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert!(f.notifier.sent().await.is_empty());

        let replay = reconciler.apply_raw(ProviderId::Regional, update("delivered")).await.unwrap();
        assert_eq!(replay, ReconcileOutcome::Duplicate { status: ShipmentStatus::Delivered });

        let order = f.store.find_order(f.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        let sent = f.notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, OrderStatus::Delivered);

        // a third report finds everything in sync
        reconciler.apply_raw(ProviderId::Regional, update("delivered")).await.unwrap();
        assert_eq!(f.notifier.sent().await.len(), 1);
        let shipment = f.store.find_by_tracking("T1").await.unwrap().unwrap();
        assert_eq!(f.store.tracking_events(shipment.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_order_events_do_not_regress() {
        let f = fixture().await;
        f.reconciler.apply_raw(ProviderId::Regional, update("in_transit")).await.unwrap();

        let late = f.reconciler.apply_raw(ProviderId::Regional, update("picked_up")).await.unwrap();
        assert_eq!(
            late,
            ReconcileOutcome::Stale { current: ShipmentStatus::InTransit, incoming: ShipmentStatus::PickedUp }
        );
        let shipment = f.store.find_by_tracking("T1").await.unwrap().unwrap();
        assert_eq!(shipment.status, ShipmentStatus::InTransit);
    }

    #[tokio::test]
    async fn test_progress_notifies_once_per_order_change() {
        let f = fixture().await;
        for raw in ["picked_up", "in_transit", "out_for_delivery"] {
            f.reconciler.apply_raw(ProviderId::Regional, update(raw)).await.unwrap();
        }

        let shipment = f.store.find_by_tracking("T1").await.unwrap().unwrap();
        assert_eq!(f.store.tracking_events(shipment.id).await.unwrap().len(), 3);
        // all three map to OUT_FOR_DELIVERY on the order
        let sent = f.notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, OrderStatus::OutForDelivery);
    }

    #[tokio::test]
    async fn test_unrecognized_status_changes_nothing() {
        let f = fixture().await;
        let outcome = f.reconciler.apply_raw(ProviderId::Regional, update("teleported")).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unrecognized { raw_status: "teleported".into() });

        let shipment = f.store.find_by_tracking("T1").await.unwrap().unwrap();
        assert_eq!(shipment.status, ShipmentStatus::Pending);
        assert!(f.store.tracking_events(shipment.id).await.unwrap().is_empty());
        assert!(f.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tracking_number() {
        let f = fixture().await;
        let mut stray = update("delivered");
        stray.tracking_number = "NOPE".into();
        let err = f.reconciler.apply_raw(ProviderId::Regional, stray).await.unwrap_err();
        assert!(matches!(err, DeliveryError::ShipmentNotFound(_)));

        // right tracking number, wrong provider
        let err = f
            .reconciler
            .apply_raw(ProviderId::International, update("delivered"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::ShipmentNotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_delivery_cancels_order_with_reason() {
        let f = fixture().await;
        let mut failed = update("failed");
        failed.description = Some("customer unreachable".into());
        f.reconciler.apply_raw(ProviderId::Regional, failed).await.unwrap();

        let shipment = f.store.find_by_tracking("T1").await.unwrap().unwrap();
        assert_eq!(shipment.failure_reason.as_deref(), Some("customer unreachable"));
        let order = f.store.find_order(f.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        let sent = f.notifier.sent().await;
        assert!(sent[0].message.contains("customer unreachable"));
    }
}
