//! In-memory implementations of every store the delivery service talks to.
//! Used by tests and by the API when no database is configured. All state
//! sits behind one mutex, which is what makes quote consumption and status
//! updates compare-and-set.

use async_trait::async_trait;
use chowline_core::address::{Address, AddressBook, CachedAddressCode};
use chowline_core::checkout::{Cart, CheckoutReader};
use chowline_core::order::{Notifier, Order, OrderRepository, OrderStatus};
use chowline_core::{DeliveryError, DeliveryResult};
use chowline_quote::{Quote, QuoteRepository, Selection};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{Shipment, ShipmentStatus, TrackingEvent};
use crate::repository::ShipmentRepository;

#[derive(Default)]
struct MemoryState {
    quotes: HashMap<Uuid, Quote>,
    shipments: HashMap<Uuid, Shipment>,
    events: Vec<TrackingEvent>,
    orders: HashMap<Uuid, Order>,
    addresses: HashMap<Uuid, Address>,
    carts: HashMap<(Uuid, Uuid), Cart>,
    vendor_addresses: HashMap<Uuid, Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_order(&self, order: Order) {
        self.state.lock().await.orders.insert(order.id, order);
    }

    pub async fn insert_address(&self, address: Address) {
        self.state.lock().await.addresses.insert(address.id, address);
    }

    pub async fn insert_cart(&self, cart: Cart) {
        self.state
            .lock()
            .await
            .carts
            .insert((cart.user_id, cart.vendor_id), cart);
    }

    pub async fn set_vendor_address(&self, vendor_id: Uuid, address_id: Uuid) {
        self.state
            .lock()
            .await
            .vendor_addresses
            .insert(vendor_id, address_id);
    }

    pub async fn shipment_count(&self) -> usize {
        self.state.lock().await.shipments.len()
    }
}

fn with_quote<T>(
    quotes: &mut HashMap<Uuid, Quote>,
    id: Uuid,
    transition: impl FnOnce(&mut Quote) -> DeliveryResult<T>,
) -> DeliveryResult<Quote> {
    let quote = quotes.get_mut(&id).ok_or(DeliveryError::QuoteNotFound(id))?;
    transition(quote)?;
    Ok(quote.clone())
}

#[async_trait]
impl QuoteRepository for MemoryStore {
    async fn insert_quote(&self, quote: &Quote) -> DeliveryResult<()> {
        self.state.lock().await.quotes.insert(quote.id, quote.clone());
        Ok(())
    }

    async fn get_quote(&self, id: Uuid) -> DeliveryResult<Option<Quote>> {
        Ok(self.state.lock().await.quotes.get(&id).cloned())
    }

    async fn select_quote(&self, id: Uuid, selection: Selection, now: DateTime<Utc>) -> DeliveryResult<Quote> {
        let mut state = self.state.lock().await;
        with_quote(&mut state.quotes, id, |q| q.select(selection, now))
    }

    async fn cancel_quote(&self, id: Uuid, now: DateTime<Utc>) -> DeliveryResult<Quote> {
        let mut state = self.state.lock().await;
        with_quote(&mut state.quotes, id, |q| q.cancel(now))
    }

    async fn expire_quote(&self, id: Uuid, now: DateTime<Utc>) -> DeliveryResult<Quote> {
        let mut state = self.state.lock().await;
        with_quote(&mut state.quotes, id, |q| Ok(q.expire(now)))
    }

    async fn expire_stale_quotes(&self, now: DateTime<Utc>) -> DeliveryResult<u64> {
        let mut state = self.state.lock().await;
        let expired = state
            .quotes
            .values_mut()
            .filter(|q| q.is_expired_at(now))
            .map(|q| q.expire(now))
            .filter(|changed| *changed)
            .count();
        Ok(expired as u64)
    }
}

#[async_trait]
impl ShipmentRepository for MemoryStore {
    async fn create_from_quote(&self, quote_id: Uuid, shipment: &Shipment, now: DateTime<Utc>) -> DeliveryResult<Quote> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if state
            .shipments
            .values()
            .any(|s| s.order_id == shipment.order_id && s.status != ShipmentStatus::Cancelled)
        {
            return Err(DeliveryError::ShipmentAlreadyExists(shipment.order_id));
        }
        if state
            .shipments
            .values()
            .any(|s| s.tracking_number == shipment.tracking_number)
        {
            return Err(DeliveryError::Storage(format!(
                "duplicate tracking number {}",
                shipment.tracking_number
            )));
        }

        let used = with_quote(&mut state.quotes, quote_id, |q| q.mark_used(shipment.id, now))?;
        state.shipments.insert(shipment.id, shipment.clone());
        Ok(used)
    }

    async fn find_shipment(&self, id: Uuid) -> DeliveryResult<Option<Shipment>> {
        Ok(self.state.lock().await.shipments.get(&id).cloned())
    }

    async fn find_by_tracking(&self, tracking_number: &str) -> DeliveryResult<Option<Shipment>> {
        Ok(self
            .state
            .lock()
            .await
            .shipments
            .values()
            .find(|s| s.tracking_number == tracking_number)
            .cloned())
    }

    async fn find_active_for_order(&self, order_id: Uuid) -> DeliveryResult<Option<Shipment>> {
        Ok(self
            .state
            .lock()
            .await
            .shipments
            .values()
            .find(|s| s.order_id == order_id && s.status != ShipmentStatus::Cancelled)
            .cloned())
    }

    async fn record_transition(
        &self,
        expected: ShipmentStatus,
        updated: &Shipment,
        event: &TrackingEvent,
    ) -> DeliveryResult<bool> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let current = state
            .shipments
            .get_mut(&updated.id)
            .ok_or_else(|| DeliveryError::ShipmentNotFound(updated.tracking_number.clone()))?;

        if current.status != expected {
            return Ok(false);
        }
        *current = updated.clone();
        state.events.push(event.clone());
        Ok(true)
    }

    async fn tracking_events(&self, shipment_id: Uuid) -> DeliveryResult<Vec<TrackingEvent>> {
        Ok(self
            .state
            .lock()
            .await
            .events
            .iter()
            .filter(|e| e.shipment_id == shipment_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn find_order(&self, id: Uuid) -> DeliveryResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn save_order(&self, order: &Order) -> DeliveryResult<()> {
        self.state.lock().await.orders.insert(order.id, order.clone());
        Ok(())
    }
}

#[async_trait]
impl AddressBook for MemoryStore {
    async fn get_address(&self, id: Uuid) -> DeliveryResult<Option<Address>> {
        Ok(self.state.lock().await.addresses.get(&id).cloned())
    }

    async fn update_provider_address_code(&self, id: Uuid, code: CachedAddressCode) -> DeliveryResult<()> {
        let mut state = self.state.lock().await;
        let address = state
            .addresses
            .get_mut(&id)
            .ok_or(DeliveryError::AddressNotFound(id))?;
        address.remember_code(code);
        Ok(())
    }
}

#[async_trait]
impl CheckoutReader for MemoryStore {
    async fn get_cart_for_vendor(&self, user_id: Uuid, vendor_id: Uuid) -> DeliveryResult<Option<Cart>> {
        Ok(self.state.lock().await.carts.get(&(user_id, vendor_id)).cloned())
    }

    async fn get_vendor_address(&self, vendor_id: Uuid) -> DeliveryResult<Option<Uuid>> {
        Ok(self.state.lock().await.vendor_addresses.get(&vendor_id).copied())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub message: String,
}

/// Notifier that keeps what it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_order_update(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        status: OrderStatus,
        message: &str,
    ) -> DeliveryResult<()> {
        tracing::info!(%order_id, %status, "Order update notification");
        self.sent.lock().await.push(SentNotification {
            user_id,
            order_id,
            status,
            message: message.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chowline_core::ProviderId;
    use chowline_providers::mock::MockProvider;
    use chowline_providers::CreatedShipment;
    use chowline_quote::QuoteStatus;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn selection() -> Selection {
        Selection { by: "tester".into(), reason: None, confirmed: false }
    }

    fn shipment_for(quote: &Quote, order_id: Uuid, tracking: &str) -> Shipment {
        let created = CreatedShipment {
            tracking_number: tracking.to_string(),
            label_url: None,
            courier_name: None,
            service_type: None,
            cost: Decimal::new(1200, 0),
            currency: "NGN".into(),
            estimated_delivery_at: None,
            raw: serde_json::Value::Null,
        };
        Shipment::from_created(quote, order_id, created, Utc::now())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consumption_has_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let quote = MockProvider::sample_quote(ProviderId::Regional);
        store.insert_quote(&quote).await.unwrap();
        store.select_quote(quote.id, selection(), Utc::now()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let quote = quote.clone();
            handles.push(tokio::spawn(async move {
                let shipment = shipment_for(&quote, Uuid::new_v4(), &format!("T{i}"));
                store.create_from_quote(quote.id, &shipment, Utc::now()).await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(used) => {
                    assert_eq!(used.status, QuoteStatus::Used);
                    wins += 1;
                }
                Err(e) => assert!(matches!(e, DeliveryError::QuoteAlreadyUsed(_))),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(store.shipment_count().await, 1);
    }

    #[tokio::test]
    async fn test_expiry_noticed_at_use_is_persisted() {
        let store = MemoryStore::new();
        let mut quote = MockProvider::sample_quote(ProviderId::International);
        quote.expires_at = Some(Utc::now() + Duration::minutes(5));
        store.insert_quote(&quote).await.unwrap();
        store.select_quote(quote.id, selection(), Utc::now()).await.unwrap();

        let later = Utc::now() + Duration::minutes(6);
        let shipment = shipment_for(&quote, Uuid::new_v4(), "T1");
        let err = store.create_from_quote(quote.id, &shipment, later).await.unwrap_err();
        assert!(matches!(err, DeliveryError::QuoteExpired(_)));

        let stored = store.get_quote(quote.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QuoteStatus::Expired);
        assert_eq!(store.shipment_count().await, 0);
    }

    #[tokio::test]
    async fn test_one_live_shipment_per_order() {
        let store = MemoryStore::new();
        let order_id = Uuid::new_v4();
        let first = MockProvider::sample_quote(ProviderId::Regional);
        let second = MockProvider::sample_quote(ProviderId::Regional);
        for q in [&first, &second] {
            store.insert_quote(q).await.unwrap();
            store.select_quote(q.id, selection(), Utc::now()).await.unwrap();
        }

        store
            .create_from_quote(first.id, &shipment_for(&first, order_id, "T1"), Utc::now())
            .await
            .unwrap();
        let err = store
            .create_from_quote(second.id, &shipment_for(&second, order_id, "T2"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::ShipmentAlreadyExists(id) if id == order_id));

        // the losing quote is left untouched
        let untouched = store.get_quote(second.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, QuoteStatus::Selected);
    }

    #[tokio::test]
    async fn test_record_transition_is_compare_and_set() {
        let store = MemoryStore::new();
        let quote = MockProvider::sample_quote(ProviderId::Regional);
        store.insert_quote(&quote).await.unwrap();
        store.select_quote(quote.id, selection(), Utc::now()).await.unwrap();
        let shipment = shipment_for(&quote, Uuid::new_v4(), "T1");
        store.create_from_quote(quote.id, &shipment, Utc::now()).await.unwrap();

        let now = Utc::now();
        let picked = shipment.transitioned(ShipmentStatus::PickedUp, None, now);
        let event = TrackingEvent {
            id: Uuid::new_v4(),
            shipment_id: shipment.id,
            status: ShipmentStatus::PickedUp,
            provider_status: Some("picked_up".into()),
            description: None,
            location: None,
            occurred_at: now,
            raw: None,
            created_at: now,
        };

        assert!(store.record_transition(ShipmentStatus::Pending, &picked, &event).await.unwrap());
        assert!(!store.record_transition(ShipmentStatus::Pending, &picked, &event).await.unwrap());
        assert_eq!(store.tracking_events(shipment.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_expires_only_stale_quotes() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut stale = MockProvider::sample_quote(ProviderId::International);
        stale.expires_at = Some(now - Duration::minutes(1));
        let mut fresh = MockProvider::sample_quote(ProviderId::International);
        fresh.expires_at = Some(now + Duration::minutes(10));
        let open_ended = MockProvider::sample_quote(ProviderId::Regional);
        for q in [&stale, &fresh, &open_ended] {
            store.insert_quote(q).await.unwrap();
        }

        assert_eq!(store.expire_stale_quotes(now).await.unwrap(), 1);
        assert_eq!(store.expire_stale_quotes(now).await.unwrap(), 0);
        let stored = store.get_quote(stale.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QuoteStatus::Expired);
    }
}
