//! Entry point for everything delivery: quoting, booking, tracking and
//! provider callbacks.

use chowline_core::address::AddressBook;
use chowline_core::checkout::CheckoutReader;
use chowline_core::order::{Notifier, OrderRepository};
use chowline_core::{select_provider, DeliveryError, DeliveryResult, ProviderCapabilities, ProviderId};
use chowline_providers::{ProviderRegistry, QuoteRequest};
use chowline_quote::{PackageManifest, Quote, QuoteRepository, Selection};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridge::OrderStatusBridge;
use crate::creator::ShipmentCreator;
use crate::gateway::AddressGateway;
use crate::memory::MemoryStore;
use crate::models::{Shipment, ShipmentStatus, ShipmentTrackingView};
use crate::reconciler::{ReconcileOutcome, StatusUpdate, TrackingReconciler};
use crate::repository::ShipmentRepository;

/// Validity given to quotes from providers that expire quotes but did not say when.
pub const DEFAULT_QUOTE_TTL_MINUTES: i64 = 15;

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequestInput {
    pub user_id: Uuid,
    pub vendor_id: Uuid,
    pub delivery_address_id: Uuid,
}

#[derive(Clone)]
pub struct DeliveryService {
    providers: ProviderRegistry,
    quotes: Arc<dyn QuoteRepository>,
    shipments: Arc<dyn ShipmentRepository>,
    orders: Arc<dyn OrderRepository>,
    checkout: Arc<dyn CheckoutReader>,
    gateway: AddressGateway,
    creator: ShipmentCreator,
    reconciler: TrackingReconciler,
}

impl DeliveryService {
    pub fn new(
        providers: ProviderRegistry,
        quotes: Arc<dyn QuoteRepository>,
        shipments: Arc<dyn ShipmentRepository>,
        orders: Arc<dyn OrderRepository>,
        addresses: Arc<dyn AddressBook>,
        checkout: Arc<dyn CheckoutReader>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let bridge = OrderStatusBridge::new(orders.clone(), notifier);
        Self {
            creator: ShipmentCreator::new(providers.clone(), quotes.clone(), shipments.clone()),
            reconciler: TrackingReconciler::new(shipments.clone(), bridge),
            gateway: AddressGateway::new(addresses),
            providers,
            quotes,
            shipments,
            orders,
            checkout,
        }
    }

    /// Everything backed by one in-memory store.
    pub fn in_memory(providers: ProviderRegistry, store: Arc<MemoryStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self::new(
            providers,
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            notifier,
        )
    }

    pub fn select_provider(&self, country: &str) -> ProviderId {
        select_provider(country)
    }

    pub fn capabilities(&self, country: &str) -> &'static ProviderCapabilities {
        select_provider(country).capabilities()
    }

    /// Price delivery of the user's cart from the vendor to the chosen
    /// address. The provider is picked by the vendor's country.
    pub async fn request_quote(&self, input: QuoteRequestInput) -> DeliveryResult<Quote> {
        let cart = self
            .checkout
            .get_cart_for_vendor(input.user_id, input.vendor_id)
            .await?
            .filter(|cart| !cart.items.is_empty())
            .ok_or(DeliveryError::CartNotFound(input.vendor_id))?;
        let vendor_address_id = self
            .checkout
            .get_vendor_address(input.vendor_id)
            .await?
            .ok_or(DeliveryError::AddressNotFound(input.vendor_id))?;

        let origin = self.gateway.load(vendor_address_id).await?;
        let destination = self.gateway.load(input.delivery_address_id).await?;
        let provider_id = select_provider(&origin.country);
        let provider = self.providers.get(provider_id);
        let caps = provider.capabilities();
        if !caps.serves(&destination.country) {
            return Err(DeliveryError::AddressNotServiceable(format!(
                "{provider_id} does not deliver to {}",
                destination.country
            )));
        }

        let origin = self.gateway.resolve(provider.as_ref(), origin).await?;
        let destination = self.gateway.resolve(provider.as_ref(), destination).await?;
        let now = Utc::now();
        let request = QuoteRequest {
            origin: origin.party(),
            destination: destination.party(),
            manifest: PackageManifest::from_cart(&cart),
            requested_at: now,
        };

        let mut offer = provider.get_quote(&request).await?;
        if caps.quotes_expire && offer.expires_at.is_none() {
            offer.expires_at = Some(now + Duration::minutes(DEFAULT_QUOTE_TTL_MINUTES));
        }
        let quote = Quote::new(provider_id, request.origin, request.destination, request.manifest, offer, now);
        self.quotes.insert_quote(&quote).await?;

        info!(
            quote_id = %quote.id,
            provider = %provider_id,
            fee = %quote.fee,
            currency = %quote.currency,
            "Delivery quote created"
        );
        Ok(quote)
    }

    pub async fn get_quote(&self, id: Uuid) -> DeliveryResult<Quote> {
        self.quotes
            .get_quote(id)
            .await?
            .ok_or(DeliveryError::QuoteNotFound(id))
    }

    /// PENDING → SELECTED. For providers that require it, acceptance is also
    /// the confirmation step.
    pub async fn accept_quote(&self, id: Uuid, by: &str, reason: Option<String>) -> DeliveryResult<Quote> {
        let quote = self.get_quote(id).await?;
        let selection = Selection {
            by: by.to_string(),
            reason,
            confirmed: quote.provider.capabilities().requires_confirmation,
        };
        let selected = self.quotes.select_quote(id, selection, Utc::now()).await?;
        info!(quote_id = %id, selected_by = by, "Delivery quote accepted");
        Ok(selected)
    }

    pub async fn cancel_quote(&self, id: Uuid) -> DeliveryResult<Quote> {
        let quote = self.quotes.cancel_quote(id, Utc::now()).await?;
        info!(quote_id = %id, status = %quote.status, "Delivery quote cancelled");
        Ok(quote)
    }

    pub async fn create_shipment(&self, quote_id: Uuid, order_id: Uuid) -> DeliveryResult<Shipment> {
        self.orders
            .find_order(order_id)
            .await?
            .ok_or(DeliveryError::OrderNotFound(order_id))?;
        self.creator.create(quote_id, order_id).await
    }

    async fn shipment_by_tracking(&self, tracking_number: &str) -> DeliveryResult<Shipment> {
        self.shipments
            .find_by_tracking(tracking_number)
            .await?
            .ok_or_else(|| DeliveryError::ShipmentNotFound(tracking_number.to_string()))
    }

    /// Current state plus history. Live shipments are refreshed from the
    /// provider first; if it cannot be reached the stored view is returned.
    pub async fn track_shipment(&self, tracking_number: &str) -> DeliveryResult<ShipmentTrackingView> {
        let shipment = self.shipment_by_tracking(tracking_number).await?;

        if !shipment.status.is_terminal() {
            let provider = self.providers.get(shipment.provider);
            match provider.track_shipment(tracking_number).await {
                Ok(live) => {
                    let update = StatusUpdate {
                        tracking_number: tracking_number.to_string(),
                        raw_status: live.raw_status,
                        description: live.description,
                        location: live.location,
                        occurred_at: live.occurred_at,
                        raw: Some(live.raw),
                    };
                    if let Err(e) = self.reconciler.apply_raw(shipment.provider, update).await {
                        warn!(tracking_number, error = %e, "Could not apply live tracking status");
                    }
                }
                Err(e) => {
                    warn!(tracking_number, error = %e, "Provider tracking unavailable, serving stored status");
                }
            }
        }

        let shipment = self.shipment_by_tracking(tracking_number).await?;
        let events = self.shipments.tracking_events(shipment.id).await?;
        Ok(ShipmentTrackingView { shipment, events })
    }

    pub async fn cancel_shipment(&self, tracking_number: &str, reason: Option<String>) -> DeliveryResult<Shipment> {
        let shipment = self.shipment_by_tracking(tracking_number).await?;
        if shipment.status == ShipmentStatus::Cancelled {
            return Ok(shipment);
        }
        let refused = || DeliveryError::InvalidShipmentTransition {
            from: shipment.status.to_string(),
            to: ShipmentStatus::Cancelled.to_string(),
        };
        if shipment.status.is_terminal() {
            return Err(refused());
        }

        if !self
            .providers
            .get(shipment.provider)
            .cancel_shipment(tracking_number)
            .await?
        {
            return Err(refused());
        }

        let update = StatusUpdate {
            tracking_number: tracking_number.to_string(),
            raw_status: "cancelled".to_string(),
            description: reason,
            location: None,
            occurred_at: None,
            raw: None,
        };
        self.reconciler
            .apply_status(shipment.provider, ShipmentStatus::Cancelled, update)
            .await?;
        self.shipment_by_tracking(tracking_number).await
    }

    pub fn signature_header(&self, provider: ProviderId) -> &'static str {
        self.providers.get(provider).signature_header()
    }

    /// Verify, decode and reconcile one provider callback.
    pub async fn process_webhook(
        &self,
        provider: ProviderId,
        signature: Option<&str>,
        body: &[u8],
    ) -> DeliveryResult<ReconcileOutcome> {
        let client = self.providers.get(provider);
        client.verify_webhook(body, signature)?;
        let event = client.parse_webhook(body)?;

        let Some(raw_status) = event.raw_status else {
            debug!(%provider, event_type = %event.event_type, tracking_number = %event.tracking_number, "Callback carries no status");
            return Ok(ReconcileOutcome::Ignored);
        };
        let update = StatusUpdate {
            tracking_number: event.tracking_number,
            raw_status,
            description: event.description,
            location: event.location,
            occurred_at: event.occurred_at,
            raw: Some(event.raw),
        };
        self.reconciler.apply_raw(provider, update).await
    }

    pub async fn expire_stale_quotes(&self) -> DeliveryResult<u64> {
        let expired = self.quotes.expire_stale_quotes(Utc::now()).await?;
        if expired > 0 {
            info!(expired, "Expired stale delivery quotes");
        }
        Ok(expired)
    }
}
