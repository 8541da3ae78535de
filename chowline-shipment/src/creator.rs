use chowline_core::{DeliveryError, DeliveryResult};
use chowline_providers::ProviderRegistry;
use chowline_quote::QuoteRepository;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::Shipment;
use crate::repository::ShipmentRepository;

/// Turns a selected quote into a booked shipment.
#[derive(Clone)]
pub struct ShipmentCreator {
    providers: ProviderRegistry,
    quotes: Arc<dyn QuoteRepository>,
    shipments: Arc<dyn ShipmentRepository>,
}

impl ShipmentCreator {
    pub fn new(
        providers: ProviderRegistry,
        quotes: Arc<dyn QuoteRepository>,
        shipments: Arc<dyn ShipmentRepository>,
    ) -> Self {
        Self { providers, quotes, shipments }
    }

    pub async fn create(&self, quote_id: Uuid, order_id: Uuid) -> DeliveryResult<Shipment> {
        if self.shipments.find_active_for_order(order_id).await?.is_some() {
            return Err(DeliveryError::ShipmentAlreadyExists(order_id));
        }

        let quote = self
            .quotes
            .get_quote(quote_id)
            .await?
            .ok_or(DeliveryError::QuoteNotFound(quote_id))?;

        let now = Utc::now();
        if let Err(e) = quote.ensure_consumable(now) {
            if matches!(e, DeliveryError::QuoteExpired(_)) {
                self.quotes.expire_quote(quote_id, now).await?;
            }
            return Err(e);
        }
        if quote.provider.capabilities().requires_confirmation && quote.confirmed_at.is_none() {
            return Err(DeliveryError::QuoteNotConfirmed(quote_id));
        }

        let provider = self.providers.get(quote.provider);
        let created = provider.create_shipment(&quote, order_id).await?;
        let shipment = Shipment::from_created(&quote, order_id, created, Utc::now());

        match self
            .shipments
            .create_from_quote(quote_id, &shipment, shipment.created_at)
            .await
        {
            Ok(_) => {
                info!(
                    %quote_id,
                    %order_id,
                    tracking_number = %shipment.tracking_number,
                    provider = %shipment.provider,
                    "Shipment created"
                );
                Ok(shipment)
            }
            Err(e) => {
                // Booked with the provider but not recorded here: undo the booking.
                warn!(%quote_id, tracking_number = %shipment.tracking_number, error = %e, "Shipment commit failed, cancelling with provider");
                match provider.cancel_shipment(&shipment.tracking_number).await {
                    Ok(true) => {}
                    Ok(false) => error!(tracking_number = %shipment.tracking_number, "Provider refused compensating cancellation"),
                    Err(cancel_err) => error!(tracking_number = %shipment.tracking_number, error = %cancel_err, "Compensating cancellation failed"),
                }
                Err(e)
            }
        }
    }
}
