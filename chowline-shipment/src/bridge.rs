use chowline_core::order::{Notifier, OrderRepository, OrderStatus};
use chowline_core::{DeliveryError, DeliveryResult};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{Shipment, ShipmentStatus};

/// Order status a shipment status implies, if any.
pub fn order_status_for(status: ShipmentStatus) -> Option<OrderStatus> {
    match status {
        ShipmentStatus::PickedUp | ShipmentStatus::InTransit | ShipmentStatus::OutForDelivery => {
            Some(OrderStatus::OutForDelivery)
        }
        ShipmentStatus::Delivered => Some(OrderStatus::Delivered),
        ShipmentStatus::Failed | ShipmentStatus::Cancelled => Some(OrderStatus::Cancelled),
        ShipmentStatus::Pending | ShipmentStatus::Returned => None,
    }
}

pub fn message_for(shipment: &Shipment) -> String {
    match shipment.status {
        ShipmentStatus::PickedUp => format!(
            "Your order has been picked up and is on its way. Tracking number: {}",
            shipment.tracking_number
        ),
        ShipmentStatus::InTransit | ShipmentStatus::OutForDelivery => format!(
            "Your order is out for delivery. Tracking number: {}",
            shipment.tracking_number
        ),
        ShipmentStatus::Delivered => "Your order has been delivered. Enjoy your meal!".to_string(),
        ShipmentStatus::Failed => match &shipment.failure_reason {
            Some(reason) => format!("We could not deliver your order ({reason}). It has been cancelled."),
            None => "We could not deliver your order. It has been cancelled.".to_string(),
        },
        ShipmentStatus::Cancelled => "Your delivery was cancelled.".to_string(),
        ShipmentStatus::Pending | ShipmentStatus::Returned => {
            format!("Delivery update: {}", shipment.status)
        }
    }
}

/// Pushes shipment progress onto the owning order.
#[derive(Clone)]
pub struct OrderStatusBridge {
    orders: Arc<dyn OrderRepository>,
    notifier: Arc<dyn Notifier>,
}

impl OrderStatusBridge {
    pub fn new(orders: Arc<dyn OrderRepository>, notifier: Arc<dyn Notifier>) -> Self {
        Self { orders, notifier }
    }

    /// Apply the shipment's status to its order and notify the customer.
    /// Returns whether the order changed; unchanged orders send nothing.
    pub async fn on_shipment_status(&self, shipment: &Shipment) -> DeliveryResult<bool> {
        let Some(target) = order_status_for(shipment.status) else {
            return Ok(false);
        };

        let mut order = self
            .orders
            .find_order(shipment.order_id)
            .await?
            .ok_or(DeliveryError::OrderNotFound(shipment.order_id))?;
        if !order.update_status(target, Utc::now()) {
            return Ok(false);
        }
        self.orders.save_order(&order).await?;
        info!(order_id = %order.id, status = %target, tracking_number = %shipment.tracking_number, "Order status updated from delivery");

        let message = message_for(shipment);
        if let Err(e) = self
            .notifier
            .send_order_update(order.user_id, order.id, target, &message)
            .await
        {
            warn!(order_id = %order.id, error = %e, "Failed to send order update");
        }
        Ok(true)
    }
}
